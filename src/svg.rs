use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};

use crate::convert::flatten_onto_white;
use crate::errors::{BridgeError, Result};
use crate::status::{Status, StatusWriter};
use crate::upscale::open_image;

/// Wraps `input` as a PNG data URI inside a minimal SVG document.
pub fn run<W: Write>(input: &Path, output: &Path, status: &mut StatusWriter<W>) -> Result<()> {
    status.emit(Status::Processing)?;
    status.emit(Status::ConvertingToSvg)?;

    status.emit(Status::LoadingImage)?;
    let image = open_image(input, "open image")?;
    if image.color().has_alpha() {
        status.emit(Status::ConvertingColorSpace)?;
    }
    let image = flatten_onto_white(&image);

    let document = render(&image)?;

    status.emit(Status::Saving)?;
    fs::write(output, document).map_err(|e| BridgeError::file_system("write svg", output, e))
}

/// SVG text sized to the image's pixels, embedding it as base64 PNG and
/// asking the renderer not to smooth it.
pub fn render(image: &DynamicImage) -> Result<String> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| BridgeError::codec("encode embedded png", "in-memory", e))?;

    let (width, height) = (image.width(), image.height());
    let data = STANDARD.encode(&png);

    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}" viewBox="0 0 {width} {height}">
  <style>image {{ image-rendering: pixelated; image-rendering: crisp-edges; }}</style>
  <image x="0" y="0" width="{width}" height="{height}" xlink:href="data:image/png;base64,{data}"/>
</svg>
"#
    ))
}
