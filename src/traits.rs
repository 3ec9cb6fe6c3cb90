use std::path::Path;

use crate::errors::Result;
use crate::upscale::ModelDescriptor;

/// Super-resolution backend: the bundled RealESRGAN process or a test double.
///
/// Implementations write an opaque RGB PNG to `output` regardless of its
/// extension.
pub trait Upscaler {
    /// Enlarges `input` by `model.scale` and saves the result to `output`.
    fn upscale(&self, input: &Path, output: &Path, model: &ModelDescriptor) -> Result<()>;
}

/// Background removal over encoded image bytes, returning a PNG whose
/// background pixels are transparent.
pub trait BackgroundRemover {
    fn remove_background(&self, input: &[u8]) -> Result<Vec<u8>>;
}
