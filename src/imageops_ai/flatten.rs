use image::{ImageBuffer, Pixel, Primitive, Rgb, Rgba};
use num_traits::AsPrimitive;

use crate::imageops_ai::get_max_value;

/// Composites an image with alpha onto an opaque background, dropping the
/// alpha channel: `out = colour * a + background * (1 - a)`.
pub trait FlattenAlpha {
    type Output;
    type Background;

    fn flatten_onto(&self, background: Self::Background) -> Self::Output;
}

fn blend<S>(channel: S, background: S, alpha: f32) -> S
where
    S: Primitive + AsPrimitive<f32> + 'static,
    f32: AsPrimitive<S>,
{
    let channel: f32 = channel.as_();
    let background: f32 = background.as_();
    let value = channel * alpha + background * (1.0 - alpha);
    if super::is_floating_point::<S>() {
        value.as_()
    } else {
        value.round().as_()
    }
}

impl<S> FlattenAlpha for ImageBuffer<Rgba<S>, Vec<S>>
where
    Rgba<S>: Pixel<Subpixel = S>,
    Rgb<S>: Pixel<Subpixel = S>,
    S: Primitive + AsPrimitive<f32> + 'static,
    f32: AsPrimitive<S>,
{
    type Output = ImageBuffer<Rgb<S>, Vec<S>>;
    type Background = Rgb<S>;

    fn flatten_onto(&self, background: Rgb<S>) -> Self::Output {
        let max: f32 = get_max_value::<S>().as_();
        let Rgb([br, bg, bb]) = background;
        let mut img = ImageBuffer::new(self.width(), self.height());
        for (x, y, p) in self.enumerate_pixels() {
            let Rgba([r, g, b, a]) = *p;
            let a: f32 = a.as_() / max;
            img.put_pixel(
                x,
                y,
                Rgb([blend(r, br, a), blend(g, bg, a), blend(b, bb, a)]),
            );
        }
        img
    }
}
