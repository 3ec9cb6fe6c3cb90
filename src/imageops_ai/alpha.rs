use anyhow::{anyhow, ensure, Result};
use image::{ImageBuffer, Luma, Pixel, Primitive, Rgb, Rgba};
use num_traits::AsPrimitive;

use crate::imageops_ai::get_max_value;

pub trait AlphaChannel<S>
where
    S: Primitive + 'static,
{
    /// Copies the alpha channel out as a single-channel image.
    fn extract_alpha(&self) -> ImageBuffer<Luma<S>, Vec<S>>;

    /// Overwrites the alpha channel with `mask`, leaving colour untouched.
    fn replace_alpha(&mut self, mask: &ImageBuffer<Luma<S>, Vec<S>>) -> Result<()>;
}

impl<S> AlphaChannel<S> for ImageBuffer<Rgba<S>, Vec<S>>
where
    Rgba<S>: Pixel<Subpixel = S>,
    Luma<S>: Pixel<Subpixel = S>,
    S: Primitive + 'static,
{
    fn extract_alpha(&self) -> ImageBuffer<Luma<S>, Vec<S>> {
        ImageBuffer::from_fn(self.width(), self.height(), |x, y| {
            let Rgba([_, _, _, alpha]) = *self.get_pixel(x, y);
            Luma([alpha])
        })
    }

    fn replace_alpha(&mut self, mask: &ImageBuffer<Luma<S>, Vec<S>>) -> Result<()> {
        ensure!(
            self.dimensions() == mask.dimensions(),
            "Image and alpha mask dimensions do not match: image {:?}, mask {:?}",
            self.dimensions(),
            mask.dimensions()
        );

        for (pixel, &Luma([alpha])) in self.pixels_mut().zip(mask.pixels()) {
            pixel[3] = alpha;
        }
        Ok(())
    }
}

pub trait AlphaMaskApplicable<SI>
where
    SI: Primitive + AsPrimitive<f32> + 'static,
{
    fn apply_alpha_mask<SM>(
        self,
        mask: &ImageBuffer<Luma<SM>, Vec<SM>>,
    ) -> Result<ImageBuffer<Rgba<SI>, Vec<SI>>>
    where
        Rgba<SI>: Pixel<Subpixel = SI>,
        SM: Primitive + AsPrimitive<f32> + 'static,
        f32: AsPrimitive<SM>;
}

impl<SI> AlphaMaskApplicable<SI> for ImageBuffer<Rgb<SI>, Vec<SI>>
where
    Rgb<SI>: Pixel<Subpixel = SI>,
    SI: Primitive + AsPrimitive<f32> + 'static,
    f32: AsPrimitive<SI>,
{
    fn apply_alpha_mask<SM>(
        self,
        mask: &ImageBuffer<Luma<SM>, Vec<SM>>,
    ) -> Result<ImageBuffer<Rgba<SI>, Vec<SI>>>
    where
        Rgba<SI>: Pixel<Subpixel = SI>,
        SM: Primitive + AsPrimitive<f32> + 'static,
        f32: AsPrimitive<SM>,
    {
        ensure!(
            self.dimensions() == mask.dimensions(),
            "Image and mask dimensions do not match"
        );

        let si_max: f32 = get_max_value::<SI>().as_();
        let sm_max: f32 = get_max_value::<SM>().as_();

        let processed_pixels = self
            .pixels()
            .zip(mask.pixels())
            .flat_map(|(&image_pixel, &mask_pixel)| {
                let Rgb([red, green, blue]) = image_pixel;
                let Luma([alpha]) = mask_pixel;
                let alpha = (alpha.as_() / sm_max * si_max).as_();
                [red, green, blue, alpha]
            })
            .collect::<Vec<SI>>();

        ImageBuffer::from_raw(self.width(), self.height(), processed_pixels)
            .ok_or_else(|| anyhow!("Failed to create ImageBuffer from processed pixels"))
    }
}
