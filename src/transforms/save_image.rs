use crate::labels::ClassMap;

use super::pipeline::Transform;
use ab_glyph::{FontVec, PxScale};
use burn::{
    prelude::Backend,
    tensor::{cast::ToElement, s},
};
use imageproc::drawing::{draw_hollow_rect, draw_text_mut};

const FONT_FILE: &str = "./assets/fonts/DejaVuSans.ttf";

impl<B: Backend> Transform<B> {
    /// Saves the current image tensor to `path`, drawing any bounding
    /// boxes and class names on top first.
    ///
    /// The tensor is assumed to be `[C, H, W]` with 0–255 pixel values and
    /// boxes in pixel coordinates; run this before `normalize`, or on the
    /// decoded inference output. Each box is outlined in the average
    /// complementary color of the area it covers so the overlay stays
    /// visible against the scene.
    pub fn save_as(&mut self, path: String, class_map: &ClassMap) -> Self {
        let [_ch, height, width] = self.image.dims();

        let t = self.image.clone().permute([1, 2, 0]);

        let buf: Vec<u8> = t
            .to_data()
            .to_vec::<f32>()
            .unwrap()
            .iter()
            .map(|&p| p as u8)
            .collect();

        let mut image = image::RgbImage::from_vec(width as u32, height as u32, buf).unwrap();

        let font_bytes = std::fs::read(FONT_FILE)
            .unwrap_or_else(|_| panic!("Label font not found at {}", FONT_FILE));
        let font = FontVec::try_from_vec(font_bytes).expect("Label font could not be parsed");

        if let Some(bboxes) = self.bboxes.clone() {
            let bboxes = bboxes.split(1, 0);

            for (i, bbox) in bboxes.iter().enumerate() {
                let (x1, y1, x2, y2) = (
                    bbox.clone().slice(s![0, 0]).into_scalar().to_f32(),
                    bbox.clone().slice(s![0, 1]).into_scalar().to_f32(),
                    bbox.clone().slice(s![0, 2]).into_scalar().to_f32(),
                    bbox.clone().slice(s![0, 3]).into_scalar().to_f32(),
                );
                let box_width = x2 - x1;
                let box_height = y2 - y1;

                let rect = imageproc::rect::Rect::at(x1 as i32, y1 as i32)
                    .of_size((box_width) as u32, (box_height) as u32);

                // Clamp the sampling area; a box flush with the image edge
                // would otherwise fall outside the crop bounds
                let color = image::Rgb(self.complementary(
                    x1,
                    y1,
                    x2.min(width as f32 - 1.0),
                    y2.min(height as f32 - 1.0),
                ));

                image = draw_hollow_rect(&image, rect, color);

                let label = self
                    .labels
                    .clone()
                    .unwrap()
                    .slice(s![i])
                    .into_scalar()
                    .to_usize();
                let text = class_map.id_to_name(&label);

                draw_text_mut(
                    &mut image,
                    color,
                    x1 as i32 + 5,
                    y1 as i32 + 5,
                    PxScale {
                        x: 12.4 * 1.5,
                        y: 12.4,
                    },
                    &font,
                    text,
                );
            }
        }

        image.save(path).unwrap();

        self.clone()
    }
}
