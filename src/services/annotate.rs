use ab_glyph::FontVec;
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info};

use crate::models::inference::Detection;
use crate::models::result::AnnotatedImage;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Gap between a box and its tag, in pixels.
const TAG_GAP: i32 = 5;

const SYSTEM_FONT_PATHS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Draws detection boxes and `label confidence%` tags, then JPEG-encodes the result.
pub struct Annotator {
    /// Tags are drawn without text when no font is loaded.
    font: Option<FontVec>,
    font_scale: f32,
    box_thickness: i32,
    jpeg_quality: u8,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: 16.0,
            box_thickness: 2,
            jpeg_quality: 75,
        }
    }
}

impl Annotator {
    pub fn with_font_path(font_path: &Path) -> Result<Self, EncodingError> {
        let font_data = std::fs::read(font_path)
            .map_err(|e| EncodingError::Font(format!("{}: {}", font_path.display(), e)))?;
        let font = FontVec::try_from_vec(font_data)
            .map_err(|_| EncodingError::Font(format!("{}: not a valid font", font_path.display())))?;

        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    /// Probe common system font locations, falling back to text-less tags.
    pub fn with_system_font() -> Self {
        for path in SYSTEM_FONT_PATHS {
            if let Ok(annotator) = Self::with_font_path(Path::new(path)) {
                info!(font = path, "Loaded annotation font");
                return annotator;
            }
        }

        debug!("No system font found, annotation tags will have no text");
        Self::default()
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render `detections` onto a copy of `image`. The input buffer is left untouched.
    pub fn annotate(
        &self,
        image: &RgbImage,
        detections: &[Detection],
    ) -> Result<AnnotatedImage, EncodingError> {
        let mut canvas = image.clone();

        for detection in detections {
            self.draw_box(&mut canvas, detection);
            self.draw_tag(&mut canvas, detection);
        }

        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality).encode_image(&canvas)?;
        Ok(AnnotatedImage::from_jpeg(buf))
    }

    fn draw_box(&self, canvas: &mut RgbImage, detection: &Detection) {
        let b = &detection.bounding_box;
        let (img_w, img_h) = canvas.dimensions();
        let pad = self.box_thickness;
        let (x1, y1) = (clamp_coord(b.x1, img_w, pad), clamp_coord(b.y1, img_h, pad));
        let width = (clamp_coord(b.x2, img_w, pad) - x1).max(1) as u32;
        let height = (clamp_coord(b.y2, img_h, pad) - y1).max(1) as u32;

        for t in 0..self.box_thickness {
            let rect = Rect::at(x1 - t, y1 - t)
                .of_size(width + 2 * t as u32, height + 2 * t as u32);
            draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
        }
    }

    fn draw_tag(&self, canvas: &mut RgbImage, detection: &Detection) {
        let Some(font) = &self.font else { return };

        let text = format!(
            "{} {:.1}%",
            detection.label,
            detection.confidence * 100.0
        );
        let (text_w, text_h) = text_size(self.font_scale, font, &text);
        let tag_size = (text_w.max(1), text_h.max(1));

        let (x, y) = tag_origin(
            &detection.bounding_box,
            tag_size,
            canvas.dimensions(),
        );

        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(tag_size.0, tag_size.1), BOX_COLOR);
        draw_text_mut(canvas, TEXT_COLOR, x, y, self.font_scale, font, &text);
    }
}

/// Top-left corner of a tag of `tag_size` for the given box.
///
/// Prefers the right of the box, top-aligned; moves above the box when it would
/// run off the bottom and to the left side when it would run off the right edge.
/// The result is clamped inside the image.
pub(crate) fn tag_origin(
    bbox: &crate::models::inference::BoundingBox,
    tag_size: (u32, u32),
    image_size: (u32, u32),
) -> (i32, i32) {
    let (tag_w, tag_h) = (tag_size.0 as i32, tag_size.1 as i32);
    let (img_w, img_h) = (image_size.0 as i32, image_size.1 as i32);
    let (x1, y1, x2) = (
        clamp_coord(bbox.x1, image_size.0, tag_w),
        clamp_coord(bbox.y1, image_size.1, tag_h),
        clamp_coord(bbox.x2, image_size.0, tag_w),
    );

    let mut x = x2 + TAG_GAP;
    if x + tag_w > img_w {
        x = x1 - tag_w - TAG_GAP;
    }
    let x = x.min(img_w - tag_w).max(0);

    let y = if y1 + tag_h + TAG_GAP < img_h {
        y1
    } else {
        y1 - tag_h - TAG_GAP
    };
    let y = y.min(img_h - tag_h).max(0);

    (x, y)
}

/// Pixel coordinate limited to `[-pad, limit + pad]` so drawing offsets cannot overflow.
fn clamp_coord(value: f64, limit: u32, pad: i32) -> i32 {
    let pad = f64::from(pad.max(0));
    value.clamp(-pad, f64::from(limit) + pad) as i32
}

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to load annotation font {0}")]
    Font(String),

    #[error("Annotation task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inference::{BoundingBox, DetectionLabel};

    fn sample_image() -> RgbImage {
        RgbImage::from_fn(100, 50, |x, y| Rgb([(x * 2) as u8, (y * 4) as u8, 128]))
    }

    fn logo(bbox: BoundingBox) -> Detection {
        Detection {
            class_id: 1,
            label: DetectionLabel::Logo,
            confidence: 0.82,
            bounding_box: bbox,
        }
    }

    #[test]
    fn test_empty_detections_produce_decodable_jpeg() {
        let image = sample_image();
        let annotated = Annotator::default().annotate(&image, &[]).unwrap();

        assert!(!annotated.is_empty());
        let decoded = image::load_from_memory(annotated.as_bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_annotate_leaves_input_untouched() {
        let image = sample_image();
        let before = image.clone();

        Annotator::default()
            .annotate(&image, &[logo(BoundingBox::new(10.0, 10.0, 40.0, 30.0))])
            .unwrap();

        assert_eq!(image, before);
    }

    #[test]
    fn test_annotate_is_deterministic() {
        let image = sample_image();
        let detections = [logo(BoundingBox::new(10.0, 10.0, 40.0, 30.0))];
        let annotator = Annotator::default();

        let a = annotator.annotate(&image, &detections).unwrap();
        let b = annotator.annotate(&image, &detections).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_boxes_are_drawn() {
        let image = RgbImage::new(100, 50);
        let annotated = Annotator::default()
            .with_jpeg_quality(100)
            .annotate(&image, &[logo(BoundingBox::new(10.0, 10.0, 40.0, 30.0))])
            .unwrap();
        let decoded = image::load_from_memory(annotated.as_bytes()).unwrap().to_rgb8();

        let edge = decoded.get_pixel(25, 10);
        assert!(edge[1] > 150, "expected green box edge, got {:?}", edge);
        let inside = decoded.get_pixel(25, 20);
        assert!(inside[1] < 100, "box interior should stay dark, got {:?}", inside);
    }

    #[test]
    fn test_boxes_outside_image_do_not_panic() {
        let image = sample_image();
        let detections = [
            logo(BoundingBox::new(-50.0, -50.0, 500.0, 500.0)),
            logo(BoundingBox::new(99.0, 49.0, 99.0, 49.0)),
        ];
        assert!(Annotator::default().annotate(&image, &detections).is_ok());
    }

    #[test]
    fn test_extreme_box_coordinates_are_clamped() {
        let image = sample_image();
        let detections = [
            logo(BoundingBox::new(-1e12, -1e12, 1e12, 1e12)),
            logo(BoundingBox::new(f64::MAX, f64::MAX, f64::MAX, f64::MAX)),
            logo(BoundingBox::new(f64::MIN, 10.0, 30.0, 20.0)),
        ];
        assert!(Annotator::default().annotate(&image, &detections).is_ok());

        assert_eq!(clamp_coord(-1e12, 100, 2), -2);
        assert_eq!(clamp_coord(1e12, 100, 2), 102);
        assert_eq!(clamp_coord(42.7, 100, 2), 42);

        let bbox = BoundingBox::new(f64::MIN, f64::MIN, f64::MAX, f64::MAX);
        let (x, y) = tag_origin(&bbox, (20, 10), (100, 50));
        assert!((0..=80).contains(&x));
        assert!((0..=40).contains(&y));
    }

    #[test]
    fn test_tag_defaults_to_right_of_box() {
        let bbox = BoundingBox::new(10.0, 10.0, 40.0, 30.0);
        assert_eq!(tag_origin(&bbox, (20, 10), (200, 100)), (45, 10));
    }

    #[test]
    fn test_tag_moves_left_when_overflowing_right_edge() {
        let bbox = BoundingBox::new(60.0, 10.0, 90.0, 30.0);
        assert_eq!(tag_origin(&bbox, (30, 10), (100, 100)), (25, 10));
    }

    #[test]
    fn test_tag_moves_above_near_bottom_edge() {
        let bbox = BoundingBox::new(10.0, 90.0, 40.0, 99.0);
        assert_eq!(tag_origin(&bbox, (20, 10), (200, 100)), (45, 75));
    }

    #[test]
    fn test_tag_is_clamped_inside_image() {
        let bbox = BoundingBox::new(0.0, 0.0, 95.0, 5.0);
        let (x, y) = tag_origin(&bbox, (80, 10), (100, 100));
        assert_eq!((x, y), (0, 0));

        let bbox = BoundingBox::new(10.0, 0.0, 20.0, 5.0);
        let (x, _) = tag_origin(&bbox, (120, 10), (100, 100));
        assert_eq!(x, 0);
    }

    #[test]
    fn test_missing_font_path_is_an_error() {
        let result = Annotator::with_font_path(Path::new("/nonexistent/font.ttf"));
        assert!(matches!(result, Err(EncodingError::Font(_))));
    }
}
