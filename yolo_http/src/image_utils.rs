use crate::detection::Detection;
use ab_glyph::{Font, FontRef, InvalidFont, PxScale, ScaleFont};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::io::Cursor;
use thiserror::Error;

const BOX_THICKNESS: i32 = 2;
const LABEL_FONT: &[u8] = include_bytes!("../fonts/DejaVuSans.ttf");
const LABEL_SCALE: f32 = 14.0;
const LABEL_PADDING: u32 = 2;

#[derive(Error, Debug)]
pub enum ImageUtilsError {
    #[error("Failed to read image: {0}")]
    Read(std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),
    #[error("Failed to load label font: {0}")]
    Font(InvalidFont),
}

/// Guesses the format from the content and converts to 3-channel RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ImageUtilsError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageUtilsError::Read)?;

    let image = reader.decode().map_err(ImageUtilsError::Decode)?;

    Ok(image.to_rgb8())
}

pub fn resize_square(image: RgbImage, size: Option<u32>) -> RgbImage {
    match size {
        Some(side) if image.dimensions() != (side, side) => {
            image::imageops::resize(&image, side, side, FilterType::Triangle)
        }
        _ => image,
    }
}

pub fn label_font() -> Result<FontRef<'static>, ImageUtilsError> {
    FontRef::try_from_slice(LABEL_FONT).map_err(ImageUtilsError::Font)
}

fn text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luminance = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luminance > 150. {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

/// Filled bar behind the label: above the box when it fits, inside its top edge otherwise.
fn label_rect(font: &impl Font, label: &str, x1: i32, y1: i32) -> Rect {
    let scale = PxScale::from(LABEL_SCALE);
    let (text_width, _) = text_size(scale, font, label);
    let line_height = font.as_scaled(scale).height().ceil() as u32;

    let width = text_width.max(1) + 2 * LABEL_PADDING;
    let height = line_height.max(1) + 2 * LABEL_PADDING;
    let top = if y1 >= height as i32 { y1 - height as i32 } else { y1 };

    Rect::at(x1, top).of_size(width, height)
}

/// Draws each box in its class colour with a `label confidence` caption.
pub fn annotate(image: &mut RgbImage, detections: &[Detection]) -> Result<(), ImageUtilsError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(());
    }
    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;
    let font = label_font()?;
    let scale = PxScale::from(LABEL_SCALE);

    for detection in detections {
        let [x1, y1, x2, y2] = detection.bbox;
        let x1 = (x1.round() as i32).clamp(0, max_x);
        let y1 = (y1.round() as i32).clamp(0, max_y);
        let x2 = (x2.round() as i32).clamp(0, max_x);
        let y2 = (y2.round() as i32).clamp(0, max_y);

        for offset in 0..BOX_THICKNESS {
            let left = (x1 + offset).min(max_x);
            let top = (y1 + offset).min(max_y);
            let right = (x2 - offset).max(left);
            let bottom = (y2 - offset).max(top);

            let rect = Rect::at(left, top)
                .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
            draw_hollow_rect_mut(image, rect, detection.color);
        }

        let label = format!("{} {:.2}", detection.class_label, detection.confidence);
        let bar = label_rect(&font, &label, x1, y1);
        draw_filled_rect_mut(image, bar, detection.color);
        draw_text_mut(
            image,
            text_color(detection.color),
            bar.left() + LABEL_PADDING as i32,
            bar.top() + LABEL_PADDING as i32,
            scale,
            &font,
            &label,
        );
    }

    Ok(())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageUtilsError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(ImageUtilsError::Encode)?;
    Ok(buffer)
}
