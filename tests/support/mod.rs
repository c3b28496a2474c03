#![allow(dead_code)]

pub mod socket_guard;

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

/// Encodes a small RGBA image whose left half is fully transparent.
pub fn half_transparent_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([200, 30, 30, 255])
        }
    });
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("png encoding should succeed");
    bytes.into_inner()
}

pub const SVG_DOCUMENT: &str =
    r#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"><rect width="4" height="4"/></svg>"#;
