use std::io::Cursor;

use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{CardLabError, CardLabResult};

/// Prefix every stored layer carries; the service round-trips bare base64.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Encode straight-alpha RGBA8 pixels as a PNG data URI.
///
/// Card surfaces are premultiplied, but every layer starts from an opaque
/// background fill, so the bytes are identical either way.
pub fn encode_png_data_uri(rgba8: &[u8], width: u32, height: u32) -> CardLabResult<String> {
    let img = image::RgbaImage::from_raw(width, height, rgba8.to_vec())
        .ok_or_else(|| CardLabError::serde("pixel buffer does not match dimensions"))?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .context("encode layer png")?;

    Ok(format!("{PNG_DATA_URI_PREFIX}{}", BASE64.encode(&png)))
}

/// Wrap a bare base64 PNG payload (as returned by the service) as a data URI.
pub fn wrap_png_base64(base64_image: &str) -> String {
    format!("{PNG_DATA_URI_PREFIX}{base64_image}")
}

/// A decoded layer in premultiplied RGBA8 form, ready to become a paint.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Vec<u8>,
}

/// Decode a stored layer. Accepts a full data URI or bare base64.
pub fn decode_data_uri(uri: &str) -> CardLabResult<DecodedImage> {
    let payload = match uri.strip_prefix(PNG_DATA_URI_PREFIX) {
        Some(rest) => rest,
        None if uri.starts_with("data:") => uri
            .split_once(";base64,")
            .map(|(_, rest)| rest)
            .ok_or_else(|| CardLabError::serde("data URI is not base64-encoded"))?,
        None => uri,
    };

    let bytes = BASE64
        .decode(payload)
        .map_err(|e| CardLabError::serde(format!("decode layer base64: {e}")))?;
    let rgba = image::load_from_memory(&bytes)
        .context("decode layer image")?
        .to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(DecodedImage {
        width,
        height,
        rgba8_premul,
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((u16::from(px[0]) * a + 127) / 255) as u8;
        px[1] = ((u16::from(px[1]) * a + 127) / 255) as u8;
        px[2] = ((u16::from(px[2]) * a + 127) / 255) as u8;
    }
}
