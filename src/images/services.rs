use std::io::Cursor;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart,
    },
    http::StatusCode,
};
use bytes::{Bytes, BytesMut};
use image::{imageops::FilterType, ImageFormat};
use lazy_static::lazy_static;
use regex::Regex;

/// Side length of the stored avatar square.
pub const AVATAR_SIZE: u32 = 250;

/// Multipart field that carries the avatar file.
pub const AVATAR_FIELD: &str = "avatar";

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("Please upload an image")]
    UnsupportedType,
    #[error("File too large")]
    TooLarge,
    #[error("Unexpected field")]
    UnexpectedField,
    #[error("No avatar file provided")]
    Missing,
    #[error("Invalid image")]
    Decode(#[from] image::ImageError),
    #[error("{0}")]
    Multipart(String),
}

fn has_image_extension(file_name: &str) -> bool {
    lazy_static! {
        static ref IMAGE_EXT_RE: Regex = Regex::new(r"(?i)\.(jpg|jpeg|png)$").unwrap();
    }
    IMAGE_EXT_RE.is_match(file_name)
}

fn multipart_error(e: MultipartError) -> AvatarError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AvatarError::TooLarge
    } else {
        AvatarError::Multipart(e.body_text())
    }
}

/// Pulls the single `avatar` file out of the request, enforcing the
/// extension filter and `max_bytes` before the whole file is buffered.
pub async fn read_avatar_upload(
    multipart: Result<Multipart, MultipartRejection>,
    max_bytes: usize,
) -> Result<Bytes, AvatarError> {
    let mut mp = multipart.map_err(|e| AvatarError::Multipart(e.body_text()))?;
    let mut upload: Option<Bytes> = None;

    while let Some(mut field) = mp.next_field().await.map_err(multipart_error)? {
        // Non-file fields are ignored.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if field.name() != Some(AVATAR_FIELD) || upload.is_some() {
            return Err(AvatarError::UnexpectedField);
        }
        if !has_image_extension(&file_name) {
            return Err(AvatarError::UnsupportedType);
        }

        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if buf.len() + chunk.len() > max_bytes {
                return Err(AvatarError::TooLarge);
            }
            buf.extend_from_slice(&chunk);
        }
        upload = Some(buf.freeze());
    }

    upload.ok_or(AvatarError::Missing)
}

/// Crops and scales `raw` to an `AVATAR_SIZE` square and re-encodes it as PNG.
pub fn resize_avatar(raw: &[u8]) -> Result<Vec<u8>, AvatarError> {
    let img = image::load_from_memory(raw)?;
    let resized = img.resize_to_fill(AVATAR_SIZE, AVATAR_SIZE, FilterType::Lanczos3);
    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    use image::{DynamicImage, Rgb, RgbImage};

    let pixels = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
    let img = DynamicImage::ImageRgb8(pixels);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
