//! Upload intake for image and audio search.
//!
//! Checks that an upload is what it claims to be, normalises images into the
//! shape the image feature extractor expects, and builds public playback URLs
//! for stored audio clips.

use image::{
    imageops::{self, FilterType},
    DynamicImage, GenericImageView, ImageFormat, ImageReader,
};
use std::io::Cursor;

/// Shorter image side after the first resize.
const RESIZE_SHORTER_SIDE: u32 = 256;
/// Side of the centred square handed to the extractor.
const CROP_SIDE: u32 = 224;
/// Larger uploads are rejected before decoding.
const MAX_IMAGE_SIDE: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    fn prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/",
            MediaKind::Audio => "audio/",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "an image",
            MediaKind::Audio => "an audio file",
        }
    }

    fn accepts(&self, sniffed: infer::MatcherType) -> bool {
        match self {
            MediaKind::Image => sniffed == infer::MatcherType::Image,
            // browsers record to webm/mp4 containers, which sniff as video
            MediaKind::Audio => matches!(
                sniffed,
                infer::MatcherType::Audio | infer::MatcherType::Video
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("uploaded file is empty")]
    Empty,

    #[error("File must be {expected}, got {found}")]
    WrongType { expected: &'static str, found: String },

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Validates an upload against its declared content type and its magic bytes.
///
/// Returns the content type to forward to the extractor.
pub fn check_upload(
    kind: MediaKind,
    declared: Option<&str>,
    data: &[u8],
) -> Result<String, MediaError> {
    if data.is_empty() {
        return Err(MediaError::Empty);
    }

    let declared = declared.unwrap_or_default().trim().to_lowercase();
    if !declared.starts_with(kind.prefix()) {
        return Err(MediaError::WrongType {
            expected: kind.label(),
            found: if declared.is_empty() {
                "no content type".to_string()
            } else {
                declared
            },
        });
    }

    if let Some(sniffed) = infer::get(data) {
        if !kind.accepts(sniffed.matcher_type()) {
            return Err(MediaError::WrongType {
                expected: kind.label(),
                found: sniffed.mime_type().to_string(),
            });
        }
    }

    Ok(declared)
}

/// Decodes an image and returns the centred 224x224 PNG that a resize of the
/// shorter side to 256 followed by a 224 centre crop would give.
///
/// The crop is taken in source coordinates first so memory stays bounded by
/// the upload, whatever its aspect ratio.
pub fn prepare_image(data: &[u8]) -> Result<Vec<u8>, MediaError> {
    let mut limits = image::Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_SIDE);
    limits.max_image_height = Some(MAX_IMAGE_SIDE);

    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(image::ImageError::from)?;
    reader.limits(limits);
    let img = reader.decode()?;

    let (width, height) = img.dimensions();
    let shorter = width.min(height);
    let side = ((shorter as u64 * CROP_SIDE as u64) / RESIZE_SHORTER_SIDE as u64).max(1) as u32;

    let cropped = img
        .crop_imm(width.saturating_sub(side) / 2, height.saturating_sub(side) / 2, side, side)
        .to_rgb8();
    let resized = imageops::resize(&cropped, CROP_SIDE, CROP_SIDE, FilterType::Triangle);

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(resized).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Public URL of a stored clip: base URL plus the last path segment.
///
/// Both `/` and `\` count as separators.
pub fn audio_url(base_url: &str, clip_path: &str) -> Option<String> {
    let filename = clip_path.rsplit(&['/', '\\'][..]).next()?.trim();
    if filename.is_empty() {
        return None;
    }

    Some(format!("{}/{filename}", base_url.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 200, 30, 255]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    // RIFF....WAVE header is enough for magic-byte sniffing
    fn create_test_wav() -> Vec<u8> {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&36u32.to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&[0u8; 24]);
        wav
    }

    #[test]
    fn test_audio_url_backslash_path() {
        assert_eq!(
            audio_url("http://localhost:8000/audio", r"C:\clips\sparrow_01.wav").as_deref(),
            Some("http://localhost:8000/audio/sparrow_01.wav")
        );
    }

    #[test]
    fn test_audio_url_forward_slash_and_mixed() {
        assert_eq!(
            audio_url("http://localhost:8000/audio/", "../clips_10sec/robin_3.wav").as_deref(),
            Some("http://localhost:8000/audio/robin_3.wav")
        );
        assert_eq!(
            audio_url("http://x/audio", r"data\clips/mixed\wren.wav").as_deref(),
            Some("http://x/audio/wren.wav")
        );
        assert_eq!(
            audio_url("http://x/audio", "plain.wav").as_deref(),
            Some("http://x/audio/plain.wav")
        );
    }

    #[test]
    fn test_audio_url_empty_path() {
        assert_eq!(audio_url("http://x/audio", ""), None);
        assert_eq!(audio_url("http://x/audio", "clips/"), None);
    }

    #[test]
    fn test_prepare_image_crops_to_square() {
        let png = create_test_png(640, 480);
        let prepared = prepare_image(&png).unwrap();

        let img = image::load_from_memory(&prepared).unwrap();
        assert_eq!(img.dimensions(), (224, 224));
        assert_eq!(image::guess_format(&prepared).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_prepare_image_upscales_small_images() {
        let png = create_test_png(10, 20);
        let img = image::load_from_memory(&prepare_image(&png).unwrap()).unwrap();
        assert_eq!(img.dimensions(), (224, 224));
    }

    #[test]
    fn test_prepare_image_thin_strip_stays_bounded() {
        // shorter side 1: a resize-then-crop would first build a 256x2_560_000 buffer
        let png = create_test_png(1, 10_000);
        let img = image::load_from_memory(&prepare_image(&png).unwrap()).unwrap();
        assert_eq!(img.dimensions(), (224, 224));
    }

    #[test]
    fn test_prepare_image_rejects_oversized_dimensions() {
        let png = create_test_png(1, 40_000);
        assert!(matches!(prepare_image(&png), Err(MediaError::Decode(_))));
    }

    #[test]
    fn test_prepare_image_keeps_centre() {
        // left and right thirds red, centre green: the crop must only see green
        let img = image::RgbImage::from_fn(600, 256, |x, _| {
            if (150..450).contains(&x) {
                image::Rgb([0, 255, 0])
            } else {
                image::Rgb([255, 0, 0])
            }
        });
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();

        let prepared = image::load_from_memory(&prepare_image(&png).unwrap())
            .unwrap()
            .to_rgb8();
        assert_eq!(prepared.get_pixel(112, 112), &image::Rgb([0, 255, 0]));
        assert_eq!(prepared.get_pixel(5, 112), &image::Rgb([0, 255, 0]));
    }

    #[test]
    fn test_prepare_image_rejects_garbage() {
        assert!(matches!(
            prepare_image(b"definitely not an image"),
            Err(MediaError::Decode(_))
        ));
    }

    #[test]
    fn test_check_upload_accepts_matching_types() {
        let png = create_test_png(2, 2);
        assert_eq!(
            check_upload(MediaKind::Image, Some("image/png"), &png).unwrap(),
            "image/png"
        );
        assert_eq!(
            check_upload(MediaKind::Audio, Some("Audio/WAV"), &create_test_wav()).unwrap(),
            "audio/wav"
        );
    }

    #[test]
    fn test_check_upload_rejects_declared_mismatch() {
        let png = create_test_png(2, 2);
        let err = check_upload(MediaKind::Audio, Some("image/png"), &png).unwrap_err();
        assert!(matches!(err, MediaError::WrongType { .. }));

        let err = check_upload(MediaKind::Image, None, &png).unwrap_err();
        assert!(matches!(err, MediaError::WrongType { .. }));
    }

    #[test]
    fn test_check_upload_rejects_sniffed_mismatch() {
        let png = create_test_png(2, 2);
        let err = check_upload(MediaKind::Audio, Some("audio/wav"), &png).unwrap_err();
        assert!(
            matches!(err, MediaError::WrongType { ref found, .. } if found == "image/png"),
            "{err:?}"
        );
    }

    #[test]
    fn test_check_upload_rejects_empty() {
        assert!(matches!(
            check_upload(MediaKind::Image, Some("image/png"), &[]),
            Err(MediaError::Empty)
        ));
    }
}
