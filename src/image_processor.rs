//! # Image Processing Module
//!
//! Questo modulo gestisce l'ottimizzazione di tutti i formati immagine supportati
//! direttamente in-process: decodifica e resize con `image`, encoding con
//! `jpeg-encoder`, `oxipng` e `webp`, senza tool esterni.
//!
//! ## Formati Supportati
//!
//! | Formato | Input | Output | Encoder |
//! |---------|-------|--------|---------|
//! | JPEG    | ✅    | ✅     | `jpeg-encoder`, qualità e scansione progressiva |
//! | PNG     | ✅    | ✅     | `oxipng`, preset dal livello di compressione, Adam7 se progressivo |
//! | WebP    | ✅    | ✅     | `libwebp` lossy, qualità ed effort (`method`) |
//! | SVG     | ✅    | ✅     | Copia invariata (vettoriale, niente da ricomprimere) |
//!
//! ## Pipeline di Ottimizzazione
//!
//! 1. **Decodifica**: `image::open` in un thread bloccante (`spawn_blocking`)
//! 2. **Resize**: solo se la larghezza supera `max_dimension`, mantenendo
//!    l'aspect ratio, mai upscaling
//! 3. **Encoding**: encoder specifico per formato, stesso formato dell'input
//! 4. **Report**: dimensione originale e ottimizzata
//!
//! ## Mappatura compressione PNG (0-9 → preset oxipng 0-6):
//! - 0 → 0, 3 → 2, 6 → 4, 8 → 5, 9 → 6
//!
//! ## Esempio:
//! ```ignore
//! let processor = ImageProcessor::new(config.compression.image.clone());
//! let optimized = processor.optimize(&input_path, &temp_output).await?;
//! println!("{} -> {}", optimized.original_size, optimized.optimized_size);
//! ```

use crate::config::ImageSettings;
use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::optimizer::codec::OptimizedFile;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::DynamicImage;
use jpeg_encoder::{ColorType as JpegColorType, Encoder as JpegEncoder};
use libwebp_sys::WebPConfig;
use oxipng::{Interlacing, Options as PngOptions};
use std::path::Path;
use tracing::{debug, info};

/// Output format chosen from the input extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    /// Copied unchanged
    Passthrough,
}

impl ImageFormat {
    fn from_path(path: &Path) -> Self {
        match FileManager::extension(path).as_deref() {
            Some("jpg" | "jpeg") => Self::Jpeg,
            Some("png") => Self::Png,
            Some("webp") => Self::Webp,
            _ => Self::Passthrough,
        }
    }
}

/// Re-encodes images in their own format, downscaling oversized ones
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    settings: ImageSettings,
}

impl ImageProcessor {
    pub fn new(settings: ImageSettings) -> Self {
        Self { settings }
    }

    /// Optimize `input_path` into `output_path`.
    ///
    /// The output keeps the input's format. Decode or encode failures are
    /// returned as errors and leave `output_path` in an unspecified state;
    /// the caller owns its cleanup.
    pub async fn optimize(&self, input_path: &Path, output_path: &Path) -> Result<OptimizedFile, OptimizeError> {
        let original_size = tokio::fs::metadata(input_path).await?.len();
        let format = ImageFormat::from_path(input_path);

        let settings = self.settings.clone();
        let input = input_path.to_path_buf();
        let output = output_path.to_path_buf();

        tokio::task::spawn_blocking(move || encode_image(&input, &output, format, &settings))
            .await
            .map_err(|e| OptimizeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        let optimized_size = tokio::fs::metadata(output_path).await?.len();
        info!(
            "🖼️  {}: {} → {}",
            input_path.file_name().unwrap_or_default().to_string_lossy(),
            FileManager::format_size(original_size),
            FileManager::format_size(optimized_size)
        );

        Ok(OptimizedFile {
            path: output_path.to_path_buf(),
            original_size,
            optimized_size,
        })
    }
}

/// Decode, downscale and encode one image. Blocking.
fn encode_image(
    input: &Path,
    output: &Path,
    format: ImageFormat,
    settings: &ImageSettings,
) -> Result<(), OptimizeError> {
    let encode: fn(&DynamicImage, &ImageSettings) -> Result<Vec<u8>, OptimizeError> = match format {
        ImageFormat::Jpeg => encode_jpeg,
        ImageFormat::Png => encode_png,
        ImageFormat::Webp => encode_webp,
        ImageFormat::Passthrough => {
            debug!("Copying {} unchanged", input.display());
            std::fs::copy(input, output)?;
            return Ok(());
        }
    };

    let img = image::open(input)?;
    let img = downscale(img, settings.max_dimension);

    let bytes = encode(&img, settings)?;
    std::fs::write(output, bytes)?;
    Ok(())
}

fn encode_jpeg(img: &DynamicImage, settings: &ImageSettings) -> Result<Vec<u8>, OptimizeError> {
    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let (width, height) = match (u16::try_from(rgb.width()), u16::try_from(rgb.height())) {
        (Ok(width), Ok(height)) => (width, height),
        _ => {
            return Err(OptimizeError::Encode(format!(
                "{}x{} exceeds the JPEG size limit",
                rgb.width(),
                rgb.height()
            )))
        }
    };

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new(&mut bytes, settings.jpeg.quality);
    encoder.set_progressive(settings.jpeg.progressive);
    encoder
        .encode(rgb.as_raw(), width, height, JpegColorType::Rgb)
        .map_err(|e| OptimizeError::Encode(format!("JPEG: {}", e)))?;
    Ok(bytes)
}

fn encode_png(img: &DynamicImage, settings: &ImageSettings) -> Result<Vec<u8>, OptimizeError> {
    // Quick deflate first; oxipng does the real compression
    let mut raw = Vec::new();
    img.write_with_encoder(PngEncoder::new_with_quality(
        &mut raw,
        CompressionType::Fast,
        PngFilter::Adaptive,
    ))?;

    let mut options = PngOptions::from_preset(oxipng_preset(settings.png.compression_level));
    options.interlace = Some(if settings.png.progressive {
        Interlacing::Adam7
    } else {
        Interlacing::None
    });
    // Always emit the re-encoded stream, so the interlace setting is applied
    options.force = true;

    oxipng::optimize_from_memory(&raw, &options).map_err(|e| OptimizeError::Encode(format!("PNG: {}", e)))
}

fn encode_webp(img: &DynamicImage, settings: &ImageSettings) -> Result<Vec<u8>, OptimizeError> {
    let mut config =
        WebPConfig::new().map_err(|_| OptimizeError::Encode("WebP: invalid encoder configuration".to_string()))?;
    config.lossless = 0;
    config.quality = f32::from(settings.webp.quality);
    config.method = i32::from(settings.webp.effort);

    let (width, height) = (img.width(), img.height());
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
        encoder.encode_advanced(&config)
    } else {
        let rgb = img.to_rgb8();
        let encoder = webp::Encoder::from_rgb(rgb.as_raw(), width, height);
        encoder.encode_advanced(&config)
    };

    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| OptimizeError::Encode(format!("WebP: {:?}", e)))
}

fn downscale(img: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (target_width, target_height) = target_dimensions(width, height, max_width);

    if (target_width, target_height) == (width, height) {
        return img;
    }

    debug!(
        "📐 Resizing {}x{} → {}x{}",
        width, height, target_width, target_height
    );
    img.resize_exact(target_width, target_height, FilterType::Lanczos3)
}

/// Dimensions after constraining the width to `max_width`.
///
/// Aspect ratio is preserved and images are never enlarged.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }

    let scaled_height = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled_height.max(1))
}

/// Map a 0-9 compression level onto the oxipng presets (0-6)
fn oxipng_preset(level: u8) -> u8 {
    ((u16::from(level.min(9)) * 6 + 4) / 9) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn processor() -> ImageProcessor {
        ImageProcessor::new(ImageSettings::default())
    }

    #[test]
    fn test_target_dimensions() {
        assert_eq!(target_dimensions(4000, 3000, 1920), (1920, 1440));
        assert_eq!(target_dimensions(1920, 1080, 1920), (1920, 1080));
        assert_eq!(target_dimensions(800, 600, 1920), (800, 600));
        // tall images are only constrained by width
        assert_eq!(target_dimensions(1000, 5000, 1920), (1000, 5000));
        assert_eq!(target_dimensions(10000, 1, 1920), (1920, 1));
    }

    /// Frame marker (SOF0 baseline, SOF2 progressive, ...) of a JPEG stream
    fn jpeg_frame_marker(bytes: &[u8]) -> Option<u8> {
        let mut i = 2;
        while i + 4 <= bytes.len() {
            if bytes[i] != 0xFF {
                return None;
            }
            let marker = bytes[i + 1];
            if (0xC0..=0xCF).contains(&marker) && ![0xC4, 0xC8, 0xCC].contains(&marker) {
                return Some(marker);
            }
            let length = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
            i += 2 + length;
        }
        None
    }

    /// Interlace method byte of the IHDR chunk
    fn png_interlace(bytes: &[u8]) -> u8 {
        assert_eq!(&bytes[12..16], b"IHDR");
        bytes[28]
    }

    fn noisy(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let n = x.wrapping_mul(2_654_435_761).wrapping_add(y.wrapping_mul(40_503));
            Rgb([(n % 256) as u8, ((x + y) % 256) as u8, ((n >> 8) % 256) as u8])
        }))
    }

    #[test]
    fn test_oxipng_preset_mapping() {
        assert_eq!(oxipng_preset(0), 0);
        assert_eq!(oxipng_preset(3), 2);
        assert_eq!(oxipng_preset(8), 5);
        assert_eq!(oxipng_preset(9), 6);
    }

    #[test]
    fn test_jpeg_progressive_setting_selects_scan_mode() {
        let img = noisy(128, 96);
        let mut settings = ImageSettings::default();

        settings.jpeg.progressive = true;
        let progressive = encode_jpeg(&img, &settings).unwrap();
        assert_eq!(jpeg_frame_marker(&progressive), Some(0xC2));

        settings.jpeg.progressive = false;
        let baseline = encode_jpeg(&img, &settings).unwrap();
        assert_eq!(jpeg_frame_marker(&baseline), Some(0xC0));

        settings.jpeg.quality = 20;
        let low_quality = encode_jpeg(&img, &settings).unwrap();
        assert!(low_quality.len() < baseline.len());
    }

    #[test]
    fn test_png_progressive_setting_selects_interlacing() {
        let img = noisy(64, 64);
        let mut settings = ImageSettings::default();

        settings.png.progressive = true;
        let interlaced = encode_png(&img, &settings).unwrap();
        assert_eq!(png_interlace(&interlaced), 1);

        settings.png.progressive = false;
        let plain = encode_png(&img, &settings).unwrap();
        assert_eq!(png_interlace(&plain), 0);

        let decoded = image::load_from_memory(&interlaced).unwrap();
        assert_eq!(decoded.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn test_webp_quality_and_effort_change_output() {
        let img = noisy(256, 256);
        let mut settings = ImageSettings::default();

        settings.webp.quality = 85;
        settings.webp.effort = 6;
        let high = encode_webp(&img, &settings).unwrap();

        settings.webp.quality = 5;
        settings.webp.effort = 0;
        let low = encode_webp(&img, &settings).unwrap();

        assert_ne!(high, low);
        assert!(low.len() < high.len());
        assert_eq!(&high[..4], b"RIFF");
        assert_eq!(&high[8..12], b"WEBP");
    }

    #[tokio::test]
    async fn test_wide_jpeg_is_downscaled() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("wide.jpg");
        let output = temp_dir.path().join("out.jpg");
        gradient(2400, 1200).save(&input).unwrap();

        let result = processor().optimize(&input, &output).await.unwrap();

        assert_eq!(result.path, output);
        assert!(result.optimized_size > 0);
        let decoded = image::open(&output).unwrap();
        assert_eq!(decoded.dimensions(), (1920, 960));
    }

    #[tokio::test]
    async fn test_small_png_is_not_upscaled() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("small.png");
        let output = temp_dir.path().join("out.png");
        gradient(320, 200).save(&input).unwrap();

        processor().optimize(&input, &output).await.unwrap();

        let decoded = image::open(&output).unwrap();
        assert_eq!(decoded.dimensions(), (320, 200));
    }

    #[tokio::test]
    async fn test_webp_keeps_alpha() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("icon.png");
        let webp_input = temp_dir.path().join("icon.webp");
        let output = temp_dir.path().join("out.webp");
        RgbaImage::from_pixel(64, 64, Rgba([10, 20, 30, 128])).save(&input).unwrap();
        image::open(&input).unwrap().save(&webp_input).unwrap();

        processor().optimize(&webp_input, &output).await.unwrap();

        let decoded = image::open(&output).unwrap();
        assert_eq!(decoded.dimensions(), (64, 64));
        assert!(decoded.color().has_alpha());
    }

    #[tokio::test]
    async fn test_svg_is_copied_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("logo.svg");
        let output = temp_dir.path().join("out.svg");
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"/>"#;
        std::fs::write(&input, svg).unwrap();

        let result = processor().optimize(&input, &output).await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), svg.to_vec());
        assert_eq!(result.original_size, result.optimized_size);
    }

    #[tokio::test]
    async fn test_corrupt_image_fails() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("broken.jpg");
        let output = temp_dir.path().join("out.jpg");
        std::fs::write(&input, b"definitely not a jpeg").unwrap();

        let err = processor().optimize(&input, &output).await.unwrap_err();
        assert!(matches!(err, OptimizeError::Image(_)));
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = processor()
            .optimize(&temp_dir.path().join("nope.png"), &temp_dir.path().join("out.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Io(_)));
    }
}
