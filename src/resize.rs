//! # Image Resize Module
//!
//! Questo modulo crea i thumbnails in memoria: decode, resize, re-encode e
//! wrapping in un data URI autocontenuto.
//!
//! ## Caratteristiche
//! - **Mai upscaling**: il fattore di scala è sempre ≤ 1
//! - **Due target**: larghezza massima (in-process, default 800) o
//!   quadrato fisso (worker, default 120)
//! - **Formato output**: lo stesso dell'input se codificabile (JPEG, PNG),
//!   altrimenti PNG
//! - **Piattaforma iniettabile**: le primitive decode/encode stanno dietro il
//!   trait [`ImagePlatform`], così i test possono usare un fake
//! - **Non bloccante**: il lavoro CPU gira su `spawn_blocking`
//!
//! ## Isolamento errori
//! [`ThumbnailResizer::resize_settled`] non fallisce mai: riprova l'item fino
//! a `max_retries` volte e poi restituisce un placeholder con `error` valorizzato.
//!
//! ## Esempio
//! ```ignore
//! let resizer = ThumbnailResizer::new(ResizeTarget::MaxWidth(800));
//! let thumb = resizer.resize(&file).await?;
//! assert!(thumb.url.starts_with("data:image/"));
//! ```

use crate::error::{BoxError, UploadError, UploadResult};
use crate::file_manager::{FileManager, InputFile};
use crate::thumbnail::Thumbnail;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Algoritmi di resize disponibili
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ResizeAlgorithm {
    /// Lanczos - Migliore qualità per downscaling
    #[default]
    Lanczos,
    /// Catmull-Rom, buona qualità generale
    Catrom,
    /// Gaussian - Morbido, utile per anteprime molto piccole
    Gaussian,
    /// Triangle - Veloce, qualità accettabile per anteprime veloci
    Triangle,
    /// Nearest - Pixel perfetto, nessuna interpolazione
    Nearest,
}

impl ResizeAlgorithm {
    pub fn to_filter_type(self) -> FilterType {
        match self {
            ResizeAlgorithm::Lanczos => FilterType::Lanczos3,
            ResizeAlgorithm::Catrom => FilterType::CatmullRom,
            ResizeAlgorithm::Gaussian => FilterType::Gaussian,
            ResizeAlgorithm::Triangle => FilterType::Triangle,
            ResizeAlgorithm::Nearest => FilterType::Nearest,
        }
    }
}

/// Dimensione obiettivo del thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeTarget {
    /// Scala mantenendo l'aspect ratio finché la larghezza non supera il limite
    MaxWidth(u32),
    /// Quadrato fisso (aspect ratio non preservato), mai più grande dell'originale
    Square(u32),
}

impl ResizeTarget {
    /// Calcola le dimensioni di output, con fattore di scala clampato a 1
    pub fn dimensions(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            ResizeTarget::MaxWidth(max) => {
                if width <= max {
                    return (width, height);
                }
                let scale = max as f64 / width as f64;
                let new_height = (height as f64 * scale).round() as u32;
                (max, new_height.max(1))
            }
            ResizeTarget::Square(side) => (width.min(side), height.min(side)),
        }
    }
}

/// Risultato codificato del resize
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBlob {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Primitive di decode/encode fornite dalla piattaforma
pub trait ImagePlatform: Send + Sync {
    fn decode_to_bitmap(&self, bytes: &[u8]) -> Result<DynamicImage, BoxError>;

    fn scale_and_encode(
        &self,
        bitmap: &DynamicImage,
        width: u32,
        height: u32,
        mime: &str,
    ) -> Result<EncodedBlob, BoxError>;

    fn blob_to_data_uri(&self, blob: &EncodedBlob) -> String {
        format!("data:{};base64,{}", blob.mime, STANDARD.encode(&blob.bytes))
    }
}

/// Piattaforma di default basata sul crate `image`
#[derive(Debug, Clone)]
pub struct ImageCratePlatform {
    algorithm: ResizeAlgorithm,
    jpeg_quality: u8,
}

impl ImageCratePlatform {
    pub fn new(algorithm: ResizeAlgorithm, jpeg_quality: u8) -> Self {
        Self {
            algorithm,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }
}

impl Default for ImageCratePlatform {
    fn default() -> Self {
        Self::new(ResizeAlgorithm::default(), 85)
    }
}

impl ImagePlatform for ImageCratePlatform {
    fn decode_to_bitmap(&self, bytes: &[u8]) -> Result<DynamicImage, BoxError> {
        Ok(image::load_from_memory(bytes)?)
    }

    fn scale_and_encode(
        &self,
        bitmap: &DynamicImage,
        width: u32,
        height: u32,
        mime: &str,
    ) -> Result<EncodedBlob, BoxError> {
        let scaled = if bitmap.dimensions() == (width, height) {
            bitmap.clone()
        } else {
            bitmap.resize_exact(width, height, self.algorithm.to_filter_type())
        };

        let mut bytes = Vec::new();
        let mime = match mime {
            "image/jpeg" => {
                // JPEG has no alpha channel
                DynamicImage::ImageRgb8(scaled.to_rgb8()).write_to(
                    &mut Cursor::new(&mut bytes),
                    ImageOutputFormat::Jpeg(self.jpeg_quality),
                )?;
                "image/jpeg"
            }
            _ => {
                scaled.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
                "image/png"
            }
        };

        Ok(EncodedBlob {
            mime: mime.to_string(),
            bytes,
        })
    }
}

/// Crea thumbnails per singoli file
#[derive(Clone)]
pub struct ThumbnailResizer {
    platform: Arc<dyn ImagePlatform>,
    target: ResizeTarget,
}

impl std::fmt::Debug for ThumbnailResizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailResizer")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl ThumbnailResizer {
    /// Resizer con la piattaforma `image` di default
    pub fn new(target: ResizeTarget) -> Self {
        Self::with_platform(Arc::new(ImageCratePlatform::default()), target)
    }

    pub fn with_platform(platform: Arc<dyn ImagePlatform>, target: ResizeTarget) -> Self {
        Self { platform, target }
    }

    /// Resize sincrono, da chiamare fuori dal runtime async (es. dal worker).
    ///
    /// I byte di un file su disco vengono letti qui e rilasciati a fine resize.
    pub fn resize_blocking(&self, file: &InputFile) -> UploadResult<Thumbnail> {
        let bytes = file
            .read_bytes()
            .map_err(|e| UploadError::resize(&file.name, e))?;
        let mime = FileManager::detect_mime(&file.name, &bytes);
        let bitmap = self
            .platform
            .decode_to_bitmap(&bytes)
            .map_err(|e| UploadError::resize(&file.name, e))?;
        drop(bytes);

        let (width, height) = bitmap.dimensions();
        let (new_width, new_height) = self.target.dimensions(width, height);
        debug!(
            "Resizing {}: {}x{} -> {}x{}",
            file.name, width, height, new_width, new_height
        );

        let blob = self
            .platform
            .scale_and_encode(&bitmap, new_width, new_height, mime)
            .map_err(|e| UploadError::resize(&file.name, e))?;

        Ok(Thumbnail::new(file, self.platform.blob_to_data_uri(&blob)))
    }

    /// Resize asincrono: il lavoro CPU gira sul pool blocking di tokio
    pub async fn resize(&self, file: &InputFile) -> UploadResult<Thumbnail> {
        let resizer = self.clone();
        let owned = file.clone();
        tokio::task::spawn_blocking(move || resizer.resize_blocking(&owned))
            .await
            .map_err(|e| UploadError::resize(&file.name, e))?
    }

    /// Resize con retry e fallback su placeholder: non fallisce mai
    pub async fn resize_settled(&self, file: &InputFile, max_retries: u32) -> Thumbnail {
        let mut attempt = 0;
        loop {
            match self.resize(file).await {
                Ok(thumb) => return thumb,
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    warn!("{} (retry {}/{})", e, attempt, max_retries);
                }
                Err(e) => {
                    error!("{}", e);
                    return Thumbnail::placeholder(file, e);
                }
            }
        }
    }

    /// Variante sincrona di [`Self::resize_settled`] per il worker
    pub fn resize_settled_blocking(&self, file: &InputFile, max_retries: u32) -> Thumbnail {
        let mut attempt = 0;
        loop {
            match self.resize_blocking(file) {
                Ok(thumb) => return thumb,
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    warn!("{} (retry {}/{})", e, attempt, max_retries);
                }
                Err(e) => {
                    error!("{}", e);
                    return Thumbnail::placeholder(file, e);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// PNG valido di dimensioni date, generato in memoria
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 30, 90])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    pub(crate) fn png_file(name: &str, width: u32, height: u32) -> InputFile {
        InputFile::from_bytes(name, 1_700_000_000_000, png_bytes(width, height))
    }

    fn decode_data_uri(url: &str) -> DynamicImage {
        let (header, payload) = url.split_once(";base64,").unwrap();
        assert!(header.starts_with("data:image/"));
        let bytes = STANDARD.decode(payload).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    /// Fallisce le prime `failures` chiamate, poi delega a `image`
    struct FlakyPlatform {
        failures: usize,
        calls: AtomicUsize,
    }

    impl ImagePlatform for FlakyPlatform {
        fn decode_to_bitmap(&self, bytes: &[u8]) -> Result<DynamicImage, BoxError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err("transient decode failure".into());
            }
            ImageCratePlatform::default().decode_to_bitmap(bytes)
        }

        fn scale_and_encode(
            &self,
            bitmap: &DynamicImage,
            width: u32,
            height: u32,
            mime: &str,
        ) -> Result<EncodedBlob, BoxError> {
            ImageCratePlatform::default().scale_and_encode(bitmap, width, height, mime)
        }
    }

    #[test]
    fn test_max_width_dimensions() {
        let target = ResizeTarget::MaxWidth(800);
        assert_eq!(target.dimensions(1600, 1200), (800, 600));
        assert_eq!(target.dimensions(800, 10), (800, 10));
        // never upscale
        assert_eq!(target.dimensions(400, 300), (400, 300));
        assert_eq!(target.dimensions(8000, 1), (800, 1));
    }

    #[test]
    fn test_square_dimensions() {
        let target = ResizeTarget::Square(120);
        assert_eq!(target.dimensions(1000, 500), (120, 120));
        assert_eq!(target.dimensions(60, 500), (60, 120));
        assert_eq!(target.dimensions(40, 30), (40, 30));
    }

    #[tokio::test]
    async fn test_resize_scales_down() {
        let resizer = ThumbnailResizer::new(ResizeTarget::MaxWidth(50));
        let file = png_file("wide.png", 200, 100);

        let thumb = resizer.resize(&file).await.unwrap();
        assert_eq!(thumb.name, "wide.png");
        assert_eq!(thumb.id, Thumbnail::id_for(&file));
        assert!(thumb.url.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_uri(&thumb.url).dimensions(), (50, 25));
    }

    #[tokio::test]
    async fn test_resize_never_upscales() {
        let resizer = ThumbnailResizer::new(ResizeTarget::MaxWidth(800));
        let thumb = resizer.resize(&png_file("small.png", 30, 20)).await.unwrap();
        assert_eq!(decode_data_uri(&thumb.url).dimensions(), (30, 20));
    }

    #[test]
    fn test_square_target_blocking() {
        let resizer = ThumbnailResizer::new(ResizeTarget::Square(16));
        let thumb = resizer.resize_blocking(&png_file("sq.png", 64, 32)).unwrap();
        assert_eq!(decode_data_uri(&thumb.url).dimensions(), (16, 16));
    }

    #[test]
    fn test_jpeg_input_stays_jpeg() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 40));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(90))
            .unwrap();
        let file = InputFile::from_bytes("photo.jpg", 1, bytes);
        assert_eq!(file.mime, "image/jpeg");

        let resizer = ThumbnailResizer::new(ResizeTarget::MaxWidth(20));
        let thumb = resizer.resize_blocking(&file).unwrap();
        assert!(thumb.url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_configured_algorithm_and_quality() {
        // sharp checkerboard: quality makes a visible difference in size
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }));
        let encode = |quality| {
            ImageCratePlatform::new(ResizeAlgorithm::Nearest, quality)
                .scale_and_encode(&img, 32, 32, "image/jpeg")
                .unwrap()
        };

        let low = encode(10);
        let high = encode(95);
        assert_eq!(low.mime, "image/jpeg");
        assert!(low.bytes.len() < high.bytes.len());

        let scaled = image::load_from_memory(&high.bytes).unwrap();
        assert_eq!(scaled.dimensions(), (32, 32));
    }

    #[test]
    fn test_algorithm_names() {
        let json = serde_json::to_string(&ResizeAlgorithm::Catrom).unwrap();
        assert_eq!(json, "\"catrom\"");
        assert_eq!(ResizeAlgorithm::Triangle.to_filter_type(), FilterType::Triangle);
    }

    #[tokio::test]
    async fn test_file_on_disk_is_read_at_resize_time() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("disk.png");
        std::fs::write(&path, png_bytes(40, 20)).unwrap();

        let file = FileManager::open_file(&path).await.unwrap();
        assert!(file.bytes.is_empty());

        let resizer = ThumbnailResizer::new(ResizeTarget::MaxWidth(20));
        let thumb = resizer.resize(&file).await.unwrap();
        assert_eq!(decode_data_uri(&thumb.url).dimensions(), (20, 10));

        // a file that vanished after selection fails only its own item
        std::fs::remove_file(&path).unwrap();
        let thumb = resizer.resize_settled(&file, 0).await;
        assert!(thumb.is_placeholder());
        assert_eq!(thumb.id, Thumbnail::id_for(&file));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_resize_failure() {
        let resizer = ThumbnailResizer::new(ResizeTarget::MaxWidth(800));
        let file = InputFile::from_bytes("broken.png", 1, b"definitely not a png".to_vec());

        let err = resizer.resize(&file).await.unwrap_err();
        assert!(matches!(err, UploadError::Resize { .. }));
        assert!(err.to_string().contains("broken.png"));
    }

    #[tokio::test]
    async fn test_settled_retries_once_then_succeeds() {
        let platform = Arc::new(FlakyPlatform {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let resizer = ThumbnailResizer::with_platform(platform.clone(), ResizeTarget::MaxWidth(10));

        let thumb = resizer.resize_settled(&png_file("a.png", 20, 20), 1).await;
        assert!(!thumb.is_placeholder());
        assert_eq!(platform.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_settled_falls_back_to_placeholder() {
        let platform = Arc::new(FlakyPlatform {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let resizer = ThumbnailResizer::with_platform(platform.clone(), ResizeTarget::MaxWidth(10));

        let thumb = resizer.resize_settled(&png_file("a.png", 20, 20), 1).await;
        assert!(thumb.is_placeholder());
        assert_eq!(platform.calls.load(Ordering::SeqCst), 2);

        let thumb = resizer.resize_settled_blocking(&png_file("b.png", 20, 20), 0);
        assert!(thumb.is_placeholder());
        assert_eq!(platform.calls.load(Ordering::SeqCst), 3);
    }
}
