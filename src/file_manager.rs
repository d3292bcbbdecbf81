//! # File Management Module
//!
//! Questo modulo trasforma una selezione di path in file di input pronti
//! per la pipeline.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di immagini nelle directory selezionate
//! - Lettura dei soli metadati (nome, dimensione, modification time): i byte
//!   vengono letti chunk per chunk, al momento del resize
//! - Rilevamento del mime type dal contenuto, con fallback sull'estensione
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, WebP, GIF, BMP
//!
//! ## Esempio:
//! ```ignore
//! let paths = FileManager::find_images(&selection)?;
//! let files = FileManager::open_files(&paths).await?;
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Un file selezionato dall'utente.
///
/// Se `path` è valorizzato i byte restano su disco finché
/// [`InputFile::read_bytes`] non li richiede; altrimenti sono in `bytes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    pub name: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub last_modified: u64,
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bytes: Vec<u8>,
}

impl InputFile {
    /// Costruisce un file di input da byte già letti
    pub fn from_bytes(name: impl Into<String>, last_modified: u64, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = FileManager::detect_mime(&name, &bytes).to_string();
        Self {
            size: bytes.len() as u64,
            name,
            last_modified,
            mime,
            path: None,
            bytes,
        }
    }

    /// Handle verso un file su disco, senza leggerne il contenuto
    pub fn from_path(path: PathBuf, size: u64, last_modified: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = FileManager::detect_mime(&name, &[]).to_string();
        Self {
            name,
            size,
            last_modified,
            mime,
            path: Some(path),
            bytes: Vec::new(),
        }
    }

    /// Contenuto del file: letto dal disco per gli handle, preso in prestito altrimenti
    pub fn read_bytes(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match &self.path {
            Some(path) => std::fs::read(path).map(Cow::Owned),
            None => Ok(Cow::Borrowed(&self.bytes)),
        }
    }
}

/// Manages file discovery and loading
pub struct FileManager;

impl FileManager {
    /// Espande la selezione: i file restano, le directory vengono visitate
    pub fn find_images(selection: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for path in selection {
            if path.is_dir() {
                let mut found: Vec<PathBuf> = WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .filter(|p| Self::is_image(p))
                    .collect();
                found.sort();
                debug!("Found {} images in {}", found.len(), path.display());
                files.extend(found);
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                return Err(anyhow::anyhow!("Path does not exist: {}", path.display()));
            }
        }

        Ok(files)
    }

    /// Handle con i metadati di ogni file, preservando l'ordine
    pub async fn open_files(paths: &[PathBuf]) -> Result<Vec<InputFile>> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(Self::open_file(path).await?);
        }
        Ok(files)
    }

    /// Metadati di un singolo file; il contenuto non viene letto
    pub async fn open_file(path: &Path) -> Result<InputFile> {
        let metadata = fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(InputFile::from_path(
            path.to_path_buf(),
            metadata.len(),
            last_modified,
        ))
    }

    /// Check if a file is a supported image
    pub fn is_image(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            matches!(
                ext_lower.as_str(),
                "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp"
            )
        } else {
            false
        }
    }

    /// Mime type dal contenuto, poi dall'estensione
    pub fn detect_mime(name: &str, bytes: &[u8]) -> &'static str {
        if let Ok(format) = image::guess_format(bytes) {
            return Self::mime_for_format(format);
        }

        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            _ => "application/octet-stream",
        }
    }

    /// Mime type per un formato riconosciuto da `image`
    pub fn mime_for_format(format: image::ImageFormat) -> &'static str {
        match format {
            image::ImageFormat::Jpeg => "image/jpeg",
            image::ImageFormat::Png => "image/png",
            image::ImageFormat::WebP => "image/webp",
            image::ImageFormat::Gif => "image/gif",
            image::ImageFormat::Bmp => "image/bmp",
            _ => "application/octet-stream",
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
