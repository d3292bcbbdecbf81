//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline di upload.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` passata all'orchestratore alla costruzione
//! - Fornisce validazione dei parametri (errori fatali alla costruzione)
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `chunk_size`: File per chunk (default: 5)
//! - `max_width`: Larghezza massima thumbnail in-process (default: 800)
//! - `thumbnail_size`: Lato del quadrato prodotto dal worker (default: 120)
//! - `tag_options`: Vocabolario dei tag (default: nature, city, space)
//! - `default_tag`: Tag selezionato all'avvio (default: "nature")
//! - `mode`: `chunked`, `worker` o `unchunked` (default: chunked)
//! - `max_retries`: Tentativi extra per item fallito, 0 o 1 (default: 1)
//! - `resize_algorithm`: Filtro di resize (default: lanczos)
//! - `jpeg_quality`: Qualità dei thumbnails JPEG, 1-100 (default: 85)
//! - `json_output`: Emette eventi JSON su stdout (default: false)
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     chunk_size: 10,
//!     mode: ProcessingMode::Worker,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::{UploadError, UploadResult};
use crate::resize::ResizeAlgorithm;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Una voce del vocabolario dei tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOption {
    pub value: String,
    pub label: String,
}

impl TagOption {
    pub fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

/// Strategia di elaborazione del batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Chunk sequenziali elaborati nel task chiamante
    Chunked,
    /// Chunk sequenziali inviati al worker in background
    Worker,
    /// Nessun chunking: un file alla volta, thumbnails pubblicati alla fine
    Unchunked,
}

/// Tentativi extra ammessi prima del placeholder
pub const MAX_RETRIES_LIMIT: u32 = 1;

impl Default for ProcessingMode {
    fn default() -> Self {
        Self::Chunked
    }
}

/// Configuration for the upload pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of files per chunk
    pub chunk_size: usize,
    /// Maximum thumbnail width for in-process resizing
    pub max_width: u32,
    /// Side of the square thumbnail produced by the worker
    pub thumbnail_size: u32,
    /// Tag vocabulary offered to the presentation layer
    pub tag_options: Vec<TagOption>,
    /// Tag selected when the orchestrator starts
    pub default_tag: String,
    /// Processing strategy
    pub mode: ProcessingMode,
    /// Extra attempts for a failed item before falling back to a placeholder
    pub max_retries: u32,
    /// Filter used when scaling
    pub resize_algorithm: ResizeAlgorithm,
    /// Quality of JPEG thumbnails (1-100)
    pub jpeg_quality: u8,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            max_width: 800,
            thumbnail_size: 120,
            tag_options: vec![
                TagOption::new("nature", "Nature"),
                TagOption::new("city", "City"),
                TagOption::new("space", "Space"),
            ],
            default_tag: "nature".to_string(),
            mode: ProcessingMode::default(),
            max_retries: 1,
            resize_algorithm: ResizeAlgorithm::default(),
            jpeg_quality: 85,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> UploadResult<()> {
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidConfiguration(
                "Chunk size must be greater than 0".to_string(),
            ));
        }

        if self.max_width == 0 {
            return Err(UploadError::InvalidConfiguration(
                "Max width must be greater than 0".to_string(),
            ));
        }

        if self.thumbnail_size == 0 {
            return Err(UploadError::InvalidConfiguration(
                "Thumbnail size must be greater than 0".to_string(),
            ));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(UploadError::InvalidConfiguration(format!(
                "Max retries must be at most {}",
                MAX_RETRIES_LIMIT
            )));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(UploadError::InvalidConfiguration(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.tag_options.is_empty() {
            return Err(UploadError::InvalidConfiguration(
                "At least one tag option is required".to_string(),
            ));
        }

        if !self.has_tag(&self.default_tag) {
            return Err(UploadError::InvalidConfiguration(format!(
                "Default tag '{}' is not among the tag options",
                self.default_tag
            )));
        }

        Ok(())
    }

    /// True se `value` è uno dei tag configurati
    pub fn has_tag(&self, value: &str) -> bool {
        self.tag_options.iter().any(|tag| tag.value == value)
    }

    /// Default config location (`~/.bulk-uploader/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".bulk-uploader").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
