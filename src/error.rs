//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `UploadError` enum per categorizzare gli errori possibili
//! - Distingue errori per-item (resize) da errori di canale e di configurazione
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Resize`: decode/encode di un singolo file fallito (isolato per item)
//! - `ChannelProtocol`: il worker ha risposto con un payload malformato
//! - `WorkerUnavailable`: il worker non è raggiungibile (thread terminato)
//! - `InvalidConfiguration`: parametri non validi, fatale alla costruzione
//! - `UnknownTag`: tag non presente tra le opzioni configurate
//! - `Io` / `Json`: errori standard convertiti automaticamente
//!
//! ## Esempio:
//! ```ignore
//! if config.chunk_size == 0 {
//!     return Err(UploadError::InvalidConfiguration("chunk size must be > 0".into()));
//! }
//! ```

/// Causa opaca di un fallimento della piattaforma di resize
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Custom error types for the upload pipeline
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("Failed to resize {name}: {source}")]
    Resize {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Worker protocol error: {0}")]
    ChannelProtocol(String),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    /// Crea un errore di resize per il file indicato
    pub fn resize(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Resize {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Alias comodo per i risultati della libreria
pub type UploadResult<T> = std::result::Result<T, UploadError>;
