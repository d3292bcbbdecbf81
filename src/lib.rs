//! # Bulk Image Uploader Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della pipeline di thumbnailing
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione esplicita passata all'orchestratore
//! - `error`: Tipi di errore custom (resize, canale, configurazione)
//! - `file_manager`: Discovery e lettura dei file selezionati
//! - `chunker`: Suddivisione ordinata del batch in chunk
//! - `thumbnail`: Modello del thumbnail e id stabili
//! - `resize`: Decode/resize/encode in memoria con piattaforma iniettabile
//! - `worker`: Canale request/response verso il worker in background
//! - `uploader`: Orchestratore, stato per-batch e snapshot
//! - `progress` / `json_output`: Presentazione su terminale o JSON
//!
//! ## Utilizzo:
//! ```ignore
//! use bulk_image_uploader::{Config, UploadOrchestrator};
//!
//! let orchestrator = UploadOrchestrator::new(Config::default())?;
//! let mut updates = orchestrator.subscribe();
//! orchestrator.select_files(files).await?;
//! ```

pub mod chunker;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod progress;
pub mod resize;
pub mod thumbnail;
pub mod uploader;
pub mod worker;

pub use config::{Config, ProcessingMode, TagOption};
pub use error::UploadError;
pub use file_manager::InputFile;
pub use thumbnail::Thumbnail;
pub use uploader::{BatchReport, UploadOrchestrator, UploadSnapshot};
