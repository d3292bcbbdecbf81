//! # Uploader Module
//!
//! Separa le responsabilità della pipeline in sottomoduli:
//! - `orchestrator`: Orchestratore principale del batch
//! - `backend`: Esecuzione di un chunk (in-process o worker)
//! - `state`: Stato per-batch e snapshot per la presentazione

pub mod backend;
pub mod orchestrator;
pub mod state;

pub use backend::{Backend, ChunkOutcome};
pub use orchestrator::{BatchReport, UploadOrchestrator};
pub use state::{Phase, ProcessingState, UploadSnapshot};
