//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Traduce gli snapshot dell'orchestratore in eventi di progresso
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio batch
//! - `progress`: Contatori correnti dopo ogni cambiamento di stato
//! - `thumbnail`: Nuovo thumbnail visibile (con il tag corrente)
//! - `complete`: Fine batch con statistiche finali
//! - `error`: Errore durante elaborazione

use crate::config::{Config, ProcessingMode};
use crate::thumbnail::Thumbnail;
use crate::uploader::{BatchReport, Phase, UploadSnapshot};
use serde::{Deserialize, Serialize};

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        total_files: usize,
        mode: ProcessingMode,
        chunk_size: usize,
    },

    #[serde(rename = "progress")]
    Progress {
        generation: u64,
        phase: Phase,
        processed: usize,
        total: usize,
        failed: usize,
        percentage: f64,
    },

    #[serde(rename = "thumbnail")]
    Thumbnail {
        index: usize,
        thumbnail: Thumbnail,
    },

    #[serde(rename = "complete")]
    Complete {
        processed: usize,
        total: usize,
        failed: usize,
        first_thumbnail_ms: Option<u64>,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(total_files: usize, config: &Config) -> Self {
        Self::Start {
            total_files,
            mode: config.mode,
            chunk_size: config.chunk_size,
        }
    }

    pub fn progress(snapshot: &UploadSnapshot) -> Self {
        let percentage = if snapshot.total_count > 0 {
            (snapshot.processed_count as f64 / snapshot.total_count as f64) * 100.0
        } else {
            0.0
        };

        Self::Progress {
            generation: snapshot.generation,
            phase: snapshot.phase,
            processed: snapshot.processed_count,
            total: snapshot.total_count,
            failed: snapshot.failed_count,
            percentage,
        }
    }

    /// Messaggi `thumbnail` per i thumbnails comparsi dopo `already_sent`
    pub fn new_thumbnails(snapshot: &UploadSnapshot, already_sent: usize) -> Vec<Self> {
        snapshot
            .thumbnails
            .iter()
            .enumerate()
            .skip(already_sent)
            .map(|(index, thumb)| Self::Thumbnail {
                index,
                thumbnail: thumb.tagged(&snapshot.current_tag),
            })
            .collect()
    }

    pub fn complete(report: &BatchReport) -> Self {
        Self::Complete {
            processed: report.processed_count,
            total: report.total_count,
            failed: report.failed_count,
            first_thumbnail_ms: report.first_thumbnail.map(|d| d.as_millis() as u64),
            duration_seconds: report.elapsed.as_secs_f64(),
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
