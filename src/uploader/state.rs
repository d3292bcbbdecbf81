//! # Processing State Module
//!
//! Stato mutabile per-batch posseduto dall'orchestratore, e lo snapshot
//! immutabile che viene pubblicato al layer di presentazione dopo ogni
//! cambiamento.

use crate::thumbnail::{IdRegistry, Thumbnail};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Fasi della macchina a stati dell'orchestratore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Resetting,
    ProcessingChunk,
    ChunkComplete,
    Done,
}

/// Stato di un singolo batch. Viene sostituito in blocco a ogni nuovo batch.
#[derive(Debug)]
pub struct ProcessingState {
    pub generation: u64,
    pub phase: Phase,
    pub processed_count: usize,
    pub total_count: usize,
    pub failed_count: usize,
    pub thumbnails: Vec<Arc<Thumbnail>>,
    ids: IdRegistry,
    started_at: Instant,
    pub first_thumbnail: Option<Duration>,
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self::start(0, 0)
    }
}

impl ProcessingState {
    /// Stato fresco per il batch `generation`
    pub fn start(generation: u64, total_count: usize) -> Self {
        Self {
            generation,
            phase: if generation == 0 {
                Phase::Idle
            } else {
                Phase::Resetting
            },
            processed_count: 0,
            total_count,
            failed_count: 0,
            thumbnails: Vec::new(),
            ids: IdRegistry::new(),
            started_at: Instant::now(),
            first_thumbnail: None,
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Rende gli id unici all'interno del batch
    pub fn claim_ids(&mut self, thumbnails: &mut [Thumbnail]) {
        for thumb in thumbnails {
            self.ids.claim(thumb);
        }
    }

    /// Conta item elaborati senza renderli ancora visibili
    pub fn advance(&mut self, processed: usize, failed: usize) {
        self.processed_count += processed;
        self.failed_count += failed;
    }

    /// Appende thumbnails (già con id unici) preservando l'ordine
    pub fn append(&mut self, thumbnails: Vec<Thumbnail>) {
        if self.first_thumbnail.is_none() && !thumbnails.is_empty() {
            let elapsed = self.started_at.elapsed();
            self.first_thumbnail = Some(elapsed);
            info!("🕒 First thumbnail appeared in {} ms", elapsed.as_millis());
        }
        debug!(
            "Appending {} thumbnails to batch {}",
            thumbnails.len(),
            self.generation
        );
        self.thumbnails.extend(thumbnails.into_iter().map(Arc::new));
    }

    pub fn snapshot(&self, current_tag: &str) -> UploadSnapshot {
        UploadSnapshot {
            generation: self.generation,
            phase: self.phase,
            processed_count: self.processed_count,
            total_count: self.total_count,
            failed_count: self.failed_count,
            thumbnails: self.thumbnails.clone(),
            current_tag: current_tag.to_string(),
        }
    }
}

/// Vista immutabile dello stato, consumata dalla presentazione
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSnapshot {
    pub generation: u64,
    pub phase: Phase,
    pub processed_count: usize,
    pub total_count: usize,
    pub failed_count: usize,
    /// Thumbnails senza tag: il tag corrente si applica al rendering
    pub thumbnails: Vec<Arc<Thumbnail>>,
    pub current_tag: String,
}

impl UploadSnapshot {
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Thumbnails con il tag corrente applicato
    pub fn rendered_thumbnails(&self) -> Vec<Thumbnail> {
        self.thumbnails
            .iter()
            .map(|thumb| thumb.tagged(&self.current_tag))
            .collect()
    }
}
