//! # Chunk Backend Module
//!
//! Dove viene eseguito il lavoro di un chunk: nel task dell'orchestratore
//! (resize per-item con join settle-all) oppure nel worker in background.

use crate::error::UploadError;
use crate::file_manager::InputFile;
use crate::resize::ThumbnailResizer;
use crate::thumbnail::Thumbnail;
use crate::worker::WorkerChannel;
use futures::future::join_all;
use tracing::{error, warn};

/// Risultato di un chunk
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    /// Thumbnails restituiti, in ordine di input (placeholder inclusi)
    pub thumbnails: Vec<Thumbnail>,
    /// Item falliti: placeholder più item persi per errori di canale
    pub failed: usize,
}

impl ChunkOutcome {
    fn settled(thumbnails: Vec<Thumbnail>, requested: usize) -> Self {
        let placeholders = thumbnails.iter().filter(|t| t.is_placeholder()).count();
        let missing = requested.saturating_sub(thumbnails.len());
        Self {
            thumbnails,
            failed: placeholders + missing,
        }
    }

    fn lost(requested: usize) -> Self {
        Self {
            thumbnails: Vec::new(),
            failed: requested,
        }
    }
}

/// Esecutore dei chunk
pub enum Backend {
    InProcess(ThumbnailResizer),
    Worker(WorkerChannel),
}

impl Backend {
    pub fn is_worker(&self) -> bool {
        matches!(self, Backend::Worker(_))
    }

    /// Elabora un chunk. Non fallisce mai: gli errori diventano item falliti.
    pub async fn process_chunk(&mut self, chunk: &[InputFile], max_retries: u32) -> ChunkOutcome {
        match self {
            Backend::InProcess(resizer) => {
                let thumbnails = join_all(
                    chunk
                        .iter()
                        .map(|file| resizer.resize_settled(file, max_retries)),
                )
                .await;
                ChunkOutcome::settled(thumbnails, chunk.len())
            }
            Backend::Worker(channel) => {
                let mut attempt = 0;
                loop {
                    match channel.process_chunk(chunk.to_vec()).await {
                        Ok(thumbnails) => return ChunkOutcome::settled(thumbnails, chunk.len()),
                        Err(e @ UploadError::WorkerUnavailable(_)) if attempt < max_retries => {
                            attempt += 1;
                            warn!("{} (retrying chunk {}/{})", e, attempt, max_retries);
                        }
                        Err(e @ UploadError::ChannelProtocol(_)) => {
                            warn!("{} - chunk of {} files yielded no thumbnails", e, chunk.len());
                            return ChunkOutcome::lost(chunk.len());
                        }
                        Err(e) => {
                            error!("Chunk of {} files lost: {}", chunk.len(), e);
                            return ChunkOutcome::lost(chunk.len());
                        }
                    }
                }
            }
        }
    }

    /// Elabora un singolo file (modalità senza chunking)
    pub async fn process_item(&mut self, file: &InputFile, max_retries: u32) -> ChunkOutcome {
        match self {
            Backend::InProcess(resizer) => {
                let thumb = resizer.resize_settled(file, max_retries).await;
                ChunkOutcome::settled(vec![thumb], 1)
            }
            Backend::Worker(_) => self.process_chunk(std::slice::from_ref(file), max_retries).await,
        }
    }

    pub async fn shutdown(&mut self) {
        if let Backend::Worker(channel) = self {
            channel.shutdown().await;
        }
    }
}
