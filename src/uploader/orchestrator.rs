//! # Upload Orchestrator
//!
//! Orchestratore principale: possiede la pipeline end-to-end di un batch.
//!
//! ## Flusso:
//! 1. `begin_batch`: nuova generation, stato azzerato, totale impostato
//! 2. Loop sui chunk, strettamente sequenziale (un solo chunk in volo)
//! 3. Merge dei risultati solo se la generation è ancora quella corrente
//! 4. Yield cooperativo tra un chunk e l'altro nel percorso in-process
//! 5. `Done` quando i chunk sono esauriti
//!
//! Ogni cambiamento di stato pubblica un [`UploadSnapshot`] sul canale
//! `watch` restituito da [`UploadOrchestrator::subscribe`].

use crate::{
    chunker,
    config::{Config, ProcessingMode},
    error::{UploadError, UploadResult},
    file_manager::InputFile,
    resize::{ImageCratePlatform, ImagePlatform, ResizeTarget, ThumbnailResizer},
    uploader::{
        backend::{Backend, ChunkOutcome},
        state::{Phase, ProcessingState, UploadSnapshot},
    },
    worker::WorkerChannel,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

/// Riepilogo di un batch concluso (o abbandonato)
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generation: u64,
    pub processed_count: usize,
    pub total_count: usize,
    pub failed_count: usize,
    /// False se un batch più recente ha sostituito questo prima della fine
    pub completed: bool,
    pub first_thumbnail: Option<Duration>,
    pub elapsed: Duration,
}

struct Inner {
    state: ProcessingState,
    current_tag: String,
}

/// Orchestratore della pipeline di upload
pub struct UploadOrchestrator {
    config: Config,
    backend: Mutex<Backend>,
    inner: Mutex<Inner>,
    generation: AtomicU64,
    snapshots: watch::Sender<UploadSnapshot>,
}

impl UploadOrchestrator {
    /// Crea l'orchestratore con il backend previsto da `config.mode`
    pub fn new(config: Config) -> UploadResult<Self> {
        config.validate()?;
        let platform: Arc<dyn ImagePlatform> = Arc::new(ImageCratePlatform::new(
            config.resize_algorithm,
            config.jpeg_quality,
        ));
        let backend = match config.mode {
            ProcessingMode::Chunked | ProcessingMode::Unchunked => {
                Backend::InProcess(ThumbnailResizer::with_platform(
                    platform,
                    ResizeTarget::MaxWidth(config.max_width),
                ))
            }
            ProcessingMode::Worker => Backend::Worker(WorkerChannel::with_resizer(
                ThumbnailResizer::with_platform(
                    platform,
                    ResizeTarget::Square(config.thumbnail_size),
                ),
                config.max_retries,
            )),
        };
        Self::with_backend(config, backend)
    }

    /// Crea l'orchestratore con un backend esplicito
    pub fn with_backend(config: Config, backend: Backend) -> UploadResult<Self> {
        config.validate()?;
        let current_tag = config.default_tag.clone();
        let state = ProcessingState::default();
        let (snapshots, _) = watch::channel(state.snapshot(&current_tag));

        info!(
            "Upload orchestrator ready (mode: {:?}, chunk size: {})",
            config.mode, config.chunk_size
        );

        Ok(Self {
            config,
            backend: Mutex::new(backend),
            inner: Mutex::new(Inner { state, current_tag }),
            generation: AtomicU64::new(0),
            snapshots,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ricevitore degli snapshot pubblicati dopo ogni cambiamento
    pub fn subscribe(&self) -> watch::Receiver<UploadSnapshot> {
        self.snapshots.subscribe()
    }

    /// Ultimo snapshot pubblicato
    pub fn snapshot(&self) -> UploadSnapshot {
        self.snapshots.borrow().clone()
    }

    fn publish(&self, inner: &Inner) {
        self.snapshots
            .send_replace(inner.state.snapshot(&inner.current_tag));
    }

    /// Cambia il tag corrente. Non rilancia l'elaborazione.
    pub async fn set_tag(&self, tag: &str) -> UploadResult<()> {
        if !self.config.has_tag(tag) {
            return Err(UploadError::UnknownTag(tag.to_string()));
        }
        let mut inner = self.inner.lock().await;
        inner.current_tag = tag.to_string();
        debug!("Current tag set to {}", tag);
        self.publish(&inner);
        Ok(())
    }

    /// Avvia un nuovo batch: azzera lo stato e invalida quello precedente.
    ///
    /// Ritorna `None` (no-op) per una selezione vuota.
    pub async fn begin_batch(&self, files: &[InputFile]) -> Option<u64> {
        if files.is_empty() {
            debug!("Empty selection, nothing to do");
            return None;
        }

        let mut inner = self.inner.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if inner.state.phase != Phase::Idle && inner.state.phase != Phase::Done {
            info!(
                "Batch {} superseded by batch {}",
                inner.state.generation, generation
            );
        }
        inner.state = ProcessingState::start(generation, files.len());
        info!("📂 Batch {}: {} files selected", generation, files.len());
        self.publish(&inner);
        Some(generation)
    }

    /// True se `generation` non è più il batch corrente
    pub fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Selezione utente: reset + elaborazione completa del batch
    pub async fn select_files(&self, files: Vec<InputFile>) -> UploadResult<Option<BatchReport>> {
        match self.begin_batch(&files).await {
            Some(generation) => Ok(Some(self.run_batch(generation, files).await?)),
            None => Ok(None),
        }
    }

    /// Esegue il loop sui chunk per un batch già avviato con `begin_batch`
    pub async fn run_batch(&self, generation: u64, files: Vec<InputFile>) -> UploadResult<BatchReport> {
        match self.config.mode {
            ProcessingMode::Unchunked => self.run_unchunked(generation, &files).await?,
            ProcessingMode::Chunked | ProcessingMode::Worker => {
                self.run_chunked(generation, &files).await?
            }
        }
        Ok(self.finish(generation).await)
    }

    async fn run_chunked(&self, generation: u64, files: &[InputFile]) -> UploadResult<()> {
        let chunks = chunker::chunk(files, self.config.chunk_size)?;
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.enumerate() {
            if !self.set_phase(generation, Phase::ProcessingChunk).await {
                return Ok(());
            }
            debug!(
                "Batch {}: chunk {}/{} ({} files)",
                generation,
                index + 1,
                chunk_count,
                chunk.len()
            );

            let (outcome, via_worker) = {
                let mut backend = self.backend.lock().await;
                let outcome = backend.process_chunk(chunk, self.config.max_retries).await;
                (outcome, backend.is_worker())
            };

            if !self.merge(generation, outcome).await {
                return Ok(());
            }

            // the worker path already runs off this task
            if !via_worker {
                tokio::task::yield_now().await;
            }
        }

        Ok(())
    }

    /// Un file alla volta; i thumbnails diventano visibili solo alla fine
    async fn run_unchunked(&self, generation: u64, files: &[InputFile]) -> UploadResult<()> {
        if !self.set_phase(generation, Phase::ProcessingChunk).await {
            return Ok(());
        }

        let mut collected = Vec::with_capacity(files.len());
        for file in files {
            let outcome = {
                let mut backend = self.backend.lock().await;
                backend.process_item(file, self.config.max_retries).await
            };

            let mut inner = self.inner.lock().await;
            if !inner.state.is_current(generation) {
                debug!("Discarding result of stale batch {}", generation);
                return Ok(());
            }
            inner
                .state
                .advance(outcome.thumbnails.len(), outcome.failed);
            collected.extend(outcome.thumbnails);
            self.publish(&inner);
        }

        let mut inner = self.inner.lock().await;
        if inner.state.is_current(generation) {
            inner.state.claim_ids(&mut collected);
            inner.state.append(collected);
            inner.state.phase = Phase::ChunkComplete;
            self.publish(&inner);
        }
        Ok(())
    }

    async fn set_phase(&self, generation: u64, phase: Phase) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_current(generation) {
            debug!("Batch {} is stale, stopping", generation);
            return false;
        }
        inner.state.phase = phase;
        self.publish(&inner);
        true
    }

    /// Merge dei risultati di un chunk. False se il batch è stale.
    async fn merge(&self, generation: u64, outcome: ChunkOutcome) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_current(generation) {
            debug!(
                "Discarding {} thumbnails from stale batch {}",
                outcome.thumbnails.len(),
                generation
            );
            return false;
        }

        let ChunkOutcome {
            mut thumbnails,
            failed,
        } = outcome;
        let processed = thumbnails.len();
        inner.state.claim_ids(&mut thumbnails);
        inner.state.append(thumbnails);
        inner.state.advance(processed, failed);
        inner.state.phase = Phase::ChunkComplete;
        self.publish(&inner);
        true
    }

    async fn finish(&self, generation: u64) -> BatchReport {
        let mut inner = self.inner.lock().await;
        let completed = inner.state.is_current(generation);
        if completed {
            inner.state.phase = Phase::Done;
            self.publish(&inner);
            info!(
                "✅ Batch {} done: {}/{} processed, {} failed in {:.2}s",
                generation,
                inner.state.processed_count,
                inner.state.total_count,
                inner.state.failed_count,
                inner.state.elapsed().as_secs_f64()
            );
            BatchReport {
                generation,
                processed_count: inner.state.processed_count,
                total_count: inner.state.total_count,
                failed_count: inner.state.failed_count,
                completed,
                first_thumbnail: inner.state.first_thumbnail,
                elapsed: inner.state.elapsed(),
            }
        } else {
            BatchReport {
                generation,
                processed_count: 0,
                total_count: 0,
                failed_count: 0,
                completed,
                first_thumbnail: None,
                elapsed: Duration::ZERO,
            }
        }
    }

    /// Ferma il worker in background, se presente
    pub async fn shutdown(&self) {
        self.backend.lock().await.shutdown().await;
    }
}
