//! # Bulk Image Uploader - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file JSON + override da CLI)
//! - Trasformazione della selezione in file di input e avvio del batch
//! - Rendering degli snapshot (progress bar o eventi JSON)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! bulk-uploader ~/Pictures/trip --chunk-size 5 --mode worker --tag city
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bulk_image_uploader::{
    file_manager::FileManager,
    json_output::JsonMessage,
    progress::{render_status, ProgressManager},
    resize::ResizeAlgorithm,
    Config, ProcessingMode, UploadOrchestrator, UploadSnapshot,
};

#[derive(Parser)]
#[command(name = "bulk-uploader")]
#[command(about = "Progressively thumbnail a bulk image selection in chunks")]
struct Args {
    /// Image files or directories to select
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Configuration file (defaults to ~/.bulk-uploader/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Files per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Maximum thumbnail width (in-process modes)
    #[arg(long)]
    max_width: Option<u32>,

    /// Square thumbnail side (worker mode)
    #[arg(long)]
    thumbnail_size: Option<u32>,

    /// Processing strategy
    #[arg(short, long, value_enum)]
    mode: Option<ProcessingMode>,

    /// Extra attempts for a failed item (0 or 1)
    #[arg(long)]
    retries: Option<u32>,

    /// Resize filter
    #[arg(long, value_enum)]
    algorithm: Option<ResizeAlgorithm>,

    /// Quality of JPEG thumbnails (1-100)
    #[arg(long)]
    quality: Option<u8>,

    /// Tag applied to every thumbnail
    #[arg(short, long)]
    tag: Option<String>,

    /// Write the final thumbnail list to this JSON file
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Persist the effective configuration to the config file
    #[arg(long)]
    save_config: bool,

    /// Output progress as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(max_width) = self.max_width {
            config.max_width = max_width;
        }
        if let Some(size) = self.thumbnail_size {
            config.thumbnail_size = size;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(algorithm) = self.algorithm {
            config.resize_algorithm = algorithm;
        }
        if let Some(quality) = self.quality {
            config.jpeg_quality = quality;
        }
        if self.json {
            config.json_output = true;
        }
    }
}

/// Rende gli snapshot finché il batch non è concluso
async fn render_loop(mut rx: watch::Receiver<UploadSnapshot>, json_output: bool) {
    let progress = (!json_output).then(ProgressManager::new);
    let mut sent_thumbnails = 0;

    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();

        if json_output {
            for message in JsonMessage::new_thumbnails(&snapshot, sent_thumbnails) {
                message.emit();
            }
            sent_thumbnails = snapshot.thumbnails.len();
            JsonMessage::progress(&snapshot).emit();
        } else if let Some(ref progress) = progress {
            if snapshot.is_done() {
                progress.finish(&snapshot);
            } else {
                progress.render(&snapshot);
            }
        }

        if snapshot.is_done() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config = match config_path {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    if args.save_config {
        if let Some(ref path) = config_path {
            config.save_to_file(path).await?;
            info!("Saved configuration to {}", path.display());
        }
    }

    let paths = FileManager::find_images(&args.paths)?;
    let files = FileManager::open_files(&paths).await?;
    let total_bytes: u64 = files.iter().map(|f| f.size).sum();

    let orchestrator = UploadOrchestrator::new(config.clone())?;
    if let Some(ref tag) = args.tag {
        orchestrator.set_tag(tag).await?;
    }

    if files.is_empty() {
        warn!("{}", render_status(&orchestrator.snapshot()));
        return Ok(());
    }

    if config.json_output {
        JsonMessage::start(files.len(), &config).emit();
    } else {
        info!(
            "Selected {} images ({})",
            files.len(),
            FileManager::format_size(total_bytes)
        );
    }

    let renderer = tokio::spawn(render_loop(orchestrator.subscribe(), config.json_output));

    let report = match orchestrator.select_files(files).await {
        Ok(report) => report,
        Err(e) => {
            if config.json_output {
                JsonMessage::error("Batch failed".to_string(), Some(e.to_string())).emit();
            }
            orchestrator.shutdown().await;
            return Err(e.into());
        }
    };

    if let Err(e) = renderer.await {
        warn!("Progress renderer stopped unexpectedly: {}", e);
    }

    let snapshot = orchestrator.snapshot();
    if let Some(report) = report {
        if config.json_output {
            JsonMessage::complete(&report).emit();
        } else {
            info!("=== Upload Complete ===");
            info!("{}", render_status(&snapshot));
            info!("Thumbnails: {}", snapshot.thumbnails.len());
            info!("Failed: {}", report.failed_count);
            if let Some(first) = report.first_thumbnail {
                info!("First thumbnail after: {} ms", first.as_millis());
            }
            info!("Tag: {}", snapshot.current_tag);
        }
    }

    if let Some(ref manifest) = args.manifest {
        let content = serde_json::to_string_pretty(&snapshot.rendered_thumbnails())?;
        tokio::fs::write(manifest, content).await?;
        info!("Wrote manifest to {}", manifest.display());
    }

    orchestrator.shutdown().await;
    Ok(())
}
