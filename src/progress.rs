//! # Progress Rendering Module
//!
//! Superficie di presentazione per il terminale: legge gli snapshot
//! pubblicati dall'orchestratore e li rende come barra di progresso.
//!
//! ## Componenti principali:
//! - `render_status`: testo di stato per uno snapshot
//! - `ProgressManager`: barra `indicatif` sincronizzata con gli snapshot
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:02] [========================>---------------] 15/24 (62%) 🟢 Processing... (15 of 24)
//! ```

use crate::uploader::UploadSnapshot;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Testo di stato mostrato all'utente
pub fn render_status(snapshot: &UploadSnapshot) -> String {
    let failed = if snapshot.failed_count > 0 {
        format!(" ({} failed)", snapshot.failed_count)
    } else {
        String::new()
    };

    if snapshot.total_count == 0 {
        "📂 No images selected.".to_string()
    } else if !snapshot.is_done() && snapshot.processed_count < snapshot.total_count {
        format!(
            "🟢 Processing... ({} of {}){}",
            snapshot.processed_count, snapshot.total_count, failed
        )
    } else {
        format!("✅ All images processed.{}", failed)
    }
}

/// Manages the terminal progress bar
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Allinea la barra allo snapshot corrente
    pub fn render(&self, snapshot: &UploadSnapshot) {
        self.bar.set_length(snapshot.total_count as u64);
        self.bar.set_position(snapshot.processed_count as u64);
        self.bar.set_message(render_status(snapshot));
    }

    /// Finish with a final message
    pub fn finish(&self, snapshot: &UploadSnapshot) {
        self.render(snapshot);
        self.bar.finish_with_message(render_status(snapshot));
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}
