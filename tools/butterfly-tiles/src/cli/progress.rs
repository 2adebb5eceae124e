//! Progress display for the command-line interface.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use butterfly_tiles::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// Creates a bar counting the row bands of one LOD write.
pub fn create_progress_bar(total: u64, lod: usize) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {msg} [{wide_bar:.cyan/blue}] {pos}/{len} bands")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(format!("LOD {lod:02}"));
    pb
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Spinner for the ingestion plus one bar per LOD write.
pub struct ProgressManager {
    spinner: ProgressBar,
    lod: Mutex<Option<ProgressBar>>,
}

impl ProgressManager {
    pub fn new(message: &str) -> Arc<Self> {
        eprintln!("{message}");
        Arc::new(Self {
            spinner: create_spinner("Reading blocks"),
            lod: Mutex::new(None),
        })
    }

    /// Callback feeding this manager from the converter.
    pub fn callback(self: &Arc<Self>) -> ProgressCallback {
        let manager = Arc::clone(self);
        Arc::new(move |event| manager.handle(event))
    }

    fn handle(&self, event: Progress) {
        let Ok(mut lod_bar) = self.lod.lock() else {
            return;
        };
        match event {
            Progress::Drain { pass, ways, relations } => {
                self.spinner
                    .set_message(format!("Sub-pass {pass}: {ways} ways, {relations} relations"));
            }
            Progress::LodStarted { lod, bands } => {
                *lod_bar = Some(create_progress_bar(bands as u64, lod));
            }
            Progress::BandWritten { .. } => {
                if let Some(pb) = lod_bar.as_ref() {
                    pb.inc(1);
                }
            }
            Progress::LodFinished { .. } => {
                if let Some(pb) = lod_bar.take() {
                    pb.finish_and_clear();
                }
                self.spinner.set_message("Reading blocks");
            }
        }
    }

    pub fn finish(&self) {
        if let Ok(mut lod_bar) = self.lod.lock() {
            if let Some(pb) = lod_bar.take() {
                pb.finish_and_clear();
            }
        }
        self.spinner.finish_and_clear();
    }
}

/// `1h 02m 03s`, dropping leading zero units.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}
