use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::scorer::ScanOutcome;

/// Human-readable state of the scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Loading,
    Ready,
    CameraReady { fallback: bool },
    Outcome(ScanOutcome),
    NoFeatures,
    CycleFailed(String),
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Loading => f.write_str("Loading features..."),
            Status::Ready => f.write_str("Features loaded! Start the camera to begin."),
            Status::CameraReady { fallback: false } => f.write_str("Camera ready! Scanning..."),
            Status::CameraReady { fallback: true } => {
                f.write_str("Camera ready (fallback)! Scanning...")
            }
            Status::Outcome(ScanOutcome::Recognized {
                poster_id,
                box_label,
                ..
            }) => write!(f, "Poster: {}, Box: {}", poster_id, box_label),
            Status::Outcome(ScanOutcome::NotRecognized { .. }) => {
                f.write_str("Poster not recognized")
            }
            Status::Outcome(ScanOutcome::NoMatch) => f.write_str("No match"),
            Status::NoFeatures => f.write_str("No features detected"),
            Status::CycleFailed(reason) => write!(f, "Scan failed: {}", reason),
            Status::Error(reason) => write!(f, "Error: {}", reason),
        }
    }
}

pub trait StatusSink: Send {
    fn show(&mut self, status: &Status);

    /// Interrupts the user; used for failures they must act on.
    fn alert(&mut self, message: &str);
}

/// Terminal sink: the current status lives on a spinner line.
pub struct ConsoleSink {
    progress: ProgressBar,
}

impl ConsoleSink {
    pub fn new() -> Self {
        let progress = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            progress.set_style(style);
        }
        progress.enable_steady_tick(Duration::from_millis(100));
        Self { progress }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for ConsoleSink {
    fn show(&mut self, status: &Status) {
        log::debug!("status: {}", status);
        match status {
            Status::Error(_) => self.progress.abandon_with_message(status.to_string()),
            _ => self.progress.set_message(status.to_string()),
        }
    }

    fn alert(&mut self, message: &str) {
        log::error!("{}", message);
        self.progress.println(format!("!! {}", message));
    }
}

impl Drop for ConsoleSink {
    fn drop(&mut self) {
        if !self.progress.is_finished() {
            self.progress.finish();
        }
    }
}

/// Keeps every status line in memory. Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
    alerts: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl StatusSink for RecordingSink {
    fn show(&mut self, status: &Status) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(status.to_string());
    }

    fn alert(&mut self, message: &str) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
