//! Operator-facing progress reporting

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const PROGRESS_TEMPLATE: &str = "{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// Stage banners and per-batch progress bars, hidden when silent
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    silent: bool,
}

impl Reporter {
    pub fn new(silent: bool) -> Self {
        Self { silent }
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Announce a processing stage, e.g. `[instance segmentation]`
    pub fn stage(&self, name: &str) {
        info!("[{}]", name);
    }

    /// Progress bar over `len` items
    pub fn progress(&self, len: usize, message: &'static str) -> ProgressBar {
        if self.silent {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message(message);
        bar
    }
}
