//! Console UI: an indicatif progress bar plus tracing for log lines

use indicatif::{ProgressBar, ProgressStyle};

use super::{Phase, Progress, Ui};

const BAR_TEMPLATE: &str = "{msg:40} [{bar:40.cyan/blue}] {percent:>3}%";
const SPINNER_TEMPLATE: &str = "{spinner} {msg}";

pub struct ConsoleUi {
    bar: Option<ProgressBar>,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self { bar: None }
    }

    fn bar_for(&mut self, progress: &Progress) -> &ProgressBar {
        let bar = self.bar.get_or_insert_with(|| {
            let (template, bar) = if progress.total > 0 {
                (BAR_TEMPLATE, ProgressBar::new(progress.total))
            } else {
                (SPINNER_TEMPLATE, ProgressBar::new_spinner())
            };
            if let Ok(style) = ProgressStyle::with_template(template) {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar
        });
        if progress.total > 0 {
            bar.set_length(progress.total);
        }
        bar
    }

    /// Print without tearing an active progress bar
    fn emit(&self, f: impl FnOnce()) {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }
}

impl Default for ConsoleUi {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui for ConsoleUi {
    fn set_phase(&mut self, phase: Phase) {
        self.emit(|| tracing::info!("{}", phase));
    }

    fn set_info(&mut self, info: impl Into<String>) {
        let info = info.into();
        self.emit(|| tracing::debug!("{}", info));
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        let progress = Progress::new(current, total, label);
        let bar = self.bar_for(&progress);
        bar.set_position(progress.current);
        bar.set_message(progress.label);
    }

    fn clear_progress(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.emit(|| tracing::info!("{}", message));
    }
}

impl Drop for ConsoleUi {
    fn drop(&mut self) {
        self.clear_progress();
    }
}
