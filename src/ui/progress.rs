use crate::ui::output::is_quiet;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while a blocking step (fetch, refresh) runs
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        if is_quiet() || !console::Term::stderr().is_term() {
            return Self {
                pb: ProgressBar::hidden(),
            };
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// Remove the spinner without leaving a line behind
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }
}
