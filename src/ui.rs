use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::classify::FrameCounters;
use crate::session::SessionStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = spinner("{spinner} {msg}");
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Live counter display: one updating line on a terminal, one line per
    /// tick otherwise.
    pub fn counters(&self) -> CounterDisplay {
        let spinner = self
            .use_pretty()
            .then(|| spinner("{spinner} [{elapsed_precise}] {msg}"));
        CounterDisplay { spinner }
    }
}

fn spinner(template: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style =
        ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Tracks which tick reports have been shown. A `watch` receiver can hand
/// back the same report twice, and sequence 0 is the empty session.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReportCursor {
    last_sequence: u64,
}

impl ReportCursor {
    /// True when `sequence` has not been shown yet.
    pub fn advance(&mut self, sequence: u64) -> bool {
        if sequence <= self.last_sequence {
            return false;
        }
        self.last_sequence = sequence;
        true
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}

pub struct CounterDisplay {
    spinner: Option<ProgressBar>,
}

impl CounterDisplay {
    pub fn update(&self, sequence: u64, counters: &FrameCounters) {
        let line = format!("tick {:>6}  {}", sequence, format_counters(counters));
        match &self.spinner {
            Some(spinner) => spinner.set_message(line),
            None => eprintln!("{line}"),
        }
    }

    pub fn finish(&self, status: &SessionStatus) {
        let message = match &status.fault {
            Some(fault) => format!("✘ stopped: {}", fault),
            None => format!("✔ {:?}", status.phase),
        };
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

/// The three counters as shown to a viewer.
pub fn format_counters(counters: &FrameCounters) -> String {
    format!(
        "Adults: {}  Children: {}  Animals: {}",
        counters.adult, counters.child, counters.animal
    )
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_all_three_categories() {
        let counters = FrameCounters {
            adult: 2,
            child: 1,
            animal: 0,
        };
        assert_eq!(
            format_counters(&counters),
            "Adults: 2  Children: 1  Animals: 0"
        );
    }

    #[test]
    fn pretty_needs_a_terminal() {
        assert!(!Ui::from_args(Some("pretty"), false, false).use_pretty());
        assert!(Ui::from_args(Some("pretty"), true, true).use_pretty());
        assert!(!Ui::from_args(None, true, true).use_pretty());
        assert!(!Ui::from_args(Some("plain"), true, false).use_pretty());
    }

    #[test]
    fn report_cursor_skips_empty_and_repeated_ticks() {
        let mut cursor = ReportCursor::default();
        assert!(!cursor.advance(0));
        assert!(cursor.advance(1));
        assert!(!cursor.advance(1));
        assert!(cursor.advance(3));
        assert!(!cursor.advance(2));
        assert_eq!(cursor.last_sequence(), 3);
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
