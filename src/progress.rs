use serde::Serialize;

/// Completion of a run step: a ratio in `0.0..=1.0`, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "ts-export", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-export", ts(export))]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Progress {
    Ratio(f64),
    Indeterminate,
}

impl Progress {
    /// Clamp into `0.0..=1.0`; NaN becomes indeterminate.
    pub fn ratio(value: f64) -> Self {
        if value.is_nan() {
            Progress::Indeterminate
        } else {
            Progress::Ratio(value.clamp(0.0, 1.0))
        }
    }

    /// Whole percent for display, if determinate.
    pub fn percent(self) -> Option<u8> {
        match self {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Progress::Ratio(r) => Some((r * 100.0).round() as u8),
            Progress::Indeterminate => None,
        }
    }
}

/// Progress payload as shown by the shell's status area.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts-export", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts-export", ts(export))]
pub struct ProgressNotice {
    pub run_id: u64,
    pub command: String,
    pub message: String,
    pub progress: Progress,
}

impl ProgressNotice {
    /// One-line rendering, e.g. `ls [42%] scanning`.
    pub fn render(&self) -> String {
        match self.progress.percent() {
            Some(p) => format!("{} [{p}%] {}", self.command, self.message),
            None => format!("{} [...] {}", self.command, self.message),
        }
    }
}
