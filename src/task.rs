use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ScanConfig;
use crate::scoring::MetricResult;

/// Processing stages the host pipeline advertises on a task.
pub mod stage {
    /// Normal rule processing.
    pub const FILTERS: u32 = 1 << 0;
    /// Post-processing once the score is considered stable.
    pub const POST_FILTERS: u32 = 1 << 1;
    /// Idempotent phase; no further symbol mutation is permitted.
    pub const IDEMPOTENT: u32 = 1 << 2;
}

/// Per-message weight correctors applied in place of static symbol weights.
#[derive(Debug, Clone, Default)]
pub struct TaskSettings {
    scores: HashMap<String, f64>,
}

impl TaskSettings {
    pub fn new() -> Self {
        TaskSettings::default()
    }

    pub fn set_symbol_score(&mut self, symbol: &str, score: f64) {
        self.scores.insert(symbol.to_string(), score);
    }

    pub fn symbol_score(&self, symbol: &str) -> Option<f64> {
        self.scores.get(symbol).copied()
    }
}

/// One message scan.
///
/// All scoring operations on a task run serialized from the owner's
/// perspective; the task owns its metric result and releases it, interior
/// maps included, when it is dropped.
#[derive(Debug)]
pub struct Task {
    pub message_id: String,
    pub cfg: Option<Arc<ScanConfig>>,
    pub settings: Option<TaskSettings>,
    pub processed_stages: u32,
    pub(crate) result: Option<MetricResult>,
}

impl Task {
    pub fn new(message_id: &str, cfg: Option<Arc<ScanConfig>>) -> Self {
        Task {
            message_id: message_id.to_string(),
            cfg,
            settings: None,
            processed_stages: 0,
            result: None,
        }
    }

    pub fn set_stage(&mut self, stage: u32) {
        self.processed_stages |= stage;
    }

    pub fn has_stage(&self, stage: u32) -> bool {
        self.processed_stages & stage != 0
    }

    /// The metric result, if any insertion or readout created it already.
    pub fn result(&self) -> Option<&MetricResult> {
        self.result.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_bits() {
        let mut task = Task::new("mid", None);
        assert!(!task.has_stage(stage::IDEMPOTENT));

        task.set_stage(stage::FILTERS);
        task.set_stage(stage::IDEMPOTENT);
        assert!(task.has_stage(stage::FILTERS));
        assert!(task.has_stage(stage::IDEMPOTENT));
        assert!(!task.has_stage(stage::POST_FILTERS));
    }

    #[test]
    fn test_settings_lookup() {
        let mut settings = TaskSettings::new();
        settings.set_symbol_score("FOO", -2.5);
        assert_eq!(settings.symbol_score("FOO"), Some(-2.5));
        assert_eq!(settings.symbol_score("BAR"), None);
    }
}
