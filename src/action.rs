use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scoring::MetricResult;
use crate::task::Task;

/// Terminal actions a scan can resolve to, ordered most severe first.
///
/// The set is closed: `Reject` is always the most severe outcome and
/// `NoAction` the terminal fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Reject,
    SoftReject,
    RewriteSubject,
    AddHeader,
    Greylist,
    NoAction,
}

impl Action {
    /// Number of slots in a threshold ladder.
    pub const COUNT: usize = 6;

    /// All actions, most severe first.
    pub const ALL: [Action; Action::COUNT] = [
        Action::Reject,
        Action::SoftReject,
        Action::RewriteSubject,
        Action::AddHeader,
        Action::Greylist,
        Action::NoAction,
    ];

    /// Ladder slot of this action.
    pub fn index(self) -> usize {
        match self {
            Action::Reject => 0,
            Action::SoftReject => 1,
            Action::RewriteSubject => 2,
            Action::AddHeader => 3,
            Action::Greylist => 4,
            Action::NoAction => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Reject => "reject",
            Action::SoftReject => "soft reject",
            Action::RewriteSubject => "rewrite subject",
            Action::AddHeader => "add header",
            Action::Greylist => "greylist",
            Action::NoAction => "no action",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricResult {
    /// Reconcile the accumulated score against the threshold ladder and any
    /// pass-through overrides.
    ///
    /// Without pass-throughs the matched action with the largest finite
    /// threshold wins; the ladder is sparse and not necessarily monotone, so
    /// picking by threshold value keeps a misconfigured low-severity action
    /// from shadowing a higher one. With pass-throughs the highest-priority
    /// entry wins unconditionally, optionally forcing the score to its
    /// target.
    pub fn check_action(&mut self) -> Action {
        if self.passthrough().is_empty() {
            let mut selected = None;
            let mut max_limit = f64::NEG_INFINITY;

            for action in Action::ALL {
                if action == Action::NoAction {
                    continue;
                }

                let limit = self.action_limit(action);
                if limit.is_nan() {
                    continue;
                }

                if self.score >= limit && limit > max_limit {
                    selected = Some(action);
                    max_limit = limit;
                }
            }

            selected.unwrap_or(Action::NoAction)
        } else {
            // Peek the highest priority override
            let pr = &self.passthrough()[0];
            let (action, target_score) = (pr.action, pr.target_score);

            if !target_score.is_nan() {
                if action == Action::NoAction {
                    // Explicit whitelists never make the score worse than computed
                    self.score = target_score.min(self.score);
                } else {
                    self.score = target_score;
                }
            }

            action
        }
    }
}

impl Task {
    /// Read out the terminal action for this task's metric result.
    pub fn check_action(&mut self) -> Action {
        self.create_metric_result().check_action()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::symbols::SymbolRegistry;
    use std::sync::Arc;

    fn task_with_limits(limits: &[(Action, f64)]) -> Task {
        let mut cfg = ScanConfig::new(SymbolRegistry::new());
        for (action, score) in limits {
            cfg.set_action_limit(*action, *score);
        }
        Task::new("test-mid", Some(Arc::new(cfg)))
    }

    #[test]
    fn test_action_strings() {
        assert_eq!(Action::Reject.to_string(), "reject");
        assert_eq!(Action::SoftReject.to_string(), "soft reject");
        assert_eq!(Action::NoAction.to_string(), "no action");
    }

    #[test]
    fn test_no_threshold_matched() {
        let mut task = task_with_limits(&[(Action::Reject, 15.0)]);
        task.create_metric_result().score = 5.0;
        assert_eq!(task.check_action(), Action::NoAction);
    }

    #[test]
    fn test_threshold_ladder() {
        let mut task = task_with_limits(&[
            (Action::Reject, 15.0),
            (Action::AddHeader, 6.0),
            (Action::Greylist, 4.0),
        ]);
        task.create_metric_result().score = 7.5;
        assert_eq!(task.check_action(), Action::AddHeader);

        task.create_metric_result().score = 20.0;
        assert_eq!(task.check_action(), Action::Reject);
    }

    #[test]
    fn test_largest_threshold_wins_over_severity() {
        // A misconfigured greylist threshold above add_header must not
        // shadow it: the largest matched threshold is selected.
        let mut task = task_with_limits(&[(Action::AddHeader, 6.0), (Action::Greylist, 8.0)]);
        task.create_metric_result().score = 9.0;
        assert_eq!(task.check_action(), Action::Greylist);

        task.create_metric_result().score = 7.0;
        assert_eq!(task.check_action(), Action::AddHeader);
    }

    #[test]
    fn test_passthrough_beats_threshold() {
        let mut task = task_with_limits(&[(Action::Reject, 15.0)]);
        task.create_metric_result().score = 5.0;
        task.add_passthrough(Action::Reject, 10, 20.0, "m", "x");
        task.add_passthrough(Action::Greylist, 5, f64::NAN, "m2", "y");

        assert_eq!(task.check_action(), Action::Reject);
        assert_eq!(task.create_metric_result().score, 20.0);
    }

    #[test]
    fn test_noaction_passthrough_clamps_down() {
        let mut task = task_with_limits(&[(Action::Reject, 15.0)]);
        task.create_metric_result().score = 5.0;
        task.add_passthrough(Action::NoAction, 10, 2.0, "whitelisted", "policy");

        assert_eq!(task.check_action(), Action::NoAction);
        assert_eq!(task.create_metric_result().score, 2.0);

        // A target above the computed score leaves the score alone
        let mut task = task_with_limits(&[]);
        task.create_metric_result().score = 1.0;
        task.add_passthrough(Action::NoAction, 10, 3.0, "whitelisted", "policy");
        assert_eq!(task.check_action(), Action::NoAction);
        assert_eq!(task.create_metric_result().score, 1.0);
    }

    #[test]
    fn test_passthrough_without_target_keeps_score() {
        let mut task = task_with_limits(&[]);
        task.create_metric_result().score = 7.0;
        task.add_passthrough(Action::SoftReject, 3, f64::NAN, "ratelimited", "throttle");

        assert_eq!(task.check_action(), Action::SoftReject);
        assert_eq!(task.create_metric_result().score, 7.0);
    }
}
