use crate::action::Action;
use crate::task::Task;

/// An explicit override decision that short-circuits threshold selection.
#[derive(Debug, Clone)]
pub struct PassthroughResult {
    pub action: Action,
    /// Higher priority wins; ties keep insertion order.
    pub priority: u32,
    /// Score to force on the message; NaN leaves the computed score alone.
    pub target_score: f64,
    pub message: String,
    pub module: String,
}

impl Task {
    /// Register a pass-through override for this message.
    ///
    /// The override list stays sorted by descending priority; equal
    /// priorities keep insertion order, so the earliest caller at the top
    /// priority wins.
    pub fn add_passthrough(
        &mut self,
        action: Action,
        priority: u32,
        target_score: f64,
        message: &str,
        module: &str,
    ) {
        if !target_score.is_nan() {
            log::info!(
                "<{}>: set pre-result to {action} ({target_score:.2}): '{message}' from {module}({priority})",
                self.message_id
            );
        } else {
            log::info!(
                "<{}>: set pre-result to {action} (no score): '{message}' from {module}({priority})",
                self.message_id
            );
        }

        let result = self.create_metric_result();
        result.passthrough.push(PassthroughResult {
            action,
            priority,
            target_score,
            message: message.to_string(),
            module: module.to_string(),
        });
        result
            .passthrough
            .sort_by(|a, b| b.priority.cmp(&a.priority));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_by_descending_priority() {
        let mut task = Task::new("mid", None);
        task.add_passthrough(Action::Greylist, 1, f64::NAN, "low", "a");
        task.add_passthrough(Action::Reject, 10, 20.0, "high", "b");
        task.add_passthrough(Action::AddHeader, 5, f64::NAN, "mid", "c");

        let priorities: Vec<u32> = task
            .result()
            .unwrap()
            .passthrough()
            .iter()
            .map(|pr| pr.priority)
            .collect();
        assert_eq!(priorities, vec![10, 5, 1]);
        assert_eq!(task.result().unwrap().passthrough()[0].action, Action::Reject);
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let mut task = Task::new("mid", None);
        task.add_passthrough(Action::Reject, 7, f64::NAN, "first", "a");
        task.add_passthrough(Action::Greylist, 7, f64::NAN, "second", "b");

        let head = &task.result().unwrap().passthrough()[0];
        assert_eq!(head.action, Action::Reject);
        assert_eq!(head.message, "first");
    }

    #[test]
    fn test_no_deduplication() {
        let mut task = Task::new("mid", None);
        task.add_passthrough(Action::Reject, 3, f64::NAN, "m", "x");
        task.add_passthrough(Action::Reject, 3, f64::NAN, "m", "x");
        assert_eq!(task.result().unwrap().passthrough().len(), 2);
    }
}
