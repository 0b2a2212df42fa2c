use serde::{Deserialize, Serialize};

use super::task::{Task, TaskStatus};

/// Per-user task counts as reported by the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub pending_tasks: u64,
    /// Percentage in 0..=100
    pub completion_rate: f64,
}

/// Coarse bucket of the completion rate, for coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionBand {
    Excellent,
    Good,
    Fair,
    Low,
}

impl TaskStats {
    /// Compute stats from a task list, the same way the server does
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let total = tasks.len() as u64;
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count() as u64;
        let pending = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count() as u64;
        let completion_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_tasks: total,
            completed_tasks: completed,
            pending_tasks: pending,
            completion_rate,
        }
    }

    /// Completion rate rounded for display
    pub fn completion_percent(&self) -> u32 {
        self.completion_rate.round().clamp(0.0, 100.0) as u32
    }

    pub fn completion_band(&self) -> CompletionBand {
        let rate = self.completion_rate;
        if rate >= 80.0 {
            CompletionBand::Excellent
        } else if rate >= 60.0 {
            CompletionBand::Good
        } else if rate >= 40.0 {
            CompletionBand::Fair
        } else {
            CompletionBand::Low
        }
    }
}
