//! Per-list task counters

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tasks::{Priority, Task};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStats {
    pub completed: usize,
    pub total: usize,
    pub high_priority: usize,
    /// Due within the next three days, rounding partial days up
    pub due_soon: usize,
    /// Due before `now`
    pub overdue: usize,
}

impl ListStats {
    /// Share of completed tasks, 0.0 for an empty list.
    pub fn completion_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Counters over `tasks` as of `now`. Callers pass the tasks of one list.
pub fn list_stats(tasks: &[Task], now: DateTime<Utc>) -> ListStats {
    let mut stats = ListStats {
        total: tasks.len(),
        ..ListStats::default()
    };
    for task in tasks {
        if task.completed {
            stats.completed += 1;
        }
        if task.priority == Priority::High {
            stats.high_priority += 1;
        }
        if let Some(due) = task.due_date {
            let ms = (due - now).num_milliseconds();
            if ms < 0 {
                stats.overdue += 1;
            } else if ms > 0 && (ms + DAY_MS - 1) / DAY_MS <= 3 {
                stats.due_soon += 1;
            }
        }
    }
    stats
}
