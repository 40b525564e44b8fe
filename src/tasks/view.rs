//! Filtering and ordering of task snapshots

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::types::{Priority, Task};

/// Sort orders offered to task views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskSort {
    /// Newest first
    #[default]
    CreatedAt,
    /// High before medium before low, newest first within a priority
    Priority,
    /// Earliest due first, tasks without a due date last
    DueDate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Case-insensitive match on title or any tag name
    pub search: Option<String>,
    pub priority: Option<Priority>,
    pub category_id: Option<String>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
}

impl TaskFilter {
    pub fn search(mut self, text: &str) -> Self {
        self.search = Some(text.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn category(mut self, category_id: &str) -> Self {
        self.category_id = Some(category_id.to_string());
        self
    }

    pub fn due_between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.due_from = from;
        self.due_to = to;
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = task.title.to_lowercase().contains(&needle)
                || task.tags.iter().any(|t| t.name.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if let Some(category_id) = &self.category_id {
            if task.category_id.as_ref() != Some(category_id) {
                return false;
            }
        }
        if self.due_from.is_some() || self.due_to.is_some() {
            let Some(due) = task.due_date else {
                return false;
            };
            if self.due_from.is_some_and(|from| due < from) || self.due_to.is_some_and(|to| due > to) {
                return false;
            }
        }
        if self.completed.is_some_and(|c| c != task.completed) {
            return false;
        }
        true
    }
}

fn newest_first(a: &Task, b: &Task) -> Ordering {
    b.created_at.cmp(&a.created_at)
}

pub fn sort_tasks(tasks: &mut [Task], sort: TaskSort) {
    match sort {
        TaskSort::CreatedAt => tasks.sort_by(newest_first),
        TaskSort::Priority => {
            tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| newest_first(a, b)))
        }
        TaskSort::DueDate => tasks.sort_by(|a, b| {
            match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| newest_first(a, b))
        }),
    }
}

/// Tasks matching `filter`, in `sort` order.
pub fn filter_and_sort(tasks: &[Task], filter: &TaskFilter, sort: TaskSort) -> Vec<Task> {
    let mut out: Vec<Task> = tasks.iter().filter(|t| filter.matches(t)).cloned().collect();
    sort_tasks(&mut out, sort);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::types::Tag;
    use chrono::{Duration, TimeZone};

    fn task(id: &str, created_min: i64, priority: Priority, due_days: Option<i64>) -> Task {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            description: None,
            completed: false,
            priority,
            due_date: due_days.map(|d| base + Duration::days(d)),
            reminder: None,
            list_id: "l1".to_string(),
            category_id: None,
            tags: Vec::new(),
            subtasks: Vec::new(),
            owner_id: "u1".to_string(),
            created_at: Some(base + Duration::minutes(created_min)),
            updated_at: None,
        }
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        let tasks = vec![
            task("a", 1, Priority::Low, None),
            task("b", 3, Priority::Low, None),
            task("c", 2, Priority::Low, None),
        ];
        let sorted = filter_and_sort(&tasks, &TaskFilter::default(), TaskSort::default());
        assert_eq!(ids(&sorted), ["b", "c", "a"]);
    }

    #[test]
    fn test_priority_sort() {
        let tasks = vec![
            task("low", 5, Priority::Low, None),
            task("high-old", 1, Priority::High, None),
            task("medium", 3, Priority::Medium, None),
            task("high-new", 4, Priority::High, None),
        ];
        let sorted = filter_and_sort(&tasks, &TaskFilter::default(), TaskSort::Priority);
        assert_eq!(ids(&sorted), ["high-new", "high-old", "medium", "low"]);
    }

    #[test]
    fn test_due_date_sort_puts_undated_last() {
        let tasks = vec![
            task("none", 9, Priority::Low, None),
            task("later", 1, Priority::Low, Some(5)),
            task("soon", 2, Priority::Low, Some(1)),
        ];
        let sorted = filter_and_sort(&tasks, &TaskFilter::default(), TaskSort::DueDate);
        assert_eq!(ids(&sorted), ["soon", "later", "none"]);
    }

    #[test]
    fn test_search_title_and_tags_case_insensitive() {
        let mut milk = task("milk", 1, Priority::Low, None);
        milk.title = "Buy MILK".to_string();
        let mut tagged = task("tagged", 2, Priority::Low, None);
        tagged.tags.push(Tag::new("Dairy", None).unwrap());
        let other = task("other", 3, Priority::Low, None);

        let tasks = vec![milk, tagged, other];
        let hits = filter_and_sort(&tasks, &TaskFilter::default().search("milk"), TaskSort::CreatedAt);
        assert_eq!(ids(&hits), ["milk"]);
        let hits = filter_and_sort(&tasks, &TaskFilter::default().search("dAIRY"), TaskSort::CreatedAt);
        assert_eq!(ids(&hits), ["tagged"]);
    }

    #[test]
    fn test_structured_filters() {
        let mut categorized = task("cat", 1, Priority::High, Some(2));
        categorized.category_id = Some("work".to_string());
        let tasks = vec![categorized, task("plain", 2, Priority::Low, Some(10))];

        let by_category = TaskFilter::default().category("work");
        assert_eq!(ids(&filter_and_sort(&tasks, &by_category, TaskSort::CreatedAt)), ["cat"]);

        let by_priority = TaskFilter::default().priority(Priority::Low);
        assert_eq!(ids(&filter_and_sort(&tasks, &by_priority, TaskSort::CreatedAt)), ["plain"]);

        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let window = TaskFilter::default().due_between(Some(base), Some(base + Duration::days(3)));
        assert_eq!(ids(&filter_and_sort(&tasks, &window, TaskSort::CreatedAt)), ["cat"]);
    }
}
