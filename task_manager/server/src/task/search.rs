use crate::task::Task;
use chrono::NaiveDate;
use std::cmp::Reverse;

/// Ordering applied to search results.
#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum SortKey {
    /// Earliest due date first, undated tasks last.
    DueDate,
    /// Highest priority first, tasks without a priority last.
    Priority,
}

impl SortKey {
    /// Parses a `sortBy` value case-insensitively. Unknown keys yield `None`,
    /// which keeps results in scan order.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("dueDate") {
            Some(SortKey::DueDate)
        } else if value.eq_ignore_ascii_case("priority") {
            Some(SortKey::Priority)
        } else {
            None
        }
    }
}

/// In-memory search filters. Every filter that is set must match.
#[derive(Debug, PartialEq, Clone, Eq, Default)]
pub struct SearchCriteria {
    /// Case-insensitive substring of the title or description.
    pub keyword: Option<String>,
    /// Substring of the tags field.
    pub tag: Option<String>,
    /// Inclusive lower bound on the due date.
    pub after: Option<NaiveDate>,
    /// Exclusive upper bound on the due date.
    pub before: Option<NaiveDate>,
    pub sort_by: Option<SortKey>,
}

impl SearchCriteria {
    /// Filters `tasks` and sorts the survivors. Sorting is stable.
    pub fn apply(&self, tasks: Vec<Task>) -> Vec<Task> {
        let keyword = non_blank(self.keyword.as_deref()).map(str::to_lowercase);
        let tag = non_blank(self.tag.as_deref());

        let mut matched: Vec<Task> = tasks
            .into_iter()
            .filter(|task| keyword.as_deref().is_none_or(|k| matches_keyword(task, k)))
            .filter(|task| tag.is_none_or(|t| task.tags().is_some_and(|tags| tags.contains(t))))
            .filter(|task| self.within_due_range(task))
            .collect();

        match self.sort_by {
            Some(SortKey::DueDate) => {
                matched.sort_by_key(|task| (task.due_date().is_none(), task.due_date()))
            }
            Some(SortKey::Priority) => matched.sort_by_key(|task| Reverse(task.priority_rank())),
            None => {}
        }
        matched
    }

    fn within_due_range(&self, task: &Task) -> bool {
        if self.after.is_none() && self.before.is_none() {
            return true;
        }
        let Some(due_date) = task.due_date() else {
            return false;
        };
        self.after.is_none_or(|after| due_date >= after)
            && self.before.is_none_or(|before| due_date < before)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn matches_keyword(task: &Task, lowercase_keyword: &str) -> bool {
    task.title().to_lowercase().contains(lowercase_keyword)
        || task
            .description()
            .is_some_and(|description| description.to_lowercase().contains(lowercase_keyword))
}
