use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DomainError, DomainResult};

const TEMPORARY_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Client-side id for a task the server has not acknowledged yet.
    pub fn temporary() -> Self {
        TaskId(format!("{TEMPORARY_ID_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

/// User-supplied task description, trimmed and guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskText(String);

impl TaskText {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyText);
        }
        Ok(TaskText(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub created_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Optimistic stand-in for a task that is being created.
    pub fn provisional(text: &TaskText, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::temporary(),
            text: text.as_str().to_string(),
            completed: false,
            created_date: now,
            completed_date: None,
        }
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.completed = true;
        self.completed_date = Some(at);
    }

    pub fn mark_incomplete(&mut self) {
        self.completed = false;
        self.completed_date = None;
    }

    /// `completed_date` must be present exactly when the task is completed.
    pub fn is_consistent(&self) -> bool {
        self.completed == self.completed_date.is_some()
    }

    /// Format the time since creation for display
    pub fn age_display(&self) -> String {
        time_since(self.created_date, Utc::now())
    }

    /// Time since completion, for completed tasks only.
    pub fn completed_display(&self) -> Option<String> {
        self.completed_date.map(|at| time_since(at, Utc::now()))
    }
}

fn time_since(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(at);

    if duration.num_days() > 0 {
        format!("{}d ago", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{}m ago", duration.num_minutes())
    } else {
        "just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_text_is_trimmed() {
        let text = TaskText::parse("  buy milk \n").unwrap();
        assert_eq!(text.as_str(), "buy milk");
    }

    #[test]
    fn test_task_text_rejects_blank_input() {
        assert!(matches!(TaskText::parse(""), Err(DomainError::EmptyText)));
        assert!(matches!(TaskText::parse(" \t\n"), Err(DomainError::EmptyText)));
    }

    #[test]
    fn test_provisional_task_has_temporary_id() {
        let text = TaskText::parse("write report").unwrap();
        let task = Task::provisional(&text, Utc::now());

        assert!(task.id.is_temporary());
        assert!(!task.completed);
        assert!(task.is_consistent());
        assert!(!TaskId::from("42").is_temporary());
    }

    #[test]
    fn test_temporary_ids_are_unique() {
        assert_ne!(TaskId::temporary(), TaskId::temporary());
    }

    #[test]
    fn test_completion_keeps_date_in_sync() {
        let text = TaskText::parse("walk dog").unwrap();
        let mut task = Task::provisional(&text, Utc::now());

        task.mark_completed(Utc::now());
        assert!(task.completed);
        assert!(task.completed_date.is_some());
        assert!(task.is_consistent());

        task.mark_incomplete();
        assert!(!task.completed);
        assert!(task.completed_date.is_none());
        assert!(task.is_consistent());
    }

    #[test]
    fn test_completed_display_only_for_completed_tasks() {
        let text = TaskText::parse("walk dog").unwrap();
        let now = Utc::now();
        let mut task = Task::provisional(&text, now - chrono::Duration::days(3));
        assert_eq!(task.completed_display(), None);

        task.mark_completed(now - chrono::Duration::hours(2));
        assert_eq!(task.completed_display().as_deref(), Some("2h ago"));
        assert_eq!(task.age_display(), "3d ago");
    }

    #[test]
    fn test_time_since_units() {
        let now = Utc::now();
        assert_eq!(time_since(now, now), "just now");
        assert_eq!(time_since(now - chrono::Duration::minutes(5), now), "5m ago");
        assert_eq!(time_since(now - chrono::Duration::hours(1), now), "1h ago");
    }
}
