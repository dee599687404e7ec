use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Task;
use crate::ports::ErrorDetail;

// Wire format: camelCase fields, timestamps in epoch milliseconds.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub created_date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<i64>,
}

// Request DTOs
#[derive(Debug, Serialize)]
pub struct TextRequestDto<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// Conversion implementations
impl From<TaskDto> for Task {
    fn from(dto: TaskDto) -> Self {
        let created_date = from_millis(dto.created_date).unwrap_or_else(|| {
            tracing::warn!(
                "Task {} has invalid createdDate {}, using now",
                dto.id,
                dto.created_date
            );
            Utc::now()
        });

        // Keep completed and completedDate in agreement.
        let completed_date = if dto.completed {
            Some(
                dto.completed_date
                    .and_then(from_millis)
                    .unwrap_or(created_date),
            )
        } else {
            None
        };

        let task = Task {
            id: dto.id.into(),
            text: dto.text,
            completed: dto.completed,
            created_date,
            completed_date,
        };
        debug_assert!(task.is_consistent());
        task
    }
}

impl From<&Task> for TaskDto {
    fn from(task: &Task) -> Self {
        TaskDto {
            id: task.id.to_string(),
            text: task.text.clone(),
            completed: task.completed,
            created_date: task.created_date.timestamp_millis(),
            completed_date: task.completed_date.map(|date| date.timestamp_millis()),
        }
    }
}

/// Pull whatever detail an error response body carries.
pub fn parse_error_detail(body: &str) -> Option<ErrorDetail> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(MessageBody { message }) = serde_json::from_str::<MessageBody>(body) {
        return Some(ErrorDetail::Message(message));
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(text)) => Some(ErrorDetail::Text(text)),
        Ok(_) => Some(ErrorDetail::Opaque),
        Err(_) => Some(ErrorDetail::Text(body.to_string())),
    }
}
