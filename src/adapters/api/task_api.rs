use async_trait::async_trait;

use super::dto::{TaskDto, TextRequestDto};
use super::HttpClient;
use crate::domain::{Task, TaskId};
use crate::ports::{ApiResult, TaskApi};

/// [`TaskApi`] over the JSON REST endpoints.
#[derive(Clone)]
pub struct HttpTaskApi {
    client: HttpClient,
}

impl HttpTaskApi {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    fn task_path(id: &TaskId, action: Option<&str>) -> String {
        let id = urlencoding::encode(id.as_str());
        match action {
            Some(action) => format!("/tasks/{id}/{action}"),
            None => format!("/tasks/{id}"),
        }
    }

    async fn list(&self, path: &str) -> ApiResult<Vec<Task>> {
        let tasks: Vec<TaskDto> = self.client.get(path).await?;
        Ok(tasks.into_iter().map(Task::from).collect())
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn list_all(&self) -> ApiResult<Vec<Task>> {
        self.list("/tasks").await
    }

    async fn list_completed(&self) -> ApiResult<Vec<Task>> {
        self.list("/tasks/completed").await
    }

    async fn create(&self, text: &str) -> ApiResult<Task> {
        let task: TaskDto = self.client.post("/tasks", &TextRequestDto { text }).await?;
        tracing::info!("Created task {}", task.id);
        Ok(task.into())
    }

    async fn update_text(&self, id: &TaskId, text: &str) -> ApiResult<Task> {
        let task: TaskDto = self
            .client
            .post(&Self::task_path(id, None), &TextRequestDto { text })
            .await?;
        Ok(task.into())
    }

    async fn delete(&self, id: &TaskId) -> ApiResult<()> {
        self.client.delete(&Self::task_path(id, None)).await
    }

    async fn complete(&self, id: &TaskId) -> ApiResult<Task> {
        let task: TaskDto = self
            .client
            .post_empty(&Self::task_path(id, Some("complete")))
            .await?;
        Ok(task.into())
    }

    async fn incomplete(&self, id: &TaskId) -> ApiResult<Task> {
        let task: TaskDto = self
            .client
            .post_empty(&Self::task_path(id, Some("incomplete")))
            .await?;
        Ok(task.into())
    }
}
