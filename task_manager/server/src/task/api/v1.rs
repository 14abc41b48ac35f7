use crate::task::export::{export_filename, render_csv};
use crate::task::{
    Priority, PriorityCounts, SearchCriteria, SortKey, Status, Task, TaskInput, TaskServiceError,
    TaskState, TaskSummary,
};
use crate::web::api::ErrorResponse;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// JSON representation of a Task for API responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskJson {
    /// Unique identifier for the task
    pub id: u32,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    /// Free-text tags, matched by substring
    pub tags: Option<String>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task was last updated
    pub updated_at: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
}

impl From<Task> for TaskJson {
    fn from(task: Task) -> Self {
        Self {
            id: task.id(),
            title: task.title().to_string(),
            description: task.description().map(str::to_string),
            priority: task.priority(),
            status: task.status(),
            tags: task.tags().map(str::to_string),
            created_at: task.created_at(),
            updated_at: task.updated_at(),
            due_date: task.due_date(),
        }
    }
}

/// JSON request body for creating or updating a task.
///
/// `id`, `createdAt`, `updatedAt` and any unknown fields are ignored.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// Title of the task, must not be blank
    #[serde(default)]
    title: String,
    description: Option<String>,
    priority: Option<Priority>,
    status: Option<Status>,
    tags: Option<String>,
    /// Due date, not earlier than the creation date
    due_date: Option<NaiveDate>,
}

impl From<TaskRequest> for TaskInput {
    fn from(request: TaskRequest) -> Self {
        Self {
            title: request.title,
            description: request.description,
            priority: request.priority,
            status: request.status,
            tags: request.tags,
            due_date: request.due_date,
        }
    }
}

/// Per-priority task counts.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PriorityCountsJson {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl From<PriorityCounts> for PriorityCountsJson {
    fn from(counts: PriorityCounts) -> Self {
        Self {
            high: counts.high,
            medium: counts.medium,
            low: counts.low,
        }
    }
}

/// API response for the task summary.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummaryJson {
    pub total: u64,
    pub completed: u64,
    /// Always `total - completed`
    pub pending: u64,
    pub by_priority: PriorityCountsJson,
    pub overdue: u64,
    /// Earliest-due task that is not done
    pub next_due_task: Option<TaskJson>,
}

impl From<TaskSummary> for TaskSummaryJson {
    fn from(summary: TaskSummary) -> Self {
        Self {
            total: summary.total,
            completed: summary.completed,
            pending: summary.pending,
            by_priority: summary.by_priority.into(),
            overdue: summary.overdue,
            next_due_task: summary.next_due_task.map(TaskJson::from),
        }
    }
}

/// Reads an optional query value, treating a blank one (`?status=`) as absent.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) if !value.trim().is_empty() => {
            T::deserialize(value.into_deserializer()).map(Some)
        }
        _ => Ok(None),
    }
}

/// Query parameters for filtering the task list.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    status: Option<Status>,
    #[serde(default, deserialize_with = "blank_as_none")]
    priority: Option<Priority>,
}

/// Query parameters for searching tasks.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive match on title or description
    keyword: Option<String>,
    /// Substring of the tags
    tag: Option<String>,
    /// Only tasks due on or after this date
    #[serde(default, deserialize_with = "blank_as_none")]
    after: Option<NaiveDate>,
    /// Only tasks due strictly before this date
    #[serde(default, deserialize_with = "blank_as_none")]
    before: Option<NaiveDate>,
    /// `dueDate` or `priority`
    #[serde(rename = "sortBy")]
    sort_by: Option<String>,
}

impl From<SearchQuery> for SearchCriteria {
    fn from(query: SearchQuery) -> Self {
        Self {
            keyword: query.keyword,
            tag: query.tag,
            after: query.after,
            before: query.before,
            sort_by: query.sort_by.as_deref().and_then(SortKey::parse),
        }
    }
}

/// Error type for task API handlers.
#[derive(Debug, thiserror::Error)]
pub enum TaskApiError {
    /// The requested task does not exist.
    #[error("Task with ID {0} not found")]
    NotFound(u32),
    #[error(transparent)]
    Service(#[from] TaskServiceError),
}

impl IntoResponse for TaskApiError {
    fn into_response(self) -> Response {
        match self {
            TaskApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(
                    "NOT_FOUND",
                    format!("Task with ID {} not found", id),
                )),
            )
                .into_response(),
            TaskApiError::Service(TaskServiceError::TaskNotFound(_)) => {
                StatusCode::NOT_FOUND.into_response()
            }
            TaskApiError::Service(err) if err.is_validation() => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("VALIDATION_FAILED", err.to_string())),
            )
                .into_response(),
            TaskApiError::Service(err) => {
                tracing::error!("Task request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(
                        "INTERNAL_SERVER_ERROR",
                        "An unexpected error occurred while processing your request. Please try again later.",
                    )),
                )
                    .into_response()
            }
        }
    }
}

fn to_json(tasks: Vec<Task>) -> Json<Vec<TaskJson>> {
    Json(tasks.into_iter().map(TaskJson::from).collect())
}

/// Handler for POST /tasks - Creates a task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/tasks",
    request_body = TaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskJson),
        (status = 400, description = "Invalid task", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Json(request): Json<TaskRequest>,
) -> Result<(StatusCode, Json<TaskJson>), TaskApiError> {
    let task = state.service.create_task(request.into()).await?;
    Ok((StatusCode::CREATED, Json(TaskJson::from(task))))
}

/// Handler for GET /tasks/{id} - Returns a single task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    params(("id" = u32, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task found", body = TaskJson),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_task_handler(
    State(state): State<Arc<TaskState>>,
    Path(id): Path<u32>,
) -> Result<Json<TaskJson>, TaskApiError> {
    let task = state
        .service
        .get_task_by_id(id)
        .await?
        .ok_or(TaskApiError::NotFound(id))?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for PUT /tasks/{id} - Replaces the editable fields of a task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    put,
    path = "/tasks/{id}",
    params(("id" = u32, Path, description = "Task ID")),
    request_body = TaskRequest,
    responses(
        (status = 200, description = "Task updated", body = TaskJson),
        (status = 400, description = "Invalid task", body = ErrorResponse),
        (status = 404, description = "Task not found, empty body")
    ),
    tag = "Tasks"
)]
pub async fn update_task_handler(
    State(state): State<Arc<TaskState>>,
    Path(id): Path<u32>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<TaskJson>, TaskApiError> {
    let task = state.service.update_task(id, request.into()).await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for DELETE /tasks/{id} - Deletes a task if it exists.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    params(("id" = u32, Path, description = "Task ID")),
    responses((status = 204, description = "Task deleted or never existed")),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Path(id): Path<u32>,
) -> Result<StatusCode, TaskApiError> {
    state.service.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /tasks - Lists tasks filtered by status and priority.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks",
    params(ListQuery),
    responses(
        (status = 200, description = "Matching tasks", body = [TaskJson]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn list_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TaskJson>>, TaskApiError> {
    let tasks = state
        .service
        .list_tasks(query.status, query.priority)
        .await?;
    Ok(to_json(tasks))
}

/// Handler for GET /tasks/search - Filters and sorts tasks in memory.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching tasks", body = [TaskJson]),
        (status = 400, description = "Malformed date")
    ),
    tag = "Tasks"
)]
pub async fn search_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<TaskJson>>, TaskApiError> {
    let criteria = SearchCriteria::from(query);
    let tasks = state.service.search_tasks(&criteria).await?;
    Ok(to_json(tasks))
}

/// Handler for GET /tasks/summary - Returns aggregate counts.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/summary",
    responses((status = 200, description = "Task summary", body = TaskSummaryJson)),
    tag = "Tasks"
)]
pub async fn get_summary_handler(
    State(state): State<Arc<TaskState>>,
) -> Result<Json<TaskSummaryJson>, TaskApiError> {
    let summary = state.service.get_summary().await?;
    Ok(Json(TaskSummaryJson::from(summary)))
}

/// Handler for GET /tasks/recommended - Returns tasks in recommendation order.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/recommended",
    responses((status = 200, description = "Recommended tasks", body = [TaskJson])),
    tag = "Tasks"
)]
pub async fn get_recommended_handler(
    State(state): State<Arc<TaskState>>,
) -> Result<Json<Vec<TaskJson>>, TaskApiError> {
    let tasks = state.service.get_recommended().await?;
    Ok(to_json(tasks))
}

/// Handler for GET /tasks/export - Downloads all tasks as CSV.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/export",
    responses((status = 200, description = "CSV attachment", content_type = "text/csv", body = String)),
    tag = "Tasks"
)]
pub async fn export_tasks_handler(
    State(state): State<Arc<TaskState>>,
) -> Result<impl IntoResponse, TaskApiError> {
    let tasks = state.service.list_tasks(None, None).await?;
    let filename = export_filename(Local::now());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        render_csv(&tasks),
    ))
}

/// Creates and returns the task router with all task routes.
pub fn create_task_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks_handler).post(create_task_handler))
        .route("/tasks/search", get(search_tasks_handler))
        .route("/tasks/summary", get(get_summary_handler))
        .route("/tasks/recommended", get(get_recommended_handler))
        .route("/tasks/export", get(export_tasks_handler))
        .route(
            "/tasks/{id}",
            get(get_task_handler)
                .put(update_task_handler)
                .delete(delete_task_handler),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::task;
    use crate::task::tests::model;
    use insta::assert_yaml_snapshot;

    #[test]
    fn can_ignore_read_only_and_unknown_fields_in_request() {
        let request: TaskRequest = serde_json::from_str(
            r#"{"id": 99, "title": "Buy milk", "createdAt": "2020-01-01T00:00:00Z",
                "priority": "HIGH", "dueDate": "2024-01-10", "colour": "blue"}"#,
        )
        .unwrap();

        let input = TaskInput::from(request);

        assert_eq!(input.title, "Buy milk");
        assert_eq!(input.priority, Some(Priority::High));
        assert_eq!(input.due_date, NaiveDate::from_ymd_opt(2024, 1, 10));
    }

    #[test]
    fn can_map_search_query_to_criteria() {
        let query: SearchQuery =
            serde_json::from_str(r#"{"keyword": "report", "sortBy": "DUEDATE"}"#).unwrap();

        let criteria = SearchCriteria::from(query);

        assert_eq!(criteria.keyword.as_deref(), Some("report"));
        assert_eq!(criteria.sort_by, Some(SortKey::DueDate));
    }

    #[test]
    fn can_treat_blank_list_filters_as_absent() {
        let uri = "/tasks?status=&priority=".parse().unwrap();

        let Query(query) = Query::<ListQuery>::try_from_uri(&uri).unwrap();

        assert_eq!(query.status, None);
        assert_eq!(query.priority, None);
    }

    #[test]
    fn can_read_filled_and_blank_search_dates() {
        let uri = "/tasks/search?after=2024-01-10&before=".parse().unwrap();

        let Query(query) = Query::<SearchQuery>::try_from_uri(&uri).unwrap();

        assert_eq!(query.after, NaiveDate::from_ymd_opt(2024, 1, 10));
        assert_eq!(query.before, None);
    }

    #[test]
    fn can_reject_unknown_status_filter() {
        let uri = "/tasks?status=LATER".parse().unwrap();

        assert!(Query::<ListQuery>::try_from_uri(&uri).is_err());
    }

    #[test]
    fn can_serialize_summary_with_priority_keys() {
        let summary = TaskSummary {
            total: 3,
            completed: 1,
            pending: 2,
            by_priority: PriorityCounts {
                high: 1,
                medium: 1,
                low: 0,
            },
            overdue: 0,
            next_due_task: Some(Task::from(task::Model {
                priority: Some(Priority::High),
                status: Some(Status::Todo),
                ..model(2, "Write report")
            })),
        };

        assert_yaml_snapshot!(TaskSummaryJson::from(summary), @r#"
        total: 3
        completed: 1
        pending: 2
        byPriority:
          HIGH: 1
          MEDIUM: 1
          LOW: 0
        overdue: 0
        nextDueTask:
          id: 2
          title: Write report
          description: ~
          priority: HIGH
          status: TODO
          tags: ~
          createdAt: "2024-01-01T12:00:00Z"
          updatedAt: ~
          dueDate: ~
        "#);
    }

    #[tokio::test]
    async fn can_hide_database_errors_behind_generic_message() {
        let err = TaskApiError::Service(TaskServiceError::Database(sea_orm::DbErr::Custom(
            "connection refused".to_string(),
        )));

        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_text = std::str::from_utf8(&body).unwrap();
        assert!(!body_text.contains("connection refused"));
    }

    #[tokio::test]
    async fn can_answer_update_not_found_with_empty_body() {
        let response = TaskApiError::Service(TaskServiceError::TaskNotFound(5)).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
