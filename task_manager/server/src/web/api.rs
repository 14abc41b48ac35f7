use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::task::api::v1;

/// JSON response for API errors
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        v1::create_task_handler,
        v1::get_task_handler,
        v1::update_task_handler,
        v1::delete_task_handler,
        v1::list_tasks_handler,
        v1::search_tasks_handler,
        v1::get_summary_handler,
        v1::get_recommended_handler,
        v1::export_tasks_handler,
    ),
    components(schemas(
        v1::TaskJson,
        v1::TaskRequest,
        v1::TaskSummaryJson,
        v1::PriorityCountsJson,
        ErrorResponse,
    )),
    tags((name = "Tasks", description = "Task tracking endpoints"))
)]
pub struct ApiDoc;

/// Handler for GET /api-docs/openapi.json - Returns the OpenAPI document.
#[tracing::instrument]
pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates the router serving the API documentation.
pub fn create_api_router() -> Router {
    Router::new().route("/api-docs/openapi.json", get(openapi_handler))
}
