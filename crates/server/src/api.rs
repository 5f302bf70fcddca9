use askdb_agent::Pipeline;
use askdb_core::InterfaceError;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    pipeline: Pipeline,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    correlation_id: String,
}

/// Any origin may call the API so a browser dashboard can post questions.
pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ask", post(ask))
        .with_state(ApiState { pipeline })
        .layer(CorsLayer::permissive())
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "AskDB API is running. POST /ask with {\"question\": \"...\"} to query the database."
    }))
}

/// Runs the pipeline on its own task so that a panic inside a run is
/// reported as a 500 instead of dropping the connection.
async fn ask(State(state): State<ApiState>, payload: Result<Json<AskRequest>, JsonRejection>) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return interface_response(InterfaceError::BadRequest {
                message: rejection.body_text(),
                correlation_id,
            });
        }
    };

    let span = info_span!("ask", correlation_id = %correlation_id);
    let pipeline = state.pipeline.clone();
    let run = tokio::spawn(async move { pipeline.ask(&request.question).await }.instrument(span));

    match run.await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(join_error) => {
            let failure = InterfaceError::Internal { message: join_error.to_string(), correlation_id };
            error!(
                event_name = "api.ask.panicked",
                correlation_id = failure.correlation_id(),
                error = %failure,
                "pipeline run aborted"
            );
            interface_response(failure)
        }
    }
}

fn interface_response(failure: InterfaceError) -> Response {
    let status = match failure {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorBody { error: failure.user_message(), correlation_id: failure.correlation_id().to_string() };
    (status, Json(body)).into_response()
}
