use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::pipeline::{
    CancelResponse, DescribeRequest, GenerationResponse, SingleRunRequest,
};
use crate::services::single_run::{RunTicket, SingleRunError, SingleRunView};

type Accepted = (StatusCode, Json<GenerationResponse>);

fn accepted(result: Result<RunTicket, SingleRunError>) -> Result<Accepted, StatusCode> {
    match result {
        // The task keeps running detached; its outcome lands in the view.
        Ok(ticket) => Ok((
            StatusCode::ACCEPTED,
            Json(GenerationResponse {
                generation: ticket.generation,
            }),
        )),
        Err(SingleRunError::NothingToRegenerate) => Err(StatusCode::CONFLICT),
        Err(SingleRunError::EmptyInput | SingleRunError::EmptyCategory) => {
            Err(StatusCode::UNPROCESSABLE_ENTITY)
        }
    }
}

/// GET /api/v1/single — stage, results and error of the latest run.
pub async fn get_single(State(state): State<AppState>) -> Json<SingleRunView> {
    Json(state.single.view())
}

/// POST /api/v1/single/run
pub async fn run(
    State(state): State<AppState>,
    Json(request): Json<SingleRunRequest>,
) -> Result<Accepted, StatusCode> {
    request
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    accepted(state.single.run(request.input))
}

/// POST /api/v1/single/regenerate
pub async fn regenerate(State(state): State<AppState>) -> Result<Accepted, StatusCode> {
    accepted(state.single.regenerate())
}

/// POST /api/v1/single/describe — describe user-edited category and labels.
pub async fn describe_with(
    State(state): State<AppState>,
    Json(request): Json<DescribeRequest>,
) -> Result<Accepted, StatusCode> {
    request
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    accepted(state.single.describe_with(request.category, request.labels))
}

/// POST /api/v1/single/cancel
pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.single.cancel(),
    })
}
