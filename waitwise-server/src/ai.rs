use axum::{
    extract::{Path, State},
    routing::get,
    Json,
};
use chrono::{Local, Timelike};
use waitwise_collab::PrimaryKey;
use waitwise_core::Prediction as CorePrediction;

use crate::{
    errors::ServerResult,
    serialized::{Prediction, ToSerialized},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/api/ai/predict/{id}",
    tag = "ai",
    params(("id" = i32, Path, description = "Department id")),
    responses(
        (status = 200, body = Prediction),
        (status = 404, description = "Department not found")
    )
)]
async fn predict(
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Prediction>> {
    let department = context.collab.queues.department(department_id).await?;

    let prediction = CorePrediction::from_ledger(
        &department.ledger,
        department.avg_wait_time_per_token,
        Local::now().hour(),
    );

    Ok(Json(prediction.to_serialized()))
}

pub fn router() -> Router {
    Router::new().route("/predict/:id", get(predict))
}
