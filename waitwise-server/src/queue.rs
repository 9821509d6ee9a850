use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json,
};
use waitwise_collab::PrimaryKey;

use crate::{
    auth::Session,
    errors::ServerResult,
    schemas::{SetTokenSchema, ValidatedJson},
    serialized::{Department, JoinedQueue, QueueToken, ToSerialized},
    sse, Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/api/queue/{id}",
    tag = "queue",
    params(("id" = i32, Path, description = "Department id")),
    responses(
        (status = 200, body = Department),
        (status = 404, description = "Department not found")
    )
)]
async fn department(
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Department>> {
    let department = context.collab.queues.department(department_id).await?;

    Ok(Json(department.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/queue/{id}/join",
    tag = "queue",
    params(("id" = i32, Path, description = "Department id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = JoinedQueue),
        (status = 400, description = "The queue is paused and joins are rejected"),
        (status = 404, description = "Department not found")
    )
)]
async fn join(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<JoinedQueue>> {
    let result = context
        .collab
        .queues
        .join(department_id, Some(&session.actor()))
        .await?;

    Ok(Json(result.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/api/queue/{id}/next",
    tag = "queue",
    params(("id" = i32, Path, description = "Department id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Department),
        (status = 400, description = "No more tokens in queue"),
        (status = 403, description = "Not an admin of this department")
    )
)]
async fn next(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Department>> {
    let department = context
        .collab
        .queues
        .advance(&session.actor(), department_id)
        .await?;

    Ok(Json(department.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/api/queue/{id}/previous",
    tag = "queue",
    params(("id" = i32, Path, description = "Department id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Department),
        (status = 400, description = "Already at the start of the queue"),
        (status = 403, description = "Not an admin of this department")
    )
)]
async fn previous(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Department>> {
    let department = context
        .collab
        .queues
        .retreat(&session.actor(), department_id)
        .await?;

    Ok(Json(department.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/api/queue/{id}/set",
    tag = "queue",
    params(("id" = i32, Path, description = "Department id")),
    request_body = SetTokenSchema,
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Department),
        (status = 400, description = "Token number is out of range"),
        (status = 403, description = "Not an admin of this department")
    )
)]
async fn set(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<SetTokenSchema>,
) -> ServerResult<Json<Department>> {
    let department = context
        .collab
        .queues
        .set(&session.actor(), department_id, body.token_number)
        .await?;

    Ok(Json(department.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/api/queue/{id}/toggle-pause",
    tag = "queue",
    params(("id" = i32, Path, description = "Department id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Department),
        (status = 403, description = "Not an admin of this department")
    )
)]
async fn toggle_pause(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Department>> {
    let department = context
        .collab
        .queues
        .toggle_pause(&session.actor(), department_id)
        .await?;

    Ok(Json(department.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/api/queue/{id}/tokens/{number}/cancel",
    tag = "queue",
    params(
        ("id" = i32, Path, description = "Department id"),
        ("number" = u32, Path, description = "Token number")
    ),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = QueueToken),
        (status = 400, description = "Token is no longer pending"),
        (status = 403, description = "Not the owner of the token")
    )
)]
async fn cancel(
    session: Session,
    State(context): State<ServerContext>,
    Path((department_id, token_number)): Path<(PrimaryKey, u32)>,
) -> ServerResult<Json<QueueToken>> {
    let token = context
        .collab
        .queues
        .cancel(&session.actor(), department_id, token_number)
        .await?;

    Ok(Json(token.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/queue/{id}/tokens",
    tag = "queue",
    params(("id" = i32, Path, description = "Department id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Vec<QueueToken>),
        (status = 403, description = "Not an admin of this department")
    )
)]
async fn tokens(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<QueueToken>>> {
    let tokens = context
        .collab
        .queues
        .tokens(&session.actor(), department_id)
        .await?;

    Ok(Json(tokens.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(department))
        .route("/:id/events", get(sse::event_stream))
        .route("/:id/join", post(join))
        .route("/:id/next", put(next))
        .route("/:id/previous", put(previous))
        .route("/:id/set", put(set))
        .route("/:id/toggle-pause", put(toggle_pause))
        .route("/:id/tokens", get(tokens))
        .route("/:id/tokens/:number/cancel", put(cancel))
}
