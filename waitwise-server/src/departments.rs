use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json,
};
use waitwise_collab::{DepartmentChanges, PrimaryKey};

use crate::{
    auth::Session,
    errors::ServerResult,
    schemas::{AverageTimeSchema, UpdateDepartmentSchema, ValidatedJson},
    serialized::{ActivityEntry, Analytics, Department, Message, ToSerialized},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/api/department/{id}/analytics",
    tag = "department",
    params(("id" = i32, Path, description = "Department id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Analytics),
        (status = 403, description = "Not an admin of this department")
    )
)]
async fn analytics(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Analytics>> {
    let analytics = context
        .collab
        .departments
        .analytics(&session.actor(), department_id)
        .await?;

    Ok(Json(analytics.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/api/department/{id}",
    tag = "department",
    params(("id" = i32, Path, description = "Department id")),
    request_body = UpdateDepartmentSchema,
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Department),
        (status = 403, description = "Only super admins may edit departments")
    )
)]
async fn update(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<UpdateDepartmentSchema>,
) -> ServerResult<Json<Department>> {
    let department = context
        .collab
        .departments
        .update(
            &session.actor(),
            department_id,
            DepartmentChanges {
                name: body.name,
                avg_wait_time_per_token: body.avg_wait_time_per_token,
            },
        )
        .await?;

    Ok(Json(department.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/api/department/{id}/avg-time",
    tag = "department",
    params(("id" = i32, Path, description = "Department id")),
    request_body = AverageTimeSchema,
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Department),
        (status = 403, description = "Not an admin of this department")
    )
)]
async fn update_avg_time(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<AverageTimeSchema>,
) -> ServerResult<Json<Department>> {
    let department = context
        .collab
        .departments
        .update_avg_time(&session.actor(), department_id, body.avg_wait_time_per_token)
        .await?;

    Ok(Json(department.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/api/department/{id}",
    tag = "department",
    params(("id" = i32, Path, description = "Department id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Message),
        (status = 403, description = "Only super admins may delete departments")
    )
)]
async fn delete(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Message>> {
    context
        .collab
        .departments
        .delete(&session.actor(), department_id)
        .await?;

    Ok(Json(Message::new("Department deleted")))
}

#[utoipa::path(
    get,
    path = "/api/department/{id}/activity",
    tag = "department",
    params(("id" = i32, Path, description = "Department id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Vec<ActivityEntry>),
        (status = 403, description = "Not an admin of this department")
    )
)]
async fn activity(
    session: Session,
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<ActivityEntry>>> {
    let entries = context
        .collab
        .departments
        .activity(&session.actor(), department_id)
        .await?;

    Ok(Json(entries.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/:id", put(update).delete(delete))
        .route("/:id/analytics", get(analytics))
        .route("/:id/avg-time", put(update_avg_time))
        .route("/:id/activity", get(activity))
}
