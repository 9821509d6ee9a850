use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json,
};
use waitwise_collab::{NewPlainOffice, OfficeKind, PrimaryKey};
use waitwise_core::Coordinates;

use crate::{
    auth::Session,
    errors::{ServerError, ServerResult},
    schemas::{NearbyQuery, NewDepartmentSchema, NewOfficeSchema, ValidatedJson},
    serialized::{Department, Office, ToSerialized},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/api/office",
    tag = "office",
    params(NearbyQuery),
    responses((status = 200, body = Vec<Office>))
)]
async fn list(
    State(context): State<ServerContext>,
    Query(query): Query<NearbyQuery>,
) -> ServerResult<Json<Vec<Office>>> {
    let offices = &context.collab.offices;

    let result: Vec<Office> = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => offices
            .nearby(Coordinates::new(lat, lng), query.radius)
            .await?
            .to_serialized(),
        _ => offices.list().await?.to_serialized(),
    };

    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/office",
    tag = "office",
    request_body = NewOfficeSchema,
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Office),
        (status = 403, description = "Only super admins may create offices")
    )
)]
async fn create(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewOfficeSchema>,
) -> ServerResult<Json<Office>> {
    let kind = match body.kind {
        Some(kind) => kind
            .parse()
            .map_err(|e: waitwise_core::UnknownVariant| ServerError::InvalidBody(e.to_string()))?,
        None => OfficeKind::default(),
    };

    let office = context
        .collab
        .offices
        .create(
            &session.actor(),
            NewPlainOffice {
                name: body.name,
                address: body.address,
                location: Coordinates::new(body.lat, body.lng),
                kind,
            },
        )
        .await?;

    Ok(Json(office.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/office/{id}/departments",
    tag = "office",
    params(("id" = i32, Path, description = "Office id")),
    responses(
        (status = 200, body = Vec<Department>),
        (status = 404, description = "Office not found")
    )
)]
async fn departments(
    State(context): State<ServerContext>,
    Path(office_id): Path<PrimaryKey>,
) -> ServerResult<Json<Vec<Department>>> {
    let departments = context.collab.offices.departments(office_id).await?;

    Ok(Json(departments.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/office/{id}/departments",
    tag = "office",
    params(("id" = i32, Path, description = "Office id")),
    request_body = NewDepartmentSchema,
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Department),
        (status = 403, description = "Only super admins may create departments"),
        (status = 404, description = "Office not found")
    )
)]
async fn create_department(
    session: Session,
    State(context): State<ServerContext>,
    Path(office_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<NewDepartmentSchema>,
) -> ServerResult<Json<Department>> {
    let department = context
        .collab
        .offices
        .create_department(
            &session.actor(),
            office_id,
            body.name,
            body.avg_wait_time_per_token,
        )
        .await?;

    Ok(Json(department.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id/departments", get(departments).post(create_department))
}
