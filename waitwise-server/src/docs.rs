use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::{ai, auth, departments, offices, queue, schemas, serialized, sse};

#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    info(
        title = "WaitWise API",
        description = "waitwise-server exposes endpoints to join and run department queues"
    ),
    paths(
        auth::signup,
        auth::login,
        auth::logout,
        auth::user,
        auth::update_profile,
        auth::toggle_bookmark,
        auth::update_role,
        auth::users,
        auth::tokens,
        queue::department,
        queue::join,
        queue::next,
        queue::previous,
        queue::set,
        queue::toggle_pause,
        queue::cancel,
        queue::tokens,
        sse::event_stream,
        ai::predict,
        departments::analytics,
        departments::update,
        departments::update_avg_time,
        departments::delete,
        departments::activity,
        offices::list,
        offices::create,
        offices::departments,
        offices::create_department,
    ),
    components(schemas(
        serialized::User,
        serialized::LoginResult,
        serialized::Department,
        serialized::QueueToken,
        serialized::JoinedQueue,
        serialized::Location,
        serialized::Office,
        serialized::Analytics,
        serialized::Forecast,
        serialized::Prediction,
        serialized::ActivityEntry,
        serialized::Message,
        schemas::SignupSchema,
        schemas::LoginSchema,
        schemas::ProfileSchema,
        schemas::UpdateRoleSchema,
        schemas::SetTokenSchema,
        schemas::UpdateDepartmentSchema,
        schemas::AverageTimeSchema,
        schemas::NewOfficeSchema,
        schemas::NewDepartmentSchema,
    ))
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let scheme = ApiKey::Header(ApiKeyValue::new(auth::TOKEN_HEADER));

            components.add_security_scheme("TokenAuth", SecurityScheme::ApiKey(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
