use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignupSchema {
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    #[validate(email, length(max = 256))]
    pub email: String,
    #[validate(length(min = 6, max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 256))]
    pub email: String,
    #[validate(length(max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileSchema {
    #[validate(length(min = 2, max = 128))]
    pub name: Option<String>,
    #[validate(length(min = 3, max = 32))]
    pub phone: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateRoleSchema {
    pub user_id: i32,
    /// One of `user`, `dept_admin` or `super_admin`
    pub role: String,
    pub department_id: Option<i32>,
    pub office_id: Option<i32>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetTokenSchema {
    pub token_number: u32,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateDepartmentSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub avg_wait_time_per_token: Option<u32>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AverageTimeSchema {
    #[validate(range(min = 1, max = 600))]
    pub avg_wait_time_per_token: u32,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewOfficeSchema {
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    #[validate(length(min = 2, max = 256))]
    pub address: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    /// One of `Hospital`, `RTO`, `Bank` or `Other`
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewDepartmentSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(range(min = 1, max = 600))]
    pub avg_wait_time_per_token: Option<u32>,
}

/// Optional search around a point, every office is returned without it
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NearbyQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Kilometers
    pub radius: Option<f64>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ServerError::InvalidBody(e.body_text()))?;

        extracted_json
            .0
            .validate()
            .map_err(|e| ServerError::InvalidBody(format!("Request body is invalid: {e}")))?;

        Ok(Self(extracted_json.0))
    }
}
