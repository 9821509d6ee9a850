use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;
use thiserror::Error;
use waitwise_collab::{AuthError, DatabaseError, DepartmentError, OfficeError, QueueError};
use waitwise_core::{LedgerError, PolicyError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Permission denied")]
    PermissionDenied,
    /// The request is fine but the queue can't do it right now
    #[error("{0}")]
    InvalidState(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidBody(String),
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("The queue was modified concurrently, try again")]
    ConcurrentModification,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::InvalidState(_) | Self::InvalidCredentials | Self::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict { .. } | Self::ConcurrentModification => StatusCode::CONFLICT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        if status.is_server_error() {
            error!("Request failed: {self}");
        }

        (status, Json(json!({ "msg": self.to_string() }))).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            DatabaseError::StaleLedger { .. } => Self::ConcurrentModification,
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<LedgerError> for ServerError {
    fn from(value: LedgerError) -> Self {
        Self::InvalidState(value.to_string())
    }
}

impl From<PolicyError> for ServerError {
    fn from(_: PolicyError) -> Self {
        Self::PermissionDenied
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Unauthenticated => Self::Unauthorized("Session does not exist"),
            AuthError::MissingDepartment => Self::InvalidBody(value.to_string()),
            AuthError::Policy(e) => e.into(),
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<QueueError> for ServerError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::Ledger(e) => e.into(),
            QueueError::Policy(e) => e.into(),
            QueueError::Db(e) => e.into(),
        }
    }
}

impl From<OfficeError> for ServerError {
    fn from(value: OfficeError) -> Self {
        match value {
            OfficeError::Policy(e) => e.into(),
            OfficeError::Db(e) => e.into(),
        }
    }
}

impl From<DepartmentError> for ServerError {
    fn from(value: DepartmentError) -> Self {
        match value {
            DepartmentError::Policy(e) => e.into(),
            DepartmentError::Db(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waitwise_core::Action;

    #[test]
    fn maps_errors_to_status_codes() {
        let cases = [
            (
                ServerError::from(LedgerError::NoMoreTokens),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServerError::from(PolicyError {
                    action: Action::ControlQueue,
                }),
                StatusCode::FORBIDDEN,
            ),
            (
                ServerError::from(DatabaseError::NotFound {
                    resource: "department",
                    identifier: "id",
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::from(DatabaseError::StaleLedger { department_id: 1 }),
                StatusCode::CONFLICT,
            ),
            (
                ServerError::from(AuthError::Unauthenticated),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServerError::from(AuthError::InvalidCredentials),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.as_status_code(), status, "{error}");
        }
    }

    #[test]
    fn ledger_messages_are_kept() {
        let error = ServerError::from(LedgerError::NoMoreTokens);
        assert_eq!(error.to_string(), "No more tokens in queue");
    }
}
