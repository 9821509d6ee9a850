//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use waitwise_collab::{
    ActivityLogData, DepartmentData, JoinResult, NearbyOffice, OfficeData, QueueTokenData,
    SessionData, UserData,
};
use waitwise_core::{DepartmentAnalytics, ForecastEntry, Prediction as CorePrediction};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    name: String,
    email: String,
    /// One of `user`, `dept_admin` or `super_admin`
    role: String,
    department_id: Option<i32>,
    office_id: Option<i32>,
    phone: Option<String>,
    bookmarks: Vec<i32>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResult {
    token: String,
    user: User,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    id: i32,
    office_id: i32,
    name: String,
    avg_wait_time_per_token: u32,
    current_token: u32,
    total_tokens: u32,
    is_paused: bool,
    /// One of `Low`, `Medium` or `High`
    crowd_level: String,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueToken {
    id: i32,
    department_id: i32,
    user_id: Option<i32>,
    token_number: u32,
    /// One of `Pending`, `Serving`, `Completed` or `Cancelled`
    status: String,
    issued_at: DateTime<Utc>,
    served_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinedQueue {
    /// The issued token number
    token: u32,
    /// Minutes until the token is reached
    estimated_wait: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Office {
    id: i32,
    name: String,
    address: String,
    location: Location,
    /// One of `Hospital`, `RTO`, `Bank` or `Other`
    #[serde(rename = "type")]
    kind: String,
    admin_id: Option<i32>,
    created_at: DateTime<Utc>,
    /// Only present in nearby searches
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_in_km: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    tokens_served_today: u32,
    tokens_completed_today: u32,
    /// Minutes, rounded
    avg_processing_time: i64,
    current_token: u32,
    total_tokens: u32,
    is_paused: bool,
    crowd_level: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Forecast {
    time: String,
    level: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    estimated_wait_time: u32,
    crowd_forecast: Vec<Forecast>,
    peak_time: String,
    alert: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    id: i32,
    user_id: i32,
    action: String,
    department_id: Option<i32>,
    office_id: Option<i32>,
    details: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Message {
    msg: String,
}

impl Message {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.to_string(),
            department_id: self.department_id,
            office_id: self.office_id,
            phone: self.phone.clone(),
            bookmarks: self.bookmarks.clone(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Department> for DepartmentData {
    fn to_serialized(&self) -> Department {
        let ledger = &self.ledger;

        Department {
            id: self.id,
            office_id: self.office_id,
            name: self.name.clone(),
            avg_wait_time_per_token: self.avg_wait_time_per_token,
            current_token: ledger.current_token,
            total_tokens: ledger.total_tokens,
            is_paused: ledger.is_paused,
            crowd_level: ledger.crowd_level.to_string(),
            last_updated: ledger.last_updated,
        }
    }
}

impl ToSerialized<QueueToken> for QueueTokenData {
    fn to_serialized(&self) -> QueueToken {
        QueueToken {
            id: self.id,
            department_id: self.department_id,
            user_id: self.user_id,
            token_number: self.token_number,
            status: self.stamps.status.to_string(),
            issued_at: self.stamps.issued_at,
            served_at: self.stamps.served_at,
            completed_at: self.stamps.completed_at,
        }
    }
}

impl ToSerialized<JoinedQueue> for JoinResult {
    fn to_serialized(&self) -> JoinedQueue {
        JoinedQueue {
            token: self.token_number,
            estimated_wait: self.estimated_wait,
        }
    }
}

impl ToSerialized<Office> for OfficeData {
    fn to_serialized(&self) -> Office {
        Office {
            id: self.id,
            name: self.name.clone(),
            address: self.address.clone(),
            location: Location {
                lat: self.location.lat,
                lng: self.location.lng,
            },
            kind: self.kind.to_string(),
            admin_id: self.admin_id,
            created_at: self.created_at,
            distance_in_km: None,
        }
    }
}

impl ToSerialized<Office> for NearbyOffice {
    fn to_serialized(&self) -> Office {
        Office {
            distance_in_km: Some(self.distance_in_km),
            ..self.office.to_serialized()
        }
    }
}

impl ToSerialized<Analytics> for DepartmentAnalytics {
    fn to_serialized(&self) -> Analytics {
        Analytics {
            tokens_served_today: self.tokens_served_today,
            tokens_completed_today: self.tokens_completed_today,
            avg_processing_time: self.avg_processing_time,
            current_token: self.current_token,
            total_tokens: self.total_tokens,
            is_paused: self.is_paused,
            crowd_level: self.crowd_level.to_string(),
        }
    }
}

impl ToSerialized<Forecast> for ForecastEntry {
    fn to_serialized(&self) -> Forecast {
        Forecast {
            time: self.time.clone(),
            level: self.level.to_string(),
        }
    }
}

impl ToSerialized<Prediction> for CorePrediction {
    fn to_serialized(&self) -> Prediction {
        Prediction {
            estimated_wait_time: self.estimated_wait_time,
            crowd_forecast: self.crowd_forecast.to_serialized(),
            peak_time: self.peak_time.clone(),
            alert: self.alert.clone(),
        }
    }
}

impl ToSerialized<ActivityEntry> for ActivityLogData {
    fn to_serialized(&self) -> ActivityEntry {
        ActivityEntry {
            id: self.id,
            user_id: self.user_id,
            action: self.action.to_string(),
            department_id: self.department_id,
            office_id: self.office_id,
            details: self.details.clone(),
            timestamp: self.timestamp,
        }
    }
}
