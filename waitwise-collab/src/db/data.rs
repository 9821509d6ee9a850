use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use waitwise_core::{
    Actor, Coordinates, EntityId, Ledger, Role, TokenStamps, TokenStatus, UnknownVariant,
};

/// The type used for primary keys in the database.
pub type PrimaryKey = EntityId;

/// A WaitWise account
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub name: String,
    /// Unique, used to log in
    pub email: String,
    /// Argon2 hash in PHC format
    pub password: String,
    pub role: Role,
    /// Only set for department admins
    pub department_id: Option<PrimaryKey>,
    pub office_id: Option<PrimaryKey>,
    pub phone: Option<String>,
    /// Offices this user bookmarked
    pub bookmarks: Vec<PrimaryKey>,
    pub created_at: DateTime<Utc>,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OfficeKind {
    Hospital,
    Rto,
    Bank,
    #[default]
    Other,
}

/// A physical location hosting one or more departments
#[derive(Debug, Clone)]
pub struct OfficeData {
    pub id: PrimaryKey,
    pub name: String,
    pub address: String,
    pub location: Coordinates,
    pub kind: OfficeKind,
    /// The super admin that created the office
    pub admin_id: Option<PrimaryKey>,
    pub created_at: DateTime<Utc>,
}

/// A single service queue within an office
#[derive(Debug, Clone)]
pub struct DepartmentData {
    pub id: PrimaryKey,
    pub office_id: PrimaryKey,
    pub name: String,
    /// Minutes it takes on average to serve one token
    pub avg_wait_time_per_token: u32,
    pub ledger: Ledger,
}

/// One issued token of a department queue
#[derive(Debug, Clone)]
pub struct QueueTokenData {
    pub id: PrimaryKey,
    pub department_id: PrimaryKey,
    /// Walk-ins have no user
    pub user_id: Option<PrimaryKey>,
    pub token_number: u32,
    pub stamps: TokenStamps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityAction {
    TokenNext,
    TokenPrevious,
    TokenSet,
    TokenCancel,
    QueuePause,
    QueueResume,
    OfficeCreate,
    DepartmentCreate,
    DepartmentEdit,
    DepartmentDelete,
    UserRoleUpdate,
}

/// An audit trail entry for administrative actions
#[derive(Debug, Clone)]
pub struct ActivityLogData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub action: ActivityAction,
    pub department_id: Option<PrimaryKey>,
    pub office_id: Option<PrimaryKey>,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl UserData {
    /// The policy view of this user
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id,
            role: self.role,
            department_id: self.department_id,
        }
    }
}

impl QueueTokenData {
    pub fn status(&self) -> TokenStatus {
        self.stamps.status
    }
}

impl OfficeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hospital => "Hospital",
            Self::Rto => "RTO",
            Self::Bank => "Bank",
            Self::Other => "Other",
        }
    }
}

impl Display for OfficeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfficeKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Hospital" => Ok(Self::Hospital),
            "RTO" => Ok(Self::Rto),
            "Bank" => Ok(Self::Bank),
            "Other" => Ok(Self::Other),
            other => Err(UnknownVariant {
                kind: "office kind",
                value: other.to_string(),
            }),
        }
    }
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenNext => "token_next",
            Self::TokenPrevious => "token_previous",
            Self::TokenSet => "token_set",
            Self::TokenCancel => "token_cancel",
            Self::QueuePause => "queue_pause",
            Self::QueueResume => "queue_resume",
            Self::OfficeCreate => "office_create",
            Self::DepartmentCreate => "department_create",
            Self::DepartmentEdit => "department_edit",
            Self::DepartmentDelete => "department_delete",
            Self::UserRoleUpdate => "user_role_update",
        }
    }
}

impl Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "token_next" => Self::TokenNext,
            "token_previous" => Self::TokenPrevious,
            "token_set" => Self::TokenSet,
            "token_cancel" => Self::TokenCancel,
            "queue_pause" => Self::QueuePause,
            "queue_resume" => Self::QueueResume,
            "office_create" => Self::OfficeCreate,
            "department_create" => Self::DepartmentCreate,
            "department_edit" => Self::DepartmentEdit,
            "department_delete" => Self::DepartmentDelete,
            "user_role_update" => Self::UserRoleUpdate,
            other => {
                return Err(UnknownVariant {
                    kind: "activity action",
                    value: other.to_string(),
                })
            }
        };

        Ok(action)
    }
}
