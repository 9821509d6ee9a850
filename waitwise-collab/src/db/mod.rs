use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use waitwise_core::{Coordinates, Ledger, Role, TokenStamps};

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type ArcedDatabase = std::sync::Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// The stored ledger changed between reading and committing
    #[error("Department {department_id} was modified concurrently")]
    StaleLedger { department_id: PrimaryKey },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can store and fetch WaitWise data
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_email(&self, email: &str) -> Result<UserData>;
    async fn list_users(&self) -> Result<Vec<UserData>>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn office_by_id(&self, office_id: PrimaryKey) -> Result<OfficeData>;
    async fn list_offices(&self) -> Result<Vec<OfficeData>>;
    async fn create_office(&self, new_office: NewOffice) -> Result<OfficeData>;

    async fn department_by_id(&self, department_id: PrimaryKey) -> Result<DepartmentData>;
    async fn list_departments(&self, office_id: PrimaryKey) -> Result<Vec<DepartmentData>>;
    async fn create_department(&self, new_department: NewDepartment) -> Result<DepartmentData>;
    async fn update_department(
        &self,
        updated_department: UpdatedDepartment,
    ) -> Result<DepartmentData>;
    /// Deletes a department along with all of its tokens
    async fn delete_department(&self, department_id: PrimaryKey) -> Result<()>;

    async fn token_by_number(
        &self,
        department_id: PrimaryKey,
        token_number: u32,
    ) -> Result<QueueTokenData>;
    /// Tokens numbered `low..=high`, ordered by number
    async fn tokens_in_range(
        &self,
        department_id: PrimaryKey,
        low: u32,
        high: u32,
    ) -> Result<Vec<QueueTokenData>>;
    async fn list_tokens(&self, department_id: PrimaryKey) -> Result<Vec<QueueTokenData>>;
    /// Every token a user holds across departments, newest first
    async fn list_tokens_by_user(&self, user_id: PrimaryKey) -> Result<Vec<QueueTokenData>>;
    /// Numbers of the cancelled tokens in `low..=high`
    async fn cancelled_token_numbers(
        &self,
        department_id: PrimaryKey,
        low: u32,
        high: u32,
    ) -> Result<Vec<u32>>;

    /// Atomically writes a new ledger state together with its token changes.
    ///
    /// Fails with [DatabaseError::StaleLedger] if the stored counters no longer
    /// match [LedgerCommit::expected].
    async fn commit_ledger(&self, commit: LedgerCommit) -> Result<DepartmentData>;

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityLogData>;
    async fn list_activity(&self, department_id: PrimaryKey) -> Result<Vec<ActivityLogData>>;
}

#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub bookmarks: Option<Vec<PrimaryKey>>,
    pub assignment: Option<RoleAssignment>,
}

/// A role along with the office and department it applies to
#[derive(Debug, Clone, Copy)]
pub struct RoleAssignment {
    pub role: Role,
    pub department_id: Option<PrimaryKey>,
    pub office_id: Option<PrimaryKey>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewOffice {
    pub name: String,
    pub address: String,
    pub location: Coordinates,
    pub kind: OfficeKind,
    pub admin_id: Option<PrimaryKey>,
}

#[derive(Debug)]
pub struct NewDepartment {
    pub office_id: PrimaryKey,
    pub name: String,
    pub avg_wait_time_per_token: u32,
}

#[derive(Debug, Default)]
pub struct UpdatedDepartment {
    pub id: PrimaryKey,
    pub name: Option<String>,
    pub avg_wait_time_per_token: Option<u32>,
}

#[derive(Debug)]
pub struct NewQueueToken {
    pub user_id: Option<PrimaryKey>,
    pub token_number: u32,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenUpdate {
    pub id: PrimaryKey,
    pub stamps: TokenStamps,
}

/// Everything a single queue operation writes
#[derive(Debug)]
pub struct LedgerCommit {
    pub department_id: PrimaryKey,
    /// The ledger as it was read before the operation
    pub expected: Ledger,
    pub ledger: Ledger,
    pub new_token: Option<NewQueueToken>,
    pub token_updates: Vec<TokenUpdate>,
}

#[derive(Debug)]
pub struct NewActivity {
    pub user_id: PrimaryKey,
    pub action: ActivityAction,
    pub department_id: Option<PrimaryKey>,
    pub office_id: Option<PrimaryKey>,
    pub details: String,
}

/// Whether two ledgers agree on the counters a commit depends on
pub(crate) fn same_counters(a: &Ledger, b: &Ledger) -> bool {
    a.current_token == b.current_token
        && a.total_tokens == b.total_tokens
        && a.is_paused == b.is_paused
}
