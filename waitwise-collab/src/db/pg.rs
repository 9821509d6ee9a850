use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool};
use waitwise_core::{Coordinates, Ledger, TokenStamps, TokenStatus, UnknownVariant};

use crate::{
    ActivityLogData, Database, DatabaseError, DatabaseResult, DepartmentData, IntoDatabaseError,
    LedgerCommit, NewActivity, NewDepartment, NewOffice, NewSession, NewUser, OfficeData,
    PrimaryKey, QueueTokenData, Result, SessionData, UpdatedDepartment, UpdatedUser,
    UserData,
};

/// A postgres database implementation for WaitWise
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connects to the database and applies pending migrations
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    password: String,
    role: String,
    department_id: Option<i32>,
    office_id: Option<i32>,
    phone: Option<String>,
    bookmarks: Vec<i32>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SessionRow {
    id: i32,
    token: String,
    user_id: i32,
    expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OfficeRow {
    id: i32,
    name: String,
    address: String,
    lat: f64,
    lng: f64,
    kind: String,
    admin_id: Option<i32>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct DepartmentRow {
    id: i32,
    office_id: i32,
    name: String,
    avg_wait_time_per_token: i32,
    current_token: i32,
    total_tokens: i32,
    is_paused: bool,
    crowd_level: String,
    last_updated: DateTime<Utc>,
}

#[derive(FromRow)]
struct QueueTokenRow {
    id: i32,
    department_id: i32,
    user_id: Option<i32>,
    token_number: i32,
    status: String,
    issued_at: DateTime<Utc>,
    served_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct ActivityRow {
    id: i32,
    user_id: i32,
    action: String,
    department_id: Option<i32>,
    office_id: Option<i32>,
    details: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserData {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password: row.password,
            role: row.role.parse().map_err(|e: UnknownVariant| e.any())?,
            department_id: row.department_id,
            office_id: row.office_id,
            phone: row.phone,
            bookmarks: row.bookmarks,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<OfficeRow> for OfficeData {
    type Error = DatabaseError;

    fn try_from(row: OfficeRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            address: row.address,
            location: Coordinates::new(row.lat, row.lng),
            kind: row.kind.parse().map_err(|e: UnknownVariant| e.any())?,
            admin_id: row.admin_id,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<DepartmentRow> for DepartmentData {
    type Error = DatabaseError;

    fn try_from(row: DepartmentRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            office_id: row.office_id,
            name: row.name,
            avg_wait_time_per_token: from_column(row.avg_wait_time_per_token)?,
            ledger: Ledger {
                current_token: from_column(row.current_token)?,
                total_tokens: from_column(row.total_tokens)?,
                is_paused: row.is_paused,
                crowd_level: row.crowd_level.parse().map_err(|e: UnknownVariant| e.any())?,
                last_updated: row.last_updated,
            },
        })
    }
}

impl TryFrom<QueueTokenRow> for QueueTokenData {
    type Error = DatabaseError;

    fn try_from(row: QueueTokenRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            department_id: row.department_id,
            user_id: row.user_id,
            token_number: from_column(row.token_number)?,
            stamps: TokenStamps {
                status: row.status.parse().map_err(|e: UnknownVariant| e.any())?,
                issued_at: row.issued_at,
                served_at: row.served_at,
                completed_at: row.completed_at,
            },
        })
    }
}

impl TryFrom<ActivityRow> for ActivityLogData {
    type Error = DatabaseError;

    fn try_from(row: ActivityRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            action: row.action.parse().map_err(|e: UnknownVariant| e.any())?,
            department_id: row.department_id,
            office_id: row.office_id,
            details: row.details,
            timestamp: row.timestamp,
        })
    }
}

/// Converts every row, failing on the first one that doesn't parse
fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))?
            .try_into()
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "email"))?
            .try_into()
    }

    async fn list_users(&self) -> Result<Vec<UserData>> {
        let rows = query_as::<_, UserRow>("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        // A signup racing this one can still win between the check and the insert
        query_as::<_, UserRow>(
            "INSERT INTO users (name, email, password, role) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(new_user.name)
        .bind(&new_user.email)
        .bind(new_user.password)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_any(e, "user", "email", &new_user.email))?
        .try_into()
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let user = self.user_by_id(updated_user.id).await?;

        let (role, department_id, office_id) = match updated_user.assignment {
            Some(a) => (a.role, a.department_id, a.office_id),
            None => (user.role, user.department_id, user.office_id),
        };

        query(
            "UPDATE users SET
                name = $1,
                phone = $2,
                bookmarks = $3,
                role = $4,
                department_id = $5,
                office_id = $6
            WHERE id = $7",
        )
        .bind(updated_user.name.unwrap_or(user.name))
        .bind(updated_user.phone.or(user.phone))
        .bind(updated_user.bookmarks.unwrap_or(user.bookmarks))
        .bind(role.as_str())
        .bind(department_id)
        .bind(office_id)
        .bind(updated_user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.user_by_id(updated_user.id).await
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = query_as::<_, SessionRow>("SELECT * FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: self.user_by_id(row.user_id).await?,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE now() > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn office_by_id(&self, office_id: PrimaryKey) -> Result<OfficeData> {
        query_as::<_, OfficeRow>("SELECT * FROM offices WHERE id = $1")
            .bind(office_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("office", "id"))?
            .try_into()
    }

    async fn list_offices(&self) -> Result<Vec<OfficeData>> {
        let rows = query_as::<_, OfficeRow>("SELECT * FROM offices ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn create_office(&self, new_office: NewOffice) -> Result<OfficeData> {
        query_as::<_, OfficeRow>(
            "INSERT INTO offices (name, address, lat, lng, kind, admin_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *",
        )
        .bind(new_office.name)
        .bind(new_office.address)
        .bind(new_office.location.lat)
        .bind(new_office.location.lng)
        .bind(new_office.kind.as_str())
        .bind(new_office.admin_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn department_by_id(&self, department_id: PrimaryKey) -> Result<DepartmentData> {
        query_as::<_, DepartmentRow>("SELECT * FROM departments WHERE id = $1")
            .bind(department_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("department", "id"))?
            .try_into()
    }

    async fn list_departments(&self, office_id: PrimaryKey) -> Result<Vec<DepartmentData>> {
        let rows = query_as::<_, DepartmentRow>(
            "SELECT * FROM departments WHERE office_id = $1 ORDER BY id",
        )
        .bind(office_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn create_department(&self, new_department: NewDepartment) -> Result<DepartmentData> {
        // Ensure office exists
        let _ = self.office_by_id(new_department.office_id).await?;

        query_as::<_, DepartmentRow>(
            "INSERT INTO departments (office_id, name, avg_wait_time_per_token)
            VALUES ($1, $2, $3)
            RETURNING *",
        )
        .bind(new_department.office_id)
        .bind(new_department.name)
        .bind(to_column(new_department.avg_wait_time_per_token)?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn update_department(
        &self,
        updated_department: UpdatedDepartment,
    ) -> Result<DepartmentData> {
        let department = self.department_by_id(updated_department.id).await?;

        query("UPDATE departments SET name = $1, avg_wait_time_per_token = $2 WHERE id = $3")
            .bind(updated_department.name.unwrap_or(department.name))
            .bind(to_column(
                updated_department
                    .avg_wait_time_per_token
                    .unwrap_or(department.avg_wait_time_per_token),
            )?)
            .bind(updated_department.id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.department_by_id(updated_department.id).await
    }

    async fn delete_department(&self, department_id: PrimaryKey) -> Result<()> {
        // Ensure department exists
        let _ = self.department_by_id(department_id).await?;

        // Tokens go with it through the foreign key cascade
        query("DELETE FROM departments WHERE id = $1")
            .bind(department_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn token_by_number(
        &self,
        department_id: PrimaryKey,
        token_number: u32,
    ) -> Result<QueueTokenData> {
        query_as::<_, QueueTokenRow>(
            "SELECT * FROM queue_tokens WHERE department_id = $1 AND token_number = $2",
        )
        .bind(department_id)
        .bind(to_column(token_number)?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("queue token", "department_id:token_number"))?
        .try_into()
    }

    async fn tokens_in_range(
        &self,
        department_id: PrimaryKey,
        low: u32,
        high: u32,
    ) -> Result<Vec<QueueTokenData>> {
        // Numbers past the column's range can't exist, so the bounds are clamped
        let low = i32::try_from(low).unwrap_or(i32::MAX);
        let high = i32::try_from(high).unwrap_or(i32::MAX);

        let rows = query_as::<_, QueueTokenRow>(
            "SELECT * FROM queue_tokens
            WHERE department_id = $1 AND token_number BETWEEN $2 AND $3
            ORDER BY token_number",
        )
        .bind(department_id)
        .bind(low)
        .bind(high)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn list_tokens(&self, department_id: PrimaryKey) -> Result<Vec<QueueTokenData>> {
        self.tokens_in_range(department_id, 0, u32::MAX).await
    }

    async fn list_tokens_by_user(&self, user_id: PrimaryKey) -> Result<Vec<QueueTokenData>> {
        let rows = query_as::<_, QueueTokenRow>(
            "SELECT * FROM queue_tokens WHERE user_id = $1 ORDER BY issued_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn cancelled_token_numbers(
        &self,
        department_id: PrimaryKey,
        low: u32,
        high: u32,
    ) -> Result<Vec<u32>> {
        let low = i32::try_from(low).unwrap_or(i32::MAX);
        let high = i32::try_from(high).unwrap_or(i32::MAX);

        let numbers: Vec<i32> = sqlx::query_scalar(
            "SELECT token_number FROM queue_tokens
            WHERE department_id = $1 AND status = $2 AND token_number BETWEEN $3 AND $4
            ORDER BY token_number",
        )
        .bind(department_id)
        .bind(TokenStatus::Cancelled.as_str())
        .bind(low)
        .bind(high)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        numbers.into_iter().map(from_column).collect()
    }

    async fn commit_ledger(&self, commit: LedgerCommit) -> Result<DepartmentData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;
        let ledger = commit.ledger;
        let expected = commit.expected;

        let updated = query(
            "UPDATE departments SET
                current_token = $1,
                total_tokens = $2,
                is_paused = $3,
                crowd_level = $4,
                last_updated = $5
            WHERE id = $6 AND current_token = $7 AND total_tokens = $8 AND is_paused = $9",
        )
        .bind(to_column(ledger.current_token)?)
        .bind(to_column(ledger.total_tokens)?)
        .bind(ledger.is_paused)
        .bind(ledger.crowd_level.as_str())
        .bind(ledger.last_updated)
        .bind(commit.department_id)
        .bind(to_column(expected.current_token)?)
        .bind(to_column(expected.total_tokens)?)
        .bind(expected.is_paused)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        if updated.rows_affected() == 0 {
            // Either the department is gone or someone else got there first
            let _ = self.department_by_id(commit.department_id).await?;

            return Err(DatabaseError::StaleLedger {
                department_id: commit.department_id,
            });
        }

        if let Some(new_token) = commit.new_token {
            query(
                "INSERT INTO queue_tokens (department_id, user_id, token_number, status, issued_at)
                VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(commit.department_id)
            .bind(new_token.user_id)
            .bind(to_column(new_token.token_number)?)
            .bind(TokenStamps::issued(new_token.issued_at).status.as_str())
            .bind(new_token.issued_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                conflict_or_any(
                    e,
                    "queue token",
                    "token_number",
                    &new_token.token_number.to_string(),
                )
            })?;
        }

        for update in commit.token_updates {
            let result = query(
                "UPDATE queue_tokens SET status = $1, served_at = $2, completed_at = $3
                WHERE id = $4 AND department_id = $5",
            )
            .bind(update.stamps.status.as_str())
            .bind(update.stamps.served_at)
            .bind(update.stamps.completed_at)
            .bind(update.id)
            .bind(commit.department_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

            if result.rows_affected() == 0 {
                return Err(DatabaseError::NotFound {
                    resource: "queue token",
                    identifier: "id",
                });
            }
        }

        tx.commit().await.map_err(|e| e.any())?;

        self.department_by_id(commit.department_id).await
    }

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityLogData> {
        query_as::<_, ActivityRow>(
            "INSERT INTO activity_logs (user_id, action, department_id, office_id, details)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *",
        )
        .bind(new_activity.user_id)
        .bind(new_activity.action.as_str())
        .bind(new_activity.department_id)
        .bind(new_activity.office_id)
        .bind(new_activity.details)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn list_activity(&self, department_id: PrimaryKey) -> Result<Vec<ActivityLogData>> {
        let rows = query_as::<_, ActivityRow>(
            "SELECT * FROM activity_logs WHERE department_id = $1 ORDER BY timestamp DESC",
        )
        .bind(department_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        convert_all(rows)
    }
}

/// Postgres error code for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

/// Turns a unique constraint violation into [DatabaseError::Conflict]
fn conflict_or_any(
    error: SqlxError,
    resource: &'static str,
    field: &'static str,
    value: &str,
) -> DatabaseError {
    match &error {
        SqlxError::Database(e) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }
        }
        _ => error.any(),
    }
}

/// Counters and token numbers are stored in `INTEGER` columns
fn to_column(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|e| DatabaseError::Internal(Box::new(e)))
}

fn from_column(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|e| DatabaseError::Internal(Box::new(e)))
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}

impl IntoDatabaseError for UnknownVariant {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, _resource: &'static str, _identifier: &'static str) -> DatabaseError {
        self.any()
    }
}

#[cfg(test)]
mod tests {
    use waitwise_core::Role;

    use super::*;
    use crate::{util::session_token, NewQueueToken, OfficeKind};

    const TEST_DATABASE_VAR: &str = "WAITWISE_TEST_DATABASE_URL";

    async fn database() -> PgDatabase {
        let url = std::env::var(TEST_DATABASE_VAR).unwrap();
        PgDatabase::new(&url).await.unwrap()
    }

    async fn department(db: &PgDatabase) -> DepartmentData {
        let office = db
            .create_office(NewOffice {
                name: "Bank".to_string(),
                address: "Main Street".to_string(),
                location: Coordinates::new(0., 0.),
                kind: OfficeKind::Bank,
                admin_id: None,
            })
            .await
            .unwrap();

        db.create_department(NewDepartment {
            office_id: office.id,
            name: "Loans".to_string(),
            avg_wait_time_per_token: 5,
        })
        .await
        .unwrap()
    }

    fn join(department: &DepartmentData) -> LedgerCommit {
        let mut ledger = department.ledger;
        let token_number = ledger.issue(Utc::now(), false).unwrap();

        LedgerCommit {
            department_id: department.id,
            expected: department.ledger,
            ledger,
            new_token: Some(NewQueueToken {
                user_id: None,
                token_number,
                issued_at: Utc::now(),
            }),
            token_updates: vec![],
        }
    }

    #[test]
    fn counters_outside_the_column_range_are_errors() {
        assert_eq!(to_column(7).unwrap(), 7);
        assert!(to_column(u32::MAX).is_err());
        assert!(to_column(i32::MAX as u32 + 1).is_err());

        assert_eq!(from_column(7).unwrap(), 7);
        assert!(from_column(-1).is_err());
    }

    #[tokio::test]
    #[ignore = "needs a postgres database in WAITWISE_TEST_DATABASE_URL"]
    async fn stale_commits_roll_back() {
        let db = database().await;
        let department = department(&db).await;

        let first = join(&department);
        let second = join(&department);

        let committed = db.commit_ledger(first).await.unwrap();
        assert_eq!(committed.ledger.total_tokens, 1);

        let result = db.commit_ledger(second).await;
        assert!(matches!(result, Err(DatabaseError::StaleLedger { .. })));

        let stored = db.department_by_id(department.id).await.unwrap();
        assert_eq!(stored.ledger.total_tokens, 1);
        assert_eq!(db.list_tokens(department.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "needs a postgres database in WAITWISE_TEST_DATABASE_URL"]
    async fn commits_on_missing_departments_are_not_found() {
        let db = database().await;
        let department = department(&db).await;
        let commit = join(&department);

        db.delete_department(department.id).await.unwrap();

        let result = db.commit_ledger(commit).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    #[ignore = "needs a postgres database in WAITWISE_TEST_DATABASE_URL"]
    async fn racing_signups_conflict() {
        let db = database().await;
        let email = format!("{}@example.com", session_token());

        let new_user = || NewUser {
            name: "Alice".to_string(),
            email: email.clone(),
            password: "hash".to_string(),
            role: Role::User,
        };

        let (a, b) = tokio::join!(db.create_user(new_user()), db.create_user(new_user()));
        let results = [a, b];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(DatabaseError::Conflict { .. }))));
    }
}
