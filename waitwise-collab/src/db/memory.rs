use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use waitwise_core::{Ledger, TokenStamps, TokenStatus};

use crate::{
    same_counters, ActivityLogData, Database, DatabaseError, DatabaseResult, DepartmentData,
    LedgerCommit, NewActivity, NewDepartment, NewOffice, NewSession, NewUser, OfficeData,
    PrimaryKey, QueueTokenData, Result, SessionData, TokenUpdate, UpdatedDepartment, UpdatedUser,
    UserData,
};

/// A database kept entirely in memory.
///
/// Used by tests, and when no postgres url is configured.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_id: PrimaryKey,
    users: Vec<UserData>,
    sessions: Vec<StoredSession>,
    offices: Vec<OfficeData>,
    departments: Vec<DepartmentData>,
    tokens: Vec<QueueTokenData>,
    activity: Vec<ActivityLogData>,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<&UserData> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    fn department_mut(&mut self, department_id: PrimaryKey) -> Result<&mut DepartmentData> {
        self.departments
            .iter_mut()
            .find(|d| d.id == department_id)
            .ok_or(DatabaseError::NotFound {
                resource: "department",
                identifier: "id",
            })
    }

    fn session(&self, token: &str) -> Result<SessionData> {
        let session = self
            .sessions
            .iter()
            .find(|s| s.token == token)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        Ok(SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user: self.user(session.user_id)?.clone(),
        })
    }

    fn apply_token_update(&mut self, update: TokenUpdate) -> Result<QueueTokenData> {
        let token = self
            .tokens
            .iter_mut()
            .find(|t| t.id == update.id)
            .ok_or(DatabaseError::NotFound {
                resource: "queue token",
                identifier: "id",
            })?;

        token.stamps = update.stamps;
        Ok(token.clone())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state.lock().user(user_id).cloned()
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "email",
            })
    }

    async fn list_users(&self) -> Result<Vec<UserData>> {
        Ok(self.state.lock().users.clone())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        let mut state = self.state.lock();

        let user = UserData {
            id: state.next_id(),
            name: new_user.name,
            email: new_user.email,
            password: new_user.password,
            role: new_user.role,
            department_id: None,
            office_id: None,
            phone: None,
            bookmarks: vec![],
            created_at: Utc::now(),
        };

        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut state = self.state.lock();

        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == updated_user.id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        if let Some(name) = updated_user.name {
            user.name = name;
        }

        if let Some(phone) = updated_user.phone {
            user.phone = Some(phone);
        }

        if let Some(bookmarks) = updated_user.bookmarks {
            user.bookmarks = bookmarks;
        }

        if let Some(assignment) = updated_user.assignment {
            user.role = assignment.role;
            user.department_id = assignment.department_id;
            user.office_id = assignment.office_id;
        }

        Ok(user.clone())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        self.state.lock().session(token)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();

        state
            .session(&new_session.token)
            .conflict_or_ok("session", "token", &new_session.token)?;

        // Ensure the user exists
        state.user(new_session.user_id)?;

        let id = state.next_id();
        state.sessions.push(StoredSession {
            id,
            token: new_session.token.clone(),
            user_id: new_session.user_id,
            expires_at: new_session.expires_at,
        });

        state.session(&new_session.token)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock();

        // Ensure session exists
        state.session(token)?;

        state.sessions.retain(|s| s.token != token);
        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();

        self.state.lock().sessions.retain(|s| s.expires_at > now);
        Ok(())
    }

    async fn office_by_id(&self, office_id: PrimaryKey) -> Result<OfficeData> {
        self.state
            .lock()
            .offices
            .iter()
            .find(|o| o.id == office_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "office",
                identifier: "id",
            })
    }

    async fn list_offices(&self) -> Result<Vec<OfficeData>> {
        Ok(self.state.lock().offices.clone())
    }

    async fn create_office(&self, new_office: NewOffice) -> Result<OfficeData> {
        let mut state = self.state.lock();

        let office = OfficeData {
            id: state.next_id(),
            name: new_office.name,
            address: new_office.address,
            location: new_office.location,
            kind: new_office.kind,
            admin_id: new_office.admin_id,
            created_at: Utc::now(),
        };

        state.offices.push(office.clone());
        Ok(office)
    }

    async fn department_by_id(&self, department_id: PrimaryKey) -> Result<DepartmentData> {
        self.state
            .lock()
            .department_mut(department_id)
            .map(|d| d.clone())
    }

    async fn list_departments(&self, office_id: PrimaryKey) -> Result<Vec<DepartmentData>> {
        Ok(self
            .state
            .lock()
            .departments
            .iter()
            .filter(|d| d.office_id == office_id)
            .cloned()
            .collect())
    }

    async fn create_department(&self, new_department: NewDepartment) -> Result<DepartmentData> {
        // Ensure office exists
        self.office_by_id(new_department.office_id).await?;

        let mut state = self.state.lock();

        let department = DepartmentData {
            id: state.next_id(),
            office_id: new_department.office_id,
            name: new_department.name,
            avg_wait_time_per_token: new_department.avg_wait_time_per_token,
            ledger: Ledger::new(Utc::now()),
        };

        state.departments.push(department.clone());
        Ok(department)
    }

    async fn update_department(
        &self,
        updated_department: UpdatedDepartment,
    ) -> Result<DepartmentData> {
        let mut state = self.state.lock();
        let department = state.department_mut(updated_department.id)?;

        if let Some(name) = updated_department.name {
            department.name = name;
        }

        if let Some(avg) = updated_department.avg_wait_time_per_token {
            department.avg_wait_time_per_token = avg;
        }

        Ok(department.clone())
    }

    async fn delete_department(&self, department_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        // Ensure department exists
        state.department_mut(department_id)?;

        state.tokens.retain(|t| t.department_id != department_id);
        state.departments.retain(|d| d.id != department_id);

        Ok(())
    }

    async fn token_by_number(
        &self,
        department_id: PrimaryKey,
        token_number: u32,
    ) -> Result<QueueTokenData> {
        self.state
            .lock()
            .tokens
            .iter()
            .find(|t| t.department_id == department_id && t.token_number == token_number)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "queue token",
                identifier: "department_id:token_number",
            })
    }

    async fn tokens_in_range(
        &self,
        department_id: PrimaryKey,
        low: u32,
        high: u32,
    ) -> Result<Vec<QueueTokenData>> {
        let mut tokens: Vec<_> = self
            .state
            .lock()
            .tokens
            .iter()
            .filter(|t| t.department_id == department_id)
            .filter(|t| (low..=high).contains(&t.token_number))
            .cloned()
            .collect();

        tokens.sort_by_key(|t| t.token_number);
        Ok(tokens)
    }

    async fn list_tokens(&self, department_id: PrimaryKey) -> Result<Vec<QueueTokenData>> {
        self.tokens_in_range(department_id, 0, u32::MAX).await
    }

    async fn list_tokens_by_user(&self, user_id: PrimaryKey) -> Result<Vec<QueueTokenData>> {
        let mut tokens: Vec<_> = self
            .state
            .lock()
            .tokens
            .iter()
            .filter(|t| t.user_id == Some(user_id))
            .cloned()
            .collect();

        tokens.sort_by(|a, b| b.stamps.issued_at.cmp(&a.stamps.issued_at).then(b.id.cmp(&a.id)));
        Ok(tokens)
    }

    async fn cancelled_token_numbers(
        &self,
        department_id: PrimaryKey,
        low: u32,
        high: u32,
    ) -> Result<Vec<u32>> {
        let tokens = self.tokens_in_range(department_id, low, high).await?;

        Ok(tokens
            .into_iter()
            .filter(|t| t.status() == TokenStatus::Cancelled)
            .map(|t| t.token_number)
            .collect())
    }

    async fn commit_ledger(&self, commit: LedgerCommit) -> Result<DepartmentData> {
        let mut state = self.state.lock();
        let department = state.department_mut(commit.department_id)?;

        if !same_counters(&department.ledger, &commit.expected) {
            return Err(DatabaseError::StaleLedger {
                department_id: commit.department_id,
            });
        }

        // Validate everything before writing, so a failed commit changes nothing
        if let Some(new_token) = &commit.new_token {
            let exists = state.tokens.iter().any(|t| {
                t.department_id == commit.department_id && t.token_number == new_token.token_number
            });

            if exists {
                return Err(DatabaseError::Conflict {
                    resource: "queue token",
                    field: "token_number",
                    value: new_token.token_number.to_string(),
                });
            }
        }

        for update in &commit.token_updates {
            let belongs = state
                .tokens
                .iter()
                .any(|t| t.id == update.id && t.department_id == commit.department_id);

            if !belongs {
                return Err(DatabaseError::NotFound {
                    resource: "queue token",
                    identifier: "id",
                });
            }
        }

        let department = state.department_mut(commit.department_id)?;
        department.ledger = commit.ledger;
        let department = department.clone();

        if let Some(new_token) = commit.new_token {
            let id = state.next_id();
            state.tokens.push(QueueTokenData {
                id,
                department_id: commit.department_id,
                user_id: new_token.user_id,
                token_number: new_token.token_number,
                stamps: TokenStamps::issued(new_token.issued_at),
            });
        }

        for update in commit.token_updates {
            state.apply_token_update(update)?;
        }

        Ok(department)
    }

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityLogData> {
        let mut state = self.state.lock();

        // Ensure the actor exists
        state.user(new_activity.user_id)?;

        let entry = ActivityLogData {
            id: state.next_id(),
            user_id: new_activity.user_id,
            action: new_activity.action,
            department_id: new_activity.department_id,
            office_id: new_activity.office_id,
            details: new_activity.details,
            timestamp: Utc::now(),
        };

        state.activity.push(entry.clone());
        Ok(entry)
    }

    async fn list_activity(&self, department_id: PrimaryKey) -> Result<Vec<ActivityLogData>> {
        let mut entries: Vec<_> = self
            .state
            .lock()
            .activity
            .iter()
            .filter(|a| a.department_id == Some(department_id))
            .cloned()
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use waitwise_core::{Coordinates, Role, TokenStatus};

    use super::*;
    use crate::{NewQueueToken, OfficeKind};

    async fn department(db: &MemoryDatabase) -> DepartmentData {
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

    #[tokio::test]
    async fn stale_commits_are_rejected() {
        let db = MemoryDatabase::new();
        let department = department(&db).await;

        let first = join(&department);
        let second = join(&department);

        let committed = db.commit_ledger(first).await.unwrap();
        assert_eq!(committed.ledger.total_tokens, 1);

        let result = db.commit_ledger(second).await;
        assert!(matches!(result, Err(DatabaseError::StaleLedger { .. })));

        let tokens = db.list_tokens(department.id).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].status(), TokenStatus::Pending);
    }

    #[tokio::test]
    async fn failed_commits_write_nothing() {
        let db = MemoryDatabase::new();
        let department = department(&db).await;

        let mut commit = join(&department);
        commit.token_updates.push(TokenUpdate {
            id: 999,
            stamps: TokenStamps::issued(Utc::now()),
        });

        let result = db.commit_ledger(commit).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));

        let unchanged = db.department_by_id(department.id).await.unwrap();
        assert_eq!(unchanged.ledger.total_tokens, 0);
        assert!(db.list_tokens(department.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn emails_are_unique() {
        let db = MemoryDatabase::new();
        let new_user = || NewUser {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "hash".to_string(),
            role: Role::User,
        };

        db.create_user(new_user()).await.unwrap();
        let result = db.create_user(new_user()).await;

        assert!(matches!(result, Err(DatabaseError::Conflict { .. })));
    }
}
