use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use log::info;
use rand::rngs::OsRng;
use thiserror::Error;
use waitwise_core::{authorize, Action, Actor, PolicyError, Resource, Role};

use crate::{
    util::session_token, ActivityAction, CollabContext, DatabaseError, NewSession, NewUser,
    PrimaryKey, RoleAssignment, SessionData, UpdatedUser, UserData,
};

pub struct Auth {
    context: CollabContext,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The session is unknown or expired
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("A super admin already exists")]
    SuperuserExists,
    #[error("A department admin must be assigned to a department")]
    MissingDepartment,
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl Auth {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
            argon: Argon2::default(),
        }
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await?;

        let user = self
            .context
            .database
            .user_by_email(&credentials.email)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        self.start_session(user.id).await
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.context.database.delete_session_by_token(token).await
    }

    /// Creates a basic user and logs them in
    pub async fn signup(&self, new_user: NewPlainUser) -> Result<SessionData, AuthError> {
        let user = self.create_user(new_user, Role::User).await?;
        info!("User {} signed up", user.id);

        self.start_session(user.id).await
    }

    /// Creates a super admin, if one doesn't already exist
    pub async fn register_superuser(&self, new_user: NewPlainUser) -> Result<UserData, AuthError> {
        let has_superuser = self
            .context
            .database
            .list_users()
            .await
            .map_err(AuthError::Db)?
            .iter()
            .any(|u| u.role == Role::SuperAdmin);

        if has_superuser {
            return Err(AuthError::SuperuserExists);
        }

        self.create_user(new_user, Role::SuperAdmin).await
    }

    /// Returns a session if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<SessionData, AuthError> {
        let session = self
            .context
            .database
            .session_by_token(token)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::Unauthenticated,
                err => AuthError::Db(err),
            })?;

        if session.expires_at <= Utc::now() {
            return Err(AuthError::Unauthenticated);
        }

        Ok(session)
    }

    /// Updates the name and phone of a user
    pub async fn update_profile(
        &self,
        user_id: PrimaryKey,
        profile: ProfileUpdate,
    ) -> Result<UserData, DatabaseError> {
        self.context
            .database
            .update_user(UpdatedUser {
                id: user_id,
                name: profile.name,
                phone: profile.phone,
                ..Default::default()
            })
            .await
    }

    /// Adds the office to the user's bookmarks, or removes it if it's already there
    pub async fn toggle_bookmark(
        &self,
        user_id: PrimaryKey,
        office_id: PrimaryKey,
    ) -> Result<UserData, DatabaseError> {
        // Ensure office exists
        let _ = self.context.database.office_by_id(office_id).await?;
        let user = self.context.database.user_by_id(user_id).await?;

        let mut bookmarks = user.bookmarks;
        match bookmarks.iter().position(|id| *id == office_id) {
            Some(index) => {
                bookmarks.remove(index);
            }
            None => bookmarks.push(office_id),
        }

        self.context
            .database
            .update_user(UpdatedUser {
                id: user_id,
                bookmarks: Some(bookmarks),
                ..Default::default()
            })
            .await
    }

    /// Changes the role of a user, along with the department and office it applies to
    pub async fn update_role(&self, actor: &Actor, update: RoleUpdate) -> Result<UserData, AuthError> {
        authorize(actor, Action::UpdateRole, Resource::Global)?;

        let database = &self.context.database;

        let assignment = match update.role {
            Role::DeptAdmin => {
                let department_id = update.department_id.ok_or(AuthError::MissingDepartment)?;
                let department = database
                    .department_by_id(department_id)
                    .await
                    .map_err(AuthError::Db)?;

                RoleAssignment {
                    role: Role::DeptAdmin,
                    department_id: Some(department.id),
                    office_id: Some(update.office_id.unwrap_or(department.office_id)),
                }
            }
            Role::SuperAdmin => RoleAssignment {
                role: Role::SuperAdmin,
                department_id: None,
                office_id: update.office_id,
            },
            Role::User => RoleAssignment {
                role: Role::User,
                department_id: None,
                office_id: None,
            },
        };

        let user = database
            .update_user(UpdatedUser {
                id: update.user_id,
                assignment: Some(assignment),
                ..Default::default()
            })
            .await
            .map_err(AuthError::Db)?;

        self.context
            .record(
                actor,
                ActivityAction::UserRoleUpdate,
                assignment.department_id,
                assignment.office_id,
                format!("Set role of {} to {}", user.email, user.role),
            )
            .await;

        Ok(user)
    }

    /// Lists every account
    pub async fn list_users(&self, actor: &Actor) -> Result<Vec<UserData>, AuthError> {
        authorize(actor, Action::ListUsers, Resource::Global)?;

        self.context.database.list_users().await.map_err(AuthError::Db)
    }

    async fn start_session(&self, user_id: PrimaryKey) -> Result<SessionData, AuthError> {
        let expires_at =
            Utc::now() + Duration::days(self.context.config.session_duration_in_days);

        let new_session = NewSession {
            token: session_token(),
            user_id,
            expires_at,
        };

        self.context
            .database
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }

    async fn create_user(&self, new_user: NewPlainUser, role: Role) -> Result<UserData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        self.context
            .database
            .create_user(NewUser {
                name: new_user.name,
                email: new_user.email,
                password: hashed_password,
                role,
            })
            .await
            .map_err(AuthError::Db)
    }

    async fn clear_expired(&self) -> Result<(), AuthError> {
        self.context
            .database
            .clear_expired_sessions()
            .await
            .map_err(AuthError::Db)
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewPlainUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug)]
pub struct RoleUpdate {
    pub user_id: PrimaryKey,
    pub role: Role,
    pub department_id: Option<PrimaryKey>,
    pub office_id: Option<PrimaryKey>,
}
