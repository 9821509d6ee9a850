use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Path, State},
    http::{header, request::Parts},
    routing::{get, post, put},
    Json,
};
use waitwise_collab::{Credentials, NewPlainUser, PrimaryKey, ProfileUpdate, RoleUpdate, SessionData};
use waitwise_core::{Actor, Role};

use crate::{
    errors::{ServerError, ServerResult},
    schemas::{LoginSchema, ProfileSchema, SignupSchema, UpdateRoleSchema, ValidatedJson},
    serialized::{LoginResult, Message, QueueToken, ToSerialized, User},
    Router, ServerContext,
};

/// The header clients put their session token in
pub const TOKEN_HEADER: &str = "x-auth-token";

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// The policy view of the logged in user
    pub fn actor(&self) -> Actor {
        self.0.user.actor()
    }

    pub fn user_id(&self) -> PrimaryKey {
        self.0.user.id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    ServerContext: FromRef<S>,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);
        let token = token_from_parts(parts)?;

        let session = context.collab.auth.session(&token).await?;

        Ok(Self(session))
    }
}

/// Reads the session token from `x-auth-token`, or a bearer authorization header
fn token_from_parts(parts: &Parts) -> ServerResult<String> {
    if let Some(token) = parts.headers.get(TOKEN_HEADER) {
        return token
            .to_str()
            .map(|t| t.trim().to_string())
            .map_err(|_| ServerError::Unauthorized("Token is not valid"));
    }

    let authorization = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|x| x.to_str().ok())
        .ok_or(ServerError::Unauthorized("No token, authorization denied"))?;

    let parts: Vec<_> = authorization.split_ascii_whitespace().collect();

    match parts.as_slice() {
        ["Bearer", token] => Ok(token.to_string()),
        _ => Err(ServerError::Unauthorized("Authorization must be Bearer")),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "auth",
    request_body = SignupSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 409, description = "Email is taken")
    )
)]
async fn signup(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SignupSchema>,
) -> ServerResult<Json<LoginResult>> {
    let session = context
        .collab
        .auth
        .signup(NewPlainUser {
            name: body.name,
            email: body.email.to_lowercase(),
            password: body.password,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 400, description = "Invalid credentials")
    )
)]
async fn login(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<LoginSchema>,
) -> ServerResult<Json<LoginResult>> {
    let session = context
        .collab
        .auth
        .login(Credentials {
            email: body.email.to_lowercase(),
            password: body.password,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    security(("TokenAuth" = [])),
    responses((status = 200, body = Message))
)]
async fn logout(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Message>> {
    context.collab.auth.logout(&session.0.token).await?;

    Ok(Json(Message::new("Logged out")))
}

#[utoipa::path(
    get,
    path = "/api/auth/user",
    tag = "auth",
    security(("TokenAuth" = [])),
    responses((status = 200, body = User))
)]
async fn user(session: Session) -> Json<User> {
    Json(session.0.user.to_serialized())
}

#[utoipa::path(
    put,
    path = "/api/auth/profile",
    tag = "auth",
    request_body = ProfileSchema,
    security(("TokenAuth" = [])),
    responses((status = 200, body = User))
)]
async fn update_profile(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<ProfileSchema>,
) -> ServerResult<Json<User>> {
    let user = context
        .collab
        .auth
        .update_profile(
            session.user_id(),
            ProfileUpdate {
                name: body.name,
                phone: body.phone,
            },
        )
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/api/auth/bookmark/{id}",
    tag = "auth",
    params(("id" = i32, Path, description = "Office id")),
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = User),
        (status = 404, description = "Office not found")
    )
)]
async fn toggle_bookmark(
    session: Session,
    State(context): State<ServerContext>,
    Path(office_id): Path<PrimaryKey>,
) -> ServerResult<Json<User>> {
    let user = context
        .collab
        .auth
        .toggle_bookmark(session.user_id(), office_id)
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/api/auth/update-role",
    tag = "auth",
    request_body = UpdateRoleSchema,
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = User),
        (status = 403, description = "Only super admins may change roles")
    )
)]
async fn update_role(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<UpdateRoleSchema>,
) -> ServerResult<Json<User>> {
    let role: Role = body
        .role
        .parse()
        .map_err(|e: waitwise_core::UnknownVariant| ServerError::InvalidBody(e.to_string()))?;

    let user = context
        .collab
        .auth
        .update_role(
            &session.actor(),
            RoleUpdate {
                user_id: body.user_id,
                role,
                department_id: body.department_id,
                office_id: body.office_id,
            },
        )
        .await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/auth/users",
    tag = "auth",
    security(("TokenAuth" = [])),
    responses(
        (status = 200, body = Vec<User>),
        (status = 403, description = "Only super admins may list users")
    )
)]
async fn users(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<User>>> {
    let users = context.collab.auth.list_users(&session.actor()).await?;

    Ok(Json(users.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/api/auth/tokens",
    tag = "auth",
    security(("TokenAuth" = [])),
    responses(
        (status = 200, description = "Tokens taken by the user, newest first", body = Vec<QueueToken>),
        (status = 401, description = "Not logged in")
    )
)]
async fn tokens(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<QueueToken>>> {
    let tokens = context.collab.queues.tokens_of(&session.actor()).await?;

    Ok(Json(tokens.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user", get(user))
        .route("/profile", put(update_profile))
        .route("/bookmark/:id", post(toggle_bookmark))
        .route("/update-role", put(update_role))
        .route("/users", get(users))
        .route("/tokens", get(tokens))
}
