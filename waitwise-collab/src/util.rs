use rand::{distributions::Alphanumeric, Rng};

/// Length of the opaque token handed out on login
pub const SESSION_TOKEN_LENGTH: usize = 32;

/// Generates a fresh alphanumeric session token.
pub fn session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
