use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, UnknownVariant};

/// Where a single issued token is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
    #[default]
    Pending,
    Serving,
    Completed,
    Cancelled,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Serving => "Serving",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Serving" => Ok(Self::Serving),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownVariant::new("token status", other)),
        }
    }
}

/// The mutable part of a token record: its status and lifecycle timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStamps {
    pub status: TokenStatus,
    pub issued_at: DateTime<Utc>,
    pub served_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TokenStamps {
    pub fn issued(now: DateTime<Utc>) -> Self {
        Self {
            status: TokenStatus::Pending,
            issued_at: now,
            served_at: None,
            completed_at: None,
        }
    }

    /// Returns the stamps after moving to `target`, or `None` if nothing changes.
    ///
    /// Cancelled tokens are left alone, the pointer never resurrects them.
    pub fn moved_to(&self, target: TokenStatus, now: DateTime<Utc>) -> Option<Self> {
        if self.status == TokenStatus::Cancelled || self.status == target {
            return None;
        }

        let moved = match target {
            TokenStatus::Pending => Self {
                status: target,
                served_at: None,
                completed_at: None,
                ..*self
            },
            TokenStatus::Serving => Self {
                status: target,
                served_at: Some(now),
                completed_at: None,
                ..*self
            },
            TokenStatus::Completed => Self {
                status: target,
                completed_at: Some(now),
                ..*self
            },
            TokenStatus::Cancelled => Self {
                status: target,
                ..*self
            },
        };

        Some(moved)
    }

    /// Cancels a token that is still waiting.
    pub fn cancel(&self) -> Result<Self, LedgerError> {
        if self.status != TokenStatus::Pending {
            return Err(LedgerError::NotPending {
                status: self.status,
            });
        }

        Ok(Self {
            status: TokenStatus::Cancelled,
            ..*self
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn serving_then_completed_keeps_served_at() {
        let issued_at = Utc::now();
        let served_at = issued_at + Duration::minutes(3);
        let completed_at = served_at + Duration::minutes(7);

        let serving = TokenStamps::issued(issued_at)
            .moved_to(TokenStatus::Serving, served_at)
            .unwrap();
        let completed = serving
            .moved_to(TokenStatus::Completed, completed_at)
            .unwrap();

        assert_eq!(completed.status, TokenStatus::Completed);
        assert_eq!(completed.served_at, Some(served_at));
        assert_eq!(completed.completed_at, Some(completed_at));
    }

    #[test]
    fn moving_back_to_pending_clears_timestamps() {
        let now = Utc::now();
        let serving = TokenStamps::issued(now)
            .moved_to(TokenStatus::Serving, now)
            .unwrap();

        let pending = serving.moved_to(TokenStatus::Pending, now).unwrap();

        assert_eq!(pending.status, TokenStatus::Pending);
        assert_eq!(pending.served_at, None);
        assert_eq!(pending.completed_at, None);
    }

    #[test]
    fn cancelled_tokens_are_never_moved() {
        let now = Utc::now();
        let cancelled = TokenStamps::issued(now).cancel().unwrap();

        assert_eq!(cancelled.moved_to(TokenStatus::Serving, now), None);
        assert_eq!(cancelled.moved_to(TokenStatus::Completed, now), None);
    }

    #[test]
    fn only_pending_tokens_can_be_cancelled() {
        let now = Utc::now();
        let serving = TokenStamps::issued(now)
            .moved_to(TokenStatus::Serving, now)
            .unwrap();

        assert_eq!(
            serving.cancel(),
            Err(LedgerError::NotPending {
                status: TokenStatus::Serving
            })
        );
    }
}
