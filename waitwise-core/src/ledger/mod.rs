mod crowd;
mod token;

use std::{cmp::Ordering, collections::BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crowd::*;
pub use token::*;

/// The counters of a single department queue.
///
/// `current_token` is the number being served, `total_tokens` the number of
/// tokens ever issued. `0 <= current_token <= total_tokens` holds after every
/// operation, and `total_tokens` never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub current_token: u32,
    pub total_tokens: u32,
    pub is_paused: bool,
    pub crowd_level: CrowdLevel,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("No more tokens in queue")]
    NoMoreTokens,
    #[error("Queue is already at the first token")]
    NothingToRewind,
    #[error("Token {requested} is outside of 0..={total}")]
    OutOfRange { requested: u32, total: u32 },
    #[error("Queue is paused")]
    Paused,
    #[error("Department has run out of token numbers")]
    Exhausted,
    #[error("Token is {status}, only pending tokens can be cancelled")]
    NotPending { status: TokenStatus },
}

/// A movement of the serving pointer from one token number to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerMove {
    pub from: u32,
    pub to: u32,
}

impl Ledger {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_token: 0,
            total_tokens: 0,
            is_paused: false,
            crowd_level: CrowdLevel::Low,
            last_updated: now,
        }
    }

    /// The number of people still waiting
    pub fn pending(&self) -> u32 {
        self.total_tokens.saturating_sub(self.current_token)
    }

    /// Minutes until the last issued token is reached
    pub fn estimated_wait(&self, avg_wait_per_token: u32) -> u32 {
        self.pending().saturating_mul(avg_wait_per_token)
    }

    /// Issues the next token and returns its number.
    pub fn issue(
        &mut self,
        now: DateTime<Utc>,
        reject_when_paused: bool,
    ) -> Result<u32, LedgerError> {
        if reject_when_paused && self.is_paused {
            return Err(LedgerError::Paused);
        }

        self.total_tokens = self
            .total_tokens
            .checked_add(1)
            .ok_or(LedgerError::Exhausted)?;
        self.refresh(now);

        Ok(self.total_tokens)
    }

    /// Moves the pointer to the next issued token that wasn't cancelled.
    pub fn advance(
        &mut self,
        cancelled: &BTreeSet<u32>,
        now: DateTime<Utc>,
    ) -> Result<PointerMove, LedgerError> {
        if self.current_token >= self.total_tokens {
            return Err(LedgerError::NoMoreTokens);
        }

        let next = (self.current_token + 1..=self.total_tokens)
            .find(|number| !cancelled.contains(number))
            .ok_or(LedgerError::NoMoreTokens)?;

        Ok(self.move_to(next, now))
    }

    /// Moves the pointer back to the previous token that wasn't cancelled, or 0.
    pub fn retreat(
        &mut self,
        cancelled: &BTreeSet<u32>,
        now: DateTime<Utc>,
    ) -> Result<PointerMove, LedgerError> {
        if self.current_token == 0 {
            return Err(LedgerError::NothingToRewind);
        }

        let previous = (1..self.current_token)
            .rev()
            .find(|number| !cancelled.contains(number))
            .unwrap_or(0);

        Ok(self.move_to(previous, now))
    }

    /// Moves the pointer to an arbitrary issued token, or 0.
    pub fn set(&mut self, token: u32, now: DateTime<Utc>) -> Result<PointerMove, LedgerError> {
        if token > self.total_tokens {
            return Err(LedgerError::OutOfRange {
                requested: token,
                total: self.total_tokens,
            });
        }

        Ok(self.move_to(token, now))
    }

    /// Flips the pause flag and returns the new value.
    pub fn toggle_pause(&mut self, now: DateTime<Utc>) -> bool {
        self.is_paused = !self.is_paused;
        self.refresh(now);
        self.is_paused
    }

    fn move_to(&mut self, token: u32, now: DateTime<Utc>) -> PointerMove {
        let from = self.current_token;

        self.current_token = token;
        self.refresh(now);

        PointerMove { from, to: token }
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        self.crowd_level = CrowdLevel::from_pending(self.pending());
        self.last_updated = now;
    }
}

impl PointerMove {
    /// The inclusive range of token numbers whose status may change.
    pub fn affected(&self) -> Option<(u32, u32)> {
        if self.from == self.to {
            return None;
        }

        let low = self.from.min(self.to).max(1);
        let high = self.from.max(self.to);

        (low <= high).then_some((low, high))
    }

    /// The status every affected token should end up in.
    ///
    /// Tokens before the pointer are completed, the pointer itself is serving
    /// and anything after it is pending again.
    pub fn targets(&self) -> Vec<(u32, TokenStatus)> {
        let Some((low, high)) = self.affected() else {
            return vec![];
        };

        (low..=high)
            .map(|number| {
                let status = match number.cmp(&self.to) {
                    Ordering::Less => TokenStatus::Completed,
                    Ordering::Equal => TokenStatus::Serving,
                    Ordering::Greater => TokenStatus::Pending,
                };

                (number, status)
            })
            .collect()
    }
}
