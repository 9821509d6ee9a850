use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use log::info;
use thiserror::Error;
use waitwise_core::{
    authorize, Action, Actor, Ledger, LedgerError, PointerMove, PolicyError, Resource,
};

use crate::{
    ActivityAction, CollabContext, CollabEvent, DatabaseError, DepartmentData, LedgerCommit,
    NewQueueToken, PrimaryKey, QueueTokenData, TokenUpdate,
};

/// Issues tokens and moves the serving pointer of department queues.
///
/// Every write holds the department lock from the first read until the
/// resulting event is emitted.
pub struct QueueManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// The outcome of joining a queue
#[derive(Debug, Clone)]
pub struct JoinResult {
    pub token_number: u32,
    /// Minutes until the new token is reached
    pub estimated_wait: u32,
    pub department: DepartmentData,
}

impl QueueManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns the current snapshot of a department
    pub async fn department(&self, department_id: PrimaryKey) -> Result<DepartmentData, QueueError> {
        Ok(self.context.database.department_by_id(department_id).await?)
    }

    /// Issues the next token of a department.
    ///
    /// Walk-ins join without an actor.
    pub async fn join(
        &self,
        department_id: PrimaryKey,
        actor: Option<&Actor>,
    ) -> Result<JoinResult, QueueError> {
        if let Some(actor) = actor {
            authorize(actor, Action::JoinQueue, Resource::Department(department_id))?;
        }

        let _guard = self.context.lock_department(department_id).await;
        let department = self.department(department_id).await?;

        let now = Utc::now();
        let mut ledger = department.ledger;
        let token_number = ledger.issue(now, self.context.config.reject_joins_when_paused)?;

        let department = self
            .commit(LedgerCommit {
                department_id,
                expected: department.ledger,
                ledger,
                new_token: Some(NewQueueToken {
                    user_id: actor.map(|a| a.user_id),
                    token_number,
                    issued_at: now,
                }),
                token_updates: vec![],
            })
            .await?;

        info!("Issued token {token_number} in department {department_id}");

        Ok(JoinResult {
            token_number,
            estimated_wait: department
                .ledger
                .estimated_wait(department.avg_wait_time_per_token),
            department,
        })
    }

    /// Serves the next token
    pub async fn advance(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
    ) -> Result<DepartmentData, QueueError> {
        self.move_pointer(
            actor,
            department_id,
            ActivityAction::TokenNext,
            |ledger, cancelled, now| ledger.advance(cancelled, now),
        )
        .await
    }

    /// Goes back to the previous token
    pub async fn retreat(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
    ) -> Result<DepartmentData, QueueError> {
        self.move_pointer(
            actor,
            department_id,
            ActivityAction::TokenPrevious,
            |ledger, cancelled, now| ledger.retreat(cancelled, now),
        )
        .await
    }

    /// Jumps to any issued token, or 0 to serve nobody
    pub async fn set(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
        token_number: u32,
    ) -> Result<DepartmentData, QueueError> {
        self.move_pointer(
            actor,
            department_id,
            ActivityAction::TokenSet,
            |ledger, _, now| ledger.set(token_number, now),
        )
        .await
    }

    pub async fn toggle_pause(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
    ) -> Result<DepartmentData, QueueError> {
        authorize(actor, Action::ControlQueue, Resource::Department(department_id))?;

        let _guard = self.context.lock_department(department_id).await;
        let department = self.department(department_id).await?;

        let mut ledger = department.ledger;
        let paused = ledger.toggle_pause(Utc::now());

        let updated = self
            .commit(LedgerCommit {
                department_id,
                expected: department.ledger,
                ledger,
                new_token: None,
                token_updates: vec![],
            })
            .await?;

        let (action, details) = if paused {
            (ActivityAction::QueuePause, "Paused the queue")
        } else {
            (ActivityAction::QueueResume, "Resumed the queue")
        };

        self.context
            .record(
                actor,
                action,
                Some(department_id),
                Some(department.office_id),
                details.to_string(),
            )
            .await;

        Ok(updated)
    }

    /// Cancels a token that hasn't been served yet.
    ///
    /// The counters stay as they are. Advancing and going back step over it.
    pub async fn cancel(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
        token_number: u32,
    ) -> Result<QueueTokenData, QueueError> {
        let _guard = self.context.lock_department(department_id).await;
        let department = self.department(department_id).await?;

        let database = &self.context.database;
        let token = database.token_by_number(department_id, token_number).await?;

        authorize(
            actor,
            Action::CancelToken,
            Resource::Token {
                department_id,
                owner: token.user_id,
            },
        )?;

        let stamps = token.stamps.cancel()?;

        self.commit(LedgerCommit {
            department_id,
            expected: department.ledger,
            ledger: department.ledger,
            new_token: None,
            token_updates: vec![TokenUpdate {
                id: token.id,
                stamps,
            }],
        })
        .await?;

        self.context
            .record(
                actor,
                ActivityAction::TokenCancel,
                Some(department_id),
                Some(department.office_id),
                format!("Cancelled token {token_number}"),
            )
            .await;

        Ok(QueueTokenData { stamps, ..token })
    }

    /// Lists every token ever issued by a department
    pub async fn tokens(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
    ) -> Result<Vec<QueueTokenData>, QueueError> {
        authorize(actor, Action::ViewTokens, Resource::Department(department_id))?;

        // Ensure department exists
        let _ = self.department(department_id).await?;

        Ok(self.context.database.list_tokens(department_id).await?)
    }

    /// Every token the actor has taken, newest first
    pub async fn tokens_of(&self, actor: &Actor) -> Result<Vec<QueueTokenData>, QueueError> {
        Ok(self.context.database.list_tokens_by_user(actor.user_id).await?)
    }

    async fn move_pointer<F>(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
        action: ActivityAction,
        transition: F,
    ) -> Result<DepartmentData, QueueError>
    where
        F: FnOnce(&mut Ledger, &BTreeSet<u32>, DateTime<Utc>) -> Result<PointerMove, LedgerError>,
    {
        authorize(actor, Action::ControlQueue, Resource::Department(department_id))?;

        let _guard = self.context.lock_department(department_id).await;
        let department = self.department(department_id).await?;

        let cancelled: BTreeSet<u32> = self
            .context
            .database
            .cancelled_token_numbers(department_id, 1, department.ledger.total_tokens)
            .await?
            .into_iter()
            .collect();

        let now = Utc::now();
        let mut ledger = department.ledger;
        let movement = transition(&mut ledger, &cancelled, now)?;
        let token_updates = self.reconcile(department_id, movement, now).await?;

        let updated = self
            .commit(LedgerCommit {
                department_id,
                expected: department.ledger,
                ledger,
                new_token: None,
                token_updates,
            })
            .await?;

        self.context
            .record(
                actor,
                action,
                Some(department_id),
                Some(department.office_id),
                format!("Moved from token {} to {}", movement.from, movement.to),
            )
            .await;

        Ok(updated)
    }

    /// Works out which token records have to change for a pointer move
    async fn reconcile(
        &self,
        department_id: PrimaryKey,
        movement: PointerMove,
        now: DateTime<Utc>,
    ) -> Result<Vec<TokenUpdate>, QueueError> {
        let Some((low, high)) = movement.affected() else {
            return Ok(vec![]);
        };

        let targets: HashMap<_, _> = movement.targets().into_iter().collect();
        let records = self
            .context
            .database
            .tokens_in_range(department_id, low, high)
            .await?;

        let updates = records
            .into_iter()
            .filter_map(|record| {
                let target = targets.get(&record.token_number)?;
                let stamps = record.stamps.moved_to(*target, now)?;

                Some(TokenUpdate {
                    id: record.id,
                    stamps,
                })
            })
            .collect();

        Ok(updates)
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<DepartmentData, QueueError> {
        let department_id = commit.department_id;
        let department = self.context.database.commit_ledger(commit).await?;

        self.context.emit(CollabEvent::QueueUpdate {
            department_id,
            department: department.clone(),
        });

        Ok(department)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use waitwise_core::{Config, CrowdLevel, Role, TokenStatus};

    use super::*;
    use crate::testing::{assign, collab, collab_with, department, user};
    use crate::Database;

    async fn statuses(collab: &crate::Collab, department_id: PrimaryKey) -> Vec<TokenStatus> {
        collab
            .database
            .list_tokens(department_id)
            .await
            .unwrap()
            .iter()
            .map(|t| t.status())
            .collect()
    }

    #[tokio::test]
    async fn join_then_advance_on_empty_department() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        let joined = collab.queues.join(department_id, None).await.unwrap();
        assert_eq!(joined.token_number, 1);
        assert_eq!(joined.department.ledger.total_tokens, 1);

        let department = collab
            .queues
            .advance(&admin.actor(), department_id)
            .await
            .unwrap();
        assert_eq!(department.ledger.current_token, 1);
        assert_eq!(statuses(&collab, department_id).await, vec![TokenStatus::Serving]);

        let token = collab.database.token_by_number(department_id, 1).await.unwrap();
        assert!(token.stamps.served_at.is_some());
        assert!(token.stamps.completed_at.is_none());
    }

    #[tokio::test]
    async fn join_estimates_wait_from_pending_tokens() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        for _ in 0..5 {
            collab.queues.join(department_id, None).await.unwrap();
        }
        collab
            .queues
            .set(&admin.actor(), department_id, 5)
            .await
            .unwrap();

        let joined = collab.queues.join(department_id, None).await.unwrap();
        assert_eq!(joined.token_number, 6);
        assert_eq!(joined.department.ledger.pending(), 1);
        assert_eq!(joined.estimated_wait, 10);
    }

    #[tokio::test]
    async fn joins_record_the_owner() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let alice = user(&collab, "alice@example.com", Role::User).await;

        collab
            .queues
            .join(department_id, Some(&alice.actor()))
            .await
            .unwrap();

        collab.queues.join(department_id, None).await.unwrap();
        collab
            .queues
            .join(department_id, Some(&alice.actor()))
            .await
            .unwrap();

        let tokens = collab.queues.tokens_of(&alice.actor()).await.unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.token_number).collect::<Vec<_>>(),
            vec![3, 1]
        );
    }

    #[tokio::test]
    async fn advance_at_the_end_changes_nothing() {
        let (collab, events) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        collab.queues.join(department_id, None).await.unwrap();
        collab.queues.advance(&admin.actor(), department_id).await.unwrap();
        let before = collab.queues.department(department_id).await.unwrap();
        let emitted = events.try_iter().count();
        assert_eq!(emitted, 2);

        let result = collab.queues.advance(&admin.actor(), department_id).await;
        assert!(matches!(
            result,
            Err(QueueError::Ledger(LedgerError::NoMoreTokens))
        ));

        let after = collab.queues.department(department_id).await.unwrap();
        assert_eq!(before.ledger, after.ledger);
        assert_eq!(statuses(&collab, department_id).await, vec![TokenStatus::Serving]);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn advance_completes_the_previous_token() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        for _ in 0..3 {
            collab.queues.join(department_id, None).await.unwrap();
        }
        collab.queues.advance(&admin.actor(), department_id).await.unwrap();
        collab.queues.advance(&admin.actor(), department_id).await.unwrap();

        assert_eq!(
            statuses(&collab, department_id).await,
            vec![
                TokenStatus::Completed,
                TokenStatus::Serving,
                TokenStatus::Pending
            ]
        );
    }

    #[tokio::test]
    async fn retreat_returns_the_token_to_pending() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        let result = collab.queues.retreat(&admin.actor(), department_id).await;
        assert!(matches!(
            result,
            Err(QueueError::Ledger(LedgerError::NothingToRewind))
        ));

        collab.queues.join(department_id, None).await.unwrap();
        collab.queues.join(department_id, None).await.unwrap();
        collab.queues.set(&admin.actor(), department_id, 2).await.unwrap();

        let department = collab
            .queues
            .retreat(&admin.actor(), department_id)
            .await
            .unwrap();

        assert_eq!(department.ledger.current_token, 1);
        assert_eq!(
            statuses(&collab, department_id).await,
            vec![TokenStatus::Serving, TokenStatus::Pending]
        );

        let second = collab.database.token_by_number(department_id, 2).await.unwrap();
        assert!(second.stamps.served_at.is_none());
    }

    #[tokio::test]
    async fn set_reconciles_the_whole_range() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        for _ in 0..6 {
            collab.queues.join(department_id, None).await.unwrap();
        }

        collab.queues.set(&admin.actor(), department_id, 4).await.unwrap();
        assert_eq!(
            statuses(&collab, department_id).await,
            vec![
                TokenStatus::Completed,
                TokenStatus::Completed,
                TokenStatus::Completed,
                TokenStatus::Serving,
                TokenStatus::Pending,
                TokenStatus::Pending,
            ]
        );

        collab.queues.set(&admin.actor(), department_id, 1).await.unwrap();
        assert_eq!(
            statuses(&collab, department_id).await,
            vec![
                TokenStatus::Serving,
                TokenStatus::Pending,
                TokenStatus::Pending,
                TokenStatus::Pending,
                TokenStatus::Pending,
                TokenStatus::Pending,
            ]
        );

        let result = collab.queues.set(&admin.actor(), department_id, 7).await;
        assert!(matches!(
            result,
            Err(QueueError::Ledger(LedgerError::OutOfRange {
                requested: 7,
                total: 6
            }))
        ));
    }

    #[tokio::test]
    async fn cancelled_tokens_are_skipped() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;
        let alice = user(&collab, "alice@example.com", Role::User).await;
        let bob = user(&collab, "bob@example.com", Role::User).await;

        collab.queues.join(department_id, None).await.unwrap();
        collab
            .queues
            .join(department_id, Some(&alice.actor()))
            .await
            .unwrap();

        let denied = collab.queues.cancel(&bob.actor(), department_id, 2).await;
        assert!(matches!(denied, Err(QueueError::Policy(_))));

        let cancelled = collab
            .queues
            .cancel(&alice.actor(), department_id, 2)
            .await
            .unwrap();
        assert_eq!(cancelled.status(), TokenStatus::Cancelled);

        let department = collab.queues.department(department_id).await.unwrap();
        assert_eq!(department.ledger.total_tokens, 2);

        collab.queues.set(&admin.actor(), department_id, 2).await.unwrap();
        assert_eq!(
            statuses(&collab, department_id).await,
            vec![TokenStatus::Completed, TokenStatus::Cancelled]
        );

        let again = collab.queues.cancel(&alice.actor(), department_id, 2).await;
        assert!(matches!(
            again,
            Err(QueueError::Ledger(LedgerError::NotPending { .. }))
        ));
    }

    #[tokio::test]
    async fn advancing_steps_over_cancelled_tokens() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        for _ in 0..3 {
            collab.queues.join(department_id, None).await.unwrap();
        }
        collab
            .queues
            .cancel(&admin.actor(), department_id, 2)
            .await
            .unwrap();

        collab.queues.advance(&admin.actor(), department_id).await.unwrap();
        let department = collab.queues.advance(&admin.actor(), department_id).await.unwrap();

        assert_eq!(department.ledger.current_token, 3);
        assert_eq!(
            statuses(&collab, department_id).await,
            vec![
                TokenStatus::Completed,
                TokenStatus::Cancelled,
                TokenStatus::Serving
            ]
        );

        let department = collab.queues.retreat(&admin.actor(), department_id).await.unwrap();
        assert_eq!(department.ledger.current_token, 1);
        assert_eq!(
            statuses(&collab, department_id).await,
            vec![
                TokenStatus::Serving,
                TokenStatus::Cancelled,
                TokenStatus::Pending
            ]
        );
    }

    #[tokio::test]
    async fn only_cancelled_tokens_left_means_nothing_to_advance() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        collab.queues.join(department_id, None).await.unwrap();
        collab.queues.join(department_id, None).await.unwrap();
        collab.queues.advance(&admin.actor(), department_id).await.unwrap();
        collab
            .queues
            .cancel(&admin.actor(), department_id, 2)
            .await
            .unwrap();

        let result = collab.queues.advance(&admin.actor(), department_id).await;
        assert!(matches!(
            result,
            Err(QueueError::Ledger(LedgerError::NoMoreTokens))
        ));
        assert_eq!(
            collab.queues.department(department_id).await.unwrap().ledger.current_token,
            1
        );
    }

    #[tokio::test]
    async fn admins_only_control_their_own_department() {
        let (collab, _) = collab();
        let first = department(&collab, 10).await;
        let second = department(&collab, 10).await;
        let staff = user(&collab, "staff@example.com", Role::User).await;
        let staff = assign(&collab, &staff, first).await;

        collab.queues.join(first, None).await.unwrap();
        collab.queues.join(second, None).await.unwrap();

        collab.queues.advance(&staff.actor(), first).await.unwrap();

        let denied = collab.queues.advance(&staff.actor(), second).await;
        assert!(matches!(denied, Err(QueueError::Policy(_))));

        let denied = collab.queues.tokens(&staff.actor(), second).await;
        assert!(matches!(denied, Err(QueueError::Policy(_))));

        let unchanged = collab.queues.department(second).await.unwrap();
        assert_eq!(unchanged.ledger.current_token, 0);
    }

    #[tokio::test]
    async fn paused_joins_follow_the_config() {
        let (collab, _) = collab_with(Config {
            reject_joins_when_paused: true,
            ..Config::default()
        });
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        let paused = collab
            .queues
            .toggle_pause(&admin.actor(), department_id)
            .await
            .unwrap();
        assert!(paused.ledger.is_paused);

        let result = collab.queues.join(department_id, None).await;
        assert!(matches!(result, Err(QueueError::Ledger(LedgerError::Paused))));

        let (lenient, _) = collab_with(Config::default());
        let department_id = department(&lenient, 10).await;
        let admin = user(&lenient, "root@example.com", Role::SuperAdmin).await;

        lenient
            .queues
            .toggle_pause(&admin.actor(), department_id)
            .await
            .unwrap();
        assert!(lenient.queues.join(department_id, None).await.is_ok());
    }

    #[tokio::test]
    async fn control_actions_are_logged() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        collab.queues.join(department_id, None).await.unwrap();
        collab.queues.advance(&admin.actor(), department_id).await.unwrap();
        collab.queues.toggle_pause(&admin.actor(), department_id).await.unwrap();
        collab.queues.toggle_pause(&admin.actor(), department_id).await.unwrap();

        let actions: Vec<_> = collab
            .database
            .list_activity(department_id)
            .await
            .unwrap()
            .iter()
            .map(|a| a.action)
            .collect();

        assert_eq!(actions.len(), 3);
        assert!(actions.contains(&ActivityAction::TokenNext));
        assert!(actions.contains(&ActivityAction::QueuePause));
        assert!(actions.contains(&ActivityAction::QueueResume));
    }

    #[tokio::test]
    async fn concurrent_joins_issue_dense_numbers() {
        let (collab, _) = collab();
        let collab = Arc::new(collab);
        let department_id = department(&collab, 10).await;

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let collab = collab.clone();
                tokio::spawn(async move { collab.queues.join(department_id, None).await })
            })
            .collect();

        let mut numbers = vec![];
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().token_number);
        }
        numbers.sort();

        assert_eq!(numbers, (1..=50).collect::<Vec<_>>());

        let department = collab.queues.department(department_id).await.unwrap();
        assert_eq!(department.ledger.total_tokens, 50);
        assert_eq!(department.ledger.crowd_level, CrowdLevel::High);
    }

    #[tokio::test]
    async fn events_follow_commit_order() {
        let (collab, events) = collab();
        let first = department(&collab, 10).await;
        let second = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        collab.queues.join(first, None).await.unwrap();
        collab.queues.join(second, None).await.unwrap();
        collab.queues.join(first, None).await.unwrap();
        collab.queues.advance(&admin.actor(), first).await.unwrap();

        let snapshots: Vec<_> = events
            .try_iter()
            .filter(|e| e.department_id() == first)
            .map(|CollabEvent::QueueUpdate { department, .. }| department.ledger)
            .map(|l| (l.current_token, l.total_tokens))
            .collect();

        assert_eq!(snapshots, vec![(0, 1), (0, 2), (1, 2)]);
    }
}
