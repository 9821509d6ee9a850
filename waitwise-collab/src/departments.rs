use chrono::Utc;
use log::info;
use thiserror::Error;
use waitwise_core::{
    authorize, start_of_local_day, Action, Actor, DepartmentAnalytics, PolicyError, Resource,
};

use crate::{
    ActivityAction, ActivityLogData, CollabContext, CollabEvent, DatabaseError, DepartmentData,
    PrimaryKey, UpdatedDepartment,
};

/// Administration of departments outside of queue control
pub struct DepartmentManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum DepartmentError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

#[derive(Debug, Default)]
pub struct DepartmentChanges {
    pub name: Option<String>,
    pub avg_wait_time_per_token: Option<u32>,
}

impl DepartmentManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Renames a department or changes its average time
    pub async fn update(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
        changes: DepartmentChanges,
    ) -> Result<DepartmentData, DepartmentError> {
        authorize(actor, Action::EditDepartment, Resource::Department(department_id))?;

        self.apply(actor, department_id, changes).await
    }

    /// Changes the minutes it takes to serve one token
    pub async fn update_avg_time(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
        minutes: u32,
    ) -> Result<DepartmentData, DepartmentError> {
        authorize(
            actor,
            Action::UpdateAverageTime,
            Resource::Department(department_id),
        )?;

        let changes = DepartmentChanges {
            avg_wait_time_per_token: Some(minutes),
            ..Default::default()
        };

        self.apply(actor, department_id, changes).await
    }

    /// Deletes a department along with its tokens
    pub async fn delete(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
    ) -> Result<(), DepartmentError> {
        authorize(actor, Action::DeleteDepartment, Resource::Department(department_id))?;

        let guard = self.context.lock_department(department_id).await;
        let department = self.context.database.department_by_id(department_id).await?;

        self.context.database.delete_department(department_id).await?;

        drop(guard);
        self.context.locks.remove(&department_id);

        info!("Deleted department {department_id} ({})", department.name);

        self.context
            .record(
                actor,
                ActivityAction::DepartmentDelete,
                Some(department_id),
                Some(department.office_id),
                format!("Deleted department {}", department.name),
            )
            .await;

        Ok(())
    }

    /// Today's statistics of a department
    pub async fn analytics(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
    ) -> Result<DepartmentAnalytics, DepartmentError> {
        authorize(actor, Action::ViewAnalytics, Resource::Department(department_id))?;

        let database = &self.context.database;
        let department = database.department_by_id(department_id).await?;
        let tokens = database.list_tokens(department_id).await?;

        Ok(DepartmentAnalytics::compute(
            &department.ledger,
            tokens.iter().map(|t| &t.stamps),
            start_of_local_day(Utc::now()),
        ))
    }

    /// Activity entries of a department, newest first
    pub async fn activity(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
    ) -> Result<Vec<ActivityLogData>, DepartmentError> {
        authorize(actor, Action::ViewActivity, Resource::Department(department_id))?;

        // Ensure department exists
        let _ = self.context.database.department_by_id(department_id).await?;

        Ok(self.context.database.list_activity(department_id).await?)
    }

    async fn apply(
        &self,
        actor: &Actor,
        department_id: PrimaryKey,
        changes: DepartmentChanges,
    ) -> Result<DepartmentData, DepartmentError> {
        let _guard = self.context.lock_department(department_id).await;

        let department = self
            .context
            .database
            .update_department(UpdatedDepartment {
                id: department_id,
                name: changes.name,
                avg_wait_time_per_token: changes.avg_wait_time_per_token,
            })
            .await?;

        self.context.emit(CollabEvent::QueueUpdate {
            department_id,
            department: department.clone(),
        });

        self.context
            .record(
                actor,
                ActivityAction::DepartmentEdit,
                Some(department_id),
                Some(department.office_id),
                format!(
                    "{} now takes {} minutes per token",
                    department.name, department.avg_wait_time_per_token
                ),
            )
            .await;

        Ok(department)
    }
}

#[cfg(test)]
mod tests {
    use waitwise_core::{Role, TokenStatus};

    use super::*;
    use crate::testing::{assign, collab, department, user};
    use crate::Database;

    #[tokio::test]
    async fn dept_admins_only_change_the_average() {
        let (collab, events) = collab();
        let department_id = department(&collab, 10).await;
        let staff = user(&collab, "staff@example.com", Role::User).await;
        let staff = assign(&collab, &staff, department_id).await;

        let updated = collab
            .departments
            .update_avg_time(&staff.actor(), department_id, 4)
            .await
            .unwrap();
        assert_eq!(updated.avg_wait_time_per_token, 4);
        assert_eq!(events.try_iter().count(), 1);

        let renamed = collab
            .departments
            .update(
                &staff.actor(),
                department_id,
                DepartmentChanges {
                    name: Some("Other".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(renamed, Err(DepartmentError::Policy(_))));
    }

    #[tokio::test]
    async fn delete_removes_tokens() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        collab.queues.join(department_id, None).await.unwrap();
        collab
            .departments
            .delete(&admin.actor(), department_id)
            .await
            .unwrap();

        assert!(collab.queues.department(department_id).await.is_err());
        assert!(collab.database.list_tokens(department_id).await.unwrap().is_empty());

        let again = collab.departments.delete(&admin.actor(), department_id).await;
        assert!(matches!(
            again,
            Err(DepartmentError::Db(DatabaseError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn analytics_count_todays_tokens() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;

        for _ in 0..4 {
            collab.queues.join(department_id, None).await.unwrap();
        }
        collab.queues.set(&admin.actor(), department_id, 1).await.unwrap();
        collab.queues.advance(&admin.actor(), department_id).await.unwrap();
        collab.queues.advance(&admin.actor(), department_id).await.unwrap();

        let analytics = collab
            .departments
            .analytics(&admin.actor(), department_id)
            .await
            .unwrap();

        assert_eq!(analytics.tokens_completed_today, 2);
        assert_eq!(analytics.tokens_served_today, 3);
        assert_eq!(analytics.avg_processing_time, 0);
        assert_eq!(analytics.current_token, 3);
        assert_eq!(analytics.total_tokens, 4);

        let serving = collab.database.token_by_number(department_id, 3).await.unwrap();
        assert_eq!(serving.status(), TokenStatus::Serving);
    }

    #[tokio::test]
    async fn activity_is_newest_first() {
        let (collab, _) = collab();
        let department_id = department(&collab, 10).await;
        let admin = user(&collab, "root@example.com", Role::SuperAdmin).await;
        let alice = user(&collab, "alice@example.com", Role::User).await;

        collab.queues.join(department_id, None).await.unwrap();
        collab.queues.advance(&admin.actor(), department_id).await.unwrap();
        collab
            .departments
            .update_avg_time(&admin.actor(), department_id, 7)
            .await
            .unwrap();

        let entries = collab
            .departments
            .activity(&admin.actor(), department_id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].timestamp >= entries[1].timestamp);

        let denied = collab.departments.activity(&alice.actor(), department_id).await;
        assert!(matches!(denied, Err(DepartmentError::Policy(_))));
    }
}
