mod auth;
mod db;
mod departments;
mod events;
mod offices;
mod queues;
mod seed;
mod util;

use std::sync::Arc;

pub use auth::*;
pub use db::*;
pub use departments::*;
pub use events::*;
pub use offices::*;
pub use queues::*;
pub use seed::*;

use dashmap::DashMap;
use log::warn;
use tokio::sync::{Mutex, OwnedMutexGuard};
use waitwise_core::{Actor, Config};

/// Per-department locks, serializing every write to one department
pub type DepartmentLocks = Arc<DashMap<PrimaryKey, Arc<Mutex<()>>>>;

/// The WaitWise collab system, facilitating queues, offices, authentication, and more.
pub struct Collab {
    pub database: ArcedDatabase,
    pub config: Config,

    pub auth: Auth,
    pub queues: QueueManager,
    pub offices: OfficeManager,
    pub departments: DepartmentManager,
}

/// A type passed to various components of the collab system, to access state and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub database: ArcedDatabase,
    pub config: Config,
    pub notifier: Arc<dyn Notifier>,

    pub locks: DepartmentLocks,
}

impl Collab {
    pub fn new<Db, N>(database: Db, config: Config, notifier: Arc<N>) -> Self
    where
        Db: Database + 'static,
        N: Notifier + 'static,
    {
        let database: ArcedDatabase = Arc::new(database);

        let context = CollabContext {
            database: database.clone(),
            config: config.clone(),
            notifier,
            locks: Default::default(),
        };

        Self {
            auth: Auth::new(&context),
            queues: QueueManager::new(&context),
            offices: OfficeManager::new(&context),
            departments: DepartmentManager::new(&context),
            database,
            config,
        }
    }
}

impl CollabContext {
    /// Forwards an event to whoever is listening
    pub fn emit(&self, event: CollabEvent) {
        self.notifier.notify(event)
    }

    /// Waits for exclusive access to a department
    pub async fn lock_department(&self, department_id: PrimaryKey) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(department_id)
            .or_insert_with(Default::default)
            .clone();

        lock.lock_owned().await
    }

    /// Writes an activity entry.
    ///
    /// The action already happened at this point, so a failure is only logged.
    pub async fn record(
        &self,
        actor: &Actor,
        action: ActivityAction,
        department_id: Option<PrimaryKey>,
        office_id: Option<PrimaryKey>,
        details: String,
    ) {
        let result = self
            .database
            .create_activity(NewActivity {
                user_id: actor.user_id,
                action,
                department_id,
                office_id,
                details,
            })
            .await;

        if let Err(e) = result {
            warn!("Failed to record {action} by user {}: {e}", actor.user_id);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crossbeam::channel::unbounded;
    use waitwise_core::{Config, Role};

    use crate::{
        Collab, Database, EventReceiver, MemoryDatabase, NewOffice, NewUser, OfficeKind,
        RoleAssignment, UpdatedUser, UserData,
    };
    use waitwise_core::Coordinates;

    pub fn collab() -> (Collab, EventReceiver) {
        collab_with(Config::default())
    }

    pub fn collab_with(config: Config) -> (Collab, EventReceiver) {
        let (sender, receiver) = unbounded();
        let collab = Collab::new(MemoryDatabase::new(), config, Arc::new(sender));

        (collab, receiver)
    }

    pub async fn user(collab: &Collab, email: &str, role: Role) -> UserData {
        let user = collab
            .database
            .create_user(NewUser {
                name: email.to_string(),
                email: email.to_string(),
                password: "unused".to_string(),
                role: Role::User,
            })
            .await
            .unwrap();

        if role == Role::User {
            return user;
        }

        collab
            .database
            .update_user(UpdatedUser {
                id: user.id,
                assignment: Some(RoleAssignment {
                    role,
                    department_id: None,
                    office_id: None,
                }),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    /// Makes the user an admin of the given department
    pub async fn assign(collab: &Collab, user: &UserData, department_id: i32) -> UserData {
        collab
            .database
            .update_user(UpdatedUser {
                id: user.id,
                assignment: Some(RoleAssignment {
                    role: Role::DeptAdmin,
                    department_id: Some(department_id),
                    office_id: None,
                }),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    /// Creates an office with a single department, returning the department id
    pub async fn department(collab: &Collab, avg: u32) -> i32 {
        let office = collab
            .database
            .create_office(NewOffice {
                name: "City Hospital".to_string(),
                address: "MG Road".to_string(),
                location: Coordinates::new(12.97, 77.59),
                kind: OfficeKind::Hospital,
                admin_id: None,
            })
            .await
            .unwrap();

        collab
            .database
            .create_department(crate::NewDepartment {
                office_id: office.id,
                name: "OPD".to_string(),
                avg_wait_time_per_token: avg,
            })
            .await
            .unwrap()
            .id
    }
}
