use crossbeam::channel::{Receiver, Sender};
use log::warn;

use crate::{DepartmentData, PrimaryKey};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A department queue was modified, carrying the committed snapshot
    QueueUpdate {
        department_id: PrimaryKey,
        department: DepartmentData,
    },
}

/// Receives collab events as they happen.
///
/// Called while the originating department is still locked, so implementations
/// must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: CollabEvent);
}

impl Notifier for EventSender {
    fn notify(&self, event: CollabEvent) {
        if let Err(e) = self.send(event) {
            warn!("Dropped collab event, receiver is gone: {:?}", e.0);
        }
    }
}

impl CollabEvent {
    pub fn department_id(&self) -> PrimaryKey {
        match self {
            Self::QueueUpdate { department_id, .. } => *department_id,
        }
    }
}
