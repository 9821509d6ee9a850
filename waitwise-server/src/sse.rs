use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use crossbeam::atomic::AtomicCell;
use futures_util::Stream;
use log::{debug, error};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    convert::Infallible,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll, Waker},
};
use waitwise_collab::{CollabEvent, Notifier, PrimaryKey};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    serialized::{Department, ToSerialized},
};

/// The name of the event carrying a department snapshot
pub const QUEUE_UPDATE_EVENT: &str = "queueUpdate";

type ConnectionId = u64;
type SharedMailbox = Arc<Mutex<Mailbox>>;

/// Fans department snapshots out to the SSE connections watching that department
pub struct ServerSentEvents {
    me: Weak<Self>,
    last_id: AtomicCell<ConnectionId>,
    rooms: Mutex<HashMap<PrimaryKey, Vec<Subscriber>>>,
}

struct Subscriber {
    id: ConnectionId,
    mailbox: SharedMailbox,
}

/// Snapshots waiting to be streamed, oldest first
#[derive(Default)]
struct Mailbox {
    messages: VecDeque<String>,
    waker: Option<Waker>,
}

/// The stream half of a subscription, unsubscribes when dropped
pub struct ConnectionHandle {
    id: ConnectionId,
    department_id: PrimaryKey,
    mailbox: SharedMailbox,
    manager: Weak<ServerSentEvents>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            last_id: AtomicCell::new(0),
            rooms: Default::default(),
        })
    }

    /// Sends a message to everyone subscribed to the department
    pub fn broadcast(&self, department_id: PrimaryKey, message: String) {
        let rooms = self.rooms.lock();

        for subscriber in rooms.get(&department_id).into_iter().flatten() {
            subscriber.mailbox.lock().deliver(message.clone());
        }
    }

    fn connect(&self, department_id: PrimaryKey) -> ConnectionHandle {
        let id = self.last_id.fetch_add(1) + 1;
        let mailbox = SharedMailbox::default();

        self.rooms
            .lock()
            .entry(department_id)
            .or_default()
            .push(Subscriber {
                id,
                mailbox: mailbox.clone(),
            });

        debug!("SSE connection {id} subscribed to department {department_id}");

        ConnectionHandle {
            id,
            department_id,
            mailbox,
            manager: self.me.clone(),
        }
    }

    fn disconnect(&self, department_id: PrimaryKey, id: ConnectionId) {
        let mut rooms = self.rooms.lock();

        let remaining = match rooms.get_mut(&department_id) {
            Some(room) => {
                room.retain(|s| s.id != id);
                room.len()
            }
            None => 0,
        };

        if remaining == 0 {
            rooms.remove(&department_id);
        }

        debug!("SSE connection {id} closed, {remaining} left on department {department_id}");
    }
}

impl Notifier for ServerSentEvents {
    fn notify(&self, event: CollabEvent) {
        match event {
            CollabEvent::QueueUpdate {
                department_id,
                department,
            } => {
                let snapshot: Department = department.to_serialized();

                match serde_json::to_string(&snapshot) {
                    Ok(message) => self.broadcast(department_id, message),
                    Err(e) => error!("Failed to serialize department {department_id}: {e}"),
                }
            }
        }
    }
}

impl Mailbox {
    fn deliver(&mut self, message: String) {
        self.messages.push_back(message);

        if let Some(waker) = self.waker.take() {
            waker.wake()
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut mailbox = self.mailbox.lock();

        match mailbox.messages.pop_front() {
            Some(message) => {
                let event = Event::default().event(QUEUE_UPDATE_EVENT).data(message);
                Poll::Ready(Some(Ok(event)))
            }
            None => {
                mailbox.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.department_id, self.id)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/queue/{id}/events",
    tag = "queue",
    params(("id" = i32, Path, description = "Department id")),
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of `queueUpdate` events carrying the department",
            body = Department
        ),
        (status = 404, description = "Department not found")
    )
)]
pub async fn event_stream(
    State(context): State<ServerContext>,
    Path(department_id): Path<PrimaryKey>,
) -> ServerResult<Sse<ConnectionHandle>> {
    // Ensure department exists
    let _ = context.collab.queues.department(department_id).await?;

    Ok(Sse::new(context.sse.connect(department_id)).keep_alive(KeepAlive::default()))
}
