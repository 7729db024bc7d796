use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use society_types::events::ChannelEvent;
use society_types::models::{Author, ComplaintId, Message};

/// An event addressed to everyone viewing one complaint.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub complaint_id: ComplaintId,
    pub event: ChannelEvent,
    /// Connection that caused the event and should not receive it back
    pub skip_conn: Option<Uuid>,
}

/// One connection's membership in a room.
#[derive(Debug, Clone)]
struct Member {
    user_id: String,
}

/// Tracks rooms and their members, keeps the comment log, and fans events out.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connection receives every room event and filters by its own room
    broadcast_tx: broadcast::Sender<RoomEvent>,

    /// complaint_id -> (conn_id -> member). A room exists while it has members.
    rooms: RwLock<HashMap<ComplaintId, HashMap<Uuid, Member>>>,

    /// complaint_id -> comments in posting order
    comments: RwLock<HashMap<ComplaintId, Vec<Message>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                rooms: RwLock::new(HashMap::new()),
                comments: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn broadcast(&self, event: RoomEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Put a connection into a room, leaving whichever room it was in.
    /// Returns the room it left, if any.
    pub async fn join(
        &self,
        conn_id: Uuid,
        user_id: &str,
        complaint_id: ComplaintId,
    ) -> Option<ComplaintId> {
        let already_there = self
            .inner
            .rooms
            .read()
            .await
            .get(&complaint_id)
            .is_some_and(|members| members.contains_key(&conn_id));
        if already_there {
            return None;
        }

        let left = self.leave(conn_id).await;
        self.inner
            .rooms
            .write()
            .await
            .entry(complaint_id)
            .or_default()
            .insert(
                conn_id,
                Member {
                    user_id: user_id.to_string(),
                },
            );
        left.map(|(room, _)| room)
    }

    /// Remove a connection from its room. Announces `ParticipantLeft` when the
    /// user has no other connection in that room.
    pub async fn leave(&self, conn_id: Uuid) -> Option<(ComplaintId, String)> {
        let (complaint_id, member, still_present) = {
            let mut rooms = self.inner.rooms.write().await;
            let complaint_id = rooms
                .iter()
                .find(|(_, members)| members.contains_key(&conn_id))
                .map(|(id, _)| id.clone())?;

            let members = rooms.get_mut(&complaint_id)?;
            let member = members.remove(&conn_id)?;
            let still_present = members.values().any(|m| m.user_id == member.user_id);
            if members.is_empty() {
                rooms.remove(&complaint_id);
            }
            (complaint_id, member, still_present)
        };

        if !still_present {
            self.broadcast(RoomEvent {
                complaint_id: complaint_id.clone(),
                event: ChannelEvent::ParticipantLeft {
                    complaint_id: complaint_id.clone(),
                    user_id: member.user_id.clone(),
                },
                skip_conn: Some(conn_id),
            });
        }
        Some((complaint_id, member.user_id))
    }

    /// Number of connections viewing a complaint.
    pub async fn viewers(&self, complaint_id: &ComplaintId) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(complaint_id)
            .map_or(0, |members| members.len())
    }

    /// Store a comment and deliver it to the room, sender included.
    pub async fn post_message(&self, complaint_id: ComplaintId, author: Author, body: String) -> Message {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            body,
            author,
            created_at: Utc::now(),
            pending: false,
        };

        self.inner
            .comments
            .write()
            .await
            .entry(complaint_id.clone())
            .or_default()
            .push(message.clone());

        self.broadcast(RoomEvent {
            complaint_id: complaint_id.clone(),
            event: ChannelEvent::NewMessage {
                complaint_id,
                message: message.clone(),
            },
            skip_conn: None,
        });

        message
    }

    pub async fn history(&self, complaint_id: &ComplaintId) -> Vec<Message> {
        self.inner
            .comments
            .read()
            .await
            .get(complaint_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use society_types::models::Role;

    use super::*;

    fn room(id: &str) -> ComplaintId {
        ComplaintId::new(id).unwrap()
    }

    fn author(id: &str) -> Author {
        Author {
            id: id.into(),
            display_name: id.into(),
            role: Role::Tenant,
        }
    }

    #[tokio::test]
    async fn joining_moves_between_rooms() {
        let dispatcher = Dispatcher::new();
        let conn = Uuid::new_v4();

        assert_eq!(dispatcher.join(conn, "u-1", room("c-1")).await, None);
        assert_eq!(dispatcher.viewers(&room("c-1")).await, 1);

        assert_eq!(dispatcher.join(conn, "u-1", room("c-2")).await, Some(room("c-1")));
        assert_eq!(dispatcher.viewers(&room("c-1")).await, 0);
        assert_eq!(dispatcher.viewers(&room("c-2")).await, 1);

        // rejoining the same room does not duplicate membership
        dispatcher.join(conn, "u-1", room("c-2")).await;
        assert_eq!(dispatcher.viewers(&room("c-2")).await, 1);
    }

    #[tokio::test]
    async fn leave_announces_only_last_connection() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        dispatcher.join(a, "u-1", room("c-1")).await;
        dispatcher.join(b, "u-1", room("c-1")).await;

        dispatcher.leave(a).await;
        assert!(rx.try_recv().is_err());

        assert_eq!(dispatcher.leave(b).await, Some((room("c-1"), "u-1".to_string())));
        let event = rx.try_recv().unwrap();
        assert!(matches!(event.event, ChannelEvent::ParticipantLeft { ref user_id, .. } if user_id == "u-1"));

        assert_eq!(dispatcher.leave(b).await, None);
    }

    #[tokio::test]
    async fn posted_messages_are_stored_and_broadcast() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let first = dispatcher.post_message(room("c-1"), author("u-1"), "one".into()).await;
        dispatcher.post_message(room("c-1"), author("u-2"), "two".into()).await;
        dispatcher.post_message(room("c-2"), author("u-1"), "elsewhere".into()).await;

        let history = dispatcher.history(&room("c-1")).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[1].body, "two");
        assert!(dispatcher.history(&room("missing")).await.is_empty());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.complaint_id, room("c-1"));
        assert!(event.skip_conn.is_none());
    }
}
