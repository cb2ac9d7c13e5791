//! The collaboration hub: connection registry, page rooms, presence, and
//! message fan-out.
//!
//! The hub is an explicit object constructed at server start and handed to
//! everything that needs to broadcast — never ambient state. Both
//! registries (connections and rooms) live behind a single `RwLock`, so
//! membership and presence always mutate together and there is no lock
//! order to get wrong. Delivery is fire-and-forget through per-connection
//! unbounded senders; a send to a closing connection is simply dropped.
//!
//! Misuse (joining unauthenticated, relaying without a room) never
//! terminates a connection: the offender gets an `error` frame and stays
//! usable.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use super::protocol::{
    ClientOperation, CursorData, RoomBroadcast, RoomUser, ServerEvent, StoreEventKind,
};

/// Counters exposed by the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    /// Authenticated connections
    pub connected_users: usize,
    /// Rooms with at least one member
    pub active_pages: usize,
}

struct ConnectionEntry {
    user: Option<RoomUser>,
    page_id: Option<String>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct HubInner {
    /// connection id -> connection state
    connections: HashMap<String, ConnectionEntry>,
    /// page id -> member connection ids
    rooms: HashMap<String, HashSet<String>>,
}

impl HubInner {
    fn send_to(&self, conn_id: &str, event: ServerEvent) {
        if let Some(conn) = self.connections.get(conn_id) {
            let _ = conn.tx.send(event);
        }
    }

    fn broadcast_room(&self, page_id: &str, exclude: Option<&str>, event: &ServerEvent) {
        let Some(members) = self.rooms.get(page_id) else {
            return;
        };
        for member in members {
            if Some(member.as_str()) == exclude {
                continue;
            }
            if let Some(conn) = self.connections.get(member) {
                let _ = conn.tx.send(event.clone());
            }
        }
    }

    fn room_users(&self, page_id: &str) -> Vec<(String, RoomUser)> {
        let Some(members) = self.rooms.get(page_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| {
                let user = self.connections.get(id).and_then(|c| c.user.clone())?;
                Some((id.clone(), user))
            })
            .collect()
    }

    /// Remove a connection from a room, notify the remaining members, and
    /// drop the room entry once empty.
    fn leave_room(&mut self, conn_id: &str, page_id: &str) {
        let Some(user) = self.connections.get(conn_id).and_then(|c| c.user.clone()) else {
            return;
        };
        let remaining = match self.rooms.get_mut(page_id) {
            Some(members) => {
                members.remove(conn_id);
                members.len()
            }
            None => return,
        };
        if remaining == 0 {
            self.rooms.remove(page_id);
        } else {
            self.broadcast_room(
                page_id,
                None,
                &ServerEvent::UserLeft {
                    user,
                    users_in_page: remaining,
                },
            );
        }
        if let Some(conn) = self.connections.get_mut(conn_id) {
            if conn.page_id.as_deref() == Some(page_id) {
                conn.page_id = None;
            }
        }
    }
}

/// Connection registry, room membership, presence, and message fan-out.
pub struct CollabHub {
    inner: RwLock<HubInner>,
}

impl CollabHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HubInner::default()),
        }
    }

    /// Register a new (still anonymous) connection.
    ///
    /// Returns the connection id and the receiver the socket task drains.
    pub async fn register(&self) -> (String, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        inner.connections.insert(
            conn_id.clone(),
            ConnectionEntry {
                user: None,
                page_id: None,
                tx,
            },
        );
        debug!("connection registered: {conn_id}");
        (conn_id, rx)
    }

    /// Attach an identity to a connection. Idempotent; re-authenticating
    /// replaces the stored identity and joins nothing.
    pub async fn authenticate(&self, conn_id: &str, user_id: &str, name: &str) {
        let mut inner = self.inner.write().await;
        if let Some(conn) = inner.connections.get_mut(conn_id) {
            conn.user = Some(RoomUser {
                id: user_id.to_string(),
                name: name.to_string(),
            });
            info!("user authenticated: {name} ({user_id})");
        }
    }

    /// Enter a page room.
    ///
    /// Requires authentication (soft `error` frame otherwise). Any current
    /// room is left first. Pre-existing members are told `user_joined` with
    /// the post-join occupant count; the joiner gets `page_users` listing
    /// exactly the occupants that were already there.
    pub async fn join_page(&self, conn_id: &str, page_id: &str) {
        let mut inner = self.inner.write().await;
        let (user, prev_page) = match inner.connections.get(conn_id) {
            Some(conn) => (conn.user.clone(), conn.page_id.clone()),
            None => return,
        };
        let Some(user) = user else {
            inner.send_to(
                conn_id,
                ServerEvent::Error {
                    message: "Authentication required".to_string(),
                },
            );
            return;
        };

        if let Some(prev) = prev_page {
            inner.leave_room(conn_id, &prev);
        }

        inner
            .rooms
            .entry(page_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
        if let Some(conn) = inner.connections.get_mut(conn_id) {
            conn.page_id = Some(page_id.to_string());
        }

        let occupants = inner.room_users(page_id);
        inner.broadcast_room(
            page_id,
            Some(conn_id),
            &ServerEvent::UserJoined {
                user: user.clone(),
                users_in_page: occupants.len(),
            },
        );
        let already_there = occupants
            .into_iter()
            .filter(|(id, _)| id != conn_id)
            .map(|(_, user)| user)
            .collect();
        inner.send_to(conn_id, ServerEvent::PageUsers { users: already_there });

        info!("user {} joined page {page_id}", user.name);
    }

    /// Leave a page room, notifying the remaining members.
    pub async fn leave_page(&self, conn_id: &str, page_id: &str) {
        let mut inner = self.inner.write().await;
        inner.leave_room(conn_id, page_id);
    }

    /// Relay a peer operation to every *other* member of the sender's room.
    ///
    /// Requires a joined room (soft `error` frame otherwise). The frame is
    /// stamped with the room page id, the sender's user id, and the server
    /// time in milliseconds.
    pub async fn relay_block_operation(&self, conn_id: &str, operation: ClientOperation) {
        let inner = self.inner.read().await;
        let Some(conn) = inner.connections.get(conn_id) else {
            return;
        };
        let (Some(user), Some(page_id)) = (conn.user.clone(), conn.page_id.clone()) else {
            inner.send_to(
                conn_id,
                ServerEvent::Error {
                    message: "Must join a page first".to_string(),
                },
            );
            return;
        };

        debug!("relaying {} in page {page_id} from {}", operation.kind, user.name);
        let data = serde_json::to_value(&operation).unwrap_or(Value::Null);
        inner.broadcast_room(
            &page_id,
            Some(conn_id),
            &ServerEvent::BlockOperation(RoomBroadcast {
                page_id: page_id.clone(),
                data,
                user_id: Some(user.id),
                timestamp: now_millis(),
            }),
        );
    }

    /// Relay a cursor position to every *other* member of the sender's
    /// room. Same preconditions and stamping as operation relay.
    pub async fn relay_cursor(&self, conn_id: &str, block_id: Option<String>, position: Option<i64>) {
        let inner = self.inner.read().await;
        let Some(conn) = inner.connections.get(conn_id) else {
            return;
        };
        let (Some(user), Some(page_id)) = (conn.user.clone(), conn.page_id.clone()) else {
            inner.send_to(
                conn_id,
                ServerEvent::Error {
                    message: "Must join a page first".to_string(),
                },
            );
            return;
        };

        let data = serde_json::to_value(CursorData {
            user_name: user.name,
            block_id,
            position,
        })
        .unwrap_or(Value::Null);
        inner.broadcast_room(
            &page_id,
            Some(conn_id),
            &ServerEvent::CursorUpdate(RoomBroadcast {
                page_id: page_id.clone(),
                data,
                user_id: Some(user.id),
                timestamp: now_millis(),
            }),
        );
    }

    /// Tear down a connection: implicit leave of any current room, then
    /// deregistration.
    pub async fn disconnect(&self, conn_id: &str) {
        let mut inner = self.inner.write().await;
        let Some(conn) = inner.connections.get(conn_id) else {
            return;
        };
        if let Some(page_id) = conn.page_id.clone() {
            inner.leave_room(conn_id, &page_id);
        }
        if let Some(entry) = inner.connections.remove(conn_id) {
            if let Some(user) = entry.user {
                info!("user {} disconnected", user.name);
            }
        }
    }

    /// Fan a store-accepted mutation out to *all* members of the page's
    /// room. The HTTP caller is not a socket, so nobody is excluded;
    /// `user_id` only stamps the originator on the envelope.
    pub async fn broadcast_store_event(
        &self,
        page_id: &str,
        kind: StoreEventKind,
        data: Value,
        user_id: Option<String>,
    ) {
        let inner = self.inner.read().await;
        let event = kind.into_event(RoomBroadcast {
            page_id: page_id.to_string(),
            data,
            user_id,
            timestamp: now_millis(),
        });
        inner.broadcast_room(page_id, None, &event);
    }

    /// Current registry counters.
    pub async fn stats(&self) -> HubStats {
        let inner = self.inner.read().await;
        HubStats {
            connected_users: inner
                .connections
                .values()
                .filter(|c| c.user.is_some())
                .count(),
            active_pages: inner.rooms.len(),
        }
    }
}

impl Default for CollabHub {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::mpsc::error::TryRecvError;

    async fn joined(
        hub: &CollabHub,
        user_id: &str,
        name: &str,
        page_id: &str,
    ) -> (String, UnboundedReceiver<ServerEvent>) {
        let (conn, rx) = hub.register().await;
        hub.authenticate(&conn, user_id, name).await;
        hub.join_page(&conn, page_id).await;
        (conn, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return events,
            }
        }
    }

    #[tokio::test]
    async fn test_join_requires_authentication() {
        let hub = CollabHub::new();
        let (conn, mut rx) = hub.register().await;

        hub.join_page(&conn, "p1").await;
        assert_eq!(
            drain(&mut rx),
            [ServerEvent::Error {
                message: "Authentication required".to_string()
            }]
        );
        assert_eq!(hub.stats().await.active_pages, 0);

        // The connection stays usable.
        hub.authenticate(&conn, "u1", "Aoi").await;
        hub.join_page(&conn, "p1").await;
        assert_eq!(
            drain(&mut rx),
            [ServerEvent::PageUsers { users: Vec::new() }]
        );
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members_only() {
        let hub = CollabHub::new();
        let (_first, mut first_rx) = joined(&hub, "u1", "Aoi", "p1").await;
        drain(&mut first_rx);

        let (_second, mut second_rx) = joined(&hub, "u2", "Rin", "p1").await;

        // The pre-existing member hears about the join, with the post-join
        // count.
        assert_eq!(
            drain(&mut first_rx),
            [ServerEvent::UserJoined {
                user: RoomUser {
                    id: "u2".to_string(),
                    name: "Rin".to_string()
                },
                users_in_page: 2,
            }]
        );

        // The joiner's reply lists exactly the occupants that were already
        // there, not itself.
        assert_eq!(
            drain(&mut second_rx),
            [ServerEvent::PageUsers {
                users: vec![RoomUser {
                    id: "u1".to_string(),
                    name: "Aoi".to_string()
                }],
            }]
        );
    }

    #[tokio::test]
    async fn test_rejoin_auto_leaves_previous_room() {
        let hub = CollabHub::new();
        let (_a, mut a_rx) = joined(&hub, "u1", "Aoi", "p1").await;
        let (b, mut b_rx) = joined(&hub, "u2", "Rin", "p1").await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.join_page(&b, "p2").await;

        let events = drain(&mut a_rx);
        assert_eq!(
            events,
            [ServerEvent::UserLeft {
                user: RoomUser {
                    id: "u2".to_string(),
                    name: "Rin".to_string()
                },
                users_in_page: 1,
            }]
        );
        let stats = hub.stats().await;
        assert_eq!(stats.active_pages, 2);
    }

    #[tokio::test]
    async fn test_relay_excludes_sender() {
        let hub = CollabHub::new();
        let (a, mut a_rx) = joined(&hub, "u1", "Aoi", "p1").await;
        let (_b, mut b_rx) = joined(&hub, "u2", "Rin", "p1").await;
        let (_c, mut c_rx) = joined(&hub, "u3", "Saki", "p1").await;
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);

        hub.relay_block_operation(
            &a,
            ClientOperation {
                kind: "block_updated".to_string(),
                data: json!({ "id": "b1" }),
            },
        )
        .await;

        assert!(drain(&mut a_rx).is_empty(), "no self-echo");
        for rx in [&mut b_rx, &mut c_rx] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            match &events[0] {
                ServerEvent::BlockOperation(broadcast) => {
                    assert_eq!(broadcast.page_id, "p1");
                    assert_eq!(broadcast.user_id.as_deref(), Some("u1"));
                    assert_eq!(
                        broadcast.data,
                        json!({ "type": "block_updated", "data": { "id": "b1" } })
                    );
                    assert!(broadcast.timestamp > 0);
                }
                other => panic!("expected block_operation, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_relay_requires_room() {
        let hub = CollabHub::new();
        let (conn, mut rx) = hub.register().await;
        hub.authenticate(&conn, "u1", "Aoi").await;

        hub.relay_block_operation(
            &conn,
            ClientOperation {
                kind: "block_updated".to_string(),
                data: Value::Null,
            },
        )
        .await;
        hub.relay_cursor(&conn, None, None).await;

        assert_eq!(
            drain(&mut rx),
            [
                ServerEvent::Error {
                    message: "Must join a page first".to_string()
                },
                ServerEvent::Error {
                    message: "Must join a page first".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_cursor_relay_carries_envelope() {
        let hub = CollabHub::new();
        let (a, mut a_rx) = joined(&hub, "u1", "Aoi", "p1").await;
        let (_b, mut b_rx) = joined(&hub, "u2", "Rin", "p1").await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.relay_cursor(&a, Some("b1".to_string()), Some(12)).await;

        assert!(drain(&mut a_rx).is_empty());
        let events = drain(&mut b_rx);
        match &events[..] {
            [ServerEvent::CursorUpdate(broadcast)] => {
                assert_eq!(broadcast.page_id, "p1");
                assert_eq!(broadcast.user_id.as_deref(), Some("u1"));
                assert_eq!(
                    broadcast.data,
                    json!({ "userName": "Aoi", "blockId": "b1", "position": 12 })
                );
            }
            other => panic!("expected cursor_update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_broadcast_reaches_all_members() {
        let hub = CollabHub::new();
        let (_a, mut a_rx) = joined(&hub, "u1", "Aoi", "p1").await;
        let (_b, mut b_rx) = joined(&hub, "u2", "Rin", "p1").await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.broadcast_store_event(
            "p1",
            StoreEventKind::BlockCreated,
            json!({ "id": "b1" }),
            Some("u1".to_string()),
        )
        .await;

        for rx in [&mut a_rx, &mut b_rx] {
            let events = drain(rx);
            match &events[..] {
                [ServerEvent::BlockCreated(broadcast)] => {
                    assert_eq!(broadcast.page_id, "p1");
                    assert_eq!(broadcast.user_id.as_deref(), Some("u1"));
                }
                other => panic!("expected block_created, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_disconnect_leaves_room_and_deregisters() {
        let hub = CollabHub::new();
        let (a, mut a_rx) = joined(&hub, "u1", "Aoi", "p1").await;
        let (_b, mut b_rx) = joined(&hub, "u2", "Rin", "p1").await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        hub.disconnect(&a).await;

        assert_eq!(
            drain(&mut b_rx),
            [ServerEvent::UserLeft {
                user: RoomUser {
                    id: "u1".to_string(),
                    name: "Aoi".to_string()
                },
                users_in_page: 1,
            }]
        );
        let stats = hub.stats().await;
        assert_eq!(stats.connected_users, 1);
        assert_eq!(stats.active_pages, 1);
    }

    #[tokio::test]
    async fn test_empty_room_is_dropped() {
        let hub = CollabHub::new();
        let (a, _a_rx) = joined(&hub, "u1", "Aoi", "p1").await;
        hub.leave_page(&a, "p1").await;
        assert_eq!(hub.stats().await.active_pages, 0);
    }
}
