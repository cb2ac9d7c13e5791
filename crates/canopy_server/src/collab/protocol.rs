//! Event-shaped messages exchanged over the `/ws` endpoint.
//!
//! Frames are JSON text with a snake_case `type` tag and camelCase payload
//! fields. Every hub→room broadcast except `page_users` and `error` carries
//! the uniform [`RoomBroadcast`] envelope: page id, opaque data, optional
//! originating user, millisecond timestamp.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages a client may send to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Attach an identity to the connection. Idempotent; joins nothing.
    Authenticate {
        /// Opaque user id
        user_id: String,
        /// Display name shown to collaborators
        name: String,
    },
    /// Enter a page room (auto-leaves any current room first).
    JoinPage {
        /// Target page id
        page_id: String,
    },
    /// Leave a page room.
    LeavePage {
        /// Room page id
        page_id: String,
    },
    /// Relay a realtime block operation to the rest of the room.
    BlockOperation {
        /// The peer-originated operation, passed through opaquely
        operation: ClientOperation,
    },
    /// Share a cursor position with the rest of the room.
    CursorUpdate {
        /// Page the cursor is on
        page_id: String,
        /// Block the cursor is in, if any
        #[serde(default)]
        block_id: Option<String>,
        /// Offset within the block, if any
        #[serde(default)]
        position: Option<i64>,
    },
}

/// A peer-originated operation: a type tag plus opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOperation {
    /// Operation kind (e.g. `block_updated`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque operation payload
    #[serde(default)]
    pub data: Value,
}

/// A connected, identified user as presented to the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    /// Opaque user id
    pub id: String,
    /// Display name
    pub name: String,
}

/// The uniform envelope carried by every room-wide broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomBroadcast {
    /// Room page id
    pub page_id: String,
    /// Event payload, opaque to the hub
    pub data: Value,
    /// Originating user, when one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Server time in milliseconds
    pub timestamp: i64,
}

/// Cursor payload relayed inside a [`RoomBroadcast`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorData {
    /// Display name of the pointing user
    pub user_name: String,
    /// Block the cursor is in, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    /// Offset within the block, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

/// Messages the hub may send to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Soft failure delivered only to the offending connection.
    Error {
        /// Human-readable reason
        message: String,
    },
    /// A user entered the room (sent to pre-existing members only).
    UserJoined {
        /// The joining user
        user: RoomUser,
        /// Occupant count after the join
        users_in_page: usize,
    },
    /// A user left the room (sent to remaining members).
    UserLeft {
        /// The departing user
        user: RoomUser,
        /// Occupant count after the leave
        users_in_page: usize,
    },
    /// Reply to the joiner: the occupants that were already present.
    PageUsers {
        /// Pre-existing room occupants (excluding the joiner)
        users: Vec<RoomUser>,
    },
    /// A peer's realtime operation, relayed to the room minus the sender.
    BlockOperation(RoomBroadcast),
    /// A peer's cursor position, relayed to the room minus the sender.
    CursorUpdate(RoomBroadcast),
    /// A page mutation accepted by the store.
    PageUpdated(RoomBroadcast),
    /// A block created through the store.
    BlockCreated(RoomBroadcast),
    /// A block updated through the store.
    BlockUpdated(RoomBroadcast),
    /// A block soft-deleted through the store.
    BlockDeleted(RoomBroadcast),
}

/// The store-originated event kinds a repository mutation can broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEventKind {
    /// Page created/updated/deleted/moved
    PageUpdated,
    /// Block created or duplicated
    BlockCreated,
    /// Block updated or moved
    BlockUpdated,
    /// Block soft-deleted
    BlockDeleted,
}

impl StoreEventKind {
    /// Wrap an envelope in the matching wire event.
    pub fn into_event(self, broadcast: RoomBroadcast) -> ServerEvent {
        match self {
            StoreEventKind::PageUpdated => ServerEvent::PageUpdated(broadcast),
            StoreEventKind::BlockCreated => ServerEvent::BlockCreated(broadcast),
            StoreEventKind::BlockUpdated => ServerEvent::BlockUpdated(broadcast),
            StoreEventKind::BlockDeleted => ServerEvent::BlockDeleted(broadcast),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_tags_and_fields() {
        let event: ClientEvent = serde_json::from_value(json!({
            "type": "authenticate",
            "userId": "u1",
            "name": "Aoi"
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Authenticate {
                user_id: "u1".to_string(),
                name: "Aoi".to_string()
            }
        );

        let event: ClientEvent = serde_json::from_value(json!({
            "type": "block_operation",
            "operation": { "type": "block_updated", "data": { "id": "b1" } }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::BlockOperation {
                operation: ClientOperation {
                    kind: "block_updated".to_string(),
                    data: json!({ "id": "b1" }),
                }
            }
        );
    }

    #[test]
    fn test_server_event_envelope_shape() {
        let event = ServerEvent::BlockCreated(RoomBroadcast {
            page_id: "p1".to_string(),
            data: json!({ "id": "b1" }),
            user_id: Some("u1".to_string()),
            timestamp: 1_700_000_000_000,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "block_created",
                "pageId": "p1",
                "data": { "id": "b1" },
                "userId": "u1",
                "timestamp": 1_700_000_000_000_i64
            })
        );
    }

    #[test]
    fn test_presence_events_use_camel_case_count() {
        let event = ServerEvent::UserJoined {
            user: RoomUser {
                id: "u2".to_string(),
                name: "Rin".to_string(),
            },
            users_in_page: 2,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "user_joined",
                "user": { "id": "u2", "name": "Rin" },
                "usersInPage": 2
            })
        );
    }

    #[test]
    fn test_anonymous_broadcast_omits_user() {
        let event = ServerEvent::PageUpdated(RoomBroadcast {
            page_id: "p1".to_string(),
            data: json!({}),
            user_id: None,
            timestamp: 1,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("userId").is_none());
    }
}
