//! Realtime collaboration: wire protocol and the hub that routes it.

mod hub;
mod protocol;

pub use hub::{CollabHub, HubStats};
pub use protocol::{
    ClientEvent, ClientOperation, CursorData, RoomBroadcast, RoomUser, ServerEvent, StoreEventKind,
};
