// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const WS_REJECTED: &str = "ws.rejected";
pub const AUTH_LOCKOUT: &str = "auth.lockout";
pub const EVENT_RECEIVED: &str = "event.received";
pub const EVENT_REJECTED: &str = "event.rejected";
pub const EVENT_DROPPED: &str = "event.dropped";
pub const MESSAGE_SENT: &str = "message.sent";
pub const MESSAGE_EDITED: &str = "message.edited";
pub const MESSAGE_DELETED: &str = "message.deleted";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_DELETED: &str = "room.deleted";
