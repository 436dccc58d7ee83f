//! WebSocket event grammar shared by the hub and the serve layer.
//!
//! Every outbound frame is a JSON object with a `type` tag and a `timestamp`;
//! [`stamp`] injects the timestamp when the producer did not set one.

mod event;
mod stamp;

pub use event::WsEvent;
pub use stamp::{stamp, utc_now_rfc3339};
