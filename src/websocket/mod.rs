//! WebSocket Real-Time Streaming
//!
//! Pushes pipeline events to every connected viewer.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Holds the live connection set and fans events out
//! - **Handler**: Handles WebSocket upgrade and the per-socket writer task
//! - **Messages**: Event envelopes and viewer control messages
//!
//! Viewers connect to `/ws` and receive every event; there are no topic
//! subscriptions. Delivery is best-effort with no acknowledgement.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:3001/ws');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'occupancy') console.log(msg.deviceId, msg.state, msg.zones);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, ConnectionId, Frame, HubConfig, HubError};
pub use messages::{ClientMessage, ServerMessage};
