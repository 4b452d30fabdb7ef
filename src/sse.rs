//! Server-sent-events framing for subscription streams.
//!
//! The HTTP layer writes [`PREAMBLE`] once, then one [`encode`]d frame per
//! event, and [`KEEP_ALIVE`] while idle.

use crate::event::EventEnvelope;

/// Reconnect hint sent when a stream opens.
pub const PREAMBLE: &str = "retry: 5000\n\n";

/// Comment frame used as a keep-alive ping.
pub const KEEP_ALIVE: &str = ":\n\n";

/// Renders one envelope as an `event:`/`data:` frame.
pub fn encode(envelope: &EventEnvelope) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(&envelope.data)?;
    Ok(format!("event: {}\ndata: {}\n\n", envelope.name, data))
}
