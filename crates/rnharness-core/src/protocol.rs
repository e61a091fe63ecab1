//! Messages exchanged between the coordinator and the test app.
//!
//! The protocol is line-based JSON over TCP: every message is a single JSON
//! object followed by `\n`, discriminated by a `type` tag.
//!
//! ```text
//! app                              runner
//!  | --- {"type":"Hello","id":"ios"} -->|
//!  |<-- {"type":"Run"} -----------------|   (or Rejected + close)
//!  | --- {"type":"TestPassed",...} ---->|
//!  | --- {"type":"End","failures":0} -->|
//! ```

use serde::{Deserialize, Serialize};

/// A message sent by the app to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message on every connection; `id` must match the coordinator id.
    Hello { id: String },

    /// A suite started running.
    SuiteStarted { title: String },

    /// A test passed.
    TestPassed { title: String },

    /// A test failed.
    TestFailed { title: String, error: String },

    /// A test was skipped.
    TestPending { title: String },

    /// The run finished.
    End { failures: u32 },
}

/// A message sent by the coordinator to the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// The app was accepted and should start running its tests.
    Run,

    /// The app announced the wrong id; the connection is closed afterwards.
    Rejected { reason: String },
}

/// Serializes a message as a single protocol line, including the trailing newline.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    Ok(serde_json::to_string(message)? + "\n")
}

/// Parses one protocol line. Surrounding whitespace is ignored.
pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(line.trim())
}
