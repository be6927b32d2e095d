//! Plain-text chat export

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::store::StoredMessage;
use crate::types::RoomName;

/// Day-first timestamp layout used in exports, rendered in UTC
const TIMESTAMP_FORMAT: &str = "%d.%m.%Y, %H:%M:%S";

const RULE_WIDTH: usize = 50;

/// Requested date range as given by the client
#[derive(Debug, Clone, Copy, Default)]
pub struct Period<'a> {
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Render messages (oldest first) as a text document
///
/// The period line is only written when `period` is given. Messages with
/// readers get a `(Read by: ...)` suffix.
pub fn render_text(
    room: &RoomName,
    messages: &[StoredMessage],
    period: Option<Period<'_>>,
    exported_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();

    // writing to a String cannot fail
    let _ = writeln!(out, "Chat Export - Room: {}", room);
    let _ = writeln!(out, "Exported at: {}", format_timestamp(exported_at));
    if let Some(period) = period {
        let _ = writeln!(
            out,
            "Period: {} to {}",
            period.start.unwrap_or("beginning"),
            period.end.unwrap_or("end")
        );
    }
    out.push_str(&"=".repeat(RULE_WIDTH));
    out.push_str("\n\n");

    for msg in messages {
        let _ = write!(
            out,
            "[{}] {}: {}",
            format_timestamp(msg.created_at),
            msg.author,
            msg.content
        );
        if !msg.read_by.is_empty() {
            let _ = write!(out, " (Read by: {})", msg.read_by.join(", "));
        }
        out.push('\n');
    }

    out
}

/// Attachment file name, e.g. `chat-export-lobby-1700000000000.txt`
pub fn file_name(prefix: &str, room: &RoomName, at: DateTime<Utc>) -> String {
    let room: String = room
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{}-{}.txt", prefix, room, at.timestamp_millis())
}
