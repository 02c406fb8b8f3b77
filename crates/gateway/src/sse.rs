//! Splitting of the upstream Server-Sent-Events byte stream into `data:` payloads.
//!
//! Upstream frames are separated by a blank line. A JSON payload can never
//! contain a literal blank line because JSON strings escape newlines, so
//! splitting on `\n\n` is safe. The tail after the last separator is an
//! incomplete frame and is handed back to the caller for the next chunk.

/// One payload carried by a complete SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SsePayload {
    /// A `data:` line carrying a JSON-encoded upstream frame.
    Data(String),
    /// The `data: [DONE]` stream terminator.
    Done,
}

/// Splits complete frames off the front of `buffer`.
///
/// Returns the payloads of every complete frame in arrival order and the
/// remaining unterminated tail. Empty frames and non-`data:` lines are
/// skipped silently.
pub(crate) fn split_frames(buffer: &str) -> (Vec<SsePayload>, String) {
    let mut payloads = Vec::new();
    let mut rest = buffer;

    while let Some(position) = rest.find("\n\n") {
        let frame = &rest[..position];
        rest = &rest[position + 2..];

        for line in frame.lines() {
            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };

            if payload == "[DONE]" {
                payloads.push(SsePayload::Done);
            } else {
                payloads.push(SsePayload::Data(payload.to_string()));
            }
        }
    }

    (payloads, rest.to_string())
}
