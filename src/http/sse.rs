//! Server-Sent Events framing for agent streaming (section 6):
//! `data: <json>\n\n`, terminated by `data: [DONE]\n\n`. Comments (`: ...`)
//! and blank lines are ignored by consumers.

use serde_json::Value;

/// Encodes `events` as an SSE stream, appending the `[DONE]` terminator.
#[must_use]
pub fn encode_sse(events: &[Value]) -> String {
    let mut out = String::new();
    for event in events {
        out.push_str("data: ");
        out.push_str(&event.to_string());
        out.push_str("\n\n");
    }
    out.push_str("data: [DONE]\n\n");
    out
}

/// Decodes an SSE stream back into its event payloads, stopping at the
/// `[DONE]` terminator (and not including it in the result). Comment lines
/// (`:...`) and blank lines are ignored.
#[must_use]
pub fn decode_sse(stream: &str) -> Vec<Value> {
    let mut events = Vec::new();
    for line in stream.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let Some(payload) = line.strip_prefix("data:") else { continue };
        let payload = payload.trim();
        if payload == "[DONE]" {
            break;
        }
        if let Ok(value) = serde_json::from_str::<Value>(payload) {
            events.push(value);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_preserves_events() {
        let events = vec![json!({"type": "step", "action": "searching", "query": "q"})];
        let encoded = encode_sse(&events);
        let decoded = decode_sse(&encoded);
        assert_eq!(decoded, events);
    }

    #[test]
    fn decodes_concrete_scenario_from_spec() {
        let stream = "data: {\"type\":\"step\",\"action\":\"searching\",\"query\":\"q\"}\n\ndata: [DONE]\n\n";
        let decoded = decode_sse(stream);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["type"], "step");
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let stream = ": heartbeat\n\ndata: {\"type\":\"chunk\"}\n\ndata: [DONE]\n\n";
        let decoded = decode_sse(stream);
        assert_eq!(decoded.len(), 1);
    }
}
