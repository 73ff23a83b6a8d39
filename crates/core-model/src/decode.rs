// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Decoding helpers for the OpenAI-compatible `/v1/chat/completions` wire
//! format, shared by the streaming and non-streaming call paths.

use serde_json::Value;

use crate::error::UpstreamError;
use crate::types::ResponseEvent;

/// Extract `choices[0].message.content` from a non-streaming response body.
pub fn extract_message_content(body: &Value) -> Result<String, UpstreamError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            UpstreamError::MalformedFrame(format!(
                "missing choices[0].message.content in {body}"
            ))
        })
}

/// Parse one SSE `data: ...` line into a [`ResponseEvent`].
///
/// Returns `None` for blank lines, comments, or lines carrying no usable
/// delta (so the caller can simply skip forwarding them).
fn parse_sse_data_line(line: &str) -> Option<Result<ResponseEvent, UpstreamError>> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(ResponseEvent::Done));
    }
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(UpstreamError::MalformedFrame(e.to_string()))),
    };

    let delta = v["choices"][0]["delta"]["content"].as_str();
    match delta {
        Some(text) if !text.is_empty() => Some(Ok(ResponseEvent::TextDelta(text.to_string()))),
        _ => None,
    }
}

/// Drain every complete `\n`-terminated line from `buf`, leaving any trailing
/// partial line (not yet terminated by the upstream) for the next chunk.
///
/// SSE events can be split across TCP segments; this lets the caller feed
/// arbitrarily-chunked bytes in and still only decode complete lines.
pub fn drain_complete_lines(buf: &mut String) -> Vec<Result<ResponseEvent, UpstreamError>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_non_stream_content() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "hello there"}}]
        });
        assert_eq!(extract_message_content(&body).unwrap(), "hello there");
    }

    #[test]
    fn missing_content_is_malformed_frame() {
        let body = serde_json::json!({"choices": []});
        assert!(extract_message_content(&serde_json::json!({})).is_err());
        let _ = body;
    }

    #[test]
    fn drains_only_complete_lines() {
        let mut buf = String::from("data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n");
        let events = drain_complete_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Ok(ResponseEvent::TextDelta(t)) if t == "He"));
        assert!(buf.is_empty());
    }

    #[test]
    fn leaves_partial_trailing_line_in_buffer() {
        let mut buf = String::from("data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\ndata: {\"cho");
        let events = drain_complete_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert_eq!(buf, "data: {\"cho");
    }

    #[test]
    fn done_sentinel_becomes_done_event() {
        let mut buf = String::from("data: [DONE]\n");
        let events = drain_complete_lines(&mut buf);
        assert!(matches!(events[0], Ok(ResponseEvent::Done)));
    }

    #[test]
    fn empty_delta_is_skipped() {
        let mut buf = String::from("data: {\"choices\":[{\"delta\":{}}]}\n");
        let events = drain_complete_lines(&mut buf);
        assert!(events.is_empty());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let mut buf = String::from("\n: keep-alive\n");
        let events = drain_complete_lines(&mut buf);
        assert!(events.is_empty());
    }
}
