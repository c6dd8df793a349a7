//! Event-stream framing and classification.
//!
//! The response body arrives as arbitrary byte chunks. [`line_stream`] turns
//! it into complete text lines, and [`classify`] turns each line into at most
//! one [`StreamEvent`]. Classification never fails: anything unrecognizable
//! becomes [`StreamEvent::Skip`].

use std::fmt::Display;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::{ChatCompletionChunk, ChunkPayload, StreamEvent};

/// Prefix of every event line.
pub const EVENT_PREFIX: &str = "data:";
/// Payload that marks the end of the event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

// ─── Line framing ────────────────────────────────────────────────────────────

/// Split a body byte stream into lines.
///
/// Bytes are buffered until a line terminator arrives, so multi-byte
/// characters split across network chunks decode correctly. `\n`, `\r` and
/// `\r\n` all end a line; a `\r\n` split across chunks still counts once. A
/// final line without a terminator is still yielded when the body closes.
///
/// Each wait for the next chunk is bounded by `read_timeout`. The stream ends
/// after the first error.
pub fn line_stream<S, B, E>(
    byte_stream: S,
    read_timeout: Duration,
) -> impl Stream<Item = Result<String, InferenceError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = LineState {
        byte_stream,
        buffer: Vec::new(),
        closed: false,
        failed: false,
        skip_lf: false,
    };

    stream::unfold(state, move |mut state| async move {
        if state.failed {
            return None;
        }
        loop {
            // The previous line ended with `\r`; swallow the `\n` of a CRLF pair
            if state.skip_lf && !state.buffer.is_empty() {
                if state.buffer[0] == b'\n' {
                    state.buffer.drain(..1);
                }
                state.skip_lf = false;
            }

            // Check if we have a complete line in the buffer
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') {
                let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                state.skip_lf = raw.last() == Some(&b'\r');
                return Some((Ok(decode_line(&raw)), state));
            }

            if state.closed {
                if state.buffer.is_empty() {
                    return None;
                }
                let raw = std::mem::take(&mut state.buffer);
                return Some((Ok(decode_line(&raw)), state));
            }

            // Need more data from the stream
            match tokio::time::timeout(read_timeout, state.byte_stream.next()).await {
                Ok(Some(Ok(bytes))) => state.buffer.extend_from_slice(bytes.as_ref()),
                Ok(Some(Err(e))) => {
                    state.failed = true;
                    let err = InferenceError::StreamError {
                        reason: format!("stream read error: {e}"),
                    };
                    return Some((Err(err), state));
                }
                Ok(None) => state.closed = true,
                Err(_) => {
                    state.failed = true;
                    let err = InferenceError::Timeout {
                        duration: read_timeout,
                    };
                    return Some((Err(err), state));
                }
            }
        }
    })
}

struct LineState<S> {
    byte_stream: S,
    buffer: Vec<u8>,
    closed: bool,
    failed: bool,
    skip_lf: bool,
}

fn decode_line(raw: &[u8]) -> String {
    let line = raw
        .strip_suffix(b"\n")
        .or_else(|| raw.strip_suffix(b"\r"))
        .unwrap_or(raw);
    String::from_utf8_lossy(line).into_owned()
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Classify one line of the event stream.
///
/// Lines without the `data:` prefix are skipped. The payload is parsed as a
/// chunk; the first choice's `delta` is preferred over its `message`. A
/// non-null `reasoning_content` wins over `content`, so a line yields at most
/// one fragment.
pub fn classify(line: &str) -> StreamEvent {
    let Some(payload) = line.strip_prefix(EVENT_PREFIX) else {
        return StreamEvent::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return StreamEvent::Done;
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(error = %e, "error parsing streaming chunk, skipping");
            return StreamEvent::Skip;
        }
    };

    let Some(choice) = chunk.choices.and_then(|choices| choices.into_iter().next()) else {
        return StreamEvent::Skip;
    };

    match choice.delta.or(choice.message) {
        Some(ChunkPayload {
            reasoning_content: Some(text),
            ..
        }) => StreamEvent::Reasoning(text),
        Some(ChunkPayload {
            content: Some(text),
            ..
        }) => StreamEvent::Answer(text),
        _ => StreamEvent::Skip,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
