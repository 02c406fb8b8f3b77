//! Per-request drive shared by every protocol handler.
//!
//! One request flows through: decode inbound JSON, detect vision input,
//! convert to the upstream payload, fill the default model, validate
//! credentials (refreshing at most once), perform the upstream call, then
//! either translate the complete body or drive the streaming translation.
//!
//! The streaming drive owns the per-request adapter state and one partial
//! SSE frame's worth of buffered bytes; nothing else is buffered. Dropping
//! the returned stream cancels the upstream read.

use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream::BoxStream};

use crate::{
    adapter::ProtocolAdapter,
    error::{GatewayError, GatewayResult},
    server::RelayServer,
};

/// Result of dispatching one inbound request upstream.
pub(crate) enum Dispatched<A: ProtocolAdapter> {
    Unary(A::UnaryResponse),
    Stream(BoxStream<'static, A::Event>),
}

pub(crate) async fn dispatch<A: ProtocolAdapter>(
    server: &RelayServer,
    adapter: A,
    body: &[u8],
) -> GatewayResult<Dispatched<A>> {
    let request: A::Request = sonic_rs::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("failed to decode request body: {e}")))?;

    let streaming = adapter.wants_stream(&request);
    let vision = adapter.detect_vision(&request);

    let mut payload = adapter.convert_request(request);

    if payload.model.is_empty() {
        payload.model = server.model.current_model().id;
    }

    payload.stream = Some(streaming);

    let mut credentials = server.auth.token().await?;

    if credentials.expired {
        if server.auth.refresh().await {
            credentials = server.auth.token().await?;
        } else {
            return Err(GatewayError::Authentication(
                "Copilot token is expired and refresh failed".to_string(),
            ));
        }
    }

    log::debug!("Dispatching request for model {} (stream: {streaming})", payload.model);

    let response = server.upstream.chat_completions(&credentials, &payload, vision).await?;

    if streaming {
        Ok(Dispatched::Stream(translate_stream(adapter, response).boxed()))
    } else {
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Connection(format!("failed to read upstream response: {e}")))?;

        Ok(Dispatched::Unary(adapter.parse_response(&body)?))
    }
}

/// Turns the upstream byte stream into adapter-native events.
///
/// Chunks are appended to a byte buffer; only its valid UTF-8 prefix is
/// handed to the adapter, so multi-byte characters split across chunks
/// survive. At EOF the adapter drains once. Failures emit one final
/// adapter-native error frame and end the stream.
fn translate_stream<A: ProtocolAdapter>(adapter: A, response: reqwest::Response) -> impl Stream<Item = A::Event> {
    let upstream = Box::pin(response.bytes_stream());

    let initial = TranslateState {
        upstream,
        buffer: Vec::new(),
        state: A::State::default(),
        pending: VecDeque::new(),
        ended: false,
    };

    futures::stream::unfold(initial, move |mut drive| async move {
        loop {
            if let Some(event) = drive.pending.pop_front() {
                return Some((event, drive));
            }

            if drive.ended {
                return None;
            }

            match drive.upstream.next().await {
                Some(Ok(chunk)) => {
                    drive.buffer.extend_from_slice(&chunk);

                    let valid_length = match std::str::from_utf8(&drive.buffer) {
                        Ok(_) => drive.buffer.len(),
                        Err(error) => error.valid_up_to(),
                    };

                    let text = String::from_utf8_lossy(&drive.buffer[..valid_length]).into_owned();

                    match adapter.parse_stream_chunk(&text, &mut drive.state) {
                        Ok((events, rest)) => {
                            drive.pending.extend(events);

                            let mut next_buffer = rest.into_bytes();
                            next_buffer.extend_from_slice(&drive.buffer[valid_length..]);
                            drive.buffer = next_buffer;
                        }
                        Err(error) => {
                            log::error!("Stream translation failed: {error}");
                            drive.pending.push_back(adapter.error_event(&error));
                            drive.ended = true;
                        }
                    }
                }
                Some(Err(error)) => {
                    log::error!("Upstream stream error: {error}");

                    let error = GatewayError::Connection(error.to_string());
                    drive.pending.push_back(adapter.error_event(&error));
                    drive.ended = true;
                }
                None => {
                    drive.pending.extend(adapter.finish_stream(&mut drive.state));
                    drive.ended = true;
                }
            }
        }
    })
}

struct TranslateState<S, St, E> {
    upstream: S,
    buffer: Vec<u8>,
    state: St,
    pending: VecDeque<E>,
    ended: bool,
}
