use super::state::{RelayEvent, RelayStateMachine};
use crate::{
    Error, Result,
    upstream::{ChunkStream, GenerateParams, InferenceBackend},
};
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Chunks held between the upstream reader and the client writer. Small, so a
/// slow client applies backpressure to the upstream instead of piling up.
const RELAY_CHANNEL_CAPACITY: usize = 16;

type RelayItem = io::Result<Bytes>;

/// Bridges one client connection to one upstream streaming generate call.
pub struct StreamingRelay {
    backend: Arc<dyn InferenceBackend>,
    first_chunk_timeout: Duration,
}

impl StreamingRelay {
    pub fn new(backend: Arc<dyn InferenceBackend>, first_chunk_timeout: Duration) -> Self {
        Self {
            backend,
            first_chunk_timeout,
        }
    }

    /// Opens the upstream stream and waits for its first chunk.
    ///
    /// Any failure up to that point is returned as an error, so the caller can
    /// still answer with a JSON error instead of an event stream. Once this
    /// returns `Ok`, the relay task owns the upstream side and the returned
    /// body owns the client side.
    pub async fn open(&self, params: GenerateParams) -> Result<RelayBody> {
        let mut machine = RelayStateMachine::new(Uuid::new_v4().to_string());
        machine.transition(RelayEvent::UpstreamRequested)?;
        info!("Relay {} opening stream for model {}", machine.id(), params.model);

        let (upstream, first) = match self.first_chunk(&params).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Relay {} failed before first byte: {}", machine.id(), e);
                machine.transition(RelayEvent::UpstreamFailed)?;
                return Err(e);
            }
        };

        machine.transition(RelayEvent::HeadersCommitted)?;

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
        tokio::spawn(pump(machine, upstream, first, tx, token.clone()));

        Ok(RelayBody {
            rx,
            _cancel_on_drop: token.drop_guard(),
        })
    }

    async fn first_chunk(&self, params: &GenerateParams) -> Result<(ChunkStream, Option<Bytes>)> {
        tokio::time::timeout(self.first_chunk_timeout, self.open_upstream(params))
            .await
            .map_err(|_| Error::Timeout {
                timeout_ms: self.first_chunk_timeout.as_millis() as u64,
            })?
    }

    async fn open_upstream(&self, params: &GenerateParams) -> Result<(ChunkStream, Option<Bytes>)> {
        let mut upstream = self.backend.generate_stream(params).await?;
        match upstream.next().await {
            Some(Ok(chunk)) => Ok((upstream, Some(chunk))),
            Some(Err(e)) => Err(e),
            None => Ok((upstream, None)),
        }
    }
}

/// Sends one item to the client unless the client has gone away first.
async fn deliver(tx: &mpsc::Sender<RelayItem>, token: &CancellationToken, item: RelayItem) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

async fn pump(
    mut machine: RelayStateMachine,
    mut upstream: ChunkStream,
    first: Option<Bytes>,
    tx: mpsc::Sender<RelayItem>,
    token: CancellationToken,
) {
    let event = match first {
        None => RelayEvent::UpstreamFinished,
        Some(chunk) => {
            machine.record_chunk(chunk.len());
            if deliver(&tx, &token, Ok(chunk)).await {
                relay_rest(&mut machine, &mut upstream, &tx, &token).await
            } else {
                RelayEvent::ClientDisconnected
            }
        }
    };

    // Release the upstream connection before anything else.
    drop(upstream);
    if event == RelayEvent::ClientDisconnected {
        debug!("Relay {} cancelled upstream after client disconnect", machine.id());
    }

    if let Err(e) = machine.transition(event) {
        warn!("Relay {} ended in an unexpected state: {}", machine.id(), e);
    }
}

async fn relay_rest(
    machine: &mut RelayStateMachine,
    upstream: &mut ChunkStream,
    tx: &mpsc::Sender<RelayItem>,
    token: &CancellationToken,
) -> RelayEvent {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return RelayEvent::ClientDisconnected,
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                machine.record_chunk(chunk.len());
                if !deliver(tx, token, Ok(chunk)).await {
                    return RelayEvent::ClientDisconnected;
                }
            }
            Some(Err(e)) => {
                // Headers are already out; the client only sees the connection drop.
                warn!("Relay {} upstream failed mid-stream: {}", machine.id(), e);
                deliver(tx, token, Err(io::Error::other(e.to_string()))).await;
                return RelayEvent::UpstreamFailed;
            }
            None => return RelayEvent::UpstreamFinished,
        }
    }
}

/// Client half of a relay. Dropping it (client disconnect) cancels the
/// upstream half.
pub struct RelayBody {
    rx: mpsc::Receiver<RelayItem>,
    _cancel_on_drop: DropGuard,
}

impl Stream for RelayBody {
    type Item = RelayItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl IntoResponse for RelayBody {
    fn into_response(self) -> Response {
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .header("x-accel-buffering", "no")
            .body(Body::from_stream(self))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}
