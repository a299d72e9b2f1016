use crate::{Error, Result};
use tracing::{debug, info, warn};

// Relay states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    HeadersPending,
    Streaming,
    Completed,
    ClientAborted,
    UpstreamFailedEarly,
    UpstreamFailedMidStream,
}

// Relay events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    UpstreamRequested,
    /// Event-stream headers go out; happens once, at the first byte.
    HeadersCommitted,
    UpstreamFinished,
    UpstreamFailed,
    ClientDisconnected,
}

pub struct RelayStateMachine {
    id: String,
    state: RelayState,
    chunks_relayed: u64,
    bytes_relayed: u64,
}

impl RelayStateMachine {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RelayState::Idle,
            chunks_relayed: 0,
            bytes_relayed: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current_state(&self) -> RelayState {
        self.state
    }

    pub fn transition(&mut self, event: RelayEvent) -> Result<RelayState> {
        let old_state = self.state;
        debug!("Relay {} processing event {:?} in state {:?}", self.id, event, old_state);

        let new_state = match (old_state, event) {
            (RelayState::Idle, RelayEvent::UpstreamRequested) => RelayState::HeadersPending,
            (RelayState::HeadersPending, RelayEvent::HeadersCommitted) => RelayState::Streaming,
            (RelayState::HeadersPending, RelayEvent::UpstreamFailed) => {
                RelayState::UpstreamFailedEarly
            }
            (RelayState::Streaming, RelayEvent::UpstreamFinished) => RelayState::Completed,
            (RelayState::Streaming, RelayEvent::UpstreamFailed) => {
                RelayState::UpstreamFailedMidStream
            }
            (RelayState::Streaming, RelayEvent::ClientDisconnected) => RelayState::ClientAborted,
            _ => {
                warn!(
                    "Invalid relay transition from {:?} with event {:?}",
                    old_state, event
                );
                return Err(Error::internal(format!(
                    "invalid relay transition: {:?} on {:?}",
                    event, old_state
                )));
            }
        };

        if self.is_terminal_state(new_state) {
            info!(
                "Relay {} finished: {:?} -> {:?} after {} chunks / {} bytes",
                self.id, old_state, new_state, self.chunks_relayed, self.bytes_relayed
            );
        } else {
            debug!("Relay {} state transition: {:?} -> {:?}", self.id, old_state, new_state);
        }

        self.state = new_state;
        Ok(new_state)
    }

    pub fn record_chunk(&mut self, len: usize) {
        self.chunks_relayed += 1;
        self.bytes_relayed += len as u64;
    }

    pub fn chunks_relayed(&self) -> u64 {
        self.chunks_relayed
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal_state(self.state)
    }

    fn is_terminal_state(&self, state: RelayState) -> bool {
        matches!(
            state,
            RelayState::Completed
                | RelayState::ClientAborted
                | RelayState::UpstreamFailedEarly
                | RelayState::UpstreamFailedMidStream
        )
    }
}
