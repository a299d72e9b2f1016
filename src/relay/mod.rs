pub mod bridge;
pub mod state;

pub use bridge::{RelayBody, StreamingRelay};
pub use state::{RelayEvent, RelayState, RelayStateMachine};
