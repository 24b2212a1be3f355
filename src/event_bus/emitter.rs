use std::fmt;
use thiserror::Error;

use super::event::Event;

/// Trait representing an abstract event emitter that workers and the runner
/// can clone and hold.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    /// Emit an event in a synchronous, non-blocking manner.
    fn emit(&self, event: Event) -> Result<(), EmitterError>;
}

/// Errors that can occur when emitting an event.
///
/// Subscriber lag is absorbed inside the hub (slow sinks drop events and the
/// drops are counted); the only failure an emitter can observe is a hub with
/// nothing listening.
#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event hub closed")]
    Closed,
}
