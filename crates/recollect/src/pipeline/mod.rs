//! The compression pipeline.
//!
//! - [`apply`]: [`Observer`], the per-turn apply engine.
//! - [`coordinator`]: [`Coordinator`], single-flight background jobs and the
//!   pending-results cache.
//! - [`job`]: the background job itself (extract, merge, condense).
//! - [`events`]: [`ObserverEvent`] and the [`EventHandler`] implementations.

pub mod apply;
pub mod coordinator;
pub mod events;
pub mod job;

pub use apply::{Observer, TurnOutcome};
pub use coordinator::{Coordinator, PendingResult};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    ObserverEvent,
};
pub use job::JobOutcome;
