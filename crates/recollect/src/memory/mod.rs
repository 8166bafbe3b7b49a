//! Observation log model and everything that reads or writes it.
//!
//! - [`types`]: [`SessionMemory`], [`ObservationGroup`], [`ObservationEntry`].
//! - [`merge`]: date-keyed, order-preserving merge of two logs.
//! - [`render`]: the canonical text form of a log, and of a message slice.
//! - [`legacy`]: reparse of the older plain-text log format.
//! - [`store`]: the [`MemoryStore`] trait with file and in-memory backends.

pub mod legacy;
pub mod merge;
pub mod render;
pub mod store;
pub mod types;

pub use legacy::parse_legacy_log;
pub use merge::merge;
pub use render::{render_observations, render_transcript};
pub use store::{FileStore, InMemoryStore, MemoryStore};
pub use types::{
    ObservationEntry, ObservationGroup, Priority, SessionMemory, entry_count,
    is_structurally_empty,
};
