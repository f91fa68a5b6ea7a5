//! VectorGraph loader - staged ingestion of vector graphs into a session.
//!
//! This library provides:
//! - The decode pipeline and its stage chain
//! - Collaborator traits for the rendering session and dataframe
//! - Channel loaders writing bound attributes into the session
//! - An in-memory session for tools and tests

pub mod config;
pub mod error;
pub mod loaders;
pub mod memory;
pub mod pipeline;
pub mod session;

pub use error::{LoadError, LoadResult, SessionError, SessionResult};
pub use memory::MemorySession;
pub use pipeline::{load, Loaded, PipelineOptions, Stage};
pub use session::{BroadcastNotifier, Dataframe, LoadEvent, Notifier, Session};
