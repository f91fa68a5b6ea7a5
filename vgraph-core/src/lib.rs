//! VectorGraph core - decoding and data preparation for graph ingestion.
//!
//! This crate holds the synchronous half of the ingestion pipeline: the wire
//! codec for VectorGraph messages, semantic type inference, initial layout
//! seeding, degree-based defaults, and mapper profiles that bind attributes
//! to visual channels. The async stage driver lives in `vgraph-loader`.
//!
//! # Features
//!
//! - **Wire codec**: Decode and validate VectorGraph v0/v1 messages
//! - **Type inference**: Detect date and colour columns by name and sample
//! - **Layout seeding**: Pack weakly connected components into a grid
//! - **Defaults**: Degree-based point sizes and community labels
//! - **Mappers**: Named profiles routing attributes to visual channels
//!
//! # Usage
//!
//! ```no_run
//! use rand::SeedableRng;
//! use vgraph_core::{layout, wire};
//!
//! # fn run(bytes: &[u8]) -> Result<(), wire::DecodeError> {
//! let graph = wire::decode(bytes)?;
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let positions = layout::seed_positions(graph.vertex_count as usize, &graph.edges, &mut rng);
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod defaults;
pub mod infer;
pub mod layout;
pub mod mapper;
pub mod metadata;
pub mod normalize;
pub mod types;
pub mod wire;

pub use mapper::{BindingWarning, Channel, LoaderEntry, ResolvedLoaders};
pub use metadata::SidecarMetadata;
pub use types::{AttributeColumn, AttributeTarget, Position, SemanticType, Values, VectorGraph};
pub use wire::DecodeError;

/// Get the version of vgraph-core.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
