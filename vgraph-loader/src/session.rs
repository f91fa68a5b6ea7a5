//! Collaborator interfaces the loader writes into.
//!
//! A rendering session owns the dataframe, the computed column manager and
//! the simulation buffers. The loader only talks to it through these traits
//! so the same pipeline can drive a real renderer or the in-memory session
//! used by the CLI and tests.

use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::trace;
use vgraph_core::{AttributeColumn, Position, SemanticType, SidecarMetadata, Values};

use crate::error::{SessionError, SessionResult};

/// Buffer holding render-side columns.
pub const LOCAL_BUFFER: &str = "localBuffer";
/// Buffer holding host-side columns, including the edge permutations.
pub const HOST_BUFFER: &str = "hostBuffer";

/// Element counts the client should allocate for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AllocationHint {
    pub point: usize,
    pub edge: usize,
}

/// Events published while a load is in progress.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    /// Human readable progress message
    LoadingStatus(String),
    /// Memory sizing hint, sent once before positions are bound
    SizesForAllocation(AllocationHint),
}

/// Fire-and-forget progress sink.
pub trait Notifier: Send + Sync {
    fn loading_status(&self, status: &str);

    fn sizes_for_allocation(&self, hint: AllocationHint);
}

/// Notifier that publishes [`LoadEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<LoadEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to load events.
    pub fn subscribe(&self) -> broadcast::Receiver<LoadEvent> {
        self.tx.subscribe()
    }

    fn broadcast(&self, event: LoadEvent) {
        trace!("Broadcasting {:?}", event);
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Notifier for BroadcastNotifier {
    fn loading_status(&self, status: &str) {
        self.broadcast(LoadEvent::LoadingStatus(status.to_string()));
    }

    fn sizes_for_allocation(&self, hint: AllocationHint) {
        self.broadcast(LoadEvent::SizesForAllocation(hint));
    }
}

/// A column written into a dataframe partition.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnValues {
    pub name: String,
    pub values: Values,
    pub value_type: SemanticType,
    pub number_per_graph_component: Option<u32>,
}

impl ColumnValues {
    pub fn new(name: impl Into<String>, values: Values, value_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            values,
            value_type,
            number_per_graph_component: None,
        }
    }

    pub fn per_component(mut self, count: u32) -> Self {
        self.number_per_graph_component = Some(count);
        self
    }
}

/// Everything the dataframe receives in one bulk load.
#[derive(Clone, Debug, Default)]
pub struct DataframeLoad {
    pub points: Vec<AttributeColumn>,
    pub edges: Vec<AttributeColumn>,
    pub vertex_count: usize,
    pub edge_count: usize,
    /// Channel name to the attribute bound by an encoding
    pub aliases: BTreeMap<String, String>,
    pub metadata: Option<SidecarMetadata>,
}

/// A column a computed column reads from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnRef {
    pub name: String,
    /// Partition (`point`, `edge`) or buffer name
    pub buffer: String,
}

impl ColumnRef {
    pub fn new(name: &str, buffer: &str) -> Self {
        Self {
            name: name.to_string(),
            buffer: buffer.to_string(),
        }
    }
}

/// How a computed column derives its values from its dependencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Derivation {
    /// Template placeholder; must be replaced before registering
    Unset,
    /// Copy the single dependency element by element
    Identity,
    /// Write every edge value twice, once per endpoint
    DuplicatePerEndpoint,
    /// Reorder values by the permutation in the second dependency
    PermuteByEdges,
}

impl Derivation {
    /// Evaluate against dependency values, given in dependency order.
    pub fn evaluate(&self, inputs: &[&Values]) -> SessionResult<Values> {
        match self {
            Derivation::Unset => Err(SessionError::Rejected(
                "computed column has no derivation".to_string(),
            )),
            Derivation::Identity => Ok(first(inputs)?.clone()),
            Derivation::DuplicatePerEndpoint => Ok(match first(inputs)? {
                Values::Number(v) => Values::Number(doubled(v)),
                Values::Text(v) => Values::Text(doubled(v)),
                Values::Bool(v) => Values::Bool(doubled(v)),
            }),
            Derivation::PermuteByEdges => {
                let values = first(inputs)?;
                let permutation = inputs
                    .get(1)
                    .and_then(|p| p.as_numbers())
                    .ok_or_else(|| {
                        SessionError::Rejected("edge permutation is missing".to_string())
                    })?;
                permute(values, permutation)
            }
        }
    }
}

fn first<'a>(inputs: &[&'a Values]) -> SessionResult<&'a Values> {
    inputs
        .first()
        .copied()
        .ok_or_else(|| SessionError::Rejected("computed column has no dependencies".to_string()))
}

fn doubled<T: Clone>(values: &[T]) -> Vec<T> {
    values
        .iter()
        .flat_map(|v| [v.clone(), v.clone()])
        .collect()
}

fn permute(values: &Values, permutation: &[f64]) -> SessionResult<Values> {
    if permutation.len() != values.len() {
        return Err(SessionError::LengthMismatch {
            name: "edge permutation".to_string(),
            expected: values.len(),
            actual: permutation.len(),
        });
    }
    let pick = |i: &f64| -> SessionResult<usize> {
        let index = *i as usize;
        if index < values.len() {
            Ok(index)
        } else {
            Err(SessionError::Rejected(format!("permutation index {} out of range", index)))
        }
    };
    Ok(match values {
        Values::Number(v) => Values::Number(
            permutation
                .iter()
                .map(|i| pick(i).map(|i| v[i]))
                .collect::<SessionResult<_>>()?,
        ),
        Values::Text(v) => Values::Text(
            permutation
                .iter()
                .map(|i| pick(i).map(|i| v[i].clone()))
                .collect::<SessionResult<_>>()?,
        ),
        Values::Bool(v) => Values::Bool(
            permutation
                .iter()
                .map(|i| pick(i).map(|i| v[i]))
                .collect::<SessionResult<_>>()?,
        ),
    })
}

/// Description of a column derived from other columns.
#[derive(Clone, Debug, PartialEq)]
pub struct ComputedColumnSpec {
    pub value_type: SemanticType,
    /// `point` or `edge`
    pub graph_component_type: String,
    pub filterable: bool,
    pub number_per_graph_component: u32,
    pub dependencies: Vec<ColumnRef>,
    pub derivation: Derivation,
}

impl ComputedColumnSpec {
    pub fn new(value_type: SemanticType, graph_component_type: &str) -> Self {
        Self {
            value_type,
            graph_component_type: graph_component_type.to_string(),
            filterable: false,
            number_per_graph_component: 1,
            dependencies: Vec::new(),
            derivation: Derivation::Unset,
        }
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn per_component(mut self, count: u32) -> Self {
        self.number_per_graph_component = count;
        self
    }

    pub fn depends_on(mut self, dependencies: Vec<ColumnRef>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn derived_by(mut self, derivation: Derivation) -> Self {
        self.derivation = derivation;
        self
    }
}

/// Columnar attribute store plus its computed column manager.
pub trait Dataframe {
    /// Bulk-load decoded attributes.
    fn load_dataframe(&mut self, load: DataframeLoad) -> SessionResult<()>;

    /// Write a single column into a partition.
    fn load_column(&mut self, name: &str, partition: &str, column: ColumnValues)
        -> SessionResult<()>;

    /// Registered computed column template, cloned.
    fn computed_spec(&self, buffer: &str, key: &str) -> Option<ComputedColumnSpec>;

    fn add_computed_column(
        &mut self,
        buffer: &str,
        key: &str,
        spec: ComputedColumnSpec,
    ) -> SessionResult<()>;
}

/// A rendering session receiving a graph.
///
/// # Example
///
/// ```ignore
/// use futures::FutureExt;
///
/// impl Session for MySession {
///     fn set_vertices<'a>(
///         &'a mut self,
///         positions: &'a [Position],
///     ) -> BoxFuture<'a, SessionResult<()>> {
///         async move {
///             self.upload(positions).await
///         }
///         .boxed()
///     }
///     // ...
/// }
/// ```
pub trait Session: Dataframe + Send {
    fn set_vertices<'a>(
        &'a mut self,
        positions: &'a [Position],
    ) -> BoxFuture<'a, SessionResult<()>>;

    fn set_edges<'a>(
        &'a mut self,
        edges: &'a [(u32, u32)],
        positions: &'a [Position],
    ) -> BoxFuture<'a, SessionResult<()>>;

    /// Set or clear (with `None`) the colours of edge midpoints.
    fn set_mid_edge_colors(&mut self, colors: Option<Values>) -> SessionResult<()>;

    fn notifier(&self) -> &dyn Notifier;
}
