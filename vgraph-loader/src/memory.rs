//! In-memory session that records everything the loader writes.

use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeMap;
use tracing::debug;
use vgraph_core::{AttributeColumn, Position, SemanticType, SidecarMetadata, Values};

use crate::error::{SessionError, SessionResult};
use crate::session::{
    BroadcastNotifier, ColumnValues, ComputedColumnSpec, DataframeLoad, Dataframe, Notifier,
    Session, HOST_BUFFER, LOCAL_BUFFER,
};

/// Session calls in the order they were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOp {
    LoadDataframe,
    LoadColumn(String),
    AddComputedColumn(String),
    SetVertices,
    SetEdges,
    SetMidEdgeColors,
}

/// Session call that should fail, for exercising error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    LoadDataframe,
    SetVertices,
    SetEdges,
    MidEdgeColors,
}

type ColumnKey = (String, String);

fn key(buffer: &str, name: &str) -> ColumnKey {
    (buffer.to_string(), name.to_string())
}

/// Reference [`Session`] keeping all state in memory.
///
/// Computed column templates for the render buffers are registered up front,
/// and `set_edges` derives the forward/backward edge permutations the way a
/// renderer sorts its edge buffers.
pub struct MemorySession {
    notifier: BroadcastNotifier,
    vertex_count: usize,
    edge_count: usize,
    attributes: BTreeMap<ColumnKey, AttributeColumn>,
    aliases: BTreeMap<String, String>,
    metadata: Option<SidecarMetadata>,
    columns: BTreeMap<ColumnKey, ColumnValues>,
    templates: BTreeMap<ColumnKey, ComputedColumnSpec>,
    computed: BTreeMap<ColumnKey, ComputedColumnSpec>,
    vertices: Option<Vec<Position>>,
    edges: Option<Vec<(u32, u32)>>,
    mid_edge_colors: Option<Option<Values>>,
    history: Vec<SessionOp>,
    fail_at: Option<FailPoint>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::with_notifier(BroadcastNotifier::default())
    }

    pub fn with_notifier(notifier: BroadcastNotifier) -> Self {
        let templates = [
            (LOCAL_BUFFER, "pointSizes", ComputedColumnSpec::new(SemanticType::Number, "point")),
            (LOCAL_BUFFER, "pointColors", ComputedColumnSpec::new(SemanticType::Color, "point")),
            (
                LOCAL_BUFFER,
                "edgeColors",
                ComputedColumnSpec::new(SemanticType::Color, "edge").per_component(2),
            ),
            (
                HOST_BUFFER,
                "forwardsEdgeWeights",
                ComputedColumnSpec::new(SemanticType::Number, "edge"),
            ),
            (
                HOST_BUFFER,
                "backwardsEdgeWeights",
                ComputedColumnSpec::new(SemanticType::Number, "edge"),
            ),
        ]
        .into_iter()
        .map(|(buffer, name, spec)| (key(buffer, name), spec))
        .collect();

        Self {
            notifier,
            vertex_count: 0,
            edge_count: 0,
            attributes: BTreeMap::new(),
            aliases: BTreeMap::new(),
            metadata: None,
            columns: BTreeMap::new(),
            templates,
            computed: BTreeMap::new(),
            vertices: None,
            edges: None,
            mid_edge_colors: None,
            history: Vec::new(),
            fail_at: None,
        }
    }

    /// Make one session call fail with [`SessionError::Rejected`].
    pub fn fail_at(mut self, point: FailPoint) -> Self {
        self.fail_at = Some(point);
        self
    }

    /// Drop a computed column template.
    pub fn remove_template(&mut self, buffer: &str, name: &str) -> Option<ComputedColumnSpec> {
        self.templates.remove(&key(buffer, name))
    }

    pub fn events(&self) -> &BroadcastNotifier {
        &self.notifier
    }

    pub fn history(&self) -> &[SessionOp] {
        &self.history
    }

    pub fn vertices(&self) -> Option<&[Position]> {
        self.vertices.as_deref()
    }

    pub fn edges(&self) -> Option<&[(u32, u32)]> {
        self.edges.as_deref()
    }

    /// `None` if never set, `Some(None)` if cleared.
    pub fn mid_edge_colors(&self) -> Option<Option<&Values>> {
        self.mid_edge_colors.as_ref().map(Option::as_ref)
    }

    /// Attributes bulk-loaded into a partition, by name.
    pub fn attribute(&self, partition: &str, name: &str) -> Option<&AttributeColumn> {
        self.attributes.get(&key(partition, name))
    }

    /// Names of the attributes bulk-loaded into a partition.
    pub fn attribute_names(&self, partition: &str) -> Vec<&str> {
        self.attributes
            .keys()
            .filter(|(p, _)| p == partition)
            .map(|(_, n)| n.as_str())
            .collect()
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn metadata(&self) -> Option<&SidecarMetadata> {
        self.metadata.as_ref()
    }

    pub fn column(&self, buffer: &str, name: &str) -> Option<&ColumnValues> {
        self.columns.get(&key(buffer, name))
    }

    /// Names of stored columns as `buffer/name`.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().map(|(b, n)| format!("{}/{}", b, n)).collect()
    }

    pub fn computed(&self, buffer: &str, name: &str) -> Option<&ComputedColumnSpec> {
        self.computed.get(&key(buffer, name))
    }

    /// Names of registered computed columns as `buffer/name`.
    pub fn computed_names(&self) -> Vec<String> {
        self.computed.keys().map(|(b, n)| format!("{}/{}", b, n)).collect()
    }

    /// Evaluate a registered computed column from the stored columns.
    pub fn evaluate(&self, buffer: &str, name: &str) -> SessionResult<Values> {
        let spec = self
            .computed(buffer, name)
            .ok_or_else(|| SessionError::MissingColumn {
                name: name.to_string(),
                partition: buffer.to_string(),
            })?;
        let inputs = spec
            .dependencies
            .iter()
            .map(|dep| {
                self.column(&dep.buffer, &dep.name)
                    .map(|c| &c.values)
                    .ok_or_else(|| SessionError::MissingColumn {
                        name: dep.name.clone(),
                        partition: dep.buffer.clone(),
                    })
            })
            .collect::<SessionResult<Vec<_>>>()?;
        spec.derivation.evaluate(&inputs)
    }

    fn check(&self, point: FailPoint) -> SessionResult<()> {
        if self.fail_at == Some(point) {
            return Err(SessionError::Rejected(format!("{:?} failed", point)));
        }
        Ok(())
    }

    fn expected_len(&self, partition: &str) -> Option<usize> {
        match partition {
            "point" => Some(self.vertex_count),
            "edge" => Some(self.edge_count),
            _ => None,
        }
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

/// Edge indices in sorted order, i.e. the inverse of the sort permutation.
fn sorted_edge_order<K: Ord>(edges: &[(u32, u32)], sort_key: impl Fn(&(u32, u32)) -> K) -> Values {
    let mut order: Vec<usize> = (0..edges.len()).collect();
    order.sort_by_key(|&i| sort_key(&edges[i]));
    Values::Number(order.into_iter().map(|i| i as f64).collect())
}

impl Dataframe for MemorySession {
    fn load_dataframe(&mut self, load: DataframeLoad) -> SessionResult<()> {
        self.history.push(SessionOp::LoadDataframe);
        self.check(FailPoint::LoadDataframe)?;
        self.vertex_count = load.vertex_count;
        self.edge_count = load.edge_count;
        for attribute in load.edges.into_iter().chain(load.points) {
            let partition = attribute.target.partition();
            self.attributes.insert(key(partition, &attribute.name), attribute);
        }
        self.aliases.extend(load.aliases);
        if load.metadata.is_some() {
            self.metadata = load.metadata;
        }
        debug!("Loaded dataframe with {} attributes", self.attributes.len());
        Ok(())
    }

    fn load_column(
        &mut self,
        name: &str,
        partition: &str,
        column: ColumnValues,
    ) -> SessionResult<()> {
        self.history.push(SessionOp::LoadColumn(name.to_string()));
        if let Some(expected) = self.expected_len(partition) {
            if column.values.len() != expected {
                return Err(SessionError::LengthMismatch {
                    name: name.to_string(),
                    expected,
                    actual: column.values.len(),
                });
            }
        }
        self.columns.insert(key(partition, name), column);
        Ok(())
    }

    fn computed_spec(&self, buffer: &str, name: &str) -> Option<ComputedColumnSpec> {
        self.templates.get(&key(buffer, name)).cloned()
    }

    fn add_computed_column(
        &mut self,
        buffer: &str,
        name: &str,
        spec: ComputedColumnSpec,
    ) -> SessionResult<()> {
        self.history
            .push(SessionOp::AddComputedColumn(format!("{}/{}", buffer, name)));
        self.computed.insert(key(buffer, name), spec);
        Ok(())
    }
}

impl Session for MemorySession {
    fn set_vertices<'a>(
        &'a mut self,
        positions: &'a [Position],
    ) -> BoxFuture<'a, SessionResult<()>> {
        async move {
            self.history.push(SessionOp::SetVertices);
            self.check(FailPoint::SetVertices)?;
            self.vertices = Some(positions.to_vec());
            Ok(())
        }
        .boxed()
    }

    fn set_edges<'a>(
        &'a mut self,
        edges: &'a [(u32, u32)],
        positions: &'a [Position],
    ) -> BoxFuture<'a, SessionResult<()>> {
        async move {
            self.history.push(SessionOp::SetEdges);
            self.check(FailPoint::SetEdges)?;
            if let Some(&(src, dst)) = edges
                .iter()
                .find(|&&(s, d)| s as usize >= positions.len() || d as usize >= positions.len())
            {
                return Err(SessionError::Rejected(format!(
                    "edge ({}, {}) references a missing vertex",
                    src, dst
                )));
            }

            let forwards = sorted_edge_order(edges, |&(s, d)| (s, d));
            let backwards = sorted_edge_order(edges, |&(s, d)| (d, s));
            self.columns.insert(
                key(HOST_BUFFER, "forwardsEdges"),
                ColumnValues::new("forwardsEdges", forwards, SemanticType::Number),
            );
            self.columns.insert(
                key(HOST_BUFFER, "backwardsEdges"),
                ColumnValues::new("backwardsEdges", backwards, SemanticType::Number),
            );
            self.edges = Some(edges.to_vec());
            Ok(())
        }
        .boxed()
    }

    fn set_mid_edge_colors(&mut self, colors: Option<Values>) -> SessionResult<()> {
        self.history.push(SessionOp::SetMidEdgeColors);
        self.check(FailPoint::MidEdgeColors)?;
        self.mid_edge_colors = Some(colors);
        Ok(())
    }

    fn notifier(&self) -> &dyn Notifier {
        &self.notifier
    }
}
