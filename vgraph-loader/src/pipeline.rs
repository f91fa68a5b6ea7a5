//! Decode pipeline: from wire bytes to a fully bound session.
//!
//! Runs:
//! 1. Decoding and type inference (per wire version)
//! 2. Metadata validation and channel binding
//! 3. Sizing hint, then the dataframe load
//! 4. The stage chain: positions, vertices, edges, defaults, channel loaders
//!
//! Stages only move forward. Any error moves the run to [`Stage::Failed`]
//! and is returned tagged with the stage being attempted; there is no
//! partial result.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error, info};
use vgraph_core::defaults::Degrees;
use vgraph_core::infer::infer_column;
use vgraph_core::layout::{lookup_initial_positions, seed_positions};
use vgraph_core::mapper::{select_profile, BindingWarning, ResolvedLoaders};
use vgraph_core::wire::{self, DecodeError};
use vgraph_core::{
    AttributeColumn, AttributeTarget, Position, SemanticType, SidecarMetadata, Values, VectorGraph,
};

use crate::error::{LoadError, LoadResult};
use crate::loaders::{run_loaders, simple_encodings};
use crate::session::{AllocationHint, ColumnValues, DataframeLoad, Session};

/// Upper bound for the element counts in the sizing hint.
pub const DEFAULT_MAX_ALLOCATION: usize = 2_000_000;

/// Tunables for a single load.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Mapper used when the metadata does not name one
    pub default_mapper: Option<String>,
    pub max_allocation: usize,
    /// Seed for the layout RNG; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            default_mapper: None,
            max_allocation: DEFAULT_MAX_ALLOCATION,
            seed: None,
        }
    }
}

/// Progress of a load through the stage chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    PositionsReady,
    VerticesBound,
    EdgesBound,
    DefaultsComputed,
    LoadersRun,
    Done,
    Failed,
}

impl Stage {
    /// The stage following this one on success.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::PositionsReady),
            Stage::PositionsReady => Some(Stage::VerticesBound),
            Stage::VerticesBound => Some(Stage::EdgesBound),
            Stage::EdgesBound => Some(Stage::DefaultsComputed),
            Stage::DefaultsComputed => Some(Stage::LoadersRun),
            Stage::LoadersRun => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::PositionsReady => "positions_ready",
            Stage::VerticesBound => "vertices_bound",
            Stage::EdgesBound => "edges_bound",
            Stage::DefaultsComputed => "defaults_computed",
            Stage::LoadersRun => "loaders_run",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub name: String,
    pub version: u32,
    pub vertex_count: usize,
    pub edge_count: usize,
    /// Mapper profile actually used
    pub mapper: &'static str,
    /// Whether positions were seeded rather than read from `x`/`y`
    pub seeded_positions: bool,
    pub warnings: Vec<BindingWarning>,
}

/// Decoded attributes and resolved loaders, ready for the stage chain.
struct Prepared {
    points: Vec<AttributeColumn>,
    edges: Vec<AttributeColumn>,
    loaders: ResolvedLoaders,
    aliases: BTreeMap<String, String>,
    metadata: Option<SidecarMetadata>,
    mapper: &'static str,
    warnings: Vec<BindingWarning>,
}

/// Load a vector graph payload into a session.
///
/// Version 1 payloads require sidecar metadata; for version 0 it is optional
/// and only consulted for the mapper name.
pub async fn load<S: Session + ?Sized>(
    session: &mut S,
    bytes: &[u8],
    metadata: Option<SidecarMetadata>,
    options: &PipelineOptions,
) -> LoadResult<Loaded> {
    let result = load_graph(session, bytes, metadata, options).await;
    if let Err(ref e) = result {
        error!("Failure in vgraph loader: {}", e);
    }
    result
}

async fn load_graph<S: Session + ?Sized>(
    session: &mut S,
    bytes: &[u8],
    metadata: Option<SidecarMetadata>,
    options: &PipelineOptions,
) -> LoadResult<Loaded> {
    let graph = wire::decode(bytes)?;
    info!(
        "Decoding VectorGraph (version: {}, name: {}, nodes: {}, edges: {})",
        graph.version, graph.name, graph.vertex_count, graph.edge_count
    );

    let prepared = match graph.version {
        0 => prepare_v0(&graph, metadata, options),
        1 => prepare_v1(&graph, metadata, options)?,
        v => return Err(DecodeError::UnsupportedVersion(v).into()),
    };

    let mut run = StageRun::new(session, options);
    let result = run.run(&graph, prepared).await;
    debug!("Load of {} ended in stage {}", graph.name, run.stage);
    result
}

/// Pick the mapper profile and wrap the channel loaders with it.
fn resolve_mapper(
    metadata: Option<&SidecarMetadata>,
    options: &PipelineOptions,
    warnings: &mut Vec<BindingWarning>,
) -> (ResolvedLoaders, &'static str) {
    let name = metadata
        .and_then(|m| m.mapper.as_deref())
        .or(options.default_mapper.as_deref());
    let (profile, warning) = select_profile(name);
    warnings.extend(warning);
    debug!("Using mapper {}", profile.name);
    (ResolvedLoaders::wrap(profile), profile.name)
}

fn prepare_v0(
    graph: &VectorGraph,
    metadata: Option<SidecarMetadata>,
    options: &PipelineOptions,
) -> Prepared {
    let (points, edges): (Vec<_>, Vec<_>) = graph
        .columns
        .v0()
        .filter(|c| !c.values.is_empty())
        .map(|c| infer_column(c.clone(), None))
        .partition(|c| c.target == AttributeTarget::Vertex);

    let mut warnings = Vec::new();
    let (mut loaders, mapper) = resolve_mapper(metadata.as_ref(), options, &mut warnings);
    warnings.extend(loaders.bind_attributes(points.iter().chain(&edges)));

    Prepared {
        mapper,
        points,
        edges,
        loaders,
        aliases: BTreeMap::new(),
        metadata,
        warnings,
    }
}

fn prepare_v1(
    graph: &VectorGraph,
    metadata: Option<SidecarMetadata>,
    options: &PipelineOptions,
) -> LoadResult<Prepared> {
    let mut metadata = metadata.ok_or_else(|| {
        LoadError::MetadataMismatch("version 1 graphs require sidecar metadata".to_string())
    })?;

    if metadata.nodes.len() != 1 || metadata.edges.len() != 1 {
        return Err(LoadError::UnsupportedTopology {
            nodes: metadata.nodes.len(),
            edges: metadata.edges.len(),
        });
    }

    // later vectors with the same name replace earlier ones
    let mut points = BTreeMap::new();
    let mut edges = BTreeMap::new();
    for raw in graph.columns.v1().filter(|c| !c.values.is_empty()) {
        let attribute_meta = metadata.attribute_mut(raw.target, &raw.name);
        let column = infer_column(raw.clone(), attribute_meta);
        let by_name = match column.target {
            AttributeTarget::Vertex => &mut points,
            AttributeTarget::Edge => &mut edges,
        };
        by_name.insert(column.name.clone(), column);
    }

    check_partition(&metadata, AttributeTarget::Vertex, &points, graph.vertex_count)?;
    check_partition(&metadata, AttributeTarget::Edge, &edges, graph.edge_count)?;

    let mut warnings = Vec::new();
    let (mut loaders, mapper) = resolve_mapper(Some(&metadata), options, &mut warnings);
    warnings.extend(loaders.bind_attributes(points.values().chain(edges.values())));

    let mut aliases = BTreeMap::new();
    for (target, attributes) in [
        (AttributeTarget::Vertex, &points),
        (AttributeTarget::Edge, &edges),
    ] {
        let partition = &metadata.partitions(target)[0];
        let accepted = simple_encodings(
            &partition.encodings,
            &loaders,
            target,
            attributes,
            &mut warnings,
        );
        for (channel, name) in accepted {
            // presence checked by simple_encodings
            if let Some(attribute) = attributes.get(&name) {
                warnings.extend(loaders.bind_encoding(channel, attribute));
                aliases.insert(channel.to_string(), name);
            }
        }
    }

    Ok(Prepared {
        mapper,
        points: points.into_values().collect(),
        edges: edges.into_values().collect(),
        loaders,
        aliases,
        metadata: Some(metadata),
        warnings,
    })
}

/// Compare a metadata partition with the decoded attributes of its side.
fn check_partition(
    metadata: &SidecarMetadata,
    target: AttributeTarget,
    attributes: &BTreeMap<String, AttributeColumn>,
    count: u32,
) -> LoadResult<()> {
    let partition = &metadata.partitions(target)[0];
    debug!(
        "{} attributes in metadata: {:?}, in graph: {:?}",
        target,
        partition.attributes.keys().collect::<Vec<_>>(),
        attributes.keys().collect::<Vec<_>>()
    );

    if !partition.attributes.keys().eq(attributes.keys()) {
        return Err(LoadError::MetadataMismatch(format!(
            "Discrepancies between metadata and VGraph {} attributes",
            target
        )));
    }
    if partition.count != u64::from(count) {
        return Err(LoadError::MetadataMismatch(format!(
            "metadata declares {} {}s, graph has {}",
            partition.count, target, count
        )));
    }
    Ok(())
}

/// One pass through the stage chain.
struct StageRun<'s, S: ?Sized> {
    session: &'s mut S,
    options: &'s PipelineOptions,
    stage: Stage,
}

impl<'s, S: Session + ?Sized> StageRun<'s, S> {
    fn new(session: &'s mut S, options: &'s PipelineOptions) -> Self {
        Self {
            session,
            options,
            stage: Stage::Init,
        }
    }

    fn advance(&mut self, to: Stage) {
        debug_assert_eq!(self.stage.next(), Some(to));
        debug!("Stage {} -> {}", self.stage, to);
        self.stage = to;
    }

    async fn run(&mut self, graph: &VectorGraph, prepared: Prepared) -> LoadResult<Loaded> {
        match self.stages(graph, prepared).await {
            Ok(loaded) => Ok(loaded),
            Err(e) => {
                debug!("Stage {} -> {}", self.stage, Stage::Failed);
                self.stage = Stage::Failed;
                Err(e)
            }
        }
    }

    async fn stages(&mut self, graph: &VectorGraph, prepared: Prepared) -> LoadResult<Loaded> {
        let Prepared {
            points,
            edges,
            loaders,
            aliases,
            metadata,
            mapper,
            warnings,
        } = prepared;
        let vertex_count = graph.vertex_count as usize;
        let edge_count = graph.edge_count as usize;

        self.session.notifier().sizes_for_allocation(AllocationHint {
            point: vertex_count.min(self.options.max_allocation),
            edge: edge_count.min(self.options.max_allocation),
        });

        let existing_positions = lookup_initial_positions(&points, vertex_count);
        let attribute_names: Vec<_> = points.iter().chain(&edges).map(|c| c.name.clone()).collect();
        self.session
            .load_dataframe(DataframeLoad {
                points,
                edges,
                vertex_count,
                edge_count,
                aliases,
                metadata,
            })
            .map_err(LoadError::stage(Stage::Init))?;
        info!("Successfully loaded dataframe with attributes {:?}", attribute_names);

        let seeded_positions = existing_positions.is_none();
        let positions = match existing_positions {
            Some(positions) => positions,
            None => {
                self.session.notifier().loading_status("Initializing positions");
                self.seed(vertex_count, &graph.edges)
            }
        };
        self.advance(Stage::PositionsReady);

        self.session.notifier().loading_status("Binding nodes");
        self.session
            .set_vertices(&positions)
            .await
            .map_err(LoadError::stage(Stage::VerticesBound))?;
        self.advance(Stage::VerticesBound);

        self.session.notifier().loading_status("Binding edges");
        self.session
            .set_edges(&graph.edges, &positions)
            .await
            .map_err(LoadError::stage(Stage::EdgesBound))?;
        self.advance(Stage::EdgesBound);

        self.session.notifier().loading_status("Binding everything else");
        self.store_defaults(vertex_count, &graph.edges)
            .map_err(LoadError::stage(Stage::DefaultsComputed))?;
        self.advance(Stage::DefaultsComputed);

        run_loaders(&mut *self.session, loaders).map_err(LoadError::stage(Stage::LoadersRun))?;
        self.advance(Stage::LoadersRun);

        self.advance(Stage::Done);
        info!(
            "Loaded {} vertices and {} edges with {} warning(s)",
            vertex_count,
            edge_count,
            warnings.len()
        );

        Ok(Loaded {
            name: graph.name.clone(),
            version: graph.version,
            vertex_count,
            edge_count,
            mapper,
            seeded_positions,
            warnings,
        })
    }

    fn seed(&self, vertex_count: usize, edges: &[(u32, u32)]) -> Vec<Position> {
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        seed_positions(vertex_count, edges, &mut rng)
    }

    fn store_defaults(
        &mut self,
        vertex_count: usize,
        edges: &[(u32, u32)],
    ) -> crate::error::SessionResult<()> {
        let degrees = Degrees::from_edges(vertex_count, edges);
        let columns = [
            ("__pointCommunity", degrees.communities()),
            ("__defaultPointSize", degrees.default_point_sizes()),
        ];
        for (name, values) in columns {
            self.session.load_column(
                name,
                "point",
                ColumnValues::new(name, Values::Number(values), SemanticType::Number),
            )?;
        }
        Ok(())
    }
}
