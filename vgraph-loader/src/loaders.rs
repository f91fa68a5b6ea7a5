//! Channel loaders: write bound attribute values into the session.
//!
//! Binding happens in `vgraph_core::mapper`; this module validates metadata
//! encodings against the resolved table and runs every loader entry once the
//! graph structure is in place.

use std::collections::BTreeMap;
use tracing::{debug, warn};
use vgraph_core::mapper::{BindingWarning, Channel, ResolvedLoaders};
use vgraph_core::metadata::Encoding;
use vgraph_core::{AttributeColumn, AttributeTarget, SemanticType, Values};

use crate::error::{SessionError, SessionResult};
use crate::session::{
    ColumnRef, ColumnValues, ComputedColumnSpec, Derivation, Session, HOST_BUFFER, LOCAL_BUFFER,
};

/// Encodings describing graph structure rather than a visual channel.
pub const GRAPH_SHAPE_PROPERTIES: &[&str] = &["source", "destination", "nodeId"];

/// Keep the single-attribute encodings of one partition that map onto a
/// known channel of the right side and name an existing attribute.
///
/// Returns the accepted `channel -> attribute` pairs.
pub fn simple_encodings(
    encodings: &BTreeMap<String, Encoding>,
    loaders: &ResolvedLoaders,
    target: AttributeTarget,
    attributes: &BTreeMap<String, AttributeColumn>,
    warnings: &mut Vec<BindingWarning>,
) -> Vec<(Channel, String)> {
    let mut accepted = Vec::new();
    for (property, encoding) in encodings {
        if GRAPH_SHAPE_PROPERTIES.contains(&property.as_str()) {
            continue;
        }
        let Ok(channel) = property.parse::<Channel>() else {
            let warning = BindingWarning::UnknownEncoding {
                property: property.clone(),
            };
            warn!("{}", warning);
            warnings.push(warning);
            continue;
        };

        let rejection = if !loaders.channel_target_is(channel, target) {
            Some(format!("wrong target type ({}) for graph property", target))
        } else if encoding.attributes.len() != 1 {
            Some(format!(
                "{} attributes given, only one is supported",
                encoding.attributes.len()
            ))
        } else if !attributes.contains_key(&encoding.attributes[0]) {
            Some(format!("no {} attribute {}", target, encoding.attributes[0]))
        } else {
            None
        };

        match rejection {
            Some(reason) => {
                let warning = BindingWarning::UnsupportedEncoding { channel, reason };
                warn!("{}", warning);
                warnings.push(warning);
            }
            None => accepted.push((channel, encoding.attributes[0].clone())),
        }
    }
    accepted
}

/// Run every loader entry: bound entries write their (transformed) values,
/// the rest fall back to the channel default.
///
/// Entries run one after another against the exclusively borrowed session;
/// the first failure aborts the run.
pub fn run_loaders<S: Session + ?Sized>(
    session: &mut S,
    loaders: ResolvedLoaders,
) -> SessionResult<()> {
    for mut entry in loaders.into_entries() {
        match entry.take_input() {
            Some(values) => apply(entry.channel, session, values)?,
            None => {
                debug!("Loading default values for {}", entry.channel);
                apply_default(entry.channel, session)?;
            }
        }
    }
    Ok(())
}

fn apply<S: Session + ?Sized>(
    channel: Channel,
    session: &mut S,
    values: Values,
) -> SessionResult<()> {
    match channel {
        Channel::PointSize => {
            session.load_column(
                "__pointSizes",
                "point",
                ColumnValues::new("__pointSizes", values, SemanticType::Number),
            )?;
            let spec = template(session, LOCAL_BUFFER, "pointSizes")?
                .depends_on(vec![ColumnRef::new("__pointSizes", "point")])
                .derived_by(Derivation::Identity);
            session.add_computed_column(LOCAL_BUFFER, "pointSizes", spec)
        }
        Channel::PointColor => {
            session.load_column(
                "__pointColors",
                "point",
                ColumnValues::new("__pointColors", values, SemanticType::Color),
            )?;
            let spec = template(session, LOCAL_BUFFER, "pointColors")?
                .depends_on(vec![ColumnRef::new("__pointColors", "point")])
                .derived_by(Derivation::Identity);
            session.add_computed_column(LOCAL_BUFFER, "pointColors", spec)
        }
        Channel::EdgeColor => {
            session.load_column(
                "__edgeColors",
                "edge",
                ColumnValues::new("__edgeColors", values, SemanticType::Color).per_component(1),
            )?;
            let spec = template(session, LOCAL_BUFFER, "edgeColors")?
                .depends_on(vec![ColumnRef::new("__edgeColors", "edge")])
                .derived_by(Derivation::DuplicatePerEndpoint);
            session.add_computed_column(LOCAL_BUFFER, "edgeColors", spec)
        }
        Channel::EdgeHeight => {
            warn!("Loading edge heights is not supported, ignoring {} values", values.len());
            Ok(())
        }
        Channel::MidEdgeColor => session.set_mid_edge_colors(Some(values)),
        Channel::PointLabel => {
            load_labels(session, "point", "__pointLabels", "pointLabels", values)
        }
        Channel::EdgeLabel => {
            load_labels(session, "edge", "__edgeLabels", "edgeLabels", values)
        }
        Channel::EdgeWeight => {
            session.load_column(
                "__edgeWeights",
                "edge",
                ColumnValues::new("__edgeWeights", values, SemanticType::Number),
            )?;
            for (key, permutation) in [
                ("forwardsEdgeWeights", "forwardsEdges"),
                ("backwardsEdgeWeights", "backwardsEdges"),
            ] {
                let spec = template(session, HOST_BUFFER, key)?
                    .depends_on(vec![
                        ColumnRef::new("__edgeWeights", "edge"),
                        ColumnRef::new(permutation, HOST_BUFFER),
                    ])
                    .derived_by(Derivation::PermuteByEdges);
                session.add_computed_column(HOST_BUFFER, key, spec)?;
            }
            Ok(())
        }
        // titles are loaded outside the channel loaders
        Channel::PointTitle | Channel::EdgeTitle => Ok(()),
    }
}

fn apply_default<S: Session + ?Sized>(channel: Channel, session: &mut S) -> SessionResult<()> {
    match channel {
        Channel::MidEdgeColor => session.set_mid_edge_colors(None),
        _ => Ok(()),
    }
}

fn load_labels<S: Session + ?Sized>(
    session: &mut S,
    partition: &str,
    column: &str,
    key: &str,
    values: Values,
) -> SessionResult<()> {
    session.load_column(
        column,
        partition,
        ColumnValues::new(column, values, SemanticType::String),
    )?;
    let spec = ComputedColumnSpec::new(SemanticType::String, partition)
        .filterable()
        .depends_on(vec![ColumnRef::new(column, partition)])
        .derived_by(Derivation::Identity);
    session.add_computed_column(HOST_BUFFER, key, spec)
}

fn template<S: Session + ?Sized>(
    session: &S,
    buffer: &str,
    key: &str,
) -> SessionResult<ComputedColumnSpec> {
    session
        .computed_spec(buffer, key)
        .ok_or_else(|| SessionError::MissingTemplate {
            buffer: buffer.to_string(),
            key: key.to_string(),
        })
}
