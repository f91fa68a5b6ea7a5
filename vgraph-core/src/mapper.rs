//! Visual channels, mapper profiles, and the loader table they resolve to.
//!
//! A mapper profile renames the source attribute a channel reads from and
//! optionally transforms the values on the way in. Resolving a profile yields
//! a table keyed by source attribute name; several channels may share one
//! source, so each key holds a list of loader entries.
//!
//! # Example
//!
//! ```text
//! opentsdb: pointSize <- log-normalized "degree"
//!           pointColor <- "community_spinglass" through a qualitative palette
//! ```

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::color::{int2color, palette_binding, GREEN_TO_RED, QUALITATIVE};
use crate::normalize::{log_transform, normalize, normalize_float};
use crate::types::{AttributeColumn, AttributeTarget, SemanticType, Values};

/// Profile used when the requested one is missing or unknown.
pub const DEFAULT_PROFILE: &str = "default";

/// A named visual attribute slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    PointSize,
    PointColor,
    EdgeColor,
    EdgeHeight,
    MidEdgeColor,
    PointLabel,
    EdgeLabel,
    EdgeWeight,
    /// Titles are loaded elsewhere; the channel exists so title encodings
    /// are recognized.
    PointTitle,
    EdgeTitle,
}

const NUMBER: &[SemanticType] = &[SemanticType::Number];
const NUMBER_OR_COLOR: &[SemanticType] = &[SemanticType::Number, SemanticType::Color];
const STRING: &[SemanticType] = &[SemanticType::String];

impl Channel {
    pub const ALL: [Channel; 10] = [
        Channel::PointSize,
        Channel::PointColor,
        Channel::EdgeColor,
        Channel::EdgeHeight,
        Channel::MidEdgeColor,
        Channel::PointLabel,
        Channel::EdgeLabel,
        Channel::EdgeWeight,
        Channel::PointTitle,
        Channel::EdgeTitle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::PointSize => "pointSize",
            Channel::PointColor => "pointColor",
            Channel::EdgeColor => "edgeColor",
            Channel::EdgeHeight => "edgeHeight",
            Channel::MidEdgeColor => "midEdgeColor",
            Channel::PointLabel => "pointLabel",
            Channel::EdgeLabel => "edgeLabel",
            Channel::EdgeWeight => "edgeWeight",
            Channel::PointTitle => "pointTitle",
            Channel::EdgeTitle => "edgeTitle",
        }
    }

    /// Graph side the channel reads from.
    pub fn target(&self) -> AttributeTarget {
        match self {
            Channel::PointSize
            | Channel::PointColor
            | Channel::PointLabel
            | Channel::PointTitle => AttributeTarget::Vertex,
            Channel::EdgeColor
            | Channel::EdgeHeight
            | Channel::MidEdgeColor
            | Channel::EdgeLabel
            | Channel::EdgeWeight
            | Channel::EdgeTitle => AttributeTarget::Edge,
        }
    }

    /// Semantic types the channel accepts.
    pub fn accepted_types(&self) -> &'static [SemanticType] {
        match self {
            Channel::PointSize | Channel::EdgeHeight | Channel::EdgeWeight => NUMBER,
            Channel::PointColor | Channel::EdgeColor | Channel::MidEdgeColor => NUMBER_OR_COLOR,
            Channel::PointLabel
            | Channel::EdgeLabel
            | Channel::PointTitle
            | Channel::EdgeTitle => STRING,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or(())
    }
}

/// Non-fatal problems found while binding attributes to channels.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingWarning {
    #[error(
        "Vertex/edge attribute mismatch for {attribute}: {channel} expects a {expected} attribute"
    )]
    TargetMismatch {
        attribute: String,
        channel: Channel,
        expected: AttributeTarget,
    },

    #[error("Expected type in {expected:?}, but got {actual} for {attribute} ({channel})")]
    TypeMismatch {
        attribute: String,
        channel: Channel,
        expected: &'static [SemanticType],
        actual: SemanticType,
    },

    #[error("In encodings, unknown graph property: {property}")]
    UnknownEncoding { property: String },

    #[error("Unsupported encoding for {channel}: {reason}")]
    UnsupportedEncoding { channel: Channel, reason: String },

    #[error("Unknown mapper {name}, using \"default\"")]
    UnknownMapper { name: String },
}

/// Value transform applied before a loader sees its input.
pub type Transform = fn(Values) -> Values;

/// Where a channel reads from in a given profile.
#[derive(Clone, Copy, Debug)]
pub struct Mapping {
    pub source: &'static str,
    pub transform: Option<Transform>,
}

impl Mapping {
    pub const fn plain(source: &'static str) -> Self {
        Self {
            source,
            transform: None,
        }
    }

    pub const fn with(source: &'static str, transform: Transform) -> Self {
        Self {
            source,
            transform: Some(transform),
        }
    }
}

/// A named, immutable channel-to-source table.
#[derive(Clone, Debug)]
pub struct MapperProfile {
    pub name: &'static str,
    mappings: BTreeMap<Channel, Mapping>,
}

impl MapperProfile {
    pub fn new(
        name: &'static str,
        mappings: impl IntoIterator<Item = (Channel, Mapping)>,
    ) -> Self {
        Self {
            name,
            mappings: mappings.into_iter().collect(),
        }
    }

    fn extend(
        name: &'static str,
        base: &MapperProfile,
        overrides: impl IntoIterator<Item = (Channel, Mapping)>,
    ) -> Self {
        let mut mappings = base.mappings.clone();
        mappings.extend(overrides);
        Self { name, mappings }
    }

    pub fn mapping(&self, channel: Channel) -> Option<&Mapping> {
        self.mappings.get(&channel)
    }
}

fn map_numbers(values: Values, f: impl FnOnce(&[f64]) -> Vec<f64>) -> Values {
    match values {
        Values::Number(v) => Values::Number(f(&v)),
        other => {
            trace!("Leaving non-numeric values untransformed");
            other
        }
    }
}

fn size_range(values: Values) -> Values {
    map_numbers(values, |v| normalize(v, 5.0, 256.0))
}

fn log_size_range(values: Values) -> Values {
    map_numbers(values, |v| normalize(&log_transform(v), 5.0, 256.0))
}

fn weight_range(values: Values) -> Values {
    map_numbers(values, |v| normalize_float(v, 0.5, 1.5))
}

fn log_weight_range(values: Values) -> Values {
    map_numbers(values, |v| normalize_float(&log_transform(v), 0.5, 1.5))
}

fn category_colors(values: Values) -> Values {
    map_numbers(values, |v| v.iter().map(|&c| palette_binding(c)).collect())
}

fn community_colors(values: Values) -> Values {
    map_numbers(values, |v| {
        let top = (QUALITATIVE.len() - 1) as f64;
        int2color(&normalize(v, 0.0, top), QUALITATIVE)
    })
}

fn traffic_colors(values: Values) -> Values {
    map_numbers(values, |v| {
        let top = (GREEN_TO_RED.len() - 1) as f64;
        int2color(&normalize(&log_transform(v), 0.0, top), GREEN_TO_RED)
    })
}

static PROFILES: Lazy<BTreeMap<&'static str, MapperProfile>> = Lazy::new(|| {
    let default = MapperProfile::new(
        DEFAULT_PROFILE,
        [
            (Channel::PointSize, Mapping::with("pointSize", size_range)),
            (Channel::PointLabel, Mapping::plain("pointLabel")),
            (Channel::EdgeLabel, Mapping::plain("edgeLabel")),
            (Channel::PointColor, Mapping::with("pointColor", category_colors)),
            (Channel::EdgeColor, Mapping::with("edgeColor", category_colors)),
            (Channel::EdgeHeight, Mapping::plain("edgeHeight")),
            (Channel::EdgeWeight, Mapping::with("edgeWeight", weight_range)),
        ],
    );

    let opentsdb = MapperProfile::new(
        "opentsdb",
        [
            (Channel::PointSize, Mapping::with("degree", log_size_range)),
            (Channel::PointTitle, Mapping::plain("label")),
            (
                Channel::PointColor,
                Mapping::with("community_spinglass", community_colors),
            ),
            (Channel::EdgeColor, Mapping::with("bytes", traffic_colors)),
            (Channel::EdgeWeight, Mapping::with("weight", log_weight_range)),
        ],
    );

    let miserables = MapperProfile::extend(
        "miserables",
        &opentsdb,
        [(Channel::PointSize, Mapping::with("betweenness", size_range))],
    );

    let splunk = MapperProfile {
        name: "splunk",
        ..default.clone()
    };

    [default, opentsdb, miserables, splunk]
        .into_iter()
        .map(|p| (p.name, p))
        .collect()
});

/// Names of all registered profiles.
pub fn profile_names() -> impl Iterator<Item = &'static str> {
    PROFILES.keys().copied()
}

/// Select a profile by name, falling back to the default one.
///
/// An unknown name yields a warning; a missing name selects the default
/// profile silently.
pub fn select_profile(name: Option<&str>) -> (&'static MapperProfile, Option<BindingWarning>) {
    let requested = name.unwrap_or(DEFAULT_PROFILE);
    match PROFILES.get(requested) {
        Some(profile) => (profile, None),
        None => {
            warn!("Unknown mapper {}, using \"{}\"", requested, DEFAULT_PROFILE);
            let warning = BindingWarning::UnknownMapper {
                name: requested.to_string(),
            };
            (&PROFILES[DEFAULT_PROFILE], Some(warning))
        }
    }
}

/// One channel's loader slot for a single load call.
#[derive(Clone, Debug)]
pub struct LoaderEntry {
    pub channel: Channel,
    pub target: AttributeTarget,
    pub allowed_types: &'static [SemanticType],
    pub transform: Option<Transform>,
    pub values: Option<Values>,
}

impl LoaderEntry {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            target: channel.target(),
            allowed_types: channel.accepted_types(),
            transform: None,
            values: None,
        }
    }

    /// Bound values with the profile transform applied.
    pub fn take_input(&mut self) -> Option<Values> {
        let values = self.values.take()?;
        Some(match self.transform {
            Some(transform) => transform(values),
            None => values,
        })
    }

    /// Check an attribute against this entry and bind it if compatible.
    fn try_bind(&mut self, attribute: &AttributeColumn) -> Result<(), BindingWarning> {
        if attribute.target != self.target {
            return Err(BindingWarning::TargetMismatch {
                attribute: attribute.name.clone(),
                channel: self.channel,
                expected: self.target,
            });
        }
        if !self.allowed_types.contains(&attribute.inferred_type) {
            return Err(BindingWarning::TypeMismatch {
                attribute: attribute.name.clone(),
                channel: self.channel,
                expected: self.allowed_types,
                actual: attribute.inferred_type,
            });
        }
        self.values = Some(attribute.values.clone());
        Ok(())
    }
}

/// Loader entries keyed by the source attribute name they read from.
#[derive(Clone, Debug, Default)]
pub struct ResolvedLoaders {
    by_source: BTreeMap<String, Vec<LoaderEntry>>,
}

impl ResolvedLoaders {
    /// Apply a profile to the full channel set.
    ///
    /// Mapped channels move to their source name and pick up the profile's
    /// transform; unmapped channels stay under their own name.
    pub fn wrap(profile: &MapperProfile) -> Self {
        let mut by_source: BTreeMap<String, Vec<LoaderEntry>> = BTreeMap::new();
        for channel in Channel::ALL {
            let mut entry = LoaderEntry::new(channel);
            let key = match profile.mapping(channel) {
                Some(mapping) => {
                    trace!("Mapping {} to {}", mapping.source, channel);
                    entry.transform = mapping.transform;
                    mapping.source
                }
                None => channel.as_str(),
            };
            by_source.entry(key.to_string()).or_default().push(entry);
        }
        Self { by_source }
    }

    pub fn get(&self, source: &str) -> Option<&[LoaderEntry]> {
        self.by_source.get(source).map(Vec::as_slice)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.by_source.contains_key(source)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LoaderEntry> {
        self.by_source.values().flatten()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut LoaderEntry> {
        self.by_source.values_mut().flatten()
    }

    /// Whether every entry of a channel reads from the given side.
    pub fn channel_target_is(&self, channel: Channel, target: AttributeTarget) -> bool {
        self.entries()
            .filter(|e| e.channel == channel)
            .all(|e| e.target == target)
    }

    /// Bind attributes to the entries registered under their names.
    ///
    /// Attributes no channel reads from are skipped without a warning.
    pub fn bind_attributes<'a, I>(&mut self, attributes: I) -> Vec<BindingWarning>
    where
        I: IntoIterator<Item = &'a AttributeColumn>,
    {
        let mut warnings = Vec::new();
        for attribute in attributes {
            let Some(entries) = self.by_source.get_mut(&attribute.name) else {
                debug!("Skipping unmapped attribute {}", attribute.name);
                continue;
            };
            for entry in entries.iter_mut() {
                if let Err(warning) = entry.try_bind(attribute) {
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        warnings
    }

    /// Bind an attribute to every entry of a channel, overriding any
    /// name-based binding.
    pub fn bind_encoding(
        &mut self,
        channel: Channel,
        attribute: &AttributeColumn,
    ) -> Vec<BindingWarning> {
        let mut warnings = Vec::new();
        for entry in self.entries_mut().filter(|e| e.channel == channel) {
            debug!("Loading values for {} from attribute {}", channel, attribute.name);
            if let Err(warning) = entry.try_bind(attribute) {
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
        warnings
    }

    pub fn into_entries(self) -> impl Iterator<Item = LoaderEntry> {
        self.by_source.into_values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(
        name: &str,
        target: AttributeTarget,
        ty: SemanticType,
        values: Values,
    ) -> AttributeColumn {
        AttributeColumn {
            name: name.to_string(),
            target,
            inferred_type: ty,
            values,
        }
    }

    #[test]
    fn test_channel_names_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>(), Ok(channel));
        }
        assert!("nodeId".parse::<Channel>().is_err());
    }

    #[test]
    fn test_registry_contains_builtin_profiles() {
        let names: Vec<_> = profile_names().collect();
        for expected in ["default", "miserables", "opentsdb", "splunk"] {
            assert!(names.contains(&expected));
        }
    }

    #[test]
    fn test_unknown_profile_falls_back() {
        let (profile, warning) = select_profile(Some("nope"));
        assert_eq!(profile.name, DEFAULT_PROFILE);
        assert_eq!(
            warning,
            Some(BindingWarning::UnknownMapper {
                name: "nope".to_string()
            })
        );

        let (profile, warning) = select_profile(None);
        assert_eq!(profile.name, DEFAULT_PROFILE);
        assert!(warning.is_none());
    }

    #[test]
    fn test_miserables_overrides_point_size_only() {
        let (mis, _) = select_profile(Some("miserables"));
        let (tsdb, _) = select_profile(Some("opentsdb"));
        assert_eq!(mis.mapping(Channel::PointSize).unwrap().source, "betweenness");
        assert_eq!(
            mis.mapping(Channel::EdgeColor).unwrap().source,
            tsdb.mapping(Channel::EdgeColor).unwrap().source
        );
    }

    #[test]
    fn test_wrap_renames_and_passes_through() {
        let (profile, _) = select_profile(Some("opentsdb"));
        let loaders = ResolvedLoaders::wrap(profile);

        assert!(loaders.contains("degree"));
        assert!(!loaders.contains("pointSize"));
        // no mapping for midEdgeColor in opentsdb
        assert_eq!(loaders.get("midEdgeColor").unwrap()[0].channel, Channel::MidEdgeColor);
        assert_eq!(loaders.entries().count(), Channel::ALL.len());
    }

    #[test]
    fn test_shared_source_fans_out() {
        let profile = MapperProfile::new(
            "shared",
            [
                (Channel::PointSize, Mapping::with("score", size_range)),
                (Channel::PointColor, Mapping::with("score", category_colors)),
            ],
        );
        let mut loaders = ResolvedLoaders::wrap(&profile);
        assert_eq!(loaders.get("score").unwrap().len(), 2);

        let score = attr(
            "score",
            AttributeTarget::Vertex,
            SemanticType::Number,
            Values::Number(vec![0.0, 10.0]),
        );
        let warnings = loaders.bind_attributes([&score]);
        assert!(warnings.is_empty());

        let mut inputs: Vec<_> = loaders
            .entries_mut()
            .filter(|e| e.values.is_some())
            .map(|e| (e.channel, e.take_input().unwrap()))
            .collect();
        inputs.sort_by_key(|(c, _)| *c);

        assert_eq!(inputs[0].0, Channel::PointSize);
        assert_eq!(inputs[0].1, Values::Number(vec![5.0, 233.0]));
        assert_eq!(inputs[1].0, Channel::PointColor);
        assert_eq!(
            inputs[1].1,
            Values::Number(vec![palette_binding(0.0), palette_binding(10.0)])
        );
    }

    #[test]
    fn test_binding_mismatches_warn() {
        let (profile, _) = select_profile(None);
        let mut loaders = ResolvedLoaders::wrap(profile);

        let wrong_target = attr(
            "pointSize",
            AttributeTarget::Edge,
            SemanticType::Number,
            Values::Number(vec![1.0]),
        );
        let wrong_type = attr(
            "edgeWeight",
            AttributeTarget::Edge,
            SemanticType::String,
            Values::Text(vec!["heavy".into()]),
        );
        let unmapped = attr(
            "whatever",
            AttributeTarget::Vertex,
            SemanticType::Number,
            Values::Number(vec![1.0]),
        );

        let warnings = loaders.bind_attributes([&wrong_target, &wrong_type, &unmapped]);

        assert_eq!(warnings.len(), 2);
        assert!(matches!(warnings[0], BindingWarning::TargetMismatch { .. }));
        assert!(matches!(warnings[1], BindingWarning::TypeMismatch { .. }));
        assert!(loaders.entries().all(|e| e.values.is_none()));
    }

    #[test]
    fn test_unmapped_attributes_are_skipped_quietly() {
        let (profile, _) = select_profile(None);
        let mut loaders = ResolvedLoaders::wrap(profile);
        let columns = [
            attr("x", AttributeTarget::Vertex, SemanticType::Number, Values::Number(vec![0.0])),
            attr("y", AttributeTarget::Vertex, SemanticType::Number, Values::Number(vec![1.0])),
            attr(
                "nickname",
                AttributeTarget::Vertex,
                SemanticType::String,
                Values::Text(vec!["al".into()]),
            ),
        ];

        assert!(loaders.bind_attributes(&columns).is_empty());
        assert!(loaders.entries().all(|e| e.values.is_none()));
    }

    #[test]
    fn test_encoding_overrides_name_binding() {
        let (profile, _) = select_profile(None);
        let mut loaders = ResolvedLoaders::wrap(profile);

        let by_name = attr(
            "pointLabel",
            AttributeTarget::Vertex,
            SemanticType::String,
            Values::Text(vec!["by name".into()]),
        );
        let encoded = attr(
            "title",
            AttributeTarget::Vertex,
            SemanticType::String,
            Values::Text(vec!["encoded".into()]),
        );
        loaders.bind_attributes([&by_name]);
        assert!(loaders.bind_encoding(Channel::PointLabel, &encoded).is_empty());

        let entry = loaders
            .entries()
            .find(|e| e.channel == Channel::PointLabel)
            .unwrap();
        assert_eq!(entry.values, Some(Values::Text(vec!["encoded".into()])));
    }

    #[test]
    fn test_transforms_leave_text_alone() {
        let colors = Values::Text(vec!["#fff".into()]);
        assert_eq!(category_colors(colors.clone()), colors);
    }

    #[test]
    fn test_traffic_colors_use_palette_ends() {
        let out = traffic_colors(Values::Number(vec![1.0, 1e9]));
        let packed = out.as_numbers().unwrap();
        assert_eq!(packed[0], GREEN_TO_RED[0].pack() as f64);
        assert_ne!(packed[1], packed[0]);
    }
}
