//! Type URL catalogue for ADS resources.
//!
//! Proxies may address the same logical resource with either the v2
//! (`envoy.api.v2.*`) or the v3 (`envoy.config.*.v3.*`) type URL. This module
//! maps every supported wire string onto a closed [`ResourceKind`] plus the
//! [`SchemaVersion`] it was spelled in.

use std::fmt;

use crate::AdsError;

/// Logical resource kinds served over ADS.
///
/// Variants are declared in push order: clusters before endpoints before
/// listeners before routes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Clusters (CDS).
    Cluster,
    /// Cluster load assignments (EDS).
    Endpoint,
    /// Listeners (LDS).
    Listener,
    /// Route configurations (RDS).
    Route,
}

impl ResourceKind {
    /// All kinds, in push order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Cluster,
        ResourceKind::Endpoint,
        ResourceKind::Listener,
        ResourceKind::Route,
    ];

    /// Short protocol name (`CDS`, `EDS`, `LDS`, `RDS`).
    #[must_use]
    pub fn discovery_name(self) -> &'static str {
        match self {
            Self::Cluster => "CDS",
            Self::Endpoint => "EDS",
            Self::Listener => "LDS",
            Self::Route => "RDS",
        }
    }

    /// The type URL of this kind in the given schema.
    #[must_use]
    pub fn type_url(self, schema: SchemaVersion) -> TypeUrl {
        TypeUrl { kind: self, schema }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cluster => "Cluster",
            Self::Endpoint => "ClusterLoadAssignment",
            Self::Listener => "Listener",
            Self::Route => "RouteConfiguration",
        };
        f.write_str(name)
    }
}

/// Schema generation of a type URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// `envoy.api.v2`
    V2,
    /// `envoy.config.*.v3`
    V3,
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2 => f.write_str("v2"),
            Self::V3 => f.write_str("v3"),
        }
    }
}

const CATALOGUE: [(ResourceKind, SchemaVersion, &str); 8] = [
    (
        ResourceKind::Cluster,
        SchemaVersion::V2,
        "type.googleapis.com/envoy.api.v2.Cluster",
    ),
    (
        ResourceKind::Endpoint,
        SchemaVersion::V2,
        "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment",
    ),
    (
        ResourceKind::Listener,
        SchemaVersion::V2,
        "type.googleapis.com/envoy.api.v2.Listener",
    ),
    (
        ResourceKind::Route,
        SchemaVersion::V2,
        "type.googleapis.com/envoy.api.v2.RouteConfiguration",
    ),
    (
        ResourceKind::Cluster,
        SchemaVersion::V3,
        "type.googleapis.com/envoy.config.cluster.v3.Cluster",
    ),
    (
        ResourceKind::Endpoint,
        SchemaVersion::V3,
        "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment",
    ),
    (
        ResourceKind::Listener,
        SchemaVersion::V3,
        "type.googleapis.com/envoy.config.listener.v3.Listener",
    ),
    (
        ResourceKind::Route,
        SchemaVersion::V3,
        "type.googleapis.com/envoy.config.route.v3.RouteConfiguration",
    ),
];

/// A recognised ADS type URL.
///
/// `TypeUrl` is a (kind, schema) pair; the wire string is looked up in a
/// static catalogue, so values are `Copy` and cheap to compare.
///
/// # Example
///
/// ```rust
/// use ads_core::{ResourceKind, SchemaVersion, TypeUrl};
///
/// let url = TypeUrl::parse("type.googleapis.com/envoy.config.route.v3.RouteConfiguration")
///     .unwrap();
/// assert_eq!(url.kind(), ResourceKind::Route);
/// assert_eq!(url.schema(), SchemaVersion::V3);
/// assert_eq!(url.short_name(), "RouteConfiguration");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeUrl {
    kind: ResourceKind,
    schema: SchemaVersion,
}

impl TypeUrl {
    /// Resolve a wire type URL.
    pub fn parse(url: &str) -> Result<Self, AdsError> {
        CATALOGUE
            .iter()
            .find(|(_, _, wire)| *wire == url)
            .map(|(kind, schema, _)| Self {
                kind: *kind,
                schema: *schema,
            })
            .ok_or_else(|| AdsError::InvalidTypeUrl {
                type_url: url.to_string(),
                reason: "not a supported ADS resource type".to_string(),
            })
    }

    /// The logical kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The schema the URL is spelled in.
    #[must_use]
    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    /// The wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        CATALOGUE
            .iter()
            .find(|(kind, schema, _)| *kind == self.kind && *schema == self.schema)
            .map_or("", |(_, _, wire)| wire)
    }

    /// Extract the short message name.
    ///
    /// For example, `type.googleapis.com/envoy.api.v2.Cluster` returns
    /// `Cluster`.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let url = self.as_str();
        url.rsplit('.').next().unwrap_or(url)
    }
}

impl fmt::Display for TypeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for TypeUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// A small set of [`ResourceKind`]s.
///
/// Iteration always yields kinds in push order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourceKindSet(u8);

impl ResourceKindSet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every kind.
    #[must_use]
    pub fn all() -> Self {
        ResourceKind::ALL.into_iter().collect()
    }

    /// Add a kind.
    pub fn insert(&mut self, kind: ResourceKind) {
        self.0 |= kind.bit();
    }

    /// Check membership.
    #[must_use]
    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Set union.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether the set holds no kinds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of kinds in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate in push order.
    pub fn iter(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        ResourceKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

impl FromIterator<ResourceKind> for ResourceKindSet {
    fn from_iter<I: IntoIterator<Item = ResourceKind>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Display for ResourceKindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(ResourceKind::discovery_name).collect();
        write!(f, "[{}]", names.join(","))
    }
}
