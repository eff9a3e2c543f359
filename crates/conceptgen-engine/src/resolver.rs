//! Priority order for satisfying a declared relation.

use std::fmt;

/// Where a related instance comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// An entry already present in the model library.
    Library,
    /// A handler declared on the concept (record or nested concept).
    Nested,
    /// A fresh record from the record-store factory.
    Factory,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Library => "library",
            Source::Nested => "nested",
            Source::Factory => "factory",
        })
    }
}

/// Facts the resolver decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub in_library: bool,
    pub has_handler: bool,
    /// The root entity exposes the relation name.
    pub has_relation: bool,
}

/// Candidate sources in the order they must be tried.
///
/// The order decides which data wins when several sources could satisfy the
/// same alias: library, then handler, then factory. An empty list means the
/// relation cannot be resolved.
pub fn candidate_sources(probe: Probe) -> Vec<Source> {
    let mut sources = Vec::with_capacity(3);
    if probe.in_library {
        sources.push(Source::Library);
    }
    if probe.has_handler {
        sources.push(Source::Nested);
    }
    if probe.has_relation {
        sources.push(Source::Factory);
    }
    sources
}
