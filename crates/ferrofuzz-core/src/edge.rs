//! Coverage edges: the `(previous location, current location)` pairs a
//! [`crate::tracer::Tracer`] reports.

use std::collections::HashSet;

/// A single source location, as reported by a tracer callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// A directed transition between two locations. `from` is `None` at the
/// start of a trace, before any line has executed yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    pub from: Option<Location>,
    pub to: Location,
}

/// The set of edges exercised by one run of a target. Order never matters,
/// only set membership — this is always compared and stored as a set.
pub type CoverageSet = HashSet<Edge>;

/// `true` if `incoming` contains at least one edge not already in
/// `known`. Used to decide whether an input is "interesting" enough to
/// keep in the corpus.
pub fn has_new_edges(known: &CoverageSet, incoming: &CoverageSet) -> bool {
    incoming.iter().any(|e| !known.contains(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_genuinely_new_edges() {
        let mut known = CoverageSet::new();
        known.insert(Edge {
            from: None,
            to: Location::new("a.rs", 1),
        });
        let mut incoming = known.clone();
        assert!(!has_new_edges(&known, &incoming));

        incoming.insert(Edge {
            from: Some(Location::new("a.rs", 1)),
            to: Location::new("a.rs", 2),
        });
        assert!(has_new_edges(&known, &incoming));

        known.extend(incoming.iter().cloned());
        assert!(!has_new_edges(&known, &incoming));
    }
}
