//! Typed dependency graph and its BFS resolver. Vertices live in an arena
//! (a plain `Vec`) addressed by integer index rather than behind shared
//! pointers, so the data structure itself can never form an ownership cycle
//! even though the dependency structure it represents can.

use crate::internal::backends::Backends;
use crate::internal::buildable::Buildable;
use anyhow::{anyhow, bail};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyType {
    Explicit,
    Run,
    Make,
    Check,
}

impl DependencyType {
    /// `explicit`, `make` and `check` are build-time; `run` is not.
    pub fn is_build_time(&self) -> bool {
        !matches!(self, DependencyType::Run)
    }
}

#[derive(Debug)]
pub struct DependencyEdge {
    pub pkgname: String,
    pub dependency_type: DependencyType,
    is_resolved: bool,
    vertex_to: Option<usize>,
}

impl DependencyEdge {
    fn new(pkgname: String, dependency_type: DependencyType) -> Self {
        DependencyEdge {
            pkgname,
            dependency_type,
            is_resolved: false,
            vertex_to: None,
        }
    }

    /// Resolves this edge to `target` (a vertex index, or `None` if the name
    /// is assumed to be satisfied externally). Once resolved, the target is
    /// immutable; resolving twice is a programmer error.
    fn resolve(&mut self, target: Option<usize>) -> anyhow::Result<()> {
        if self.is_resolved {
            bail!("Edge for '{}' is already resolved", self.pkgname);
        }
        self.vertex_to = Some(target.map_or(usize::MAX, |t| t));
        self.is_resolved = true;
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.is_resolved
    }

    /// The resolved target vertex index, or `None` if unresolved or resolved
    /// to "no vertex" (assumed satisfied externally).
    pub fn vertex_to(&self) -> Option<usize> {
        self.vertex_to.filter(|&idx| idx != usize::MAX)
    }

    pub fn is_build_time_dependency(&self) -> bool {
        self.dependency_type.is_build_time()
    }
}

#[derive(Debug)]
pub struct DependencyVertex {
    pub buildable: Buildable,
    pub edges: Vec<DependencyEdge>,
}

impl DependencyVertex {
    pub fn pkgname(&self) -> &str {
        &self.buildable.package_info().pkgname
    }

    /// Number of outgoing edges classified as build-time (explicit/make/check).
    /// Used by the planner's root ordering heuristic.
    pub fn num_build_time_dependencies(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| e.is_build_time_dependency())
            .count()
    }
}

/// Vertex arena plus the resolved root edges.
pub struct DependencyGraph {
    pub vertices: Vec<DependencyVertex>,
    pub roots: Vec<DependencyEdge>,
}

/// Identifies one edge to be resolved in a given BFS round: either a root
/// edge, or an edge owned by a vertex already in the arena.
#[derive(Clone, Copy)]
enum EdgeLoc {
    Root(usize),
    Vertex(usize, usize),
}

/// Builds the dependency graph for `root_names` by querying `backends` in
/// priority order, frontier by frontier, per SPEC_FULL.md §4.3.
pub fn build(root_names: &[String], backends: &Backends) -> anyhow::Result<DependencyGraph> {
    let mut vertices: Vec<DependencyVertex> = Vec::new();
    // lowercased pkgname -> resolved target (Some(idx) or None if externally satisfied)
    let mut table: HashMap<String, Option<usize>> = HashMap::new();

    let mut seen_lower = std::collections::HashSet::new();
    let mut roots: Vec<DependencyEdge> = Vec::new();
    for name in root_names {
        if seen_lower.insert(name.to_lowercase()) {
            roots.push(DependencyEdge::new(name.clone(), DependencyType::Explicit));
        }
    }

    let mut frontier: Vec<EdgeLoc> = (0..roots.len()).map(EdgeLoc::Root).collect();

    while !frontier.is_empty() {
        let edge_pkgname = |loc: &EdgeLoc, roots: &[DependencyEdge], vertices: &[DependencyVertex]| -> String {
            match loc {
                EdgeLoc::Root(i) => roots[*i].pkgname.clone(),
                EdgeLoc::Vertex(v, e) => vertices[*v].edges[*e].pkgname.clone(),
            }
        };

        // Names still needing resolution this round, case-insensitively
        // deduplicated (first-seen casing kept for the query).
        let mut pending: HashMap<String, String> = HashMap::new();
        for loc in &frontier {
            let name = edge_pkgname(loc, &roots, &vertices);
            let lower = name.to_lowercase();
            if !table.contains_key(&lower) {
                pending.entry(lower).or_insert(name);
            }
        }

        for backend in backends.ordered() {
            if pending.is_empty() {
                break;
            }
            let query: Vec<String> = pending.values().cloned().collect();
            let results = backend.resolve(&query)?;
            for buildable in results {
                let pkgname = buildable.package_info().pkgname.clone();
                let lower = pkgname.to_lowercase();
                if pending.remove(&lower).is_none() {
                    continue;
                }
                let edges = edges_from_buildable(&buildable);
                let idx = vertices.len();
                vertices.push(DependencyVertex { buildable, edges });
                table.insert(lower, Some(idx));
            }
        }

        for (lower, name) in &pending {
            crate::internal::log::error(&format!("Not found: {}", name));
            table.insert(lower.clone(), None);
        }

        for loc in &frontier {
            let name = edge_pkgname(loc, &roots, &vertices);
            let target = *table
                .get(&name.to_lowercase())
                .ok_or_else(|| anyhow!("Internal error: '{}' was never classified", name))?;
            match loc {
                EdgeLoc::Root(i) => roots[*i].resolve(target)?,
                EdgeLoc::Vertex(v, e) => vertices[*v].edges[*e].resolve(target)?,
            }
        }

        // Next frontier: the unresolved edges owned by vertices created in
        // this round (edges targeting vertices already in the table got
        // resolved above already, in the `for loc in &frontier` pass above -
        // but only for edges that *were* in this round's frontier; a vertex's
        // own edges are new and become next round's frontier here).
        let mut next_frontier = Vec::new();
        for loc in &frontier {
            if let EdgeLoc::Root(i) = loc {
                if let Some(target) = roots[*i].vertex_to() {
                    for e in 0..vertices[target].edges.len() {
                        next_frontier.push(EdgeLoc::Vertex(target, e));
                    }
                }
            } else if let EdgeLoc::Vertex(v, e) = loc {
                if let Some(target) = vertices[*v].edges[*e].vertex_to() {
                    for e2 in 0..vertices[target].edges.len() {
                        next_frontier.push(EdgeLoc::Vertex(target, e2));
                    }
                }
            }
        }
        frontier = next_frontier;
    }

    Ok(DependencyGraph { vertices, roots })
}

/// Builds a vertex's outgoing edges from the union of its three dependency
/// lists. Precedence when a name appears in more than one list: make > check
/// > run (first match wins).
fn edges_from_buildable(buildable: &Buildable) -> Vec<DependencyEdge> {
    let pi = buildable.package_info();
    let mut classified: Vec<(String, DependencyType)> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    let mut add = |names: &[String], ty: DependencyType| {
        for name in names {
            let lower = name.to_lowercase();
            if seen.insert(lower) {
                classified.push((name.clone(), ty));
            }
        }
    };
    add(&pi.makedepends, DependencyType::Make);
    add(&pi.checkdepends, DependencyType::Check);
    add(&pi.depends, DependencyType::Run);

    classified
        .into_iter()
        .map(|(name, ty)| DependencyEdge::new(name, ty))
        .collect()
}

/// Builds an already-resolved edge directly, bypassing the BFS resolver.
/// Used by `plan`'s tests to assemble small graphs by hand.
#[cfg(test)]
pub(crate) fn test_edge(pkgname: &str, dependency_type: DependencyType, target: Option<usize>) -> DependencyEdge {
    let mut edge = DependencyEdge::new(pkgname.to_string(), dependency_type);
    edge.resolve(target).unwrap();
    edge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::backends::Backend;
    use crate::internal::buildable::{AurBuildable, Buildable};
    use crate::internal::package::PackageInfo;
    use crate::internal::version::Version;

    struct FakeBackend {
        packages: Vec<(String, Vec<String>, Vec<String>, Vec<String>)>,
    }

    impl Backend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn resolve(&self, names: &[String]) -> anyhow::Result<Vec<Buildable>> {
            let wanted: std::collections::HashSet<String> =
                names.iter().map(|n| n.to_lowercase()).collect();
            Ok(self
                .packages
                .iter()
                .filter(|(name, ..)| wanted.contains(&name.to_lowercase()))
                .map(|(name, depends, makedepends, checkdepends)| {
                    Buildable::Aur(AurBuildable {
                        package_info: PackageInfo::new(name.clone(), Version::new("1-1"))
                            .with_depends(depends.clone())
                            .with_makedepends(makedepends.clone())
                            .with_checkdepends(checkdepends.clone()),
                    })
                })
                .collect())
        }
    }

    #[test]
    fn classification_precedence_is_make_check_run() {
        let buildable = Buildable::Aur(AurBuildable {
            package_info: PackageInfo::new("foo", Version::new("1-1"))
                .with_depends(vec!["bar".to_string()])
                .with_makedepends(vec!["bar".to_string()])
                .with_checkdepends(vec!["bar".to_string()]),
        });
        let edges = edges_from_buildable(&buildable);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].dependency_type, DependencyType::Make);
    }

    #[test]
    fn case_insensitive_resolution_keeps_backend_casing() {
        let backend = FakeBackend {
            packages: vec![("foo-bar".to_string(), vec![], vec![], vec![])],
        };
        let results = backend.resolve(&["Foo-Bar".to_string()]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].package_info().pkgname, "foo-bar");
    }

    #[test]
    fn double_resolution_is_rejected() {
        let mut edge = DependencyEdge::new("foo".to_string(), DependencyType::Explicit);
        edge.resolve(None).unwrap();
        assert!(edge.resolve(Some(0)).is_err());
    }
}
