//! Lowers a [`DependencyGraph`] into an ordered, deduplicated list of
//! [`Plan`]s: one per distinct [`SourceReference`], each carrying the
//! build-vs-keep decision for every package name that maps to it.

use crate::internal::{
    buildable::Buildable,
    graph::DependencyGraph,
    source::SourceReference,
    version::Version,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};

/// Supplies the version currently held in the local repository for a given
/// package name, if any. Implemented by `Repository`.
pub trait CurrentVersions {
    fn version_of(&self, pkgname: &str) -> Option<Version>;
}

/// One unit of planned work: a recipe to materialize, the artifact names it
/// must pre-seed into the build environment, and the build-vs-keep split of
/// its own package names.
#[derive(Debug)]
pub struct Plan {
    pub buildable: Buildable,
    pub requisites: Vec<String>,
    pub build: Vec<String>,
    pub keep: Vec<String>,
}

impl Plan {
    fn new(buildable: Buildable, requisites: Vec<String>) -> Self {
        Plan {
            buildable,
            requisites,
            build: Vec::new(),
            keep: Vec::new(),
        }
    }

    /// A chroot is required when the recipe itself is untrusted, or when the
    /// build environment needs pre-seeded requisites at all.
    pub fn chroot(&self) -> bool {
        self.buildable.chroot_required() || !self.requisites.is_empty()
    }

    /// Decides build vs keep for `pkgname`: kept iff the repository already
    /// holds a version at least as new as this plan's buildable.
    fn add(&mut self, pkgname: String, versions: &dyn CurrentVersions) -> anyhow::Result<()> {
        let buildable_version = &self.buildable.package_info().version;
        let keep = match versions.version_of(&pkgname) {
            Some(current) => current.at_least(buildable_version)?,
            None => false,
        };
        if keep {
            self.keep.push(pkgname);
        } else {
            self.build.push(pkgname);
        }
        Ok(())
    }
}

/// Carries a build-time dependency cycle as an ordered chain. Built up as the
/// call stack unwinds: each visited frame prepends its own package name,
/// until the name that started the cycle reappears, at which point the chain
/// is sealed and further prepends are no-ops.
#[derive(Debug)]
pub struct CyclicDependencyError {
    chain: Vec<String>,
    sealed: bool,
}

impl CyclicDependencyError {
    fn new(name: String) -> Self {
        CyclicDependencyError {
            chain: vec![name],
            sealed: false,
        }
    }

    fn prepend(mut self, name: String) -> Self {
        if self.sealed {
            return self;
        }
        if self.chain.first() == Some(&name) {
            self.sealed = true;
        }
        self.chain.insert(0, name);
        self
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }
}

impl Display for CyclicDependencyError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Cyclic build dependency: {}", self.chain.join(" -> "))
    }
}

impl std::error::Error for CyclicDependencyError {}

fn prepend_if_cyclic(err: anyhow::Error, name: &str) -> anyhow::Error {
    match err.downcast::<CyclicDependencyError>() {
        Ok(cyclic) => cyclic.prepend(name.to_string()).into(),
        Err(other) => other,
    }
}

/// Lowers `graph` into an ordered `Plan` list. Root edges are visited in
/// ascending order of their target's `num_build_time_dependencies`, so
/// lightweight builds are planned first.
pub fn convert_graph_to_plan(
    graph: &DependencyGraph,
    versions: &dyn CurrentVersions,
) -> anyhow::Result<Vec<Plan>> {
    let mut order: Vec<usize> = (0..graph.roots.len()).collect();
    order.sort_by_key(|&i| {
        graph.roots[i]
            .vertex_to()
            .map(|t| graph.vertices[t].num_build_time_dependencies())
            .unwrap_or(0)
    });

    let mut plans: Vec<Plan> = Vec::new();
    let mut plan_index: HashMap<SourceReference, usize> = HashMap::new();

    for i in order {
        let edge = &graph.roots[i];
        let Some(target) = edge.vertex_to() else {
            continue;
        };
        let mut required_by: Vec<String> = Vec::new();
        visit(
            graph,
            target,
            &edge.pkgname,
            &mut required_by,
            &mut plans,
            &mut plan_index,
            versions,
        )?;
    }

    Ok(plans)
}

#[allow(clippy::too_many_arguments)]
fn visit(
    graph: &DependencyGraph,
    vertex_idx: usize,
    name: &str,
    required_by: &mut Vec<String>,
    plans: &mut Vec<Plan>,
    plan_index: &mut HashMap<SourceReference, usize>,
    versions: &dyn CurrentVersions,
) -> anyhow::Result<()> {
    let vertex = &graph.vertices[vertex_idx];
    let canonical = vertex.pkgname().to_string();
    let source_ref = vertex.buildable.source_reference();

    if let Some(&pidx) = plan_index.get(&source_ref) {
        plans[pidx].add(name.to_string(), versions)?;
        return Ok(());
    }

    if required_by.iter().any(|n| n.eq_ignore_ascii_case(&canonical)) {
        return Err(CyclicDependencyError::new(canonical).into());
    }

    for edge in &vertex.edges {
        let Some(edge_target) = edge.vertex_to() else {
            continue;
        };
        let is_build_time = edge.is_build_time_dependency();
        if is_build_time {
            required_by.push(canonical.clone());
        }
        let result = visit(
            graph,
            edge_target,
            &edge.pkgname,
            required_by,
            plans,
            plan_index,
            versions,
        );
        if is_build_time {
            required_by.pop();
        }
        result.map_err(|e| prepend_if_cyclic(e, &canonical))?;
    }

    if !plan_index.contains_key(&source_ref) {
        let mut requisites: BTreeSet<String> = BTreeSet::new();
        for edge in &vertex.edges {
            if let Some(edge_target) = edge.vertex_to() {
                let target_ref = graph.vertices[edge_target].buildable.source_reference();
                if let Some(&pidx) = plan_index.get(&target_ref) {
                    requisites.extend(plans[pidx].build.iter().cloned());
                    requisites.extend(plans[pidx].keep.iter().cloned());
                    requisites.extend(plans[pidx].requisites.iter().cloned());
                }
            }
        }
        let plan_idx = plans.len();
        plans.push(Plan::new(
            vertex.buildable.clone(),
            requisites.into_iter().collect(),
        ));
        plan_index.insert(source_ref, plan_idx);
    }

    let pidx = plan_index[&vertex.buildable.source_reference()];
    plans[pidx].add(name.to_string(), versions)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::buildable::{AurBuildable, GitBuildable};
    use crate::internal::graph::{test_edge, DependencyType, DependencyVertex};
    use crate::internal::package::PackageInfo;

    struct NoVersions;
    impl CurrentVersions for NoVersions {
        fn version_of(&self, _pkgname: &str) -> Option<Version> {
            None
        }
    }

    struct FixedVersions(HashMap<String, Version>);
    impl CurrentVersions for FixedVersions {
        fn version_of(&self, pkgname: &str) -> Option<Version> {
            self.0.get(pkgname).cloned()
        }
    }

    fn aur_vertex(name: &str, edges: Vec<crate::internal::graph::DependencyEdge>) -> DependencyVertex {
        DependencyVertex {
            buildable: Buildable::Aur(AurBuildable {
                package_info: PackageInfo::new(name, Version::new("1-1")),
            }),
            edges,
        }
    }

    #[test]
    fn detects_build_time_cycle() {
        // A --make--> B --make--> A
        let vertices = vec![
            aur_vertex("a", vec![test_edge("b", DependencyType::Make, Some(1))]),
            aur_vertex("b", vec![test_edge("a", DependencyType::Make, Some(0))]),
        ];
        let roots = vec![test_edge("a", DependencyType::Explicit, Some(0))];
        let graph = DependencyGraph { vertices, roots };

        let err = convert_graph_to_plan(&graph, &NoVersions).unwrap_err();
        let cyclic = err.downcast::<CyclicDependencyError>().unwrap();
        assert!(cyclic.chain().contains(&"a".to_string()));
        assert!(cyclic.chain().contains(&"b".to_string()));
    }

    #[test]
    fn runtime_only_cycle_is_tolerated() {
        // A --run--> B --run--> A : no build-time cycle, must not error.
        let vertices = vec![
            aur_vertex("a", vec![test_edge("b", DependencyType::Run, Some(1))]),
            aur_vertex("b", vec![test_edge("a", DependencyType::Run, Some(0))]),
        ];
        let roots = vec![test_edge("a", DependencyType::Explicit, Some(0))];
        let graph = DependencyGraph { vertices, roots };

        let plans = convert_graph_to_plan(&graph, &NoVersions).unwrap();
        assert_eq!(plans.len(), 2);
    }

    #[test]
    fn merges_plans_sharing_a_source_reference() {
        let vertices = vec![
            DependencyVertex {
                buildable: Buildable::Git(GitBuildable {
                    package_info: PackageInfo::new("bar", Version::new("1-1")),
                    repo_url: "https://example.invalid/repo".to_string(),
                    path: "/".to_string(),
                    branch: "master".to_string(),
                }),
                edges: vec![],
            },
            DependencyVertex {
                buildable: Buildable::Git(GitBuildable {
                    package_info: PackageInfo::new("bar-extras", Version::new("1-1")),
                    repo_url: "https://example.invalid/repo".to_string(),
                    path: "/".to_string(),
                    branch: "master".to_string(),
                }),
                edges: vec![],
            },
        ];
        let roots = vec![
            test_edge("bar", DependencyType::Explicit, Some(0)),
            test_edge("bar-extras", DependencyType::Explicit, Some(1)),
        ];
        let graph = DependencyGraph { vertices, roots };

        let plans = convert_graph_to_plan(&graph, &NoVersions).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].build, vec!["bar".to_string(), "bar-extras".to_string()]);
    }

    #[test]
    fn keeps_when_repo_version_is_at_least_buildable_version() {
        let vertices = vec![aur_vertex("foo", vec![])];
        let roots = vec![test_edge("foo", DependencyType::Explicit, Some(0))];
        let graph = DependencyGraph { vertices, roots };

        let mut current = HashMap::new();
        current.insert("foo".to_string(), Version::new("1-1"));
        let plans = convert_graph_to_plan(&graph, &FixedVersions(current)).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].keep, vec!["foo".to_string()]);
        assert!(plans[0].build.is_empty());
    }
}
