//! Git backend. Configured by an ordered list of `(repository, path, branch)`
//! records persisted in `git.json`. On first call, shallow-clones each unique
//! repository once into a transient workspace and evaluates the recipe at
//! `<ws>/<path>` via a sandboxed shell invocation to extract the fields this
//! orchestrator needs.

use crate::internal::{
    backends::Backend,
    buildable::{Buildable, GitBuildable},
    common,
    lock::Config,
    package::{strip_constraints, PackageInfo},
    version::Version,
};
use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct GitSource {
    pub repository: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

pub struct GitBackend {
    resolved: OnceCell<HashMap<String, Buildable>>,
}

impl GitBackend {
    pub fn new() -> Self {
        GitBackend {
            resolved: OnceCell::new(),
        }
    }

    fn ensure_resolved(&self) -> anyhow::Result<&HashMap<String, Buildable>> {
        self.resolved.get_or_try_init(do_resolve)
    }
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for GitBackend {
    fn name(&self) -> &'static str {
        "git"
    }

    fn resolve(&self, names: &[String]) -> anyhow::Result<Vec<Buildable>> {
        let resolved = self.ensure_resolved()?;
        Ok(names
            .iter()
            .filter_map(|name| resolved.get(name))
            .cloned()
            .collect())
    }
}

fn do_resolve() -> anyhow::Result<HashMap<String, Buildable>> {
    let config: Config<Vec<GitSource>> = Config::open("git")?;
    let sources = config.get().cloned().unwrap_or_default();

    let mut pkgname_to_buildable: HashMap<String, Buildable> = HashMap::new();
    let mut repo_url_to_workspace: HashMap<String, PathBuf> = HashMap::new();
    let mut workspaces = Vec::new();

    for source in &sources {
        let ws_path = if let Some(path) = repo_url_to_workspace.get(&source.repository) {
            path.clone()
        } else {
            let ws = common::new_workspace()?;
            let path = ws.path().to_path_buf();
            common::run("git")
                .arg("clone")
                .arg("--depth")
                .arg("1")
                .arg("--branch")
                .arg(&source.branch)
                .arg(&source.repository)
                .arg(&path)
                .inherit()?;
            repo_url_to_workspace.insert(source.repository.clone(), path.clone());
            workspaces.push(ws);
            path
        };

        let recipe_dir = ws_path.join(source.path.trim_start_matches('/'));
        let pkgname = match value_from_pkgbuild(&recipe_dir, "pkgname") {
            Some(v) => v,
            None => continue,
        };
        let pkgver = value_from_pkgbuild(&recipe_dir, "pkgver").unwrap_or_default();
        let pkgrel = value_from_pkgbuild(&recipe_dir, "pkgrel").unwrap_or_default();
        let epoch = value_from_pkgbuild(&recipe_dir, "epoch");
        let pkgbase = value_from_pkgbuild(&recipe_dir, "pkgbase");

        let version = Version::from_components(pkgver, pkgrel, epoch);
        let package_info = PackageInfo::new(pkgname.clone(), version)
            .with_pkgbase(pkgbase)
            .with_depends(strip_constraints(array_from_pkgbuild(&recipe_dir, "depends")))
            .with_makedepends(strip_constraints(array_from_pkgbuild(
                &recipe_dir,
                "makedepends",
            )))
            .with_checkdepends(strip_constraints(array_from_pkgbuild(
                &recipe_dir,
                "checkdepends",
            )));

        if pkgname_to_buildable.contains_key(&pkgname) {
            crate::internal::log::warn(&format!("Multiple git sources for pkgname {}", pkgname));
            continue;
        }

        pkgname_to_buildable.insert(
            pkgname,
            Buildable::Git(GitBuildable {
                package_info,
                repo_url: source.repository.clone(),
                path: source.path.clone(),
                branch: source.branch.clone(),
            }),
        );
    }

    Ok(pkgname_to_buildable)
}

/// Evaluates a single scalar PKGBUILD field by sourcing the recipe in a
/// sandboxed shell.
fn value_from_pkgbuild(cwd: &Path, name: &str) -> Option<String> {
    let script = format!(r#"set +u && . PKGBUILD && echo "${}""#, name);
    let out = common::run("bash")
        .arg("-c")
        .arg(&script)
        .cwd(cwd)
        .quiet(true)
        .allow_error(true)
        .capture()
        .ok()?;
    let out = out.trim();
    if out.is_empty() {
        None
    } else {
        Some(out.to_string())
    }
}

fn array_from_pkgbuild(cwd: &Path, name: &str) -> Vec<String> {
    let script = format!(r#"set +u && . PKGBUILD && printf "%s\n" "${{{}[@]}}""#, name);
    let out = common::run("bash")
        .arg("-c")
        .arg(&script)
        .cwd(cwd)
        .quiet(true)
        .allow_error(true)
        .capture()
        .unwrap_or_default();
    out.lines()
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}
