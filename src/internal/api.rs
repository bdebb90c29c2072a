//! Internal API called by the CLI dispatch function. Every mutating
//! operation acquires the run lock for its whole duration, guaranteeing one
//! autopkg process runs at a time.

use crate::internal::{
    backends::{git::GitSource, Backends},
    common, executor, graph,
    lock::{self, Config},
    plan::{self, Plan},
    repo::Repository,
};
use anyhow::Context;
use std::path::PathBuf;

fn open_repository() -> anyhow::Result<Repository> {
    Repository::open(&common::repo_name(), &common::repository_dir()?, common::sign_key(), false)
}

fn build_plan(targets: &[String]) -> anyhow::Result<(Vec<Plan>, Repository)> {
    let backends = Backends::new();
    let graph = graph::build(targets, &backends)?;
    let repo = open_repository()?;
    let plans = plan::convert_graph_to_plan(&graph, &repo)?;
    Ok((plans, repo))
}

// --- targets ---

pub fn targets_add(names: &[String]) -> anyhow::Result<()> {
    let _run_lock = lock::acquire_run_lock()?;
    let mut config: Config<Vec<String>> = Config::open("targets")?;
    let mut targets = config.get().cloned().unwrap_or_default();
    for name in names {
        if !targets.iter().any(|t| t == name) {
            targets.push(name.clone());
        }
    }
    config.set(targets);
    Ok(())
}

pub fn targets_remove(names: &[String]) -> anyhow::Result<()> {
    let _run_lock = lock::acquire_run_lock()?;
    let mut config: Config<Vec<String>> = Config::open("targets")?;
    let mut targets = config.get().cloned().unwrap_or_default();
    targets.retain(|t| !names.iter().any(|n| n == t));
    config.set(targets);
    Ok(())
}

pub fn targets_list() -> anyhow::Result<()> {
    let config: Config<Vec<String>> = Config::open("targets")?;
    for name in config.get().cloned().unwrap_or_default() {
        println!("{}", name);
    }
    Ok(())
}

// --- packages (direct repository management) ---

pub fn packages_add(paths: &[PathBuf]) -> anyhow::Result<()> {
    let _run_lock = lock::acquire_run_lock()?;
    let mut repo = open_repository()?;
    for path in paths {
        repo.add(path)
            .with_context(|| format!("Cannot add '{}' to repository", path.display()))?;
    }
    Ok(())
}

pub fn packages_remove(names: &[String]) -> anyhow::Result<()> {
    let _run_lock = lock::acquire_run_lock()?;
    let mut repo = open_repository()?;
    for name in names {
        repo.remove(name)
            .with_context(|| format!("Cannot remove '{}' from repository", name))?;
    }
    Ok(())
}

pub fn packages_list() -> anyhow::Result<()> {
    let repo = open_repository()?;
    let mut names: Vec<&String> = repo.names().collect();
    names.sort();
    for name in names {
        let version = repo.version_of(name).map(|v| v.to_string()).unwrap_or_default();
        println!("{} {}", name, version);
    }
    Ok(())
}

// --- git ---

pub fn git_add(repository: String, path: Option<String>, branch: Option<String>) -> anyhow::Result<()> {
    let _run_lock = lock::acquire_run_lock()?;
    let mut config: Config<Vec<GitSource>> = Config::open("git")?;
    let mut sources = config.get().cloned().unwrap_or_default();
    sources.push(GitSource {
        repository,
        path: path.unwrap_or_else(|| "/".to_string()),
        branch: branch.unwrap_or_else(|| "master".to_string()),
    });
    config.set(sources);
    Ok(())
}

pub fn git_remove(indices: &[usize]) -> anyhow::Result<()> {
    let _run_lock = lock::acquire_run_lock()?;
    let mut config: Config<Vec<GitSource>> = Config::open("git")?;
    let mut sources = config.get().cloned().unwrap_or_default();
    let mut sorted = indices.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    for index in sorted {
        if index < sources.len() {
            sources.remove(index);
        }
    }
    config.set(sources);
    Ok(())
}

pub fn git_list() -> anyhow::Result<()> {
    let config: Config<Vec<GitSource>> = Config::open("git")?;
    for (index, source) in config.get().cloned().unwrap_or_default().iter().enumerate() {
        println!("{}: {} [{}] ({})", index, source.repository, source.branch, source.path);
    }
    Ok(())
}

// --- plan / update / autoremove ---

fn current_targets() -> anyhow::Result<Vec<String>> {
    let config: Config<Vec<String>> = Config::open("targets")?;
    Ok(config.get().cloned().unwrap_or_default())
}

pub fn plan() -> anyhow::Result<()> {
    let targets = current_targets()?;
    let (plans, _repo) = build_plan(&targets)?;
    print_plans(&plans);
    Ok(())
}

fn print_plans(plans: &[Plan]) {
    for plan in plans {
        println!(
            "{} chroot={} requisites=[{}] build=[{}] keep=[{}]",
            plan.buildable.source_reference(),
            plan.chroot(),
            plan.requisites.join(", "),
            plan.build.join(", "),
            plan.keep.join(", "),
        );
    }
}

pub fn update(autoremove_after: bool) -> anyhow::Result<()> {
    let _run_lock = lock::acquire_run_lock()?;
    let targets = current_targets()?;
    let (plans, mut repo) = build_plan(&targets)?;
    executor::execute(&plans, &mut repo)?;
    if autoremove_after {
        executor::autoremove(&plans, &mut repo)?;
    }
    Ok(())
}

pub fn autoremove() -> anyhow::Result<()> {
    let _run_lock = lock::acquire_run_lock()?;
    let targets = current_targets()?;
    let (plans, mut repo) = build_plan(&targets)?;
    executor::autoremove(&plans, &mut repo)
}
