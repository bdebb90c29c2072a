//! Drives a `Plan` list to completion: decides whether a chroot is needed at
//! all, seeds each chrooted plan's requisites into the inner repository,
//! materializes and builds each plan's recipe, and publishes the resulting
//! artifacts. A single `BuildException` abandons only its own plan.

use crate::internal::{
    chroot::{self, BuildException},
    common,
    package::pick_package_file,
    plan::Plan,
    repo::Repository,
};
use anyhow::Context;
use std::path::Path;

/// Builds every plan with `build != []` in order, publishing successes into
/// `repo`. Individual build failures are logged and skipped; everything else
/// propagates.
pub fn execute(plans: &[Plan], repo: &mut Repository) -> anyhow::Result<()> {
    let needs_chroot = plans.iter().any(|p| p.chroot() && !p.build.is_empty());

    if needs_chroot {
        let repo_name = common::repo_name();
        let repo_dir = repo.dir().to_path_buf();
        chroot::with_arch_root(&repo_name, &repo_dir, |arch_root: &mut chroot::ArchRoot| {
            for plan in plans {
                if plan.build.is_empty() {
                    continue;
                }
                if plan.chroot() {
                    if let Err(err) = seed_requisites(plan, repo, arch_root) {
                        crate::internal::log::error(&format!("{:#}", err));
                        continue;
                    }
                }
                if let Err(err) = build_and_publish(plan, repo, Some(&*arch_root)) {
                    crate::internal::log::error(&format!("{:#}", err));
                }
            }
            Ok(())
        })
    } else {
        for plan in plans {
            if plan.build.is_empty() {
                continue;
            }
            if let Err(err) = build_and_publish(plan, repo, None) {
                crate::internal::log::error(&format!("{:#}", err));
            }
        }
        Ok(())
    }
}

fn seed_requisites(
    plan: &Plan,
    outer_repo: &Repository,
    arch_root: &mut chroot::ArchRoot,
) -> anyhow::Result<()> {
    for name in &plan.requisites {
        let artifact = outer_repo
            .find_artifact(name)
            .with_context(|| format!("Cannot find requisite artifact for '{}'", name))?;
        arch_root
            .inner_repo
            .add(&artifact)
            .with_context(|| format!("Cannot seed requisite '{}' into chroot", name))?;
    }
    Ok(())
}

fn build_and_publish(
    plan: &Plan,
    repo: &mut Repository,
    arch_root: Option<&chroot::ArchRoot>,
) -> anyhow::Result<()> {
    let workspace = common::new_workspace()?;
    let recipe_dir = plan
        .buildable
        .write_pkgbuild_to(workspace.path())
        .with_context(|| "Cannot materialize build recipe")?;

    match arch_root {
        Some(arch_root) => arch_root.build(&recipe_dir)?,
        None => chroot::build_unchrooted(&recipe_dir)?,
    }

    for pkgname in &plan.build {
        let artifact = pick_package_file(&recipe_dir, pkgname)
            .map_err(|err| anyhow::anyhow!(BuildException(format!("{:#}", err))))?;
        publish(repo, &artifact, pkgname)?;
    }

    Ok(())
}

fn publish(repo: &mut Repository, artifact: &Path, pkgname: &str) -> anyhow::Result<()> {
    repo.add(artifact)
        .with_context(|| format!("Cannot publish '{}' into repository", pkgname))
}

/// Removes every repository artifact not named by any plan's `build` or
/// `keep` list.
pub fn autoremove(plans: &[Plan], repo: &mut Repository) -> anyhow::Result<()> {
    let needed: std::collections::HashSet<&str> = plans
        .iter()
        .flat_map(|p| p.build.iter().chain(p.keep.iter()))
        .map(|s| s.as_str())
        .collect();

    let to_remove: Vec<String> = repo
        .names()
        .filter(|name| !needed.contains(name.as_str()))
        .cloned()
        .collect();

    for name in to_remove {
        crate::internal::log::info(&format!("Removing '{}': no longer needed", name));
        repo.remove(&name)
            .with_context(|| format!("Cannot remove '{}'", name))?;
    }

    Ok(())
}
