//! A `Buildable` is a backend-produced unit that can materialize a build
//! recipe (a `PKGBUILD` plus any accompanying sources) at a given workspace
//! path. Represented as a flat tagged variant rather than a trait object or an
//! inheritance tree, per the three concrete shapes backends actually produce.

use crate::internal::{common, package::PackageInfo, source::SourceReference};
use anyhow::Context;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum Buildable {
    Aur(AurBuildable),
    GShellExt(GShellExtBuildable),
    Git(GitBuildable),
}

#[derive(Debug, Clone)]
pub struct AurBuildable {
    pub package_info: PackageInfo,
}

#[derive(Debug, Clone)]
pub struct GShellExtBuildable {
    pub package_info: PackageInfo,
    pub uuid: String,
    pub version: u64,
    pub version_tag: u64,
    pub description: String,
    pub link: String,
}

#[derive(Debug, Clone)]
pub struct GitBuildable {
    pub package_info: PackageInfo,
    pub repo_url: String,
    pub path: String,
    pub branch: String,
}

impl Buildable {
    pub fn package_info(&self) -> &PackageInfo {
        match self {
            Buildable::Aur(b) => &b.package_info,
            Buildable::GShellExt(b) => &b.package_info,
            Buildable::Git(b) => &b.package_info,
        }
    }

    pub fn source_reference(&self) -> SourceReference {
        match self {
            Buildable::Aur(b) => SourceReference::Aur {
                pkgbase: b.package_info.pkgbase.clone(),
            },
            Buildable::GShellExt(b) => SourceReference::GShellExt {
                uuid: b.uuid.clone(),
            },
            Buildable::Git(b) => SourceReference::Git {
                repo_url: b.repo_url.clone(),
                path: b.path.clone(),
                branch: b.branch.clone(),
            },
        }
    }

    /// Any variant whose upstream recipe is untrusted (AUR, Git) requires a
    /// chroot; generated recipes (GShellExt) do not by themselves.
    pub fn chroot_required(&self) -> bool {
        matches!(self, Buildable::Aur(_) | Buildable::Git(_))
    }

    /// Materializes this Buildable's recipe at `path`, returning the directory
    /// that actually contains the `PKGBUILD` file (for Git buildables this may
    /// be a subdirectory of `path`).
    pub fn write_pkgbuild_to(&self, path: &Path) -> anyhow::Result<PathBuf> {
        match self {
            Buildable::Aur(b) => {
                let url = crate::internal::backends::aur::clone_url(&b.package_info.pkgbase);
                common::run("git")
                    .arg("clone")
                    .arg("--depth")
                    .arg("1")
                    .arg(&url)
                    .arg(path)
                    .inherit()
                    .with_context(|| format!("Cannot clone AUR repository '{}'", url))?;
                Ok(path.to_path_buf())
            }
            Buildable::GShellExt(b) => {
                let pkgbuild = crate::internal::backends::gshellext::render_pkgbuild(b);
                std::fs::write(path.join("PKGBUILD"), pkgbuild)
                    .with_context(|| "Cannot write generated PKGBUILD")?;
                Ok(path.to_path_buf())
            }
            Buildable::Git(b) => {
                common::run("git")
                    .arg("clone")
                    .arg("--depth")
                    .arg("1")
                    .arg("--branch")
                    .arg(&b.branch)
                    .arg(&b.repo_url)
                    .arg(path)
                    .inherit()
                    .with_context(|| format!("Cannot clone git repository '{}'", b.repo_url))?;
                Ok(path.join(b.path.trim_start_matches('/')))
            }
        }
    }
}
