//! Chroot lifecycle: scoped acquisition/teardown of a build root, and the two
//! build strategies (chrooted via `makechrootpkg`, unchrooted via `makepkg`).
//! Streamed build output and up-front argument assembly follow the teacher's
//! `pkgbuild.rs` build invocations; unconditional scope cleanup on every exit
//! path follows the teacher's `repo.rs` `lock!` macro, which wraps
//! `scopeguard::defer!` around a lock/unlock pair.

use crate::internal::{common, repo::Repository};
use anyhow::{anyhow, Context};
use scopeguard::defer;
use std::path::{Path, PathBuf};

/// Raised when a build fails after exhausting whatever retries apply.
#[derive(Debug)]
pub struct BuildException(pub String);

impl std::fmt::Display for BuildException {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BuildException {}

/// A live chroot build root, with its own nested repository for make-time
/// dependency seeding.
pub struct ArchRoot {
    root: PathBuf,
    pub inner_repo: Repository,
}

impl ArchRoot {
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Invokes `makechrootpkg -c -u -l working -r <root>` with `cwd =
    /// pkgbuild_dir`, retrying up to `AUTOPKG_RETRY` times. Returns as soon as
    /// one attempt succeeds.
    pub fn build(&self, pkgbuild_dir: &Path) -> anyhow::Result<()> {
        let attempts = common::retry_count().max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            let result = common::run("makechrootpkg")
                .arg("-c")
                .arg("-u")
                .arg("-l")
                .arg("working")
                .arg("-r")
                .arg(&self.root)
                .cwd(pkgbuild_dir)
                .inherit();
            match result {
                Ok(()) => return Ok(()),
                Err(err) => {
                    crate::internal::log::warn(&format!(
                        "makechrootpkg attempt {}/{} for '{}' failed: {:#}",
                        attempt,
                        attempts,
                        pkgbuild_dir.display(),
                        err
                    ));
                    last_err = Some(err);
                }
            }
        }

        crate::internal::log::error(&format!(
            "Build in chroot from '{}' failed after {} attempt(s)",
            pkgbuild_dir.display(),
            attempts
        ));
        Err(anyhow!(BuildException(format!(
            "Build in chroot from '{}' failed after {} attempt(s): {}",
            pkgbuild_dir.display(),
            attempts,
            last_err.map(|e| format!("{:#}", e)).unwrap_or_default()
        ))))
    }
}

/// Creates a fresh chroot rooted at a new workspace, runs `body` with it, and
/// tears the chroot down on every exit path, including an error return from
/// `body`.
pub fn with_arch_root<F, T>(repo_name: &str, outer_repo_dir: &Path, body: F) -> anyhow::Result<T>
where
    F: FnOnce(&mut ArchRoot) -> anyhow::Result<T>,
{
    let workspace = common::new_workspace()?;
    let root = workspace.path().join("root");

    common::run("mkarchroot")
        .sudo(true)
        .arg(&root)
        .arg("base-devel")
        .inherit()
        .with_context(|| format!("Cannot create chroot at '{}'", root.display()))?;

    defer! {
        cleanup_arch_root(&root);
    }

    let pacman_conf = root.join("etc/pacman.conf");
    let stanza = format!(
        "\n[{name}]\nSigLevel = Never\nServer = file://{dir}\n",
        name = repo_name,
        dir = outer_repo_dir.display(),
    );
    common::run("tee")
        .sudo(true)
        .arg("-a")
        .arg(&pacman_conf)
        .stdin(stanza)
        .quiet(true)
        .capture()
        .with_context(|| format!("Cannot append repo stanza to '{}'", pacman_conf.display()))?;

    let inner_repo_dir = root.join("repo");
    let inner_repo = Repository::open(repo_name, &inner_repo_dir, None, true)
        .with_context(|| format!("Cannot open inner repository at '{}'", inner_repo_dir.display()))?;

    let mut arch_root = ArchRoot {
        root: root.clone(),
        inner_repo,
    };
    body(&mut arch_root)
}

/// Removes `root` and any sibling `working` directory left by
/// `makechrootpkg -l working`. Detects btrfs via `stat -f -c %T` and, when
/// found, deletes the nested `var/lib/machines` and `root` itself as
/// subvolumes (errors tolerated, since `root` may not actually be a
/// subvolume boundary); otherwise falls back to a plain `rm -rf`.
fn cleanup_arch_root(root: &Path) {
    let fs_type = common::run("stat")
        .arg("-f")
        .arg("-c")
        .arg("%T")
        .arg(root)
        .quiet(true)
        .allow_error(true)
        .capture()
        .unwrap_or_default();

    if fs_type.trim() == "btrfs" {
        let machines = root.join("var/lib/machines");
        let _ = common::run("btrfs")
            .sudo(true)
            .arg("subvolume")
            .arg("delete")
            .arg(&machines)
            .allow_error(true)
            .inherit();
        let _ = common::run("btrfs")
            .sudo(true)
            .arg("subvolume")
            .arg("delete")
            .arg(root)
            .allow_error(true)
            .inherit();
    } else {
        let _ = common::run("rm")
            .sudo(true)
            .arg("-rf")
            .arg(root)
            .allow_error(true)
            .inherit();
    }

    if let Some(parent) = root.parent() {
        let working = parent.join("working");
        if working.exists() {
            let _ = common::run("rm")
                .sudo(true)
                .arg("-rf")
                .arg(&working)
                .allow_error(true)
                .inherit();
        }
    }
}

/// Unchrooted build via a single `makepkg` invocation.
pub fn build_unchrooted(pkgbuild_dir: &Path) -> anyhow::Result<()> {
    common::run("makepkg")
        .arg("-c")
        .arg("--noconfirm")
        .arg("--needed")
        .arg("--syncdeps")
        .cwd(pkgbuild_dir)
        .inherit()
        .map_err(|err| anyhow!(BuildException(format!("{:#}", err))))
}
