//! Local pacman repository: a directory of package artifacts plus a
//! `repo-add`-managed database. Per SPEC_FULL.md §4.1, the database archive is
//! read directly (gzip decompression plus tar member enumeration) rather than
//! by shelling out to a pacman library, since all autopkg needs from it is the
//! set of `(pkgname, version)` pairs it currently holds. A repository may be
//! opened with `privileged_writes`, routing every mutation through `sudo` for
//! repositories rooted under a root-owned directory (the chroot's inner repo).

use crate::internal::{
    common,
    package::{parse_artifact_file_name, pick_package_file, PackageTinyInfo},
    plan::CurrentVersions,
    version::Version,
};
use anyhow::{anyhow, Context};
use flate2::read::GzDecoder;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

pub struct Repository {
    name: String,
    dir: PathBuf,
    sign_key: Option<String>,
    privileged_writes: bool,
    packages: HashMap<String, Version>,
}

impl Repository {
    /// Opens the repository at `dir`, creating its database if absent. When
    /// `privileged_writes` is set, every write this repository performs (the
    /// initial `repo-add`, and every `add`/`remove`) runs through `sudo` -
    /// the chroot's inner repository lives under a root-owned root directory
    /// created by `mkarchroot`, so an unprivileged write there would simply
    /// fail with a permission error.
    pub fn open(name: &str, dir: &Path, sign_key: Option<String>, privileged_writes: bool) -> anyhow::Result<Self> {
        if privileged_writes {
            common::run("mkdir")
                .arg("-p")
                .arg(dir)
                .sudo(true)
                .inherit()
                .with_context(|| format!("Cannot create directory '{}'", dir.display()))?;
        } else {
            common::ensure_dir(dir)?;
        }
        let db_path = dir.join(format!("{}.db.tar.gz", name));
        if !db_path.exists() {
            common::run("repo-add")
                .arg(&db_path)
                .cwd(dir)
                .sudo(privileged_writes)
                .inherit()
                .with_context(|| format!("Cannot create repository database '{}'", db_path.display()))?;
        }

        let packages = read_database(&db_path)?;

        Ok(Repository {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            sign_key,
            privileged_writes,
            packages,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn db_path(&self) -> PathBuf {
        self.dir.join(format!("{}.db.tar.gz", self.name))
    }

    /// Registers `artifact_file` (an already-built `.pkg.tar.xz`) into the
    /// repository. No-op if the exact `(pkgname, version)` is already present.
    pub fn add(&mut self, artifact_file: &Path) -> anyhow::Result<()> {
        let (pkgname, version) = parse_artifact_file_name(
            artifact_file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("'{}' has no valid file name", artifact_file.display()))?,
        )
        .with_context(|| format!("Cannot parse artifact file name '{}'", artifact_file.display()))?;

        if self
            .packages
            .get(&pkgname)
            .map(|v| *v == version)
            .unwrap_or(false)
        {
            return Ok(());
        }

        let file_name = artifact_file
            .file_name()
            .ok_or_else(|| anyhow!("'{}' has no file name", artifact_file.display()))?;
        let dest = self.dir.join(file_name);
        if artifact_file != dest {
            if self.privileged_writes {
                common::run("cp")
                    .arg(artifact_file)
                    .arg(&dest)
                    .sudo(true)
                    .inherit()
                    .with_context(|| {
                        format!(
                            "Cannot copy '{}' into repository '{}'",
                            artifact_file.display(),
                            self.dir.display()
                        )
                    })?;
            } else {
                fs::copy(artifact_file, &dest).with_context(|| {
                    format!(
                        "Cannot copy '{}' into repository '{}'",
                        artifact_file.display(),
                        self.dir.display()
                    )
                })?;
            }
        }

        if let Some(key) = &self.sign_key {
            common::run("gpg")
                .arg("--detach-sign")
                .arg("--local-user")
                .arg(key)
                .arg("--batch")
                .arg("--yes")
                .arg(&dest)
                .sudo(self.privileged_writes)
                .inherit()
                .with_context(|| format!("Cannot sign '{}'", dest.display()))?;
        }

        let mut cmd = common::run("repo-add").arg("-R");
        if let Some(key) = &self.sign_key {
            cmd = cmd.arg("--sign").arg("--key").arg(key);
        }
        cmd.arg(self.db_path())
            .arg(&dest)
            .cwd(&self.dir)
            .sudo(self.privileged_writes)
            .inherit()
            .with_context(|| format!("Cannot add '{}' to repository database", dest.display()))?;

        self.packages.insert(pkgname, version);
        Ok(())
    }

    /// Selects the unique artifact file for `pkgname`.
    pub fn find_artifact(&self, pkgname: &str) -> anyhow::Result<PathBuf> {
        pick_package_file(&self.dir, pkgname)
    }

    /// Removes `pkgname`'s artifact, signature and database entry.
    pub fn remove(&mut self, pkgname: &str) -> anyhow::Result<()> {
        let artifact = self.find_artifact(pkgname)?;
        let sig = PathBuf::from(format!("{}.sig", artifact.display()));

        common::run("repo-remove")
            .arg(self.db_path())
            .arg(pkgname)
            .cwd(&self.dir)
            .sudo(self.privileged_writes)
            .inherit()
            .with_context(|| format!("Cannot remove '{}' from repository database", pkgname))?;

        if self.privileged_writes {
            common::run("rm")
                .arg("-f")
                .arg(&artifact)
                .sudo(true)
                .inherit()
                .with_context(|| format!("Cannot remove artifact '{}'", artifact.display()))?;
            if sig.exists() {
                common::run("rm")
                    .arg("-f")
                    .arg(&sig)
                    .sudo(true)
                    .inherit()
                    .with_context(|| format!("Cannot remove signature '{}'", sig.display()))?;
            }
        } else {
            fs::remove_file(&artifact)
                .with_context(|| format!("Cannot remove artifact '{}'", artifact.display()))?;
            if sig.exists() {
                fs::remove_file(&sig)
                    .with_context(|| format!("Cannot remove signature '{}'", sig.display()))?;
            }
        }

        self.packages.remove(pkgname);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.packages.keys()
    }

    pub fn version_of(&self, pkgname: &str) -> Option<Version> {
        self.packages.get(pkgname).cloned()
    }
}

impl CurrentVersions for Repository {
    fn version_of(&self, pkgname: &str) -> Option<Version> {
        Repository::version_of(self, pkgname)
    }
}

/// Reads the `pkgname -> version` map out of a `repo-add`-format database
/// archive by enumerating its tar member directory names directly, without
/// invoking pacman tooling.
fn read_database(db_path: &Path) -> anyhow::Result<HashMap<String, Version>> {
    let file = fs::File::open(db_path)
        .with_context(|| format!("Cannot open repository database '{}'", db_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut packages = HashMap::new();
    for entry in archive
        .entries()
        .with_context(|| format!("Cannot read repository database '{}'", db_path.display()))?
    {
        let entry = entry.with_context(|| {
            format!("Cannot read entry in repository database '{}'", db_path.display())
        })?;
        if !entry.header().entry_type().is_dir() {
            continue;
        }
        let path = entry.path().with_context(|| "Cannot read archive member path")?;
        let dir_name = match path.components().next() {
            Some(std::path::Component::Normal(name)) => name.to_string_lossy().into_owned(),
            _ => continue,
        };
        let info = match PackageTinyInfo::from_repodb_directory_name(&dir_name) {
            Ok(info) => info,
            Err(_) => continue,
        };
        packages.insert(info.name, info.version);
    }

    Ok(packages)
}
