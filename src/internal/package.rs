//! Per-package metadata and the artifact/database-entry naming conventions
//! used to recover it from the filesystem.

use crate::internal::version::Version;
use anyhow::{anyhow, Context};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

/// Strips a `>`, `<` or `=` version constraint suffix from a dependency token,
/// e.g. `glibc>=2.30` -> `glibc`.
pub fn strip_constraint(token: &str) -> String {
    token
        .split(['>', '<', '='])
        .next()
        .unwrap_or(token)
        .to_string()
}

pub fn strip_constraints<I, S>(tokens: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|t| strip_constraint(t.as_ref()))
        .collect()
}

/// Full metadata for a package as produced by a backend.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub pkgname: String,
    pub version: Version,
    pub pkgbase: String,
    pub depends: Vec<String>,
    pub makedepends: Vec<String>,
    pub checkdepends: Vec<String>,
}

impl PackageInfo {
    pub fn new<S: Into<String>>(pkgname: S, version: Version) -> Self {
        let pkgname = pkgname.into();
        PackageInfo {
            pkgbase: pkgname.clone(),
            pkgname,
            version,
            depends: vec![],
            makedepends: vec![],
            checkdepends: vec![],
        }
    }

    pub fn with_pkgbase<S: Into<String>>(mut self, pkgbase: Option<S>) -> Self {
        if let Some(pkgbase) = pkgbase {
            self.pkgbase = pkgbase.into();
        }
        self
    }

    pub fn with_depends(mut self, depends: Vec<String>) -> Self {
        self.depends = depends;
        self
    }

    pub fn with_makedepends(mut self, makedepends: Vec<String>) -> Self {
        self.makedepends = makedepends;
        self
    }

    pub fn with_checkdepends(mut self, checkdepends: Vec<String>) -> Self {
        self.checkdepends = checkdepends;
        self
    }
}

/// Minimal info recovered directly from a repository database's directory
/// entries: just enough to know whether a build is needed.
#[derive(Debug, Clone)]
pub struct PackageTinyInfo {
    pub name: String,
    pub version: Version,
}

impl PackageTinyInfo {
    /// Parses a `repo-add` database directory-member name of the form
    /// `<pkgname>-<pkgver>-<pkgrel>`: the last two hyphen-separated tokens are
    /// the version, the rest is the name.
    pub fn from_repodb_directory_name(name: &str) -> anyhow::Result<Self> {
        let parts: Vec<&str> = name.split('-').collect();
        if parts.len() < 3 {
            return Err(anyhow!(
                "Database directory entry '{}' does not look like '<pkgname>-<pkgver>-<pkgrel>'",
                name
            ));
        }
        let (name_parts, version_parts) = parts.split_at(parts.len() - 2);
        Ok(PackageTinyInfo {
            name: name_parts.join("-"),
            version: Version::new(version_parts.join("-")),
        })
    }
}

lazy_static! {
    /// Matches `<pkgname>-<pkgver>-<pkgrel>-<arch>.pkg.tar.<suffix>`, capturing
    /// name, pkgver, pkgrel, arch and compression suffix.
    static ref RE_ARTIFACT_FILE: Regex =
        Regex::new(r"^(.+)-([^-]+)-([^-]+)-([^-.]+)\.pkg\.tar\.[^.]+$").unwrap();
}

/// Splits an artifact file name (basename only) into `(pkgname, version)`.
/// Parsing splits on `-` from the right: the last token is `arch.ext`, then
/// `pkgrel`, then `pkgver`; the remainder is `pkgname`.
pub fn parse_artifact_file_name(file_name: &str) -> anyhow::Result<(String, Version)> {
    let caps = RE_ARTIFACT_FILE.captures(file_name).ok_or_else(|| {
        anyhow!(
            "'{}' does not look like a package artifact file name",
            file_name
        )
    })?;
    let name = caps[1].to_string();
    let pkgver = &caps[2];
    let pkgrel = &caps[3];
    Ok((name, Version::new(format!("{}-{}", pkgver, pkgrel))))
}

/// Parses `(pkgname, version)` out of a full artifact file path.
pub fn from_package_file_path<P: AsRef<Path>>(path: P) -> anyhow::Result<(String, Version)> {
    let file_name = path
        .as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("'{}' has no valid file name", path.as_ref().display()))?;
    parse_artifact_file_name(file_name)
        .with_context(|| format!("Cannot parse artifact file name '{}'", file_name))
}

/// Selects the unique file in `dir` whose name matches
/// `<escaped-name>-(<epoch>:)?<pkgver>-<pkgrel>-<arch>.pkg.tar.xz`; fails if
/// zero or more than one file matches.
pub fn pick_package_file<P: AsRef<Path>>(dir: P, pkgname: &str) -> anyhow::Result<std::path::PathBuf> {
    let pattern = format!(
        r"^{}-([0-9]+:)?[a-zA-Z0-9_.@+]+-[a-zA-Z0-9_.@+]+-[a-zA-Z0-9_.@+]+\.pkg\.tar\.[a-z]+$",
        regex::escape(pkgname)
    );
    let re = Regex::new(&pattern)?;

    let matched: Vec<_> = std::fs::read_dir(dir.as_ref())
        .with_context(|| format!("Cannot read directory '{}'", dir.as_ref().display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| re.is_match(n))
                .unwrap_or(false)
        })
        .collect();

    match matched.len() {
        1 => Ok(matched.into_iter().next().unwrap()),
        0 => Err(anyhow!(
            "No package file for '{}' found in '{}'",
            pkgname,
            dir.as_ref().display()
        )),
        n => Err(anyhow!(
            "Expected exactly one package file for '{}' in '{}', found {}",
            pkgname,
            dir.as_ref().display(),
            n
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_version_constraints() {
        assert_eq!(strip_constraint("glibc>=2.30"), "glibc");
        assert_eq!(strip_constraint("foo<1"), "foo");
        assert_eq!(strip_constraint("foo=1.2-3"), "foo");
        assert_eq!(strip_constraint("foo"), "foo");
    }

    #[test]
    fn parses_artifact_file_name() {
        let (name, version) = parse_artifact_file_name("foo-1.0-1-x86_64.pkg.tar.zst").unwrap();
        assert_eq!(name, "foo");
        assert_eq!(version.as_str(), "1.0-1");
    }

    #[test]
    fn parses_artifact_file_name_with_bit_exact_xz_suffix() {
        let (name, version) = parse_artifact_file_name("foo-1.0-1-x86_64.pkg.tar.xz").unwrap();
        assert_eq!(name, "foo");
        assert_eq!(version.as_str(), "1.0-1");
    }

    #[test]
    fn parses_artifact_file_name_with_hyphenated_name() {
        let (name, version) =
            parse_artifact_file_name("gnome-shell-extension-foo-1.0-1-any.pkg.tar.zst").unwrap();
        assert_eq!(name, "gnome-shell-extension-foo");
        assert_eq!(version.as_str(), "1.0-1");
    }

    #[test]
    fn parses_repodb_directory_name() {
        let info = PackageTinyInfo::from_repodb_directory_name("foo-1.0-1").unwrap();
        assert_eq!(info.name, "foo");
        assert_eq!(info.version.as_str(), "1.0-1");
    }

    #[test]
    fn rejects_malformed_repodb_directory_name() {
        assert!(PackageTinyInfo::from_repodb_directory_name("foo").is_err());
    }
}
