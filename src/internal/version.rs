//! Opaque package version. Ordering is delegated entirely to the external
//! `vercmp` utility - callers must never attempt lexical comparison, since
//! Arch version semantics (epoch, pkgrel, alpha/beta suffixes) do not follow
//! string order.

use crate::internal::common;
use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
};

#[derive(Debug, Clone, Eq)]
pub struct Version(String);

impl Version {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Version(raw.into())
    }

    /// Builds a version string from its PKGBUILD components:
    /// `<epoch>:<pkgver>-<pkgrel>`, with the epoch prefix omitted when absent
    /// or zero.
    pub fn from_components<S>(pkgver: S, pkgrel: S, epoch: Option<S>) -> Self
    where
        S: AsRef<str>,
    {
        let epoch_prefix = match epoch.as_ref().map(|e| e.as_ref()) {
            Some(e) if !e.is_empty() && e != "0" => format!("{}:", e),
            _ => String::new(),
        };
        Version(format!(
            "{}{}-{}",
            epoch_prefix,
            pkgver.as_ref(),
            pkgrel.as_ref()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares this version to `other` via the `vercmp` external utility.
    fn vercmp(&self, other: &Version) -> anyhow::Result<Ordering> {
        let out = common::run("vercmp")
            .arg(&self.0)
            .arg(&other.0)
            .quiet(true)
            .capture()?;
        match out.trim().parse::<i32>() {
            Ok(n) if n < 0 => Ok(Ordering::Less),
            Ok(0) => Ok(Ordering::Equal),
            Ok(_) => Ok(Ordering::Greater),
            Err(_) => Err(anyhow::anyhow!("vercmp returned unparseable output '{}'", out)),
        }
    }

    /// `self >= other`, per `vercmp`. Used by the planner's build-vs-keep
    /// decision.
    pub fn at_least(&self, other: &Version) -> anyhow::Result<bool> {
        Ok(!matches!(self.vercmp(other)?, Ordering::Less))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.vercmp(other)
            .map(|o| o == Ordering::Equal)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_components_omits_zero_epoch() {
        let v = Version::from_components("1.2", "3", Some("0"));
        assert_eq!(v.as_str(), "1.2-3");
    }

    #[test]
    fn from_components_keeps_nonzero_epoch() {
        let v = Version::from_components("1.2", "3", Some("2"));
        assert_eq!(v.as_str(), "2:1.2-3");
    }

    #[test]
    fn from_components_no_epoch() {
        let v = Version::from_components("1.2", "3", None);
        assert_eq!(v.as_str(), "1.2-3");
    }
}
