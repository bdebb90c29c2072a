//! Backends map a set of package names to [`Buildable`]s. All backends share
//! one contract (`resolve(names) -> Vec<Buildable>`, missing names silently
//! produce nothing) and are invoked in a fixed priority order: Git -> GNOME
//! Shell -> AUR. Each backend owns its own memoization cache so repeated
//! lookups across BFS frontiers in one run hit the network/filesystem at most
//! once per name.

pub mod aur;
pub mod git;
pub mod gshellext;

use crate::internal::buildable::Buildable;

pub trait Backend {
    /// Name used in log messages and the testable-properties priority
    /// ordering.
    fn name(&self) -> &'static str;

    /// Resolves as many of `names` as this backend recognizes. Names this
    /// backend does not know about are simply absent from the result; the
    /// caller infers that the name may be satisfied by another backend or by
    /// the distribution's official repos.
    fn resolve(&self, names: &[String]) -> anyhow::Result<Vec<Buildable>>;
}

/// The three backends bundled in their fixed priority order. Built once per
/// run and threaded through graph construction.
pub struct Backends {
    pub git: git::GitBackend,
    pub gshellext: gshellext::GShellExtBackend,
    pub aur: aur::AurBackend,
}

impl Backends {
    pub fn new() -> Self {
        Backends {
            git: git::GitBackend::new(),
            gshellext: gshellext::GShellExtBackend::new(),
            aur: aur::AurBackend::new(),
        }
    }

    /// Backends in priority order: Git, then GNOME Shell, then AUR.
    pub fn ordered(&self) -> [&dyn Backend; 3] {
        [&self.git, &self.gshellext, &self.aur]
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self::new()
    }
}
