//! Run lock and config store: scoped advisory-lock acquisitions, per
//! SPEC_FULL.md §4.6. A single process-wide exclusive lock over
//! `<home>/run.lock` serializes whole runs; a per-document exclusive lock over
//! `<config>/<name>.json` gates a scoped read-modify-write window.

use crate::internal::common;
use anyhow::Context;
use fs2::FileExt;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
};

/// Holds the run lock for the lifetime of the returned guard. Acquiring it
/// blocks until any other autopkg process releases its own guard.
pub struct RunLock {
    _file: File,
}

pub fn acquire_run_lock() -> anyhow::Result<RunLock> {
    let path = common::run_lock_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Cannot open run lock file '{}'", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("Cannot acquire run lock '{}'", path.display()))?;
    Ok(RunLock { _file: file })
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self._file);
    }
}

/// Scoped read-modify-write access to `<config>/<name>.json`. The file is
/// locked for the lifetime of the returned [`Config`]; on drop, if the body
/// assigned a value via [`Config::set`], the file is truncated and rewritten
/// with the serialized value. If the body never calls `set`, the file is left
/// untouched. A parse error on open is treated as "no document yet" rather
/// than propagated.
pub struct Config<T>
where
    T: Serialize,
{
    file: File,
    value: Option<T>,
    dirty: bool,
}

impl<T> Config<T>
where
    T: DeserializeOwned + Serialize,
{
    pub fn open(name: &str) -> anyhow::Result<Self> {
        let path = common::config_dir()?.join(format!("{}.json", name));
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Cannot open config file '{}'", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Cannot lock config file '{}'", path.display()))?;

        let mut text = String::new();
        file.read_to_string(&mut text)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        let value = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        Ok(Config {
            file,
            value,
            dirty: false,
        })
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(value);
        self.dirty = true;
    }
}

impl<T> Drop for Config<T>
where
    T: Serialize,
{
    fn drop(&mut self) {
        if !self.dirty {
            let _ = FileExt::unlock(&self.file);
            return;
        }
        if let Some(value) = &self.value {
            if let Ok(text) = serde_json::to_string(value) {
                let _ = self.file.set_len(0);
                let _ = self.file.seek(SeekFrom::Start(0));
                let _ = self.file.write_all(text.as_bytes());
            }
        }
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    // `common::home_dir` caches its resolution in a process-wide `OnceCell`,
    // so every test in this binary that touches it shares one temp home.
    // Tests below use distinct document names to stay independent of order.
    static INIT: Once = Once::new();
    fn test_home() {
        INIT.call_once(|| {
            let dir = tempfile::tempdir().unwrap();
            std::env::set_var(common::ENV_HOME, dir.path());
            std::mem::forget(dir);
        });
    }

    #[test]
    fn rmw_writes_on_set() {
        test_home();
        {
            let mut cfg: Config<Vec<String>> = Config::open("rmw_writes_on_set").unwrap();
            assert!(cfg.get().is_none());
            cfg.set(vec!["foo".to_string()]);
        }
        {
            let cfg: Config<Vec<String>> = Config::open("rmw_writes_on_set").unwrap();
            assert_eq!(cfg.get().unwrap(), &vec!["foo".to_string()]);
        }
    }

    #[test]
    fn rmw_leaves_file_untouched_without_set() {
        test_home();
        {
            let mut cfg: Config<Vec<String>> =
                Config::open("rmw_leaves_file_untouched").unwrap();
            cfg.set(vec!["foo".to_string()]);
        }
        {
            let _cfg: Config<Vec<String>> =
                Config::open("rmw_leaves_file_untouched").unwrap();
            // no set() call - drop must not rewrite the file
        }
        {
            let cfg: Config<Vec<String>> =
                Config::open("rmw_leaves_file_untouched").unwrap();
            assert_eq!(cfg.get().unwrap(), &vec!["foo".to_string()]);
        }
    }

    #[test]
    fn parse_error_presents_as_empty() {
        test_home();
        let path = common::config_dir().unwrap().join("parse_error_presents_as_empty.json");
        std::fs::write(&path, "not json").unwrap();
        let cfg: Config<Vec<String>> = Config::open("parse_error_presents_as_empty").unwrap();
        assert!(cfg.get().is_none());
    }
}
