//! AUR backend. Fetches and decompresses the AUR package index once per
//! process (a newline-delimited, `#`-commented list), then batches an RPC v5
//! `info` call for names that appear in the index and are not yet cached.

use crate::internal::{
    backends::Backend,
    buildable::{AurBuildable, Buildable},
    package::{strip_constraints, PackageInfo},
    version::Version,
};
use anyhow::{anyhow, Context};
use flate2::read::GzDecoder;
use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    io::Read,
};

const AUR_URI: &str = "https://aur.archlinux.org/";
const AUR_INDEX_URI: &str = "https://aur.archlinux.org/packages.gz";
const AUR_INFO_URI: &str = "https://aur.archlinux.org/rpc/?v=5&type=info";

#[derive(serde::Deserialize, Debug, Default)]
#[serde(default)]
struct AurResponse {
    #[serde(rename = "results")]
    results: Vec<AurResult>,
}

#[derive(serde::Deserialize, Debug, Default)]
#[serde(default)]
struct AurResult {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "PackageBase")]
    package_base: String,
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Depends")]
    depends: Vec<String>,
    #[serde(rename = "MakeDepends")]
    make_depends: Vec<String>,
    #[serde(rename = "CheckDepends")]
    check_depends: Vec<String>,
    #[serde(rename = "OutOfDate")]
    out_of_date: Option<u64>,
}

pub struct AurBackend {
    index: RefCell<Option<HashSet<String>>>,
    cache: RefCell<HashMap<String, Buildable>>,
}

impl AurBackend {
    pub fn new() -> Self {
        AurBackend {
            index: RefCell::new(None),
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn ensure_index(&self) -> anyhow::Result<()> {
        if self.index.borrow().is_some() {
            return Ok(());
        }
        crate::internal::log::fine(&format!("Fetching AUR package index from {}", AUR_INDEX_URI));
        let response = reqwest::blocking::get(AUR_INDEX_URI)
            .with_context(|| "Cannot fetch AUR package index")?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(anyhow!("HTTP error fetching AUR index: {}", response.status()));
        }
        let bytes = response
            .bytes()
            .with_context(|| "Cannot read AUR package index response body")?;
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut text = String::new();
        decoder
            .read_to_string(&mut text)
            .with_context(|| "Cannot decompress AUR package index")?;

        let names: HashSet<String> = text
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_string())
            .collect();
        *self.index.borrow_mut() = Some(names);
        Ok(())
    }
}

impl Default for AurBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for AurBackend {
    fn name(&self) -> &'static str {
        "aur"
    }

    fn resolve(&self, names: &[String]) -> anyhow::Result<Vec<Buildable>> {
        self.ensure_index()?;

        let mut buildables = Vec::new();
        let mut to_query = Vec::new();
        {
            let cache = self.cache.borrow();
            let index = self.index.borrow();
            let index = index.as_ref().unwrap();
            for name in names {
                if let Some(existing) = cache.get(name) {
                    buildables.push(existing.clone());
                } else if index.contains(name) {
                    to_query.push(name.clone());
                }
            }
        }

        if to_query.is_empty() {
            return Ok(buildables);
        }

        let mut uri = AUR_INFO_URI.to_string();
        for name in &to_query {
            uri = format!("{}&arg[]={}", uri, name);
        }

        let response = reqwest::blocking::get(&uri)
            .with_context(|| "Cannot retrieve package information from AUR")?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(anyhow!("HTTP error from AUR: {}", response.status()));
        }
        let parsed: AurResponse = response
            .json()
            .with_context(|| "Cannot parse AUR RPC response")?;

        let mut cache = self.cache.borrow_mut();
        for result in parsed.results {
            if result.out_of_date.is_some() {
                crate::internal::log::warn(&format!(
                    "AUR package '{}' is flagged as out-of-date",
                    result.name
                ));
            }
            let package_info = PackageInfo::new(result.name.clone(), Version::new(result.version))
                .with_pkgbase(Some(result.package_base))
                .with_depends(strip_constraints(result.depends))
                .with_makedepends(strip_constraints(result.make_depends))
                .with_checkdepends(strip_constraints(result.check_depends));
            let buildable = Buildable::Aur(AurBuildable { package_info });
            cache.insert(result.name, buildable.clone());
            buildables.push(buildable);
        }

        Ok(buildables)
    }
}

/// The AUR clone URL for a given package base, used by
/// [`crate::internal::buildable::Buildable::write_pkgbuild_to`].
pub fn clone_url(pkgbase: &str) -> String {
    format!("{}{}.git", AUR_URI, pkgbase)
}
