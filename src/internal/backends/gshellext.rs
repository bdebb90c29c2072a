//! GNOME Shell extension backend. Accepts only names prefixed with
//! `gnome-shell-extension-`; the remainder is the extension's UUID.

use crate::internal::{
    backends::Backend,
    buildable::{Buildable, GShellExtBuildable},
    package::PackageInfo,
    version::Version,
};
use anyhow::Context;
use std::{cell::RefCell, collections::HashMap};

pub const PREFIX: &str = "gnome-shell-extension-";
const PKGREL: &str = "1";

#[derive(serde::Deserialize, Debug)]
struct ExtensionInfo {
    description: String,
    link: String,
    shell_version_map: HashMap<String, ShellVersionEntry>,
}

#[derive(serde::Deserialize, Debug, Clone)]
struct ShellVersionEntry {
    version: u64,
    pk: u64,
}

pub struct GShellExtBackend {
    cache: RefCell<HashMap<String, Buildable>>,
}

impl GShellExtBackend {
    pub fn new() -> Self {
        GShellExtBackend {
            cache: RefCell::new(HashMap::new()),
        }
    }
}

impl Default for GShellExtBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for GShellExtBackend {
    fn name(&self) -> &'static str {
        "gshellext"
    }

    fn resolve(&self, names: &[String]) -> anyhow::Result<Vec<Buildable>> {
        let mut buildables = Vec::new();

        for name in names {
            let Some(uuid) = name.strip_prefix(PREFIX) else {
                continue;
            };

            if let Some(existing) = self.cache.borrow().get(uuid) {
                buildables.push(existing.clone());
                continue;
            }

            let uri = format!("https://extensions.gnome.org/extension-info/?uuid={}", uuid);
            let response = match reqwest::blocking::get(&uri) {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    crate::internal::log::warn(&format!(
                        "Cannot retrieve extension info for '{}': HTTP {}",
                        uuid,
                        response.status()
                    ));
                    continue;
                }
                Err(err) => {
                    crate::internal::log::warn(&format!(
                        "Cannot retrieve extension info for '{}': {}",
                        uuid, err
                    ));
                    continue;
                }
            };
            let info: ExtensionInfo = match response
                .json()
                .with_context(|| format!("Cannot parse extension info for '{}'", uuid))
            {
                Ok(info) => info,
                Err(err) => {
                    crate::internal::log::warn(&format!("{:?}", err));
                    continue;
                }
            };

            let Some(recent) = info
                .shell_version_map
                .values()
                .max_by_key(|entry| (entry.version, entry.pk))
                .cloned()
            else {
                continue;
            };

            let escaped_description = info.description.replace('\'', r#"'"'"'"#);
            let package_info = PackageInfo::new(
                format!("{}{}", PREFIX, uuid.to_lowercase()),
                Version::new(format!("{}-{}", recent.version, PKGREL)),
            );
            let buildable = Buildable::GShellExt(GShellExtBuildable {
                package_info,
                uuid: uuid.to_string(),
                version: recent.version,
                version_tag: recent.pk,
                description: escaped_description,
                link: info.link,
            });
            self.cache
                .borrow_mut()
                .insert(uuid.to_string(), buildable.clone());
            buildables.push(buildable);
        }

        Ok(buildables)
    }
}

/// Renders the fixed PKGBUILD template for a GNOME Shell extension. Installs
/// `schemas/` and `locale/` into the package when present rather than
/// stripping them (see SPEC_FULL.md §9).
pub fn render_pkgbuild(b: &GShellExtBuildable) -> String {
    format!(
        r#"
pkgname='{pkgname}'
pkgver={version}
pkgrel=1
pkgdesc='{desc}'
arch=('any')
url='https://extensions.gnome.org{link}'
license=('custom')
depends=('gnome-shell')
source=('https://extensions.gnome.org/download-extension/{uuid}.shell-extension.zip?version_tag={tag}')
sha256sums=('SKIP')

package() {{
  extension_uuid='{uuid}'
  symlink_name='{uuid}.shell-extension.zip?version_tag={tag}'
  rm -f "$symlink_name"
  install -d "${{pkgdir}}/usr/share/gnome-shell/extensions/${{extension_uuid}}"
  [[ -d schemas ]] && find schemas -name '*.xml' -exec install -Dm644 -t "$pkgdir/usr/share/glib-2.0/schemas/" '{{}}' +
  [[ -d locale ]] && cp -af locale "${{pkgdir}}/usr/share/locale/"
  cp -af * "${{pkgdir}}/usr/share/gnome-shell/extensions/${{extension_uuid}}"
  find "$pkgdir" -type d -exec chmod 755 {{}} \;
  find "$pkgdir" -type f -exec chmod 644 {{}} \;
}}
"#,
        pkgname = b.package_info.pkgname,
        version = b.package_info.version,
        desc = b.description,
        link = b.link,
        uuid = b.uuid,
        tag = b.version_tag,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_pkgbuild_with_conditional_schemas_and_locale() {
        let b = GShellExtBuildable {
            package_info: PackageInfo::new(
                "gnome-shell-extension-foo",
                Version::new("1-1"),
            ),
            uuid: "foo@author".to_string(),
            version: 1,
            version_tag: 42,
            description: "a test extension".to_string(),
            link: "/extension/1/foo".to_string(),
        };
        let rendered = render_pkgbuild(&b);
        assert!(rendered.contains("[[ -d schemas ]]"));
        assert!(rendered.contains("[[ -d locale ]]"));
        assert!(!rendered.contains("rm -rf schemas"));
    }
}
