//! Identity of a build recipe: all packages sharing one `SourceReference`
//! build together in a single recipe invocation (Arch "split packages").

use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceReference {
    Aur { pkgbase: String },
    GShellExt { uuid: String },
    Git {
        repo_url: String,
        path: String,
        branch: String,
    },
}

impl Display for SourceReference {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            SourceReference::Aur { pkgbase } => write!(f, "aur/{}", pkgbase),
            SourceReference::GShellExt { uuid } => write!(f, "gshellext/{}", uuid),
            SourceReference::Git {
                repo_url,
                path,
                branch,
            } => {
                let last_component = repo_url
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or(repo_url);
                let branch_suffix = if branch != "master" {
                    format!("({})", branch)
                } else {
                    String::new()
                };
                let path_suffix = if path != "/" { path.as_str() } else { "" };
                write!(f, "git/{}{}{}", last_component, branch_suffix, path_suffix)
            }
        }
    }
}
