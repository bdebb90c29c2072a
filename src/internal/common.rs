use anyhow::{anyhow, Context};
use duct::cmd;
use once_cell::sync::OnceCell;
use std::{
    env,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

/// Name of the sub directory used below XDG home dirs as fallback
const HOME_SUB_PATH: &str = ".autopkg";

/// Environment variable names recognized by autopkg
pub const ENV_HOME: &str = "AUTOPKG_HOME";
pub const ENV_REPO_NAME: &str = "AUTOPKG_REPO_NAME";
pub const ENV_KEY: &str = "AUTOPKG_KEY";
pub const ENV_RETRY: &str = "AUTOPKG_RETRY";

/// Defaults for the environment variables above
const DEFAULT_REPO_NAME: &str = "autopkg";
const DEFAULT_RETRY: u32 = 3;

/// Root directory below which all of autopkg's state (workspaces, config,
/// repository, run lock, log) lives. Resolution order: `AUTOPKG_HOME`, else
/// `$HOME/.autopkg`. Resolved once per process.
pub fn home_dir() -> anyhow::Result<&'static Path> {
    static PATH: OnceCell<PathBuf> = OnceCell::new();
    Ok(PATH
        .get_or_try_init(|| {
            let path = if let Ok(home) = env::var(ENV_HOME) {
                PathBuf::from(home)
            } else if let Some(home) = dirs::home_dir() {
                home.join(HOME_SUB_PATH)
            } else {
                return Err(anyhow!("Cannot determine path of autopkg home directory"));
            };
            ensure_dir(&path)
        })?
        .as_path())
}

/// Name of the repository to publish into, from `AUTOPKG_REPO_NAME` or the
/// default
pub fn repo_name() -> String {
    env::var(ENV_REPO_NAME).unwrap_or_else(|_| DEFAULT_REPO_NAME.to_string())
}

/// GPG key id to sign with, if any is configured
pub fn sign_key() -> Option<String> {
    env::var(ENV_KEY).ok().filter(|key| !key.is_empty())
}

/// Number of `makechrootpkg` attempts per plan before giving up
pub fn retry_count() -> u32 {
    env::var(ENV_RETRY)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_RETRY)
}

pub fn workspaces_dir() -> anyhow::Result<PathBuf> {
    ensure_dir(home_dir()?.join("workspaces"))
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    ensure_dir(home_dir()?.join("config"))
}

pub fn repository_dir() -> anyhow::Result<PathBuf> {
    ensure_dir(home_dir()?.join("repository"))
}

pub fn run_lock_path() -> anyhow::Result<PathBuf> {
    Ok(home_dir()?.join("run.lock"))
}

pub fn log_path() -> anyhow::Result<PathBuf> {
    Ok(home_dir()?.join("log"))
}

/// Create directory `dir` if it does not exist
pub fn ensure_dir<P>(dir: P) -> anyhow::Result<PathBuf>
where
    P: AsRef<Path>,
{
    let err_msg = format!("Cannot create directory '{}'", dir.as_ref().display());

    if dir.as_ref().exists() && !dir.as_ref().is_dir() {
        return Err(anyhow!(
            "'{}' exists already but is no directory",
            dir.as_ref().display()
        )
        .context(err_msg));
    }

    fs::create_dir_all(dir.as_ref()).with_context(|| err_msg)?;

    Ok(dir.as_ref().to_path_buf())
}

/// Creates a fresh, empty workspace directory under `<home>/workspaces` and
/// returns its path. Callers are expected to remove it with [`remove_workspace`]
/// once done; [`crate::internal::executor`] does this via `scopeguard::defer!`
/// so it fires on every exit path, including a build failure.
pub fn new_workspace() -> anyhow::Result<tempfile::TempDir> {
    tempfile::tempdir_in(workspaces_dir()?).with_context(|| "Cannot create workspace directory")
}

/// Central helper for invoking external tools. Every subprocess invocation in
/// autopkg - `git`, `makepkg`, `makechrootpkg`, `mkarchroot`, `repo-add`,
/// `repo-remove`, `gpg`, `vercmp`, `bash`, `tee`, `rm`, `btrfs`, `stat` - flows
/// through this function so that privilege elevation, quiet-mode logging and
/// error wrapping are handled in one place.
pub struct Run<'a> {
    program: &'a str,
    args: Vec<String>,
    sudo: bool,
    cwd: Option<PathBuf>,
    quiet: bool,
    allow_error: bool,
    stdin: Option<String>,
}

impl<'a> Run<'a> {
    pub fn new(program: &'a str) -> Self {
        Run {
            program,
            args: Vec::new(),
            sudo: false,
            cwd: None,
            quiet: false,
            allow_error: false,
            stdin: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args
            .push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for a in args {
            self.args.push(a.as_ref().to_string_lossy().into_owned());
        }
        self
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn cwd<P: AsRef<Path>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn allow_error(mut self, allow_error: bool) -> Self {
        self.allow_error = allow_error;
        self
    }

    pub fn stdin<S: Into<String>>(mut self, input: S) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Runs the command, returning captured stdout. Honors `allow_error`: on a
    /// non-zero exit with `allow_error` set, returns an empty string instead of
    /// failing.
    pub fn capture(self) -> anyhow::Result<String> {
        let full_cmd = self.describe();
        if !self.quiet {
            crate::internal::log::fine(&full_cmd);
        }

        let mut expr = if self.sudo {
            let mut all_args = vec![self.program.to_string()];
            all_args.extend(self.args.clone());
            cmd("sudo", &all_args)
        } else {
            cmd(self.program, &self.args)
        };
        if let Some(cwd) = &self.cwd {
            expr = expr.dir(cwd);
        }
        if let Some(input) = &self.stdin {
            expr = expr.stdin_bytes(input.clone().into_bytes());
        }
        let expr = expr.stderr_capture().unchecked();

        let output = expr
            .run()
            .with_context(|| format!("Cannot run '{}'", full_cmd))?;

        if !output.status.success() {
            if self.allow_error {
                return Ok(String::new());
            }
            crate::internal::log::error(&format!("Error while running: {}", full_cmd));
            return Err(anyhow!(
                "'{}' exited with {}: {}",
                full_cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Runs the command without capturing output (inherits stdout/stderr), for
    /// long-running builds whose progress should stream to the terminal.
    pub fn inherit(self) -> anyhow::Result<()> {
        let full_cmd = self.describe();
        if !self.quiet {
            crate::internal::log::fine(&full_cmd);
        }

        let mut expr = if self.sudo {
            let mut all_args = vec![self.program.to_string()];
            all_args.extend(self.args.clone());
            cmd("sudo", &all_args)
        } else {
            cmd(self.program, &self.args)
        };
        if let Some(cwd) = &self.cwd {
            expr = expr.dir(cwd);
        }
        let expr = expr.unchecked();

        let output = expr
            .run()
            .with_context(|| format!("Cannot run '{}'", full_cmd))?;

        if !output.status.success() && !self.allow_error {
            return Err(anyhow!("'{}' exited with {}", full_cmd, output.status));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let prefix = if self.sudo { "sudo " } else { "" };
        format!("{}{} {}", prefix, self.program, self.args.join(" "))
    }
}

/// Shorthand for `Run::new(program)`
pub fn run(program: &str) -> Run {
    Run::new(program)
}
