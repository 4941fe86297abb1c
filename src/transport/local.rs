//! GB-012: Local git transport — clone/fetch and reset working copies.

use crate::core::error::Error;
use std::path::Path;
use std::process::{Command, Stdio};

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `git <args>`, optionally inside `workdir`.
pub fn exec_git(workdir: Option<&Path>, args: &[&str]) -> Result<GitOutput, Error> {
    let mut command = Command::new("git");
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = workdir {
        command.current_dir(dir);
    }
    tracing::debug!("git {}", args.join(" "));

    let output = command.output().map_err(|e| Error::Git {
        command: args.first().copied().unwrap_or("").to_string(),
        message: format!("failed to spawn git: {}", e),
    })?;

    Ok(GitOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Like [`exec_git`] but a non-zero exit becomes [`Error::Git`].
fn run_git(workdir: Option<&Path>, args: &[&str]) -> Result<GitOutput, Error> {
    let out = exec_git(workdir, args)?;
    if out.success() {
        Ok(out)
    } else {
        Err(Error::Git {
            command: args.first().copied().unwrap_or("").to_string(),
            message: format!("exit {}: {}", out.exit_code, out.stderr.trim()),
        })
    }
}

/// Make `path` a clone of `url`: fetch if it is already a repository,
/// clone if it is absent or empty, refuse anything else.
pub fn clone_or_fetch(url: &str, path: &Path) -> Result<(), Error> {
    if path.join(".git").is_dir() {
        tracing::debug!("Fetching into existing clone {}", path.display());
        run_git(Some(path), &["fetch", "--quiet", "--tags", "origin"])?;
        return Ok(());
    }
    if path.exists() {
        let mut contents = std::fs::read_dir(path)?;
        if contents.next().is_some() {
            return Err(Error::Git {
                command: "clone".to_string(),
                message: format!("{} exists and is not a git repository", path.display()),
            });
        }
    }
    let target = path.display().to_string();
    run_git(None, &["clone", "--quiet", url, &target])?;
    Ok(())
}

/// Hard-reset the working copy at `path` to `sha`.
pub fn reset_to_commit(path: &Path, sha: &str) -> Result<(), Error> {
    run_git(Some(path), &["reset", "--quiet", "--hard", sha])?;
    Ok(())
}
