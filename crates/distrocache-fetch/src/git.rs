//! Thin wrappers over the `git` command line.

use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Stdio},
};

use tracing::trace;

use crate::{
    error::{FetchError, Result},
    reference::{parse_ls_remote, RemoteRef},
};

fn run<I, S>(args: I, cwd: Option<&Path>) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    let mut cmd = Command::new("git");
    cmd.args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }

    let rendered = format!(
        "git {}",
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    trace!(command = %rendered, "running git");

    let output = cmd.output().map_err(FetchError::GitUnavailable)?;
    if !output.status.success() {
        return Err(FetchError::Git {
            command: rendered,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Lists the remote's refs whose names end in `pattern`.
pub fn ls_remote(url: &str, pattern: &str) -> Result<Vec<RemoteRef>> {
    let stdout = run(["ls-remote", url, pattern], None)?;
    Ok(parse_ls_remote(&String::from_utf8_lossy(&stdout)))
}

/// Writes a gzipped tarball of `version` from a local repository.
pub fn archive_local(repo: &Path, version: &str, output: &Path) -> Result<()> {
    let output = output.to_string_lossy();
    run(
        [
            "archive",
            "--format=tar.gz",
            "--prefix=tree/",
            "-o",
            output.as_ref(),
            version,
        ],
        Some(repo),
    )?;
    Ok(())
}

/// Reads one file at `version` from a local repository.
pub fn show_file(repo: &Path, version: &str, path: &str) -> Result<Vec<u8>> {
    run(["show", &format!("{version}:{path}")], Some(repo))
}

/// Checks out exactly one commit of a remote into `dest` without history.
///
/// The `.git` directory is removed afterwards so only the tree remains.
pub fn shallow_checkout(url: &str, version: &str, dest: &Path) -> Result<()> {
    run(["init", "--quiet"], Some(dest))?;
    run(
        ["fetch", "--quiet", "--depth", "1", url, version],
        Some(dest),
    )?;
    run(["checkout", "--quiet", "FETCH_HEAD"], Some(dest))?;
    std::fs::remove_dir_all(dest.join(".git"))?;
    Ok(())
}
