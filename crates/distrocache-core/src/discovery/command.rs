use std::{
    path::Path,
    process::{Command, Stdio},
};

use tracing::debug;

use super::{Discoverer, DiscoveryError};
use crate::model::PackageDescriptor;

/// Runs an external program with the tree path appended to its arguments.
/// The program must print a JSON array of package descriptors on stdout.
#[derive(Debug, Clone)]
pub struct CommandDiscoverer {
    program: String,
    args: Vec<String>,
}

impl CommandDiscoverer {
    /// Returns `None` for an empty argument vector.
    pub fn new(argv: Vec<String>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
        })
    }
}

impl Discoverer for CommandDiscoverer {
    fn discover(&self, root: &Path) -> Result<Vec<PackageDescriptor>, DiscoveryError> {
        debug!(program = %self.program, root = %root.display(), "running discovery command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(root)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| {
                DiscoveryError::Spawn {
                    program: self.program.clone(),
                    source,
                }
            })?;

        if !output.status.success() {
            return Err(DiscoveryError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut packages: Vec<PackageDescriptor> =
            serde_json::from_slice(&output.stdout).map_err(|source| {
                DiscoveryError::InvalidOutput {
                    program: self.program.clone(),
                    source,
                }
            })?;
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandDiscoverer {
        CommandDiscoverer::new(vec!["sh".into(), "-c".into(), script.into(), "sh".into()]).unwrap()
    }

    #[test]
    fn test_empty_argv() {
        assert!(CommandDiscoverer::new(vec![]).is_none());
    }

    #[test]
    fn test_parses_and_sorts_output() {
        let dir = tempfile::tempdir().unwrap();
        let discoverer = sh(
            r#"test -d "$1" && echo '[{"name":"zeta","type":"cmake"},{"name":"alpha","type":"ros.catkin","path":"alpha"}]'"#,
        );

        let packages = discoverer.discover(dir.path()).unwrap();
        assert_eq!(packages[0].name, "alpha");
        assert_eq!(packages[0].path, "alpha");
        assert_eq!(packages[1].kind, "cmake");
    }

    #[test]
    fn test_failing_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("echo nope >&2; exit 3").discover(dir.path()).unwrap_err();
        match err {
            DiscoveryError::CommandFailed { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("echo not-json").discover(dir.path()).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidOutput { .. }));
    }
}
