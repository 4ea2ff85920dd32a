//! LiveKit CLI invocations
//!
//! The CLI prints unstructured text. Everything here that reads its output is
//! deliberately narrow: cloud id extraction lives in `deploy::parse`, the
//! rest only looks for a handful of substrings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::CommandSpec;

/// Builds commands for one resolved CLI binary and project
#[derive(Debug, Clone)]
pub struct LiveKitCli {
    program: PathBuf,
    project: String,
}

impl LiveKitCli {
    pub fn new(program: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            project: project.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// `<cli> agent create --project <name> --silent <dir>`
    pub fn create(&self, workspace: &Path, timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["agent", "create", "--project", &self.project, "--silent"])
            .args([workspace.display().to_string()])
            .cwd(workspace)
            .timeout(timeout)
    }

    /// `<cli> agent list --project <name>`
    pub fn list(&self, timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["agent", "list", "--project", &self.project])
            .timeout(timeout)
    }

    /// `<cli> agent delete --project <name>`, id answered on stdin
    pub fn delete(&self, cloud_agent_id: &str, timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["agent", "delete", "--project", &self.project])
            .stdin(format!("{cloud_agent_id}\n"))
            .timeout(timeout)
    }

    /// `<cli> version`
    pub fn version(&self, timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["version"])
            .timeout(timeout)
    }
}

/// Output saying the target is already gone
pub fn is_absent_output(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["not found", "does not exist", "no such agent", "no agents found"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Whether an `agent list` output mentions any of `ids` as a whole token
pub fn list_mentions(output: &str, ids: &[&str]) -> bool {
    output
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .any(|token| !token.is_empty() && ids.contains(&token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_command_shape() {
        let cli = LiveKitCli::new("/usr/local/bin/lk", "gobi");
        let spec = cli.create(Path::new("/tmp/ws/a1"), Duration::from_secs(60));

        assert_eq!(
            spec.args,
            vec!["agent", "create", "--project", "gobi", "--silent", "/tmp/ws/a1"]
        );
        assert_eq!(spec.cwd.as_deref(), Some(Path::new("/tmp/ws/a1")));
        assert_eq!(spec.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_delete_passes_id_on_stdin() {
        let cli = LiveKitCli::new("lk", "gobi");
        let spec = cli.delete("CA_abc", Duration::from_secs(15));
        assert_eq!(spec.args, vec!["agent", "delete", "--project", "gobi"]);
        assert_eq!(spec.stdin.as_deref(), Some("CA_abc\n"));
    }

    #[test]
    fn test_absent_output() {
        assert!(is_absent_output("Error: agent CA_abc Not Found"));
        assert!(is_absent_output("the resource does not exist"));
        assert!(!is_absent_output("Deleted agent CA_abc"));
    }

    #[test]
    fn test_list_mentions_whole_tokens() {
        let output = "│ CA_abc123 │ running │ agent-a1 │";
        assert!(list_mentions(output, &["CA_abc123"]));
        assert!(list_mentions(output, &["missing", "agent-a1"]));
        assert!(!list_mentions(output, &["CA_abc"]));
        assert!(!list_mentions(output, &["a1"]));
    }
}
