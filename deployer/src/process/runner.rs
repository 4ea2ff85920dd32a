//! External process runner
//!
//! Spawns a command, streams stdout and stderr line by line into a caller
//! supplied sink, and resolves with the accumulated text. A nonzero exit is
//! an error carrying the exit code; an elapsed timeout kills the child.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::DeployerError;

/// Keep error messages readable when a tool dumps pages of output
const OUTPUT_TAIL_LINES: usize = 20;

/// Stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of child output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Per-line callback
pub type LineSink = Arc<dyn Fn(OutputLine) + Send + Sync>;

/// A sink that drops every line
pub fn discard_lines() -> LineSink {
    Arc::new(|_| {})
}

/// What to run
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Written to the child's stdin, which is then closed
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program name for messages
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Accumulated output of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs external commands
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        spec: CommandSpec,
        on_line: LineSink,
    ) -> Result<ProcessOutput, DeployerError>;
}

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        spec: CommandSpec,
        on_line: LineSink,
    ) -> Result<ProcessOutput, DeployerError> {
        let name = spec.display_name();
        debug!("Running {} {:?}", name, spec.args);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeployerError::ToolMissing { tool: name.clone() }
            } else {
                DeployerError::IoError(e)
            }
        })?;

        if let Some(input) = &spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = {
            let run = async {
                tokio::join!(
                    read_lines(stdout, OutputStream::Stdout, &on_line),
                    read_lines(stderr, OutputStream::Stderr, &on_line),
                    child.wait(),
                )
            };
            match spec.timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.ok(),
                None => Some(run.await),
            }
        };

        let Some((stdout, stderr, status)) = finished else {
            warn!("{} timed out, killing process", name);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", name, e);
            }
            return Err(DeployerError::Timeout {
                program: name,
                after: spec.timeout.unwrap_or_default(),
            });
        };

        let status = status?;
        if !status.success() {
            return Err(DeployerError::ProcessFailed {
                program: name,
                code: status.code(),
                stdout: tail(&stdout, OUTPUT_TAIL_LINES),
                stderr: tail(&stderr, OUTPUT_TAIL_LINES),
            });
        }

        Ok(ProcessOutput { stdout, stderr })
    }
}

async fn read_lines<R>(reader: Option<R>, stream: OutputStream, on_line: &LineSink) -> String
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(reader) = reader else {
        return collected;
    };

    // Lines are decoded lossily so one bad byte never ends the stream
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                collected.push_str(&line);
                collected.push('\n');
                on_line(OutputLine { stream, text: line });
            }
            Err(e) => {
                warn!("Failed to read {:?} of child process: {}", stream, e);
                break;
            }
        }
    }
    collected
}

fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
