//! Shared fixtures: a scripted process runner, an in-memory room service and
//! an orchestrator wired to both inside a temporary base directory.

#![allow(dead_code)]

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gobid::deploy::orchestrator::{self, Orchestrator};
use gobid::deploy::script::install_builtin_templates;
use gobid::deploy::LogSink;
use gobid::errors::DeployerError;
use gobid::filesys::dir::Dir;
use gobid::livekit::RoomService;
use gobid::models::agent::AgentConfig;
use gobid::process::{
    CommandSpec, LineSink, OutputLine, OutputStream, ProcessOutput, ProcessRunner,
};
use gobid::registry::{AgentStore, RecordStore};
use gobid::storage::credentials::Credentials;
use gobid::storage::layout::StorageLayout;
use gobid::storage::settings::LiveKitSettings;
use livekit_api::Room;
use tempfile::TempDir;

// ================================ PROCESS RUNNER ================================ //

/// Scripted result of one command
#[derive(Debug, Clone)]
pub enum Reply {
    Ok { stdout: String },
    Fail {
        code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
    /// Wait, then behave like the inner reply
    Slow(Duration, Box<Reply>),
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Ok {
            stdout: stdout.to_string(),
        }
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Reply::Fail {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// Nonzero exit that explains itself on stdout
    pub fn fail_on_stdout(code: i32, stdout: &str) -> Self {
        Reply::Fail {
            code,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }
}

/// Which CLI step a command belongs to
pub fn step_of(spec: &CommandSpec) -> String {
    match spec.args.first().map(String::as_str) {
        Some("agent") => format!("agent {}", spec.args.get(1).cloned().unwrap_or_default()),
        Some("version") => "version".to_string(),
        _ => "build".to_string(),
    }
}

/// Runner answering each step from a script instead of spawning anything
pub struct MockRunner {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl MockRunner {
    pub fn new() -> Self {
        let replies = HashMap::from([
            ("build".to_string(), Reply::ok("compiled\n")),
            (
                "agent create".to_string(),
                Reply::ok("Using project gobi\nCreated agent with ID [CA_test123]\n"),
            ),
            ("agent list".to_string(), Reply::ok("No agents found\n")),
            ("agent delete".to_string(), Reply::ok("Deleted\n")),
            ("version".to_string(), Reply::ok("lk version 2.4.0\n")),
        ]);
        Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(&self, step: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(step.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, step: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| step_of(spec) == step)
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(
        &self,
        spec: CommandSpec,
        on_line: LineSink,
    ) -> Result<ProcessOutput, DeployerError> {
        let step = step_of(&spec);
        self.calls.lock().unwrap().push(spec.clone());
        let mut reply = self
            .replies
            .lock()
            .unwrap()
            .get(&step)
            .cloned()
            .unwrap_or_else(|| Reply::ok(""));

        while let Reply::Slow(delay, inner) = reply {
            tokio::time::sleep(delay).await;
            reply = *inner;
        }

        let program = spec.display_name();
        match reply {
            Reply::Ok { stdout } => {
                for line in stdout.lines() {
                    on_line(OutputLine {
                        stream: OutputStream::Stdout,
                        text: line.to_string(),
                    });
                }
                Ok(ProcessOutput {
                    stdout,
                    stderr: String::new(),
                })
            }
            Reply::Fail {
                code,
                stdout,
                stderr,
            } => {
                for line in stdout.lines() {
                    on_line(OutputLine {
                        stream: OutputStream::Stdout,
                        text: line.to_string(),
                    });
                }
                for line in stderr.lines() {
                    on_line(OutputLine {
                        stream: OutputStream::Stderr,
                        text: line.to_string(),
                    });
                }
                Err(DeployerError::ProcessFailed {
                    program,
                    code: Some(code),
                    stdout,
                    stderr,
                })
            }
            Reply::Timeout => Err(DeployerError::Timeout {
                program,
                after: spec.timeout.unwrap_or_default(),
            }),
            Reply::Slow(..) => unreachable!(),
        }
    }
}

// ================================= ROOM SERVICE ================================= //

/// Rooms kept in memory
#[derive(Default)]
pub struct MockRooms {
    rooms: Mutex<HashMap<String, u32>>,
    deleted: Mutex<Vec<String>>,
    fail_deletes: Mutex<bool>,
    list_delay: Mutex<Option<Duration>>,
    lists_answered: Mutex<usize>,
}

impl MockRooms {
    pub fn set_room(&self, name: &str, participants: u32) {
        self.rooms
            .lock()
            .unwrap()
            .insert(name.to_string(), participants);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn fail_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }

    /// Make every following `list_rooms` wait `delay` before answering
    pub fn delay_lists(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    /// Number of `list_rooms` calls that ran to completion
    pub fn lists_answered(&self) -> usize {
        *self.lists_answered.lock().unwrap()
    }
}

#[async_trait]
impl RoomService for MockRooms {
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<Room>, DeployerError> {
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.lists_answered.lock().unwrap() += 1;

        let rooms = self.rooms.lock().unwrap();
        Ok(rooms
            .iter()
            .filter(|(name, _)| names.is_empty() || names.contains(name))
            .map(|(name, participants)| Room {
                name: name.clone(),
                num_participants: *participants,
                ..Default::default()
            })
            .collect())
    }

    async fn delete_room(&self, name: &str) -> Result<(), DeployerError> {
        if *self.fail_deletes.lock().unwrap() {
            return Err(DeployerError::RoomServiceError("unavailable".to_string()));
        }
        self.deleted.lock().unwrap().push(name.to_string());
        self.rooms.lock().unwrap().remove(name);
        Ok(())
    }
}

// =================================== FIXTURE =================================== //

pub struct Fixture {
    pub dir: TempDir,
    pub layout: StorageLayout,
    pub runner: Arc<MockRunner>,
    pub rooms: Arc<MockRooms>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::build(true, true).await
    }

    /// Orchestrator without room service
    pub async fn without_rooms() -> Self {
        Self::build(false, true).await
    }

    /// No LiveKit CLI installed
    pub async fn without_cli() -> Self {
        Self::build(true, false).await
    }

    async fn build(with_rooms: bool, with_cli: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.setup().await.unwrap();
        install_builtin_templates(&layout.templates_dir(), false)
            .await
            .unwrap();

        let cli = if with_cli {
            fake_cli(&dir)
        } else {
            dir.path().join("missing").join("lk")
        };
        let runner = Arc::new(MockRunner::new());
        let rooms = Arc::new(MockRooms::default());

        let options = orchestrator::Options {
            livekit: LiveKitSettings {
                cli_name: "gobi-test-lk-not-on-path".to_string(),
                cli_paths: vec![cli],
                ..Default::default()
            },
            stuck_after: Duration::from_secs(120),
            workspaces: layout.workspaces_dir(),
            templates_dir: layout.templates_dir().path().to_path_buf(),
        };

        let credentials = Credentials {
            openai_api_key: Some("sk-test-secret".to_string().into()),
            ..Default::default()
        };

        let mut orchestrator = Orchestrator::new(
            options,
            Arc::new(credentials),
            runner.clone(),
            Arc::new(LogSink::default()),
            Arc::new(AgentStore::load(layout.agents_file()).await.unwrap()),
            Arc::new(RecordStore::load(layout.deployments_file()).await.unwrap()),
        );
        if with_rooms {
            orchestrator = orchestrator.with_room_service(rooms.clone());
        }

        Self {
            dir,
            layout,
            runner,
            rooms,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Store `config` and return it
    pub async fn create_agent(&self, config: AgentConfig) -> AgentConfig {
        self.orchestrator.agents().create(config).await.unwrap()
    }

    pub fn workspace(&self, agent_id: &str) -> Dir {
        self.layout.workspace_dir(agent_id)
    }
}

/// An executable file standing in for the LiveKit CLI so tool resolution
/// succeeds; the mock runner never executes it.
fn fake_cli(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("lk");
    std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn agent(agent_id: &str) -> AgentConfig {
    AgentConfig {
        agent_id: agent_id.to_string(),
        agent_name: "Front Desk".to_string(),
        description: "Answers the phone".to_string(),
        model: "gpt-4o".to_string(),
        voice: "nova".to_string(),
        temperature: 0.7,
        prompt: "You are helpful.".to_string(),
        template: None,
        customer_name: None,
        appointment_time: None,
        stt_provider: None,
        tts_provider: None,
    }
}
