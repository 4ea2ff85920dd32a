//! Deployment pipeline tests against a scripted LiveKit CLI

#![cfg(unix)]

mod common;

use std::time::Duration;

use common::{agent, Fixture, Reply};
use gobid::deploy::script::unsubstituted;
use gobid::errors::DeployerError;
use gobid::models::deployment::{
    DeploymentStatus, DisplayState, IdConfidence, LogEntryLevel, StatusSource,
};
use gobid::workers::status_poller::{self, StatusMonitor};

fn messages(fx: &Fixture, agent_id: &str) -> Vec<String> {
    fx.orchestrator
        .sink()
        .read(agent_id)
        .into_iter()
        .map(|entry| entry.message)
        .collect()
}

// ================================= DEPLOY ================================= //

#[tokio::test]
async fn test_deploy_end_to_end() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;

    let record = fx.orchestrator.deploy(config).await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Active);
    assert_eq!(record.cloud_agent_id.as_deref(), Some("CA_test123"));
    assert_eq!(record.id_confidence, Some(IdConfidence::Parsed));
    assert!(record.last_deployed_at.is_some());
    assert!(record.deploy_started_at.is_none());
    assert!(record.script_digest.is_some());

    // Persisted
    assert_eq!(
        fx.orchestrator.records().get("a1").status,
        DeploymentStatus::Active
    );

    // Workspace contents
    let workspace = fx.workspace("a1");
    let script = workspace.file("agent.py").read_string().await.unwrap();
    assert!(unsubstituted(&script).is_empty());
    assert!(script.contains(r#"AGENT_ID="a1""#));
    assert!(script.contains(r#"AGENT_MODEL="gpt-4o""#));
    assert!(script.contains(r#"AGENT_VOICE="nova""#));
    assert!(script.contains("AGENT_TEMPERATURE=0.7"));
    assert!(script.contains(r#"AGENT_PROMPT="You are helpful.""#));
    for name in ["livekit.toml", "Dockerfile", "requirements.txt"] {
        assert!(workspace.file(name).exists().await, "{name} missing");
    }

    // Build then create, both inside the workspace
    let calls = fx.runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(common::step_of(&calls[0]), "build");
    assert_eq!(common::step_of(&calls[1]), "agent create");
    assert_eq!(calls[1].cwd.as_deref(), Some(workspace.path()));
    assert!(calls[1]
        .env
        .contains(&("AGENT_ID".to_string(), "a1".to_string())));
    assert!(calls[1]
        .env
        .contains(&("AGENT_MODEL".to_string(), "gpt-4o".to_string())));
    assert!(calls[1]
        .env
        .contains(&("OPENAI_API_KEY".to_string(), "sk-test-secret".to_string())));
    assert!(calls[1].timeout.is_some_and(|t| t <= Duration::from_secs(60)));

    let logs = messages(&fx, "a1");
    assert!(logs.iter().any(|m| m == "[build] compiled"));
    assert!(logs.iter().any(|m| m.contains("Created agent with ID [CA_test123]")));
    assert_eq!(logs.last().map(String::as_str), Some("Agent deployed as CA_test123"));
}

#[tokio::test]
async fn test_prompt_quotes_survive_generation() {
    let fx = Fixture::new().await;
    let mut config = agent("quotes");
    config.prompt = "Say \"welcome\" and wait".to_string();
    let config = fx.create_agent(config).await;

    fx.orchestrator.deploy(config).await.unwrap();

    let script = fx
        .workspace("quotes")
        .file("agent.py")
        .read_string()
        .await
        .unwrap();
    assert!(script.contains(r#"AGENT_PROMPT="Say \"welcome\" and wait""#));
}

#[tokio::test]
async fn test_deploy_failure_marks_error_and_offers_retry() {
    let fx = Fixture::new().await;
    fx.runner.reply(
        "agent create",
        Reply::fail(1, "invalid credentials for key sk-test-secret"),
    );
    let config = fx.create_agent(agent("a1")).await;

    let err = fx.orchestrator.deploy(config).await.unwrap_err();
    assert!(matches!(err, DeployerError::DeployFailure(_)));

    let record = fx.orchestrator.records().get("a1");
    assert_eq!(record.status, DeploymentStatus::Error);
    assert_eq!(record.retry_count, 1);
    assert!(record.last_error.is_some());

    let entries = fx.orchestrator.sink().read("a1");
    let failure = entries
        .iter()
        .find(|e| e.level == LogEntryLevel::Error)
        .expect("an error entry");
    assert!(failure.message.starts_with("Deployment failed"));
    // Secrets never reach the log
    assert!(entries.iter().all(|e| !e.message.contains("sk-test-secret")));

    let monitor = StatusMonitor::new(fx.orchestrator.clone(), status_poller::Options::default());
    let view = monitor.snapshot("a1").await;
    assert_eq!(view.display_state, DisplayState::Error);
    assert!(view.can_retry);
    assert!(!view.can_cancel);
}

#[tokio::test]
async fn test_deploy_timeout_marks_error() {
    let fx = Fixture::new().await;
    fx.runner.reply("agent create", Reply::Timeout);
    let config = fx.create_agent(agent("a1")).await;

    let err = fx.orchestrator.deploy(config).await.unwrap_err();
    assert!(matches!(err, DeployerError::Timeout { .. }));
    assert_eq!(
        fx.orchestrator.records().get("a1").status,
        DeploymentStatus::Error
    );
    assert!(messages(&fx, "a1")
        .iter()
        .any(|m| m.contains("timed out")));
}

#[tokio::test]
async fn test_build_failure_skips_deploy() {
    let fx = Fixture::new().await;
    fx.runner
        .reply("build", Reply::fail(1, "SyntaxError: invalid syntax"));
    let config = fx.create_agent(agent("a1")).await;

    let err = fx.orchestrator.deploy(config).await.unwrap_err();
    assert!(matches!(err, DeployerError::BuildFailure(_)));
    assert!(fx.runner.calls_to("agent create").is_empty());
    assert!(messages(&fx, "a1")
        .iter()
        .any(|m| m == "[build] SyntaxError: invalid syntax"));
}

#[tokio::test]
async fn test_missing_template_fails_before_any_command() {
    let fx = Fixture::new().await;
    let mut config = agent("a1");
    config.template = Some("outbound".to_string());
    let config = fx.create_agent(config).await;

    let err = fx.orchestrator.deploy(config).await.unwrap_err();
    assert!(matches!(err, DeployerError::TemplateMissing(_)));
    assert!(fx.runner.calls().is_empty());
    assert_eq!(
        fx.orchestrator.records().get("a1").status,
        DeploymentStatus::Error
    );
}

#[tokio::test]
async fn test_missing_cli_is_reported_with_install_hint() {
    let fx = Fixture::without_cli().await;
    let config = fx.create_agent(agent("a1")).await;

    let err = fx.orchestrator.deploy(config).await.unwrap_err();
    assert!(matches!(err, DeployerError::ToolMissing { .. }));
    assert!(fx.runner.calls().is_empty());
    assert!(messages(&fx, "a1")
        .iter()
        .any(|m| m.contains("docs.livekit.io")));
}

#[tokio::test]
async fn test_unparsed_cloud_id_falls_back_to_agent_id() {
    let fx = Fixture::new().await;
    fx.runner.reply("agent create", Reply::ok("Deployment complete\n"));
    let config = fx.create_agent(agent("a1")).await;

    let record = fx.orchestrator.deploy(config).await.unwrap();
    assert_eq!(record.cloud_agent_id.as_deref(), Some("a1"));
    assert_eq!(record.id_confidence, Some(IdConfidence::Fallback));
    assert!(fx
        .orchestrator
        .sink()
        .read("a1")
        .iter()
        .any(|e| e.level == LogEntryLevel::Warn));
}

#[tokio::test]
async fn test_concurrent_deploy_is_rejected() {
    let fx = Fixture::new().await;
    fx.runner.reply(
        "agent create",
        Reply::Slow(
            Duration::from_millis(300),
            Box::new(Reply::ok("Created agent with ID [CA_test123]")),
        ),
    );
    let config = fx.create_agent(agent("a1")).await;

    let handle = fx.orchestrator.start_deploy(config.clone()).await.unwrap();
    assert_eq!(
        fx.orchestrator.records().get("a1").status,
        DeploymentStatus::Deploying
    );

    let err = fx.orchestrator.deploy(config).await.unwrap_err();
    assert!(matches!(err, DeployerError::AlreadyInProgress(_)));

    let record = handle.await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::Active);
    assert_eq!(fx.runner.calls_to("agent create").len(), 1);
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_deploy() {
    let fx = Fixture::new().await;
    fx.runner.reply(
        "agent create",
        Reply::Slow(Duration::from_secs(30), Box::new(Reply::ok(""))),
    );
    let config = fx.create_agent(agent("a1")).await;

    let handle = fx.orchestrator.start_deploy(config).await.unwrap();
    let record = fx.orchestrator.cancel("a1").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Inactive);

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, Err(DeployerError::Cancelled(_))));
    assert!(messages(&fx, "a1")
        .iter()
        .any(|m| m == "Deployment cancelled"));

    // The lock is free again
    fx.runner.reply("agent create", Reply::ok("Created agent with ID [CA_test123]"));
    let config = fx.orchestrator.agents().get("a1").unwrap();
    assert!(fx.orchestrator.deploy(config).await.is_ok());
}

#[tokio::test]
async fn test_retry_after_failure_succeeds() {
    let fx = Fixture::new().await;
    fx.runner.reply("agent create", Reply::fail(1, "quota exceeded"));
    let config = fx.create_agent(agent("a1")).await;
    assert!(fx.orchestrator.deploy(config).await.is_err());

    fx.runner.reply("agent create", Reply::ok("Created agent with ID [CA_retry9]"));
    let record = fx.orchestrator.retry("a1").await.unwrap().await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::Active);
    assert_eq!(record.cloud_agent_id.as_deref(), Some("CA_retry9"));
    assert_eq!(record.retry_count, 0);
}

#[tokio::test]
async fn test_retry_of_active_agent_is_rejected() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();

    let err = fx.orchestrator.retry("a1").await.unwrap_err();
    assert!(matches!(err, DeployerError::InvalidTransition(_)));
}

// ================================== STOP ================================== //

#[tokio::test]
async fn test_stop_deletes_agent_and_room_and_is_idempotent() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();
    fx.rooms.set_room("agent-a1", 1);

    let record = fx.orchestrator.stop("a1").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Inactive);
    assert!(record.cloud_agent_id.is_none());

    let deletes = fx.runner.calls_to("agent delete");
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].stdin.as_deref(), Some("CA_test123\n"));
    assert_eq!(fx.rooms.deleted(), vec!["agent-a1".to_string()]);

    // Second stop has nothing left to delete and still succeeds
    let record = fx.orchestrator.stop("a1").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Inactive);
    assert_eq!(fx.runner.calls_to("agent delete").len(), 1);
}

#[tokio::test]
async fn test_stop_treats_missing_cloud_agent_as_stopped() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();
    fx.runner
        .reply("agent delete", Reply::fail(1, "Error: agent CA_test123 not found"));

    let record = fx.orchestrator.stop("a1").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Inactive);
}

#[tokio::test]
async fn test_stop_accepts_not_found_reported_on_stdout() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();
    fx.runner.reply(
        "agent delete",
        Reply::fail_on_stdout(1, "agent CA_test123 does not exist\n"),
    );

    let record = fx.orchestrator.stop("a1").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Inactive);
    assert_eq!(record.cloud_agent_id, None);
}

#[tokio::test]
async fn test_stop_never_deletes_by_fallback_id() {
    let fx = Fixture::new().await;
    fx.runner.reply("agent create", Reply::ok("done\n"));
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();

    fx.orchestrator.stop("a1").await.unwrap();
    assert!(fx.runner.calls_to("agent delete").is_empty());
}

#[tokio::test]
async fn test_stop_survives_room_service_failure() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();
    fx.rooms.fail_deletes();

    let record = fx.orchestrator.stop("a1").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Inactive);
    assert!(fx
        .orchestrator
        .sink()
        .read("a1")
        .iter()
        .any(|e| e.level == LogEntryLevel::Warn && e.message.contains("agent-a1")));
}

#[tokio::test]
async fn test_remove_agent_forgets_everything() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();

    fx.orchestrator.remove_agent("a1").await.unwrap();
    assert!(matches!(
        fx.orchestrator.agents().get("a1"),
        Err(DeployerError::NotFound(_))
    ));
    assert_eq!(
        fx.orchestrator.records().get("a1").status,
        DeploymentStatus::Inactive
    );
    assert!(fx.orchestrator.sink().read("a1").is_empty());
}

// ================================= STATUS ================================= //

#[tokio::test]
async fn test_empty_room_is_not_deployed() {
    let fx = Fixture::new().await;
    fx.rooms.set_room("agent-a1", 0);

    let status = fx.orchestrator.get_status("a1").await.unwrap();
    assert!(!status.is_deployed);
    assert_eq!(status.source, StatusSource::Room);
    assert_eq!(status.room_name, "agent-a1");
}

#[tokio::test]
async fn test_occupied_room_is_deployed() {
    let fx = Fixture::new().await;
    fx.rooms.set_room("agent-a1", 2);

    let status = fx.orchestrator.get_status("a1").await.unwrap();
    assert!(status.is_deployed);
    assert_eq!(status.participants, 2);
}

#[tokio::test]
async fn test_cloud_listing_wins_over_rooms() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();
    fx.runner.reply(
        "agent list",
        Reply::ok("ID          STATUS\nCA_test123  Running\n"),
    );

    let status = fx.orchestrator.get_status("a1").await.unwrap();
    assert!(status.is_deployed);
    assert_eq!(status.source, StatusSource::Cloud);
    assert_eq!(status.cloud_agent_id.as_deref(), Some("CA_test123"));
}

#[tokio::test]
async fn test_status_without_room_service() {
    let fx = Fixture::without_rooms().await;
    let status = fx.orchestrator.get_status("a1").await.unwrap();
    assert!(!status.is_deployed);
    assert_eq!(status.source, StatusSource::None);
}

#[tokio::test]
async fn test_active_agent_missing_from_livekit_is_inconsistent() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();

    let monitor = StatusMonitor::new(fx.orchestrator.clone(), status_poller::Options::default());
    let view = monitor.snapshot("a1").await;
    assert_eq!(view.local_status, DeploymentStatus::Active);
    assert_eq!(view.display_state, DisplayState::Inconsistent);
}

#[tokio::test]
async fn test_monitor_session_publishes_until_closed() {
    let fx = Fixture::new().await;
    fx.rooms.set_room("agent-a1", 1);
    let monitor = StatusMonitor::new(
        fx.orchestrator.clone(),
        status_poller::Options {
            interval: Duration::from_millis(20),
            fast_interval: Duration::from_millis(10),
        },
    );

    let mut session = monitor.open("a1");
    let first = session.next().await.unwrap();
    assert_eq!(first.agent_id, "a1");
    assert_eq!(first.display_state, DisplayState::Inconsistent);
    assert!(session.next().await.is_some());

    session.close();
    assert!(session.is_closed());
    assert!(session.next().await.is_none());
}

#[tokio::test]
async fn test_closed_session_ignores_poll_in_flight() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();
    fx.rooms.set_room("agent-a1", 1);
    let monitor = StatusMonitor::new(
        fx.orchestrator.clone(),
        status_poller::Options {
            interval: Duration::from_millis(50),
            fast_interval: Duration::from_millis(50),
        },
    );

    let mut session = monitor.open("a1");
    let first = session.next().await.unwrap();
    assert_eq!(first.display_state, DisplayState::Active);
    assert!(session.latest().is_some());

    // The next poll hangs in the room lookup and would report a change
    fx.rooms.delay_lists(Duration::from_millis(300));
    fx.rooms.set_room("agent-a1", 0);
    let answered = fx.rooms.lists_answered();
    tokio::time::sleep(Duration::from_millis(120)).await;

    session.close();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(fx.rooms.lists_answered(), answered);
    assert!(session.latest().is_none());
    assert!(session.next().await.is_none());
}

#[tokio::test]
async fn test_fresh_session_starts_with_empty_log() {
    let fx = Fixture::new().await;
    fx.orchestrator.sink().info("a1", "old line", "ui");
    let monitor = StatusMonitor::new(fx.orchestrator.clone(), status_poller::Options::default());

    let mut session = monitor.open_fresh("a1");
    let view = session.next().await.unwrap();
    assert!(view.logs.is_empty());
}

// ================================== LOGS ================================== //

#[tokio::test]
async fn test_logs_keep_append_order_and_clear() {
    let fx = Fixture::new().await;
    let config = fx.create_agent(agent("a1")).await;
    fx.orchestrator.deploy(config).await.unwrap();

    let entries = fx.orchestrator.sink().read("a1");
    assert!(entries.len() > 3);
    assert!(entries.windows(2).all(|w| w[0].index < w[1].index));
    assert!(entries[0].message.starts_with("Starting deployment"));

    fx.orchestrator.sink().clear("a1");
    assert!(fx.orchestrator.sink().read("a1").is_empty());

    // Other agents are untouched
    fx.orchestrator.sink().info("a2", "hello", "ui");
    fx.orchestrator.sink().clear("a1");
    assert_eq!(fx.orchestrator.sink().read("a2").len(), 1);
}

#[tokio::test]
async fn test_cli_version() {
    let fx = Fixture::new().await;
    let version = fx.orchestrator.cli_version().await.unwrap();
    assert_eq!(version.version, "lk version 2.4.0");
    assert!(version.path.ends_with("lk"));
}
