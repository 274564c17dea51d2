//! End-to-end team flows: formation, dependency-ordered execution,
//! shutdown consensus, and the teardown archive.

use std::sync::Arc;
use std::time::Duration;

use squadron::testing::NoopWork;
use squadron::{
    AgentId, AnyTask, MessageKind, TaskSpec, TaskStatus, TeamConfig, TeamSession,
};

const TEST_DEADLINE: Duration = Duration::from_secs(5);

fn config(archive_dir: &std::path::Path) -> TeamConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    TeamConfig {
        enabled: true,
        idle_repoll_ms: 20,
        work_poll_ms: 5,
        archive_dir: archive_dir.to_path_buf(),
        ..TeamConfig::default()
    }
}

#[tokio::test]
async fn test_team_completes_dependency_graph_and_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let session = TeamSession::form("docs-sprint", config(dir.path())).unwrap();

    let lead = session
        .add_lead(AgentId::new("lead"), Arc::new(NoopWork))
        .unwrap();
    for name in ["writer-0", "writer-1"] {
        session
            .add_teammate(
                AgentId::new(name),
                "writer",
                Arc::new(AnyTask),
                Arc::new(NoopWork),
            )
            .unwrap();
    }
    let roster = session.roster_snapshot();
    assert_eq!(roster.iter().filter(|m| m.is_lead()).count(), 1);

    // Two independent tasks plus a synthesis task gated on both.
    let ids = lead
        .create_batch(vec![
            TaskSpec::new("outline chapter one"),
            TaskSpec::new("outline chapter two"),
            TaskSpec::new("merge outlines")
                .depends_on_entry(0)
                .depends_on_entry(1),
        ])
        .unwrap();

    tokio::time::timeout(TEST_DEADLINE, session.await_all_tasks_completed())
        .await
        .expect("tasks did not complete in time");

    let tasks = session.tasks().snapshot();
    assert_eq!(tasks.len(), 3);
    for task in &tasks {
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.owner.is_some());
    }
    // The gated task was only claimable once both dependencies completed.
    let merge = tasks.iter().find(|t| t.id == ids[2]).unwrap();
    assert_eq!(merge.dependencies, vec![ids[0], ids[1]]);

    // Shutdown consensus: teammates first, then the lead retires itself.
    lead.request_shutdown_all().unwrap();
    lead.retire().unwrap();
    tokio::time::timeout(TEST_DEADLINE, session.await_termination())
        .await
        .expect("team did not terminate in time");

    let archive = session.teardown().await.unwrap();
    assert_eq!(archive.descriptor.name, "docs-sprint");
    assert_eq!(archive.descriptor.agents.len(), 3);
    assert!(
        archive
            .descriptor
            .agents
            .iter()
            .all(|a| a.lifecycle.is_terminal())
    );
    assert_eq!(archive.tasks.len(), 3);

    // The archive landed on disk.
    let written: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(written.len(), 1);
}

#[tokio::test]
async fn test_teardown_refused_while_agents_active() {
    let dir = tempfile::tempdir().unwrap();
    let session = TeamSession::form("busy", config(dir.path())).unwrap();
    session
        .add_teammate(
            AgentId::new("worker"),
            "coder",
            Arc::new(AnyTask),
            Arc::new(NoopWork),
        )
        .unwrap();

    assert!(session.teardown().await.is_err());
}

#[tokio::test]
async fn test_broadcast_reaches_only_agents_active_at_send_time() {
    let dir = tempfile::tempdir().unwrap();
    let session = TeamSession::form("fanout", config(dir.path())).unwrap();

    let lead = session
        .add_lead(AgentId::new("lead"), Arc::new(NoopWork))
        .unwrap();
    session
        .add_teammate(
            AgentId::new("early-0"),
            "writer",
            Arc::new(AnyTask),
            Arc::new(NoopWork),
        )
        .unwrap();
    session
        .add_teammate(
            AgentId::new("early-1"),
            "writer",
            Arc::new(AnyTask),
            Arc::new(NoopWork),
        )
        .unwrap();

    let ids = lead.broadcast(MessageKind::Broadcast, "kickoff").unwrap();
    assert_eq!(ids.len(), 2);

    session
        .add_teammate(
            AgentId::new("late"),
            "writer",
            Arc::new(AnyTask),
            Arc::new(NoopWork),
        )
        .unwrap();

    let mail = session.mailboxes();
    let kickoffs = |agent: &str| {
        mail.peek_all(&AgentId::new(agent))
            .unwrap()
            .iter()
            .filter(|m| m.payload == "kickoff")
            .count()
    };
    assert_eq!(kickoffs("early-0"), 1);
    assert_eq!(kickoffs("early-1"), 1);
    assert_eq!(kickoffs("late"), 0);
    assert_eq!(kickoffs("lead"), 0);
}

#[tokio::test]
async fn test_plan_approval_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let session = TeamSession::form("planning", config(dir.path())).unwrap();

    let lead = session
        .add_lead(AgentId::new("lead"), Arc::new(NoopWork))
        .unwrap();
    session
        .add_teammate(
            AgentId::new("planner"),
            "planner",
            // Accept nothing; this teammate only exchanges messages.
            Arc::new(squadron::filter_fn(|_: &squadron::Task| false)),
            Arc::new(NoopWork),
        )
        .unwrap();

    let mail = session.mailboxes();
    let planner = AgentId::new("planner");
    let plan_id = mail
        .send(&planner, lead.id(), MessageKind::Chat, "plan: restructure docs")
        .unwrap();

    lead.approve_plan(&planner, plan_id.clone(), "looks right")
        .unwrap();

    // The approval is in the planner's log with the correlation intact.
    let deadline = tokio::time::Instant::now() + TEST_DEADLINE;
    loop {
        let approvals: Vec<_> = mail
            .peek_all(&planner)
            .unwrap()
            .into_iter()
            .filter(|m| m.kind == MessageKind::ApprovePlan)
            .collect();
        if !approvals.is_empty() {
            assert_eq!(approvals[0].correlation_id, Some(plan_id));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "approval never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_concurrent_claims_through_session_store() {
    let dir = tempfile::tempdir().unwrap();
    let session = TeamSession::form("race", config(dir.path())).unwrap();
    let store = session.tasks();
    let id = store.create("contested", Vec::new()).unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let store = session.tasks();
        handles.push(tokio::spawn(async move {
            store.claim(id, &AgentId::new(format!("racer-{i}")))
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
