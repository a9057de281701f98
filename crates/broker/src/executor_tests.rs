use chrono::Utc;
use serde_json::json;

use super::*;
use crate::ticket::CreateTicket;

fn ticket(target: &str) -> Ticket {
    Ticket::new(
        CreateTicket {
            target_agent: target.to_owned(),
            origin_agent: "ui".to_owned(),
            payload: json!({"echo": "hi"}),
            metadata: Default::default(),
            expect_reply: true,
            timeout_ms: None,
        },
        Utc::now(),
    )
}

#[tokio::test]
async fn local_process_executor_parses_json_stdout() {
    let mut commands = HashMap::new();
    commands.insert("a1".to_owned(), "cat".to_owned());
    let executor = LocalProcessExecutor::new(commands, Duration::from_secs(5));
    let reply = executor.execute("a1", &ticket("a1")).await.unwrap();
    assert_eq!(reply, json!({"echo": "hi"}));
}

#[tokio::test]
async fn local_process_executor_wraps_non_json_stdout_as_string() {
    let mut commands = HashMap::new();
    commands.insert("a1".to_owned(), "echo not-json".to_owned());
    let executor = LocalProcessExecutor::new(commands, Duration::from_secs(5));
    let reply = executor.execute("a1", &ticket("a1")).await.unwrap();
    assert_eq!(reply, json!("not-json\n"));
}

#[tokio::test]
async fn local_process_executor_fails_without_a_configured_command() {
    let executor = LocalProcessExecutor::new(HashMap::new(), Duration::from_secs(5));
    let err = executor.execute("a1", &ticket("a1")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ExecutorFail);
}

#[tokio::test]
async fn local_process_executor_surfaces_nonzero_exit() {
    let mut commands = HashMap::new();
    commands.insert("a1".to_owned(), "exit 3".to_owned());
    let executor = LocalProcessExecutor::new(commands, Duration::from_secs(5));
    let err = executor.execute("a1", &ticket("a1")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ExecutorFail);
}

#[tokio::test]
async fn local_process_executor_times_out_long_running_commands() {
    let mut commands = HashMap::new();
    commands.insert("a1".to_owned(), "sleep 5".to_owned());
    let executor = LocalProcessExecutor::new(commands, Duration::from_millis(50));
    let err = executor.execute("a1", &ticket("a1")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);
}

#[tokio::test]
async fn agent_locks_serialize_deliveries_to_the_same_agent() {
    let locks = AgentLocks::new();
    let first = locks.try_acquire("a1").await;
    assert!(first.is_some());
    let second = locks.try_acquire("a1").await;
    assert!(second.is_none());
    drop(first);
    let third = locks.try_acquire("a1").await;
    assert!(third.is_some());
}

#[tokio::test]
async fn agent_locks_are_independent_per_agent() {
    let locks = AgentLocks::new();
    let a = locks.try_acquire("a1").await;
    let b = locks.try_acquire("a2").await;
    assert!(a.is_some());
    assert!(b.is_some());
}
