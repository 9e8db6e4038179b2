//! Agent shim specs
//!
//! The invoker routes shell commands and agent prompts, captures exit
//! status instead of raising, bounds execution with a timeout, and pulls
//! the last JSON object out of the combined output.

use crate::prelude::*;
use serial_test::serial;

fn invoker() -> AgentInvoker {
    AgentInvoker::new()
}

fn timeout() -> Duration {
    Duration::from_secs(5)
}

#[tokio::test]
async fn the_last_json_object_in_the_output_wins() {
    let dir = tempfile::tempdir().unwrap();
    let out = invoker()
        .run(
            "claude",
            r#"sh -c 'echo "{\"step\": 1}"; echo progress note; echo "{\"step\": 2}"'"#,
            dir.path(),
            timeout(),
        )
        .await
        .unwrap();
    assert!(out.success());
    assert_eq!(out.result, Some(json!({"step": 2})));
}

#[tokio::test]
async fn stderr_participates_in_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let out = invoker()
        .run(
            "claude",
            r#"sh -c 'echo "{\"from\": \"stdout\"}"; echo "{\"from\": \"stderr\"}" 1>&2'"#,
            dir.path(),
            timeout(),
        )
        .await
        .unwrap();
    // stdout is scanned first, stderr after; the stderr object is last.
    assert_eq!(out.result, Some(json!({"from": "stderr"})));
}

#[tokio::test]
async fn fenced_blocks_are_extraction_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let out = invoker()
        .run(
            "claude",
            r#"sh -c 'printf "here you go:\n\`\`\`json\n{\"pr\": 7}\n\`\`\`\n"'"#,
            dir.path(),
            timeout(),
        )
        .await
        .unwrap();
    assert_eq!(out.result, Some(json!({"pr": 7})));
}

#[tokio::test]
async fn a_non_zero_exit_is_captured_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let out = invoker()
        .run("claude", r#"sh -c 'echo "{\"done\": true}"; exit 3'"#, dir.path(), timeout())
        .await
        .unwrap();
    assert!(!out.success());
    assert_eq!(out.status, 3);
    // The structured result survives the failure; callers decide what to
    // do with the pair.
    assert_eq!(out.result, Some(json!({"done": true})));
}

#[tokio::test]
async fn a_timeout_kills_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let err = invoker()
        .run("claude", "sh -c 'sleep 30'", dir.path(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(CoordError::from(err), CoordError::Timeout(_)));
}

#[tokio::test]
async fn prompts_route_to_the_provider_binary() {
    let dir = tempfile::tempdir().unwrap();
    let out = AgentInvoker::new()
        .with_binary("claude", "echo")
        .run("claude", "summarize the repository layout", dir.path(), timeout())
        .await
        .unwrap();
    // `echo` stands in for the agent: the prompt arrives as its argument.
    assert!(out.stdout.contains("summarize the repository layout"));
}

#[tokio::test]
#[serial]
async fn the_environment_can_redirect_a_provider_binary() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("CREWD_AGENT_BIN_CLAUDE", "echo");

    let out = invoker().run("claude", "hello from the gate", dir.path(), timeout()).await;
    std::env::remove_var("CREWD_AGENT_BIN_CLAUDE");

    let out = out.unwrap();
    assert!(out.success());
    assert!(out.stdout.contains("hello from the gate"));
}
