//! Integration tests for prompts, timers and the audit trail via CLI.

mod common;

use common::{TestEnv, add_node, run_json};
use predicates::prelude::*;

fn add_prompt(env: &TestEnv, node: &str, content: &str) -> String {
    let json = run_json(env, "alice", &["prompt", "add", node, content]);
    json["prompt"]["id"].as_str().unwrap().to_string()
}

fn event_types(json: &serde_json::Value) -> Vec<String> {
    json["days"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|d| d["events"].as_array().unwrap().iter())
        .map(|e| e["eventType"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_prompt_lifecycle() {
    let env = TestEnv::new();
    add_node(&env, "alice", "A", "task", "Write docs");

    let id = add_prompt(&env, "A", "Draft README");
    let json = run_json(&env, "alice", &["prompt", "done", "A", &id]);
    assert_eq!(json["prompt"]["completed"], true);

    let json = run_json(&env, "alice", &["prompt", "edit", "A", &id, "Draft README v2"]);
    assert_eq!(json["prompt"]["content"], "Draft README v2");
    assert_eq!(json["prompt"]["completed"], true);

    let json = run_json(&env, "alice", &["prompt", "undone", "A", &id]);
    assert_eq!(json["prompt"]["completed"], false);

    run_json(&env, "alice", &["prompt", "delete", "A", &id]);
    let show = run_json(&env, "alice", &["canvas", "show"]);
    assert!(show["nodes"][0]["prompts"].as_array().unwrap().is_empty());
}

#[test]
fn test_prompt_on_missing_node() {
    let env = TestEnv::new();

    env.pc_as("alice")
        .args(["prompt", "add", "nope", "Hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Node not found"));
}

#[test]
fn test_deleting_prompt_drops_its_connections() {
    let env = TestEnv::new();
    add_node(&env, "alice", "A", "task", "A");
    add_node(&env, "alice", "B", "task", "B");
    let id = add_prompt(&env, "A", "Step");
    run_json(&env, "alice", &["connect", "A", "B", "--source-prompt", &id]);
    run_json(&env, "alice", &["connect", "A", "B", "--id", "plain"]);

    run_json(&env, "alice", &["prompt", "delete", "A", &id]);

    let show = run_json(&env, "alice", &["canvas", "show"]);
    let edges = show["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["id"], "plain");
}

#[test]
fn test_events_record_semantic_edits() {
    let env = TestEnv::new();
    add_node(&env, "alice", "A", "task", "A");
    add_node(&env, "alice", "B", "goal", "B");
    run_json(&env, "alice", &["connect", "A", "B", "--id", "e1"]);
    let id = add_prompt(&env, "A", "Step");
    run_json(&env, "alice", &["prompt", "done", "A", &id]);
    // Moves are not audited
    run_json(&env, "alice", &["node", "move", "A", "5", "5"]);

    let json = run_json(&env, "alice", &["events"]);
    assert_eq!(json["range"], "all");
    assert_eq!(json["count"], 5);
    let types = event_types(&json);
    // Newest first
    assert_eq!(
        types,
        vec![
            "prompt_completed",
            "prompt_added",
            "connection_created",
            "block_created",
            "block_created"
        ]
    );
    assert_eq!(json["days"][0]["events"][0]["userId"], "alice");
}

#[test]
fn test_events_filters() {
    let env = TestEnv::new();
    add_node(&env, "alice", "A", "task", "A");
    add_node(&env, "alice", "B", "task", "B");
    run_json(&env, "alice", &["node", "delete", "B"]);

    let json = run_json(&env, "alice", &["events", "--type", "block_deleted"]);
    assert_eq!(event_types(&json), vec!["block_deleted"]);

    let json = run_json(&env, "alice", &["events", "--limit", "2"]);
    assert_eq!(json["count"], 2);

    let json = run_json(&env, "alice", &["events", "--range", "today"]);
    assert_eq!(json["count"], 3);

    let json = run_json(
        &env,
        "alice",
        &["events", "--range", "2001-01-01..2001-01-31"],
    );
    assert_eq!(json["count"], 0);

    env.pc_as("alice")
        .args(["events", "--range", "someday"])
        .assert()
        .failure();
}

#[test]
fn test_timer_events() {
    let env = TestEnv::new();
    add_node(&env, "alice", "A", "task", "A");

    run_json(&env, "alice", &["timer", "start", "A"]);
    run_json(&env, "alice", &["timer", "stop", "A"]);

    let json = run_json(
        &env,
        "alice",
        &["events", "--type", "timer_started,timer_stopped"],
    );
    assert_eq!(event_types(&json), vec!["timer_stopped", "timer_started"]);

    env.pc_as("alice")
        .args(["timer", "start", "missing"])
        .assert()
        .failure();
}

#[test]
fn test_events_human_output_groups_by_day() {
    let env = TestEnv::new();
    add_node(&env, "alice", "A", "task", "A");

    env.pc_as("alice")
        .args(["events", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("block_created"))
        .stdout(predicate::str::contains("by alice"));
}
