//! Run-level tests for the automation engine.
//!
//! Agents are replaced by `MockAgent`, persistence by `MemoryRunStore` (or a
//! store that refuses writes), and HTTP endpoints by `wiremock`, so no
//! external service is required.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use db::{DbError, MemoryRunStore, RunRecord, RunStatus, RunStore};
use nodes::mock::{MockAgent, MockBehaviour};

use crate::{AutomationRunner, Blueprint, EngineConfig, StepStatus};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn config() -> EngineConfig {
    EngineConfig { http_timeout: Duration::from_secs(5), ..EngineConfig::default() }
}

fn runner(agent: &Arc<MockAgent>, store: &Arc<MemoryRunStore>) -> AutomationRunner {
    AutomationRunner::new(store.clone(), agent.clone(), config()).expect("runner builds")
}

fn blueprint(value: Value) -> Blueprint {
    serde_json::from_value(value).expect("valid blueprint")
}

fn agent_step(id: &str, agent_id: &str) -> Value {
    json!({ "id": id, "type": "ai_agent_call", "config": { "agent_id": agent_id, "prompt": "go" } })
}

/// A store that rejects writes once `accepted` of them have gone through.
struct FlakyStore {
    accepted: usize,
    writes: AtomicUsize,
}

impl FlakyStore {
    fn rejecting_after(accepted: usize) -> Self {
        Self { accepted, writes: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl RunStore for FlakyStore {
    async fn upsert(&self, _record: &RunRecord) -> Result<(), DbError> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        if n < self.accepted {
            Ok(())
        } else {
            Err(DbError::Unavailable("connection refused".into()))
        }
    }

    async fn get(&self, _id: Uuid) -> Result<RunRecord, DbError> {
        Err(DbError::NotFound)
    }

    async fn list_for_automation(&self, _automation_id: &str) -> Result<Vec<RunRecord>, DbError> {
        Ok(Vec::new())
    }
}

// ============================================================
// Run controller
// ============================================================

#[tokio::test]
async fn empty_blueprint_completes() {
    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(MemoryRunStore::new());

    for empty in [json!([]), json!({ "steps": [] }), Value::Null] {
        let result = runner(&agent, &store).run("auto-1", &blueprint(empty), None).await;
        assert!(result.success);
        assert!(result.results.is_empty());
        assert!(result.errors.is_empty());

        let record = store.get(result.execution_id).await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.automation_id, "auto-1");
        assert!(record.finished_at.is_some());
    }
}

#[tokio::test]
async fn failing_step_halts_the_run() {
    let agent = Arc::new(MockAgent::replying(json!("ok")).with_agent("b", MockBehaviour::Fail("boom".into())));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([agent_step("one", "a"), agent_step("two", "b"), agent_step("three", "c")]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(!result.success);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].step_id, "one");
    assert_eq!(result.errors, vec!["Step two failed: AI agent invocation failed: boom".to_owned()]);
    assert_eq!(agent.calls_for("c"), 0);

    let record = store.get(result.execution_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    let logged = record.details_log["steps"].as_array().unwrap();
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[1]["status"], "failed");
    assert_eq!(record.details_log["errors"][0], result.errors[0]);
}

#[tokio::test]
async fn lenient_step_lets_the_run_continue() {
    let agent = Arc::new(MockAgent::replying(json!("ok")).with_agent("b", MockBehaviour::Fail("boom".into())));
    let store = Arc::new(MemoryRunStore::new());
    let mut lenient = agent_step("two", "b");
    lenient["stopOnError"] = json!(false);
    let bp = blueprint(json!([agent_step("one", "a"), lenient, agent_step("three", "c")]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(!result.success);
    let ids: Vec<_> = result.results.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(ids, vec!["one", "three"]);
    assert_eq!(result.errors.len(), 1);
    assert!(result.results.iter().all(|r| r.status == StepStatus::Succeeded));
}

#[tokio::test]
async fn steps_without_ids_are_labelled_by_position() {
    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "type": "delay", "config": { "duration": 0 } }, { "type": "send_fax" }]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert_eq!(result.results[0].step_id, "#1");
    assert_eq!(result.errors, vec!["Step #2 failed: Unknown step type: send_fax".to_owned()]);
}

#[tokio::test]
async fn setup_failure_runs_nothing() {
    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(FlakyStore::rejecting_after(0));
    let runner = AutomationRunner::new(store.clone(), agent.clone(), config()).unwrap();

    let result = runner.run("auto", &blueprint(json!([agent_step("a", "a")])), None).await;

    assert!(!result.success);
    assert!(result.results.is_empty());
    assert!(result.errors[0].starts_with("Automation run setup failed: "));
    assert_eq!(agent.call_count(), 0);
    // The finalising write is still attempted.
    assert_eq!(store.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn final_persist_failure_is_reported() {
    let agent = Arc::new(MockAgent::replying(json!("ok")));
    let store = Arc::new(FlakyStore::rejecting_after(1));
    let runner = AutomationRunner::new(store, agent.clone(), config()).unwrap();

    let result = runner.run("auto", &blueprint(json!([agent_step("a", "a")])), None).await;

    assert_eq!(result.results.len(), 1);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("connection refused"));
}

#[tokio::test]
async fn concurrent_runs_are_isolated() {
    let agent = Arc::new(MockAgent::replying(json!("ok")));
    let store = Arc::new(MemoryRunStore::new());
    let runner = Arc::new(runner(&agent, &store));
    let bp = blueprint(json!([agent_step("a", "a")]));

    let (first, second) = tokio::join!(
        runner.run("auto", &bp, Some(json!({ "n": 1 }))),
        runner.run("auto", &bp, Some(json!({ "n": 2 }))),
    );

    assert_ne!(first.execution_id, second.execution_id);
    assert_eq!(store.list_for_automation("auto").await.unwrap().len(), 2);
    assert_eq!(store.get(second.execution_id).await.unwrap().trigger_data, json!({ "n": 2 }));
}

// ============================================================
// Context flow between steps
// ============================================================

#[tokio::test]
async fn trigger_data_and_step_outputs_feed_later_steps() {
    let agent = Arc::new(
        MockAgent::replying(json!("sent"))
            .with_agent("scorer", MockBehaviour::Reply(json!({ "score": 9 }))),
    );
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([
        agent_step("rate", "scorer"),
        { "id": "gate", "type": "condition", "config": {
            "condition": "rate.score > 5 && tier == 'gold'",
            "if_true": [{ "id": "notify", "type": "ai_agent_call",
                          "config": { "agent_id": "mailer", "prompt": "Hi {{customer.name}}, score {{rate.score}}" } }]
        }}
    ]));

    let trigger = json!({ "tier": "gold", "customer": { "name": "Ada" } });
    let result = runner(&agent, &store).run("auto", &bp, Some(trigger)).await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.results[1].output, Some(json!({ "conditionResult": true, "result": "sent" })));

    let requests = agent.requests();
    assert_eq!(requests[1].agent_id, "mailer");
    assert_eq!(requests[1].prompt, "Hi Ada, score 9");
    assert_eq!(requests[1].context["tier"], "gold");
}

#[tokio::test]
async fn false_condition_without_branch_still_succeeds() {
    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "c", "type": "condition",
        "config": { "condition": "age > 18", "trueStep": agent_step("t", "t") } }]));

    let result = runner(&agent, &store).run("auto", &bp, Some(json!({ "age": 12 }))).await;

    assert!(result.success);
    assert_eq!(result.results[0].output, Some(json!({ "conditionResult": false })));
    assert_eq!(agent.call_count(), 0);
}

// ============================================================
// Composite steps
// ============================================================

#[tokio::test(start_paused = true)]
async fn retry_recovers_from_transient_failures() {
    let agent = Arc::new(MockAgent::new(MockBehaviour::FlakyThenReply { failures: 2, reply: json!("done") }));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "r", "type": "retry",
        "config": { "max_attempts": 3, "backoff_ms": 100, "steps": [agent_step("call", "flaky")] } }]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.results[0].output, Some(json!({ "attempts": 3, "results": ["done"] })));
    assert_eq!(agent.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_gives_up_after_max_attempts() {
    let agent = Arc::new(MockAgent::failing("down"));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "r", "type": "retry",
        "config": { "max_attempts": 2, "steps": [agent_step("call", "x")] } }]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(!result.success);
    assert_eq!(
        result.errors,
        vec!["Step r failed: retry exhausted after 2 attempt(s): AI agent invocation failed: down".to_owned()]
    );
    assert_eq!(agent.call_count(), 2);
}

#[tokio::test]
async fn fallback_runs_when_primary_fails() {
    let agent = Arc::new(
        MockAgent::replying(json!("backup answer"))
            .with_agent("primary", MockBehaviour::Fail("rate limited".into())),
    );
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "f", "type": "fallback", "config": {
        "primary_steps": [agent_step("p", "primary")],
        "fallback_steps": [agent_step("b", "backup")]
    }}]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(result.success);
    let output = result.results[0].output.clone().unwrap();
    assert_eq!(output["usedFallback"], true);
    assert_eq!(output["results"], json!(["backup answer"]));
    assert_eq!(output["primaryError"], "AI agent invocation failed: rate limited");
}

#[tokio::test]
async fn fallback_fails_when_both_branches_fail() {
    let agent = Arc::new(MockAgent::failing("nope"));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "f", "type": "fallback", "config": {
        "primary_steps": [agent_step("p", "a")],
        "fallback_steps": [agent_step("b", "b")]
    }}]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(!result.success);
    assert!(result.errors[0].starts_with("Step f failed: fallback failed: primary: "));
}

#[tokio::test]
async fn loop_runs_nested_steps_per_item() {
    let agent = Arc::new(MockAgent::replying(json!("ok")));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "each", "type": "loop", "config": {
        "items": "trigger.orders",
        "item_variable": "order",
        "steps": [{ "id": "ship", "type": "ai_agent_call",
                    "config": { "agent_id": "shipper", "prompt": "ship {{order.sku}} ({{index}})" } }]
    }}]));

    let trigger = json!({ "orders": [{ "sku": "A1" }, { "sku": "B2" }] });
    let result = runner(&agent, &store).run("auto", &bp, Some(trigger)).await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.results[0].output.as_ref().unwrap()["iterations"], 2);
    let prompts: Vec<_> = agent.requests().into_iter().map(|r| r.prompt).collect();
    assert_eq!(prompts, vec!["ship A1 (0)", "ship B2 (1)"]);
}

#[tokio::test(start_paused = true)]
async fn delay_uses_the_configured_duration() {
    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "wait", "type": "delay", "config": { "duration": 250 } }, { "id": "default", "type": "delay" }]));

    let start = tokio::time::Instant::now();
    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(result.success);
    assert_eq!(result.results[0].output, Some(json!({ "delayed": 250 })));
    assert_eq!(result.results[1].output, Some(json!({ "delayed": 1000 })));
    assert!(start.elapsed() >= Duration::from_millis(1250));
}

// ============================================================
// HTTP steps
// ============================================================

#[tokio::test]
async fn webhook_reports_non_2xx_without_failing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_json(json!({ "event": "signup", "user": "ada" })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "hook", "type": "webhook", "config": {
        "url": format!("{}/hook", server.uri()),
        "payload": { "event": "signup", "user": "{{name}}" }
    }}]));

    let result = runner(&agent, &store).run("auto", &bp, Some(json!({ "name": "ada" }))).await;

    assert!(result.success);
    let output = result.results[0].output.clone().unwrap();
    assert_eq!(output["status"], 500);
    assert_eq!(output["success"], false);
}

#[tokio::test]
async fn api_call_fails_on_non_2xx() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([{ "id": "fetch", "type": "api_call",
        "config": { "url": format!("{}/contacts", server.uri()) } }]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(!result.success);
    assert_eq!(result.errors, vec!["Step fetch failed: API call failed: 404 Not Found".to_owned()]);
}

#[tokio::test]
async fn api_call_output_is_available_to_later_steps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "amount": 5000 })))
        .mount(&server)
        .await;

    let agent = Arc::new(MockAgent::replying(json!("ok")));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([
        { "id": "deal", "type": "api_call", "config": { "url": format!("{}/deal", server.uri()) } },
        { "id": "big", "type": "condition", "config": {
            "condition": "deal.amount >= 1000", "if_true": [agent_step("celebrate", "party")] } }
    ]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.results[0].output, Some(json!({ "amount": 5000 })));
    assert_eq!(agent.calls_for("party"), 1);
}

#[tokio::test]
async fn slow_http_steps_fail_with_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(MemoryRunStore::new());
    let config = EngineConfig { http_timeout: Duration::from_millis(150), ..EngineConfig::default() };
    let runner = AutomationRunner::new(store.clone(), agent, config).unwrap();
    let bp = blueprint(json!([{ "id": "slow", "type": "api_call",
        "config": { "url": format!("{}/slow", server.uri()) } }]));

    let result = runner.run("auto", &bp, None).await;

    assert!(!result.success);
    assert_eq!(result.errors, vec!["Step slow failed: request timed out after 150ms".to_owned()]);
    assert_eq!(store.get(result.execution_id).await.unwrap().status, RunStatus::Failed);
}

#[tokio::test]
async fn webhook_transport_failure_fails_the_run() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let agent = Arc::new(MockAgent::replying(Value::Null));
    let store = Arc::new(MemoryRunStore::new());
    let bp = blueprint(json!([
        { "id": "hook", "type": "webhook", "config": { "url": format!("http://{addr}/hook") } },
        agent_step("after", "a")
    ]));

    let result = runner(&agent, &store).run("auto", &bp, None).await;

    assert!(!result.success);
    assert!(result.results.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Step hook failed: request failed: "), "{}", result.errors[0]);
    assert_eq!(agent.call_count(), 0);
}
