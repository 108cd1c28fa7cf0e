// crates/canvasruntime/tests/engine_test.rs

use async_trait::async_trait;
use canvascore::{
    ExecutionEvent, FlowError, GraphError, NodeContext, NodeError, NodeHandler, NodeKind,
    NodeSpec, RunStatus, Value, Workflow,
};
use canvasruntime::{
    CanvasRuntime, CyclePolicy, FailurePolicy, InMemoryWorkflowStore, NodeRegistry, RunOptions,
    RunOutcome, RuntimeConfig, WorkflowStore,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Prefixes its default input with "gen:" and counts calls.
struct CountingHandler {
    kind: NodeKind,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl NodeHandler for CountingHandler {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = ctx
            .inputs
            .default_input()
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(json!(format!("gen:{}", text)))
    }
}

struct FailingHandler;

#[async_trait]
impl NodeHandler for FailingHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::GeminiImage
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<Value, NodeError> {
        Err(NodeError::ExecutionFailed("backend rejected prompt".to_string()))
    }
}

/// Stands in for a long generation call.
struct SlowHandler;

#[async_trait]
impl NodeHandler for SlowHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::VeoStandard
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<Value, NodeError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!("video"))
    }
}

struct Harness {
    runtime: CanvasRuntime,
    text_calls: Arc<AtomicUsize>,
    speech_calls: Arc<AtomicUsize>,
}

fn harness(config: RuntimeConfig) -> Harness {
    init_tracing();
    let text_calls = Arc::new(AtomicUsize::new(0));
    let speech_calls = Arc::new(AtomicUsize::new(0));

    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(CountingHandler {
        kind: NodeKind::GeminiText,
        calls: Arc::clone(&text_calls),
    }));
    registry.register(Arc::new(CountingHandler {
        kind: NodeKind::SpeechGen,
        calls: Arc::clone(&speech_calls),
    }));
    registry.register(Arc::new(FailingHandler));
    registry.register(Arc::new(SlowHandler));

    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    Harness {
        runtime: CanvasRuntime::with_parts(Arc::new(registry), store, config),
        text_calls,
        speech_calls,
    }
}

/// input -> gemini_text -> output
fn text_pipeline(id: &str, prompt: &str) -> Workflow {
    let mut wf = Workflow::new(id, "Text pipeline");
    wf.add_node(NodeSpec::new("prompt", NodeKind::Input).with_value(prompt));
    wf.add_node(NodeSpec::new("gen", NodeKind::GeminiText));
    wf.add_node(NodeSpec::new("out", NodeKind::Output));
    wf.connect("prompt", "gen");
    wf.connect("gen", "out");
    wf
}

async fn collect(stream: canvasruntime::ExecutionStream) -> Vec<ExecutionEvent> {
    stream.collect().await
}

#[tokio::test]
async fn test_cached_node_runs_once() {
    let h = harness(RuntimeConfig::default());
    let wf = text_pipeline("wf", "a cat");
    let options = RunOptions::default().with_cache();

    let first = h.runtime.execute(&wf, &options).await.unwrap();
    let second = h.runtime.execute(&wf, &options).await.unwrap();

    assert_eq!(h.text_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.get("gen").unwrap().output, json!("gen:a cat"));
    assert_eq!(first.get("gen"), second.get("gen"));
    assert_eq!(second.get("out").unwrap().output, json!("gen:a cat"));

    h.runtime
        .execute(&wf, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(h.text_calls.load(Ordering::SeqCst), 2);

    h.runtime.clear_cache().await;
    assert!(h.runtime.cache().is_empty().await);
    h.runtime.execute(&wf, &options).await.unwrap();
    assert_eq!(h.text_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_changed_input_misses_cache() {
    let h = harness(RuntimeConfig::default());
    let options = RunOptions::default().with_cache();

    h.runtime.execute(&text_pipeline("wf", "a cat"), &options).await.unwrap();
    h.runtime.execute(&text_pipeline("wf", "a dog"), &options).await.unwrap();
    assert_eq!(h.text_calls.load(Ordering::SeqCst), 2);
}

fn failing_chain() -> Workflow {
    let mut wf = Workflow::new("chain", "A -> B -> C");
    wf.add_node(NodeSpec::new("a", NodeKind::Input).with_value("x"));
    wf.add_node(NodeSpec::new("b", NodeKind::GeminiImage));
    wf.add_node(NodeSpec::new("c", NodeKind::Output));
    wf.connect("a", "b");
    wf.connect("b", "c");
    wf
}

#[tokio::test]
async fn test_failed_node_does_not_stop_run() {
    let h = harness(RuntimeConfig::default());
    let report = h
        .runtime
        .execute(&failing_chain(), &RunOptions::default())
        .await
        .unwrap();

    assert!(report.get("a").unwrap().is_completed());
    let b = report.get("b").unwrap();
    assert!(b.is_failed());
    assert!(b.error.as_deref().unwrap().contains("backend rejected prompt"));
    // the sink tolerates a missing upstream value
    let c = report.get("c").unwrap();
    assert!(c.is_completed());
    assert_eq!(c.output, Value::Null);

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.status(), RunStatus::Failed);
}

#[tokio::test]
async fn test_abort_policy_stops_after_failure() {
    let h = harness(RuntimeConfig {
        on_node_failure: FailurePolicy::AbortRun,
        ..RuntimeConfig::default()
    });

    let report = h
        .runtime
        .execute(&failing_chain(), &RunOptions::default())
        .await
        .unwrap();
    assert!(report.get("a").unwrap().is_completed());
    assert!(report.get("b").unwrap().is_failed());
    assert!(report.get("c").is_none());
    assert!(matches!(report.outcome, RunOutcome::Aborted { ref node_id, .. } if node_id == "b"));
    assert_eq!(report.status(), RunStatus::Failed);

    let events = collect(
        h.runtime
            .stream(failing_chain(), RunOptions::default(), None)
            .unwrap(),
    )
    .await;
    assert!(matches!(events.last(), Some(ExecutionEvent::WorkflowFailed { .. })));
    assert!(events.iter().all(|e| e.node_id() != Some("c")));
}

#[tokio::test]
async fn test_stream_frames_in_order() {
    let h = harness(RuntimeConfig::default());
    let events = collect(
        h.runtime
            .stream(text_pipeline("wf", "hi"), RunOptions::default(), None)
            .unwrap(),
    )
    .await;

    let kinds: Vec<(&str, Option<&str>)> = events
        .iter()
        .map(|e| {
            let kind = match e {
                ExecutionEvent::NodeStarted { .. } => "started",
                ExecutionEvent::NodeCompleted { .. } => "completed",
                ExecutionEvent::NodeFailed { .. } => "failed",
                ExecutionEvent::ExecutionCancelled { .. } => "cancelled",
                ExecutionEvent::WorkflowCompleted => "workflow_completed",
                ExecutionEvent::WorkflowFailed { .. } => "workflow_failed",
            };
            (kind, e.node_id())
        })
        .collect();

    assert_eq!(
        kinds,
        vec![
            ("started", Some("prompt")),
            ("completed", Some("prompt")),
            ("started", Some("gen")),
            ("completed", Some("gen")),
            ("started", Some("out")),
            ("completed", Some("out")),
            ("workflow_completed", None),
        ]
    );
    assert!(h.runtime.active().is_empty());
}

#[tokio::test]
async fn test_cancel_during_second_node() {
    let h = harness(RuntimeConfig::default());

    let mut wf = Workflow::new("slow", "Three steps");
    wf.add_node(NodeSpec::new("script", NodeKind::GeminiText));
    wf.add_node(NodeSpec::new("video", NodeKind::VeoStandard));
    wf.add_node(NodeSpec::new("voice", NodeKind::SpeechGen));
    wf.connect("script", "video");
    wf.connect("video", "voice");

    let mut stream = h
        .runtime
        .stream(wf, RunOptions::default(), Some("exec-1".to_string()))
        .unwrap();
    assert_eq!(stream.execution_id(), "exec-1");

    let mut seen = Vec::new();
    while let Some(event) = stream.next().await {
        let second_started =
            matches!(&event, ExecutionEvent::NodeStarted { node_id } if node_id == "video");
        seen.push(event);
        if second_started {
            break;
        }
    }
    assert!(h.runtime.cancel("exec-1"));

    let rest: Vec<_> = stream.collect().await;
    assert_eq!(
        rest,
        vec![ExecutionEvent::ExecutionCancelled {
            execution_id: "exec-1".to_string()
        }]
    );

    assert_eq!(seen.len(), 3);
    assert!(matches!(&seen[1], ExecutionEvent::NodeCompleted { node_id, .. } if node_id == "script"));
    assert_eq!(h.speech_calls.load(Ordering::SeqCst), 0);
    assert!(!h.runtime.cancel("exec-1"));
}

#[tokio::test]
async fn test_duplicate_execution_id_rejected() {
    let h = harness(RuntimeConfig::default());
    let mut wf = Workflow::new("slow", "Slow");
    wf.add_node(NodeSpec::new("video", NodeKind::VeoStandard));

    let stream = h
        .runtime
        .stream(wf.clone(), RunOptions::default(), Some("dup".to_string()))
        .unwrap();
    let err = h
        .runtime
        .stream(wf, RunOptions::default(), Some("dup".to_string()))
        .err()
        .unwrap();
    assert!(matches!(err, FlowError::DuplicateExecution(id) if id == "dup"));

    assert!(h.runtime.cancel("dup"));
    let events = collect(stream).await;
    assert!(matches!(events.last(), Some(ExecutionEvent::ExecutionCancelled { .. })));
}

#[tokio::test]
async fn test_self_referencing_workflow_hits_depth_limit() {
    let h = harness(RuntimeConfig::default());
    let mut wf = Workflow::new("loop", "Calls itself");
    wf.add_node(NodeSpec::new("again", NodeKind::Workflow).with_workflow("loop"));
    h.runtime.store().save(&wf).await.unwrap();

    let err = h
        .runtime
        .execute(&wf, &RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::RecursionLimit { depth: 11, limit: 10 }));
}

#[tokio::test]
async fn test_nested_outputs_selected_by_source_handle() {
    let h = harness(RuntimeConfig::default());

    let mut inner = Workflow::new("inner", "Inner");
    inner.add_node(NodeSpec::new("prompt", NodeKind::Input));
    inner.add_node(NodeSpec::new("gen", NodeKind::GeminiText));
    inner.add_node(NodeSpec::new("out-gen", NodeKind::Output));
    inner.add_node(NodeSpec::new("out-raw", NodeKind::Output));
    inner.connect("prompt", "gen");
    inner.connect("gen", "out-gen");
    inner.connect("prompt", "out-raw");
    h.runtime.store().save(&inner).await.unwrap();

    let mut outer = Workflow::new("outer", "Outer");
    outer.add_node(NodeSpec::new("p", NodeKind::Input).with_value("owl"));
    outer.add_node(NodeSpec::new("sub", NodeKind::Workflow).with_workflow("inner"));
    outer.add_node(NodeSpec::new("generated", NodeKind::Output));
    outer.add_node(NodeSpec::new("raw", NodeKind::Output));
    outer.connect_handles("p", "output", "sub", "prompt");
    outer.connect_handles("sub", "out-gen", "generated", "input");
    outer.connect_handles("sub", "out-raw", "raw", "input");

    let report = h
        .runtime
        .execute(&outer, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(
        report.get("sub").unwrap().output,
        json!({"out-gen": "gen:owl", "out-raw": "owl"})
    );
    assert_eq!(report.get("generated").unwrap().output, json!("gen:owl"));
    assert_eq!(report.get("raw").unwrap().output, json!("owl"));
}

#[tokio::test]
async fn test_repointed_nested_node_misses_cache() {
    let h = harness(RuntimeConfig::default());
    for (id, text) in [("inner1", "one"), ("inner2", "two")] {
        let mut inner = Workflow::new(id, id);
        inner.add_node(NodeSpec::new("text", NodeKind::Input).with_value(text));
        inner.add_node(NodeSpec::new("out", NodeKind::Output));
        inner.connect("text", "out");
        h.runtime.store().save(&inner).await.unwrap();
    }

    let outer = |target: &str| {
        let mut wf = Workflow::new("outer", "Outer");
        wf.add_node(NodeSpec::new("sub", NodeKind::Workflow).with_workflow(target));
        wf
    };
    let options = RunOptions::default().with_cache();

    let first = h.runtime.execute(&outer("inner1"), &options).await.unwrap();
    assert_eq!(first.get("sub").unwrap().output, json!({"out": "one"}));

    let second = h.runtime.execute(&outer("inner2"), &options).await.unwrap();
    assert_eq!(second.get("sub").unwrap().output, json!({"out": "two"}));
}

#[tokio::test]
async fn test_missing_nested_workflow_is_node_failure() {
    let h = harness(RuntimeConfig::default());
    let mut wf = Workflow::new("outer", "Outer");
    wf.add_node(NodeSpec::new("sub", NodeKind::Workflow).with_workflow("nowhere"));
    wf.add_node(NodeSpec::new("unset", NodeKind::Workflow));

    let report = h.runtime.execute(&wf, &RunOptions::default()).await.unwrap();
    let sub = report.get("sub").unwrap();
    assert!(sub.is_failed());
    assert!(sub.error.as_deref().unwrap().contains("nowhere"));
    assert!(report.get("unset").unwrap().is_failed());
}

#[tokio::test]
async fn test_partial_run_uses_recorded_outputs() {
    let h = harness(RuntimeConfig::default());
    let mut wf = Workflow::new("wf", "Partial");
    wf.add_node(
        NodeSpec::new("prompt", NodeKind::Input)
            .with_value("fresh")
            .with_recorded_output("recorded"),
    );
    wf.add_node(NodeSpec::new("gen", NodeKind::GeminiText));
    wf.add_node(NodeSpec::new("out", NodeKind::Output));
    wf.connect("prompt", "gen");
    wf.connect("gen", "out");

    let options = RunOptions::default().only(vec!["out".to_string(), "gen".to_string()]);
    let report = h.runtime.execute(&wf, &options).await.unwrap();

    assert!(report.get("prompt").is_none());
    assert_eq!(report.get("gen").unwrap().output, json!("gen:recorded"));
    assert_eq!(report.get("out").unwrap().output, json!("gen:recorded"));
}

#[tokio::test]
async fn test_unregistered_kind_is_node_failure() {
    let h = harness(RuntimeConfig::default());
    let mut wf = Workflow::new("wf", "Music");
    wf.add_node(NodeSpec::new("music", NodeKind::LyriaGen));

    let report = h.runtime.execute(&wf, &RunOptions::default()).await.unwrap();
    let music = report.get("music").unwrap();
    assert!(music.is_failed());
    assert!(music.error.as_deref().unwrap().contains("lyria_gen"));
}

fn cyclic() -> Workflow {
    let mut wf = Workflow::new("cyclic", "Cycle");
    wf.add_node(NodeSpec::new("seed", NodeKind::Input).with_value("s"));
    wf.add_node(NodeSpec::new("a", NodeKind::GeminiText));
    wf.add_node(NodeSpec::new("b", NodeKind::GeminiText));
    wf.connect("a", "b");
    wf.connect("b", "a");
    wf
}

#[tokio::test]
async fn test_cycle_rejected_before_dispatch() {
    let h = harness(RuntimeConfig::default());
    let err = h
        .runtime
        .execute(&cyclic(), &RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Graph(GraphError::Cycle { .. })));
    assert_eq!(h.text_calls.load(Ordering::SeqCst), 0);

    let events = collect(h.runtime.stream(cyclic(), RunOptions::default(), None).unwrap()).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ExecutionEvent::WorkflowFailed { error } if error.contains("a, b")));
}

#[tokio::test]
async fn test_partial_cycle_policy_runs_the_rest() {
    let h = harness(RuntimeConfig {
        on_cycle: CyclePolicy::Partial,
        ..RuntimeConfig::default()
    });
    let report = h
        .runtime
        .execute(&cyclic(), &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.results.len(), 1);
    assert!(report.get("seed").unwrap().is_completed());
}

#[tokio::test]
async fn test_subset_run_ignores_cycle_elsewhere() {
    let h = harness(RuntimeConfig::default());

    let report = h
        .runtime
        .execute(&cyclic(), &RunOptions::default().only(vec!["seed".to_string()]))
        .await
        .unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.get("seed").unwrap().output, json!("s"));

    // a requested node inside the cycle still runs
    let report = h
        .runtime
        .execute(&cyclic(), &RunOptions::default().only(vec!["a".to_string()]))
        .await
        .unwrap();
    assert!(report.get("a").unwrap().is_completed());
    assert_eq!(h.text_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_batch_over_inputs() {
    let h = harness(RuntimeConfig::default());
    h.runtime
        .store()
        .save(&text_pipeline("saved", ""))
        .await
        .unwrap();

    let outputs = h
        .runtime
        .execute_over_inputs("saved", vec![json!("one"), json!("two")], &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outputs, vec![json!("gen:one"), json!("gen:two")]);

    let err = h
        .runtime
        .execute_over_inputs("missing", vec![json!("x")], &RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Graph(GraphError::NotFound(_))));
}

#[tokio::test]
async fn test_batch_reports_fatal_runs_inline() {
    let h = harness(RuntimeConfig::default());
    let mut wf = Workflow::new("loop", "Loop");
    wf.add_node(NodeSpec::new("in", NodeKind::Input));
    wf.add_node(NodeSpec::new("again", NodeKind::Workflow).with_workflow("loop"));
    h.runtime.store().save(&wf).await.unwrap();

    let outputs = h
        .runtime
        .execute_over_inputs("loop", vec![json!(1)], &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0]["error"].as_str().unwrap().contains("recursion depth"));
}
