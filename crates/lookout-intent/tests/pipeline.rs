//! End-to-end pipeline tests with a scripted model and a recording catalog.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lookout_adapters::{
    ActionCatalog, ActionDescriptor, ActionProvider, AdapterError, FileSource, HealthStatus,
    ProviderKind,
};
use lookout_agent::{AgentError, StructuredGenerator, StructuredPrompt};
use lookout_intent::{
    DispatchConfig, Dispatcher, Document, EntryStatus, IntentKind, IntentMatch, LookoutCache,
    MatchStatus, PayloadPreview, Pipeline, PipelineConfig, RunRecord, RunStatus, StatusSink,
};
use serde_json::{Value, json};

// ═══════════════════════════════════════════════════════════════════════
//  Fixtures
// ═══════════════════════════════════════════════════════════════════════

/// Answers lookout prompts and intent prompts with fixed values.
struct ScriptedGenerator {
    lookouts: Value,
    intents: Option<Value>,
    lookout_delay: Duration,
    intent_delay: Duration,
    lookout_calls: AtomicUsize,
    intent_calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(lookouts: Value, intents: Value) -> Self {
        Self {
            lookouts,
            intents: Some(intents),
            lookout_delay: Duration::ZERO,
            intent_delay: Duration::ZERO,
            lookout_calls: AtomicUsize::new(0),
            intent_calls: AtomicUsize::new(0),
        }
    }

    fn failing_intents(lookouts: Value) -> Self {
        Self {
            intents: None,
            ..Self::new(lookouts, json!([]))
        }
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    async fn generate_structured(
        &self,
        _prompt: &StructuredPrompt,
        schema: &Value,
    ) -> lookout_agent::Result<Value> {
        let is_lookout_stage = schema["items"]["properties"].get("watchFor").is_some();
        if is_lookout_stage {
            self.lookout_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.lookout_delay).await;
            return Ok(self.lookouts.clone());
        }
        self.intent_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.intent_delay).await;
        self.intents.clone().ok_or_else(|| AgentError::LlmRequestFailed {
            reason: "HTTP 529: overloaded".into(),
        })
    }
}

/// Records every invocation; fails the actions it is told to.
struct RecordingProvider {
    calls: Mutex<Vec<(String, Value)>>,
    failing: Vec<String>,
}

impl RecordingProvider {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Vec::new(),
        }
    }

    fn failing(action: &str) -> Self {
        Self {
            failing: vec![action.to_owned()],
            ..Self::new()
        }
    }

    fn invoked(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionProvider for RecordingProvider {
    fn id(&self) -> &str {
        "recording"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    async fn connect(&mut self) -> lookout_adapters::Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> lookout_adapters::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> lookout_adapters::Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![
            ActionDescriptor::new(
                "calendar_create_event",
                "Create a calendar event",
                json!({
                    "type": "object",
                    "properties": {
                        "summary": {"type": "string"},
                        "start": {"type": "string"},
                        "end": {"type": "string"},
                        "attendees": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["summary", "start", "end"]
                }),
            ),
            ActionDescriptor::new(
                "issues_create_issue",
                "Create a new issue (bug, ticket, task)",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "body": {"type": "string"}
                    },
                    "required": ["title"]
                }),
            ),
            ActionDescriptor::new(
                "issues_update_issue",
                "Update an existing issue identified by its number",
                json!({
                    "type": "object",
                    "properties": {
                        "number": {"type": "integer"},
                        "state": {"type": "string"}
                    },
                    "required": ["number"]
                }),
            ),
        ]
    }

    async fn invoke(&self, name: &str, payload: Value) -> lookout_adapters::Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_owned(), payload.clone()));
        if self.failing.iter().any(|f| f == name) {
            return Err(AdapterError::ExecutionFailed {
                action: name.to_owned(),
                reason: "HTTP 500".into(),
            });
        }
        Ok(json!({"ok": true}))
    }
}

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<RunRecord>>,
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn record(&self, record: &RunRecord) -> lookout_intent::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn standard_lookouts() -> Value {
    json!([
        {
            "intent": "create",
            "targetType": "event",
            "watchFor": ["schedule a meeting", "set up a call"],
            "fields": ["title", "start", "end", "attendees"]
        },
        {
            "intent": "create",
            "targetType": "issue",
            "watchFor": ["open a bug", "track this"],
            "fields": ["title", "description"]
        },
        {
            "intent": "update",
            "targetType": "issue",
            "watchFor": ["close the issue"],
            "fields": ["idToUpdate", "state"]
        }
    ])
}

fn pipeline_with(
    generator: Arc<ScriptedGenerator>,
    provider: Arc<RecordingProvider>,
    config: PipelineConfig,
) -> Pipeline {
    let catalog = ActionCatalog::new(vec![provider as Arc<dyn ActionProvider>]).unwrap();
    Pipeline::new(generator, Arc::new(catalog), config)
}

fn pipeline(generator: Arc<ScriptedGenerator>, provider: Arc<RecordingProvider>) -> Pipeline {
    pipeline_with(generator, provider, PipelineConfig::default())
}

// ═══════════════════════════════════════════════════════════════════════
//  Lookouts
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn lookouts_never_name_catalog_actions() {
    let generator = Arc::new(ScriptedGenerator::new(
        json!([{
            "intent": "create",
            "targetType": "event",
            "watchFor": ["call calendar_create_event", "schedule a meeting"],
            "fields": ["title", "CALENDAR_CREATE_EVENT", "start"]
        }, {
            "intent": "create",
            "targetType": "issue",
            "watchFor": ["issues_create_issue"],
            "fields": ["title"]
        }]),
        json!([]),
    ));
    let pipeline = pipeline(generator, Arc::new(RecordingProvider::new()));

    let lookouts = pipeline.lookouts().await.unwrap();
    assert_eq!(lookouts.len(), 1);
    let names: Vec<String> = pipeline
        .catalog()
        .list_actions()
        .iter()
        .map(|a| a.name.to_lowercase())
        .collect();
    for lookout in lookouts.iter() {
        for entry in lookout.watch_for.iter().chain(&lookout.fields) {
            let entry = entry.to_lowercase();
            assert!(!names.iter().any(|n| entry.contains(n)), "{entry}");
        }
    }
}

#[tokio::test]
async fn overlapping_lookouts_are_merged() {
    let generator = Arc::new(ScriptedGenerator::new(
        json!([
            {"intent": "create", "targetType": "task", "watchFor": ["todo", "add a task"], "fields": ["title"]},
            {"intent": "create", "targetType": "Task", "watchFor": ["TODO", "remind me"], "fields": ["title", "dueDate"]}
        ]),
        json!([]),
    ));
    let pipeline = pipeline(generator, Arc::new(RecordingProvider::new()));

    let lookouts = pipeline.lookouts().await.unwrap();
    assert_eq!(lookouts.len(), 1);
    assert_eq!(lookouts[0].watch_for, vec!["todo", "add a task", "remind me"]);
    assert_eq!(lookouts[0].fields, vec!["title", "dueDate"]);
}

#[tokio::test]
async fn concurrent_runs_share_one_lookout_extraction() {
    let mut scripted = ScriptedGenerator::new(standard_lookouts(), json!([]));
    scripted.lookout_delay = Duration::from_millis(50);
    let generator = Arc::new(scripted);
    let pipeline = pipeline(Arc::clone(&generator), Arc::new(RecordingProvider::new()));

    let (a, b, c) = tokio::join!(
        pipeline.run(Document::text("a.txt", "nothing here")),
        pipeline.run(Document::text("b.txt", "nothing here either")),
        pipeline.run(Document::text("c.txt", "still nothing")),
    );
    for report in [a, b, c] {
        assert_eq!(report.status, RunStatus::Success);
    }
    assert_eq!(generator.lookout_calls.load(Ordering::SeqCst), 1);
    assert_eq!(generator.intent_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn pipelines_can_share_a_cache() {
    let cache = LookoutCache::default();
    let generator = Arc::new(ScriptedGenerator::new(standard_lookouts(), json!([])));
    let first = pipeline(Arc::clone(&generator), Arc::new(RecordingProvider::new()))
        .with_cache(cache.clone());
    let second = pipeline(Arc::clone(&generator), Arc::new(RecordingProvider::new()))
        .with_cache(cache.clone());

    first.lookouts().await.unwrap();
    second.lookouts().await.unwrap();
    assert_eq!(generator.lookout_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().hits(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Runs
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn meeting_request_becomes_one_event() {
    let generator = Arc::new(ScriptedGenerator::new(
        standard_lookouts(),
        json!([{
            "lookoutIndex": 0,
            "intent": "create",
            "targetType": "event",
            "status": "called",
            "extractedFields": {
                "title": "Meeting with Alex",
                "start": "2025-03-01 10:00",
                "duration": "30 minutes",
                "attendees": ["Alex"]
            },
            "payloadPreview": {"title": "Meeting with Alex", "keyFields": ["start", "attendees"]}
        }]),
    ));
    let provider = Arc::new(RecordingProvider::new());
    let pipeline = pipeline(generator, Arc::clone(&provider));

    let report = pipeline
        .run(Document::text(
            "note.txt",
            "Schedule a meeting with Alex on 2025-03-01 10:00 for 30 minutes",
        ))
        .await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.counts.called, 1);
    assert_eq!(report.entries[0].action.as_deref(), Some("calendar_create_event"));

    let calls = provider.invoked();
    assert_eq!(calls.len(), 1);
    let (name, payload) = &calls[0];
    assert_eq!(name, "calendar_create_event");
    assert_eq!(payload["summary"], "Meeting with Alex");
    assert_eq!(payload["start"], "2025-03-01T10:00:00");
    assert_eq!(payload["end"], "2025-03-01T10:30:00");
    assert_eq!(payload["attendees"], json!(["Alex"]));
    assert!(payload.get("duration").is_none());
}

#[tokio::test]
async fn update_without_identifier_is_skipped() {
    let generator = Arc::new(ScriptedGenerator::new(
        standard_lookouts(),
        json!([{
            "intent": "update",
            "targetType": "issue",
            "status": "called",
            "extractedFields": {"state": "closed"}
        }]),
    ));
    let provider = Arc::new(RecordingProvider::new());
    let pipeline = pipeline(generator, Arc::clone(&provider));

    let report = pipeline
        .run(Document::text("n.txt", "We should close the issue about login"))
        .await;

    assert_eq!(report.entries.len(), 1);
    let entry = &report.entries[0];
    assert_eq!(entry.status, EntryStatus::Skipped);
    assert!(!entry.reason.as_deref().unwrap_or_default().is_empty());
    assert!(provider.invoked().is_empty());
}

#[tokio::test]
async fn update_with_identifier_reaches_the_tracker() {
    let generator = Arc::new(ScriptedGenerator::new(
        standard_lookouts(),
        json!([{
            "intent": "update",
            "targetType": "issue",
            "status": "called",
            "extractedFields": {"idToUpdate": "#42", "state": "closed"}
        }]),
    ));
    let provider = Arc::new(RecordingProvider::new());
    let pipeline = pipeline(generator, Arc::clone(&provider));

    let report = pipeline.run(Document::text("n.txt", "Close issue #42")).await;
    assert_eq!(report.counts.called, 1);
    let calls = provider.invoked();
    assert_eq!(calls[0].0, "issues_update_issue");
    assert_eq!(calls[0].1, json!({"number": 42, "state": "closed"}));
}

#[tokio::test]
async fn no_matches_is_an_empty_success() {
    let generator = Arc::new(ScriptedGenerator::new(standard_lookouts(), json!([])));
    let provider = Arc::new(RecordingProvider::new());
    let pipeline = pipeline(generator, Arc::clone(&provider));

    let report = pipeline.run(Document::text("lunch.txt", "Lunch was great.")).await;
    assert_eq!(report.status, RunStatus::Success);
    assert!(report.entries.is_empty());
    assert!(report.fallback.is_none());
    assert!(provider.invoked().is_empty());
}

#[tokio::test]
async fn one_failing_action_does_not_block_the_rest() {
    let generator = Arc::new(ScriptedGenerator::new(
        standard_lookouts(),
        json!([
            {
                "intent": "create", "targetType": "issue", "status": "called",
                "extractedFields": {"title": "Login crash", "description": "Crashes on submit"}
            },
            {
                "intent": "create", "targetType": "event", "status": "called",
                "extractedFields": {"title": "Triage", "start": "2025-03-02T09:00"}
            }
        ]),
    ));
    let provider = Arc::new(RecordingProvider::failing("issues_create_issue"));
    let pipeline = pipeline(generator, Arc::clone(&provider));

    let report = pipeline.run(Document::text("n.txt", "Open a bug and set up a call")).await;
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.counts.failed, 1);
    assert_eq!(report.counts.called, 1);
    assert_eq!(report.entries[0].status, EntryStatus::Failed);
    assert_eq!(report.entries[1].status, EntryStatus::Called);
    assert_eq!(provider.invoked().len(), 2);
}

#[tokio::test]
async fn dispatching_twice_invokes_the_same_actions() {
    let provider = Arc::new(RecordingProvider::new());
    let catalog =
        Arc::new(ActionCatalog::new(vec![Arc::clone(&provider) as Arc<dyn ActionProvider>]).unwrap());
    let dispatcher = Dispatcher::new(catalog, DispatchConfig::default());

    let called = |target: &str, fields: Value| IntentMatch {
        intent: IntentKind::Create,
        target_type: target.into(),
        status: MatchStatus::Called,
        reason: None,
        extracted_fields: fields.as_object().cloned().unwrap_or_default(),
        payload_preview: PayloadPreview::default(),
    };
    let matches = vec![
        called("issue", json!({"title": "A"})),
        called(
            "event",
            json!({"title": "B", "start": "2025-03-01T10:00:00", "end": "2025-03-01T10:30:00"}),
        ),
        called("issue", json!({"title": "C"})),
    ];

    let first = dispatcher.dispatch(matches.clone()).await;
    let second = dispatcher.dispatch(matches).await;
    let names = |outcomes: &[lookout_intent::DispatchOutcome]| -> BTreeSet<String> {
        outcomes.iter().filter_map(|o| o.action_name.clone()).collect()
    };
    assert_eq!(names(&first), names(&second));
    assert_eq!(first.len(), 3);
    assert_eq!(provider.invoked().len(), 6);
}

// ═══════════════════════════════════════════════════════════════════════
//  Failures
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn generation_failure_yields_fallback_report() {
    let generator = Arc::new(ScriptedGenerator::failing_intents(standard_lookouts()));
    let pipeline = pipeline(generator, Arc::new(RecordingProvider::new()));

    let report = pipeline.run(Document::text("scan.txt", "Open a bug")).await;
    assert_eq!(report.status, RunStatus::ProcessingError);
    let fallback = report.fallback.unwrap();
    assert!(fallback.starts_with("fallback extraction for scan.txt due to processing error:"));
    assert!(report.message.unwrap().contains("overloaded"));
}

#[tokio::test]
async fn slow_model_times_out() {
    let mut scripted = ScriptedGenerator::new(standard_lookouts(), json!([]));
    scripted.intent_delay = Duration::from_millis(200);
    let config = PipelineConfig {
        generation_timeout: Duration::from_millis(20),
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(Arc::new(scripted), Arc::new(RecordingProvider::new()), config);

    let report = pipeline.run(Document::text("a.txt", "Open a bug")).await;
    assert_eq!(report.status, RunStatus::ProcessingError);
    assert!(report.message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn unsupported_media_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("archive.zip"), b"PK\x03\x04")
        .await
        .unwrap();
    let source = FileSource::new(dir.path());

    let generator = Arc::new(ScriptedGenerator::new(standard_lookouts(), json!([])));
    let pipeline = pipeline(Arc::clone(&generator), Arc::new(RecordingProvider::new()));

    let report = pipeline.process(&source, "archive.zip").await;
    assert_eq!(report.status, RunStatus::ParseError);
    assert!(report.fallback.is_some());
    assert_eq!(generator.intent_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_document_is_a_processing_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileSource::new(dir.path());
    let generator = Arc::new(ScriptedGenerator::new(standard_lookouts(), json!([])));
    let pipeline = pipeline(generator, Arc::new(RecordingProvider::new()));

    let report = pipeline.process(&source, "missing.txt").await;
    assert_eq!(report.status, RunStatus::ProcessingError);
    assert_eq!(report.document, "missing.txt");
}

#[tokio::test]
async fn empty_catalog_needs_no_model() {
    let generator = Arc::new(ScriptedGenerator::new(standard_lookouts(), json!([])));
    let pipeline = Pipeline::new(
        Arc::clone(&generator) as Arc<dyn StructuredGenerator>,
        Arc::new(ActionCatalog::empty()),
        PipelineConfig::default(),
    );

    let report = pipeline.run(Document::text("a.txt", "Open a bug")).await;
    assert_eq!(report.status, RunStatus::Success);
    assert!(report.entries.is_empty());
    assert_eq!(generator.lookout_calls.load(Ordering::SeqCst), 0);
    assert_eq!(generator.intent_calls.load(Ordering::SeqCst), 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  Status sink
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sink_receives_every_terminal_run() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("notes.txt"), "Lunch was great.")
        .await
        .unwrap();
    tokio::fs::write(dir.path().join("blob.bin"), [0u8, 1, 2])
        .await
        .unwrap();
    let source = FileSource::new(dir.path());

    let sink = Arc::new(RecordingSink::default());
    let generator = Arc::new(ScriptedGenerator::new(standard_lookouts(), json!([])));
    let pipeline = pipeline(generator, Arc::new(RecordingProvider::new()))
        .with_sink(Arc::clone(&sink) as Arc<dyn StatusSink>);

    let ok = pipeline.process(&source, "notes.txt").await;
    let bad = pipeline.process(&source, "blob.bin").await;

    let records = sink.records.lock().unwrap().clone();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].run_id, ok.run_id);
    assert_eq!(records[0].status, RunStatus::Success);
    assert_eq!(records[1].run_id, bad.run_id);
    assert_eq!(records[1].status, RunStatus::ParseError);
    assert!(records[1].finished_at >= records[1].started_at);
}
