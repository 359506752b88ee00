use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rsd::build::{build, max_concurrent_builds, BuildError};
use rsd::compiler::CompileError;
use rsd::contract::{Compiler, MockCompiler};
use rsd::settings::{ProjectSettings, Settings};
use tempfile::tempdir;
use tracing_subscriber::{layer::Context, prelude::*, Layer, Registry};

fn settings_for(root: &Path, pattern: Option<&str>) -> Settings {
    Settings::from_parts(
        root,
        |_| None,
        ProjectSettings {
            source_roots_pattern: pattern.map(str::to_string),
            compiler: None,
        },
    )
}

fn write_source(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn echo_compiler() -> MockCompiler {
    let mut compiler = MockCompiler::new();
    compiler
        .expect_bundle()
        .returning(|entry: &Path| Ok(format!("/* bundle */ {}", entry.display()).into_bytes()));
    compiler
}

#[tokio::test]
async fn build_writes_widget_bundle_to_dest() {
    let tmp = tempdir().unwrap();
    write_source(tmp.path(), "scripts/widget.ts", "export const x = 1;");
    let settings = settings_for(tmp.path(), Some("scripts/**/*.ts"));

    let report = build(&settings, &echo_compiler())
        .await
        .expect("build should succeed");

    assert!(report.is_success());
    assert_eq!(report.built.len(), 1);
    let output = tmp.path().join("dest/widget.js");
    assert_eq!(report.built[0].output, output);
    assert_eq!(
        fs::read_to_string(output).unwrap(),
        "/* bundle */ scripts/widget.ts"
    );
}

#[tokio::test]
async fn build_mirrors_nested_directories_after_first_segment() {
    let tmp = tempdir().unwrap();
    write_source(tmp.path(), "src/main.ts", "");
    write_source(tmp.path(), "src/ui/forms/panel.ts", "");
    write_source(tmp.path(), "src/ui/notes.md", "");
    let settings = settings_for(tmp.path(), Some("src/**/*.ts"));

    let report = build(&settings, &echo_compiler()).await.unwrap();

    assert_eq!(report.built.len(), 2);
    assert!(tmp.path().join("dest/main.js").is_file());
    assert!(tmp.path().join("dest/ui/forms/panel.js").is_file());
    assert!(!tmp.path().join("dest/ui/notes.js").exists());
}

#[tokio::test]
async fn build_recreates_dest_and_is_idempotent() {
    let tmp = tempdir().unwrap();
    write_source(tmp.path(), "scripts/a.ts", "");
    write_source(tmp.path(), "dest/stale.js", "left over");
    let settings = settings_for(tmp.path(), Some("scripts/*.ts"));

    build(&settings, &echo_compiler()).await.unwrap();
    let first = fs::read_to_string(tmp.path().join("dest/a.js")).unwrap();
    assert!(!tmp.path().join("dest/stale.js").exists());

    build(&settings, &echo_compiler()).await.unwrap();
    let second = fs::read_to_string(tmp.path().join("dest/a.js")).unwrap();
    assert_eq!(first, second);

    let entries: Vec<_> = fs::read_dir(tmp.path().join("dest")).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn failing_file_does_not_block_the_others() {
    let tmp = tempdir().unwrap();
    write_source(tmp.path(), "scripts/good.ts", "");
    write_source(tmp.path(), "scripts/broken.ts", "");
    write_source(tmp.path(), "scripts/other.ts", "");
    let settings = settings_for(tmp.path(), Some("scripts/*.ts"));

    let mut compiler = MockCompiler::new();
    compiler.expect_bundle().times(3).returning(|entry: &Path| {
        if entry.ends_with("broken.ts") {
            Err(CompileError::Failed {
                entry: entry.to_path_buf(),
                status: "exit status: 2".to_string(),
                stderr: "TS2304: Cannot find name 'nope'".to_string(),
            })
        } else {
            Ok(b"ok".to_vec())
        }
    });

    let report = build(&settings, &compiler).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.built.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source, PathBuf::from("scripts/broken.ts"));
    assert!(matches!(report.failed[0].error, BuildError::Compile(_)));
    assert!(tmp.path().join("dest/good.js").is_file());
    assert!(tmp.path().join("dest/other.js").is_file());
    assert!(!tmp.path().join("dest/broken.js").exists());
}

#[tokio::test]
async fn build_without_pattern_is_rejected_before_touching_dest() {
    let tmp = tempdir().unwrap();
    write_source(tmp.path(), "dest/keep.js", "still here");
    let settings = settings_for(tmp.path(), None);

    let mut compiler = MockCompiler::new();
    compiler.expect_bundle().never();

    let err = build(&settings, &compiler).await.unwrap_err();

    assert!(matches!(err, BuildError::Settings(_)));
    assert!(tmp.path().join("dest/keep.js").is_file());
}

#[tokio::test]
async fn build_with_no_matches_produces_empty_dest() {
    let tmp = tempdir().unwrap();
    let settings = settings_for(tmp.path(), Some("scripts/*.ts"));

    let mut compiler = MockCompiler::new();
    compiler.expect_bundle().never();

    let report = build(&settings, &compiler).await.unwrap();
    assert!(report.built.is_empty());
    assert!(report.is_success());
}

#[tokio::test]
async fn sources_sharing_an_output_are_not_both_built() {
    let tmp = tempdir().unwrap();
    write_source(tmp.path(), "lib/a.ts", "");
    write_source(tmp.path(), "src/a.ts", "");
    let settings = settings_for(tmp.path(), Some("*/a.ts"));

    let mut compiler = MockCompiler::new();
    compiler
        .expect_bundle()
        .times(1)
        .returning(|entry: &Path| Ok(format!("bundle of {}", entry.display()).into_bytes()));

    let report = build(&settings, &compiler).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.built.len(), 1);
    assert_eq!(report.built[0].source, PathBuf::from("lib/a.ts"));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source, PathBuf::from("src/a.ts"));
    match &report.failed[0].error {
        BuildError::Collision { output, first } => {
            assert_eq!(output, &tmp.path().join("dest/a.js"));
            assert_eq!(first, &PathBuf::from("lib/a.ts"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        fs::read_to_string(tmp.path().join("dest/a.js")).unwrap(),
        "bundle of lib/a.ts"
    );
}

#[tokio::test]
async fn absolute_pattern_is_rejected_before_touching_dest() {
    let tmp = tempdir().unwrap();
    write_source(tmp.path(), "dest/keep.js", "still here");
    let pattern = format!("{}/scripts/*.ts", tmp.path().display());
    let settings = settings_for(tmp.path(), Some(&pattern));

    let mut compiler = MockCompiler::new();
    compiler.expect_bundle().never();

    let err = build(&settings, &compiler).await.unwrap_err();

    assert!(matches!(err, BuildError::AbsolutePattern { .. }));
    assert!(tmp.path().join("dest/keep.js").is_file());
}

/// Records how many bundles are in progress at once.
#[derive(Default)]
struct CountingCompiler {
    running: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Compiler for CountingCompiler {
    async fn bundle(&self, _entry: &Path) -> Result<Vec<u8>, CompileError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(b"ok".to_vec())
    }
}

#[tokio::test]
async fn bundler_runs_are_bounded() {
    let tmp = tempdir().unwrap();
    let total = max_concurrent_builds() * 3 + 1;
    for i in 0..total {
        write_source(tmp.path(), &format!("src/f{i}.ts"), "");
    }
    let settings = settings_for(tmp.path(), Some("src/*.ts"));
    let compiler = CountingCompiler::default();

    let report = build(&settings, &compiler).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.built.len(), total);
    let peak = compiler.peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(
        peak <= max_concurrent_builds(),
        "{peak} bundles ran at once, limit is {}",
        max_concurrent_builds()
    );
}

/// Collects the formatted message of every event.
struct MessageCollector {
    messages: Arc<Mutex<Vec<String>>>,
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            use std::fmt::Write;
            let _ = write!(self.0, "{:?}", value);
        }
    }
}

impl<S> Layer<S> for MessageCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut msg = String::new();
        event.record(&mut MessageVisitor(&mut msg));
        self.messages.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn build_logs_each_saved_file() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let collector = MessageCollector {
        messages: messages.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let tmp = tempdir().unwrap();
    write_source(tmp.path(), "scripts/widget.ts", "");
    let settings = settings_for(tmp.path(), Some("scripts/*.ts"));

    build(&settings, &echo_compiler()).await.unwrap();

    let messages = messages.lock().unwrap();
    assert!(
        messages.iter().any(|m| m == "File widget.js saved"),
        "Expected a 'File widget.js saved' event, got: {:?}",
        messages
    );
}
