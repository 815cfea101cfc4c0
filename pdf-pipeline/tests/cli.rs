use assert_cmd::Command;
use predicates::prelude::*;
use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

use pdf_pipeline::cli::{run, Cli, Commands};

#[test]
fn help_lists_both_subcommands() {
    let mut cmd = Command::cargo_bin("pdf-pipeline").expect("Binary exists");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve").and(predicate::str::contains("convert")));
}

#[test]
fn serve_fails_cleanly_without_a_config_file() {
    let mut cmd = Command::cargo_bin("pdf-pipeline").expect("Binary exists");
    cmd.arg("serve").arg("--config").arg("/definitely/not/here.yaml");
    cmd.assert().failure();
}

#[test]
fn serve_requires_the_config_flag() {
    let mut cmd = Command::cargo_bin("pdf-pipeline").expect("Binary exists");
    cmd.arg("serve");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let cli = Cli {
        command: Commands::Serve {
            config: std::path::PathBuf::from("dummy.yaml"),
        },
    };
    let result = run(cli).await;
    assert!(result.is_err(), "dummy config must not load");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}

#[tokio::test]
async fn convert_reports_a_missing_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        format!(
            "queue:\n  endpoint: http://mq.local\n  queue_name: q\nstorage:\n  endpoint: http://oss.local\n  bucket_name: b\nengine:\n  endpoint: http://127.0.0.1:9\ntemp:\n  pdf_dir: {0}/pdf\n  image_dir: {0}/images\n  markdown_dir: {0}/markdown\n",
            dir.path().display()
        ),
    )
    .unwrap();

    let cli = Cli {
        command: Commands::Convert {
            pdf: dir.path().join("missing.pdf"),
            config,
            article_id: "sample".into(),
            image_dir: None,
            markdown_dir: None,
        },
    };
    let err = run(cli).await.unwrap_err();
    assert!(format!("{err:#}").contains("missing.pdf"), "got: {err:#}");
}

#[test]
fn convert_rejects_an_article_id_that_escapes_the_temp_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        "queue:\n  endpoint: http://mq.local\n  queue_name: q\nstorage:\n  endpoint: http://oss.local\n  bucket_name: b\nengine:\n  endpoint: http://127.0.0.1:9\ntemp:\n  pdf_dir: ./pdf\n  image_dir: ./images\n  markdown_dir: ./markdown\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("in.pdf"), b"%PDF").unwrap();

    let mut cmd = Command::cargo_bin("pdf-pipeline").expect("Binary exists");
    cmd.current_dir(dir.path())
        .arg("convert")
        .arg("in.pdf")
        .arg("--config")
        .arg(&config)
        .arg("--article-id")
        .arg("..");
    cmd.assert().failure();
    assert!(!dir.path().join("markdown").exists());
}
