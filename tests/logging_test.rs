//! Failure records emitted through `tracing`

use cloudru_object_storage::s3::Operation;
use cloudru_object_storage::{
    LogLevel, LoggerOptions, MemoryStore, StorageService, TracingLogger,
};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn subscriber(captured: &Captured) -> impl tracing::Subscriber + Send + Sync {
    let writer = captured.clone();
    fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish()
}

#[tokio::test]
async fn test_failed_operation_emits_one_error_event() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(subscriber(&captured));

    let store = Arc::new(MemoryStore::new().with_bucket("cards"));
    let logger = TracingLogger::new(LoggerOptions::default().with_name("uploads"));
    let service = StorageService::new(store.clone(), "cards").with_logger(Arc::new(logger));

    store.fail_on(Operation::Get, "photos/cat.png").await;
    assert!(service.get_file("photos", "cat.png").await.is_err());

    let text = captured.text();
    let errors: Vec<&str> = text.lines().filter(|line| line.contains("ERROR")).collect();
    assert_eq!(errors.len(), 1, "{text}");
    assert!(errors[0].contains("failed to get file cat.png from folder photos"));
    assert!(errors[0].contains("logger=\"uploads\""));
    assert!(errors[0].contains("InternalError"));
}

#[tokio::test]
async fn test_warn_level_logger() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(subscriber(&captured));

    let store = Arc::new(MemoryStore::new().with_bucket("cards"));
    let logger = TracingLogger::new(LoggerOptions::default().with_level(LogLevel::Warn));
    let service = StorageService::new(store.clone(), "cards").with_logger(Arc::new(logger));

    store.fail_on(Operation::Put, "docs/").await;
    assert!(service.create_folder("docs").await.is_err());

    let text = captured.text();
    assert!(!text.contains("ERROR"), "{text}");
    assert!(text
        .lines()
        .any(|line| line.contains("WARN") && line.contains("failed to create folder docs")));
}

#[tokio::test]
async fn test_success_emits_no_failure_records() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(subscriber(&captured));

    let store = Arc::new(MemoryStore::new().with_bucket("cards"));
    let service = StorageService::new(store, "cards")
        .with_logger(Arc::new(TracingLogger::new(LoggerOptions::default())));

    service.create_folder("docs").await.unwrap();
    service.delete_folder("docs").await.unwrap();

    let text = captured.text();
    assert!(!text.contains("ERROR") && !text.contains("WARN"), "{text}");
}
