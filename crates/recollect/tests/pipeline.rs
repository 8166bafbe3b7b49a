//! End-to-end tests for the observer: launch, apply, staleness, failure,
//! persistence.

mod common;

use common::{ScriptedCompressor, continuity_count, sized, small_config};
use recollect::Message;
use recollect::memory::{FileStore, InMemoryStore, MemoryStore};
use recollect::pipeline::{FnEventHandler, JobOutcome, Observer, ObserverEvent, TurnOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn observer_with(compressor: Arc<ScriptedCompressor>) -> (Observer, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let observer = Observer::new(small_config(), store.clone(), compressor);
    (observer, store)
}

#[tokio::test]
async fn prefetch_then_apply_with_one_continuity_message() {
    let compressor = Arc::new(ScriptedCompressor::new());
    let (observer, store) = observer_with(compressor.clone());
    let mut messages = vec![Message::system("You are helpful."), sized(250)];

    // 250 unobserved tokens: past prefetch (200), under primary (1,000).
    let outcome = observer.on_turn("s", &mut messages);
    assert!(matches!(outcome, TurnOutcome::Launched { .. }));
    assert_eq!(messages.len(), 2);
    assert_eq!(continuity_count(&messages), 0);

    assert_eq!(
        observer.coordinator().wait_for("s").await,
        Some(JobOutcome::Succeeded)
    );

    for _ in 0..3 {
        messages.push(sized(250));
    }
    let outcome = observer.on_turn("s", &mut messages);
    assert_eq!(
        outcome,
        TurnOutcome::Applied {
            removed: 1,
            new_index: 1
        }
    );
    // system, continuity, three messages that arrived after the capture
    assert_eq!(messages.len(), 5);
    assert_eq!(continuity_count(&messages), 1);
    assert!(messages[1].continuity);
    assert_eq!(messages[0].text(), "You are helpful.");

    let saved = store.load("s").unwrap();
    assert_eq!(saved.last_observed_index, Some(1));
    assert_eq!(saved.entry_count(), 1);
}

#[tokio::test]
async fn repeated_cycles_keep_index_monotonic_and_one_continuity_message() {
    let compressor = Arc::new(ScriptedCompressor::new());
    let (observer, _) = observer_with(compressor.clone());
    let mut messages = vec![Message::system("sys")];
    let mut last_index = None;
    let mut applied = 0;

    for _ in 0..40 {
        messages.push(sized(150));
        match observer.on_turn("s", &mut messages) {
            TurnOutcome::Launched { .. } => {
                observer.coordinator().wait_for("s").await;
            }
            TurnOutcome::Applied { removed, .. } => {
                assert!(removed > 0);
                applied += 1;
            }
            TurnOutcome::Idle => {}
            other => panic!("unexpected outcome {other:?}"),
        }

        let index = observer.memory("s").unwrap().last_observed_index;
        assert!(index >= last_index, "index went from {last_index:?} to {index:?}");
        last_index = index;
        assert!(continuity_count(&messages) <= 1);
        assert!(!messages[0].continuity);
    }

    assert!(applied >= 2, "only {applied} apply(s)");
    assert_eq!(continuity_count(&messages), 1);

    // Continuity text never reaches an extraction prompt.
    for prompt in compressor.prompts.lock().unwrap().iter() {
        assert!(!prompt.contains("were condensed into observations"));
    }
}

#[tokio::test]
async fn stale_result_is_discarded_and_job_relaunched() {
    let compressor = Arc::new(ScriptedCompressor::new());
    let (observer, _) = observer_with(compressor);
    let mut messages = vec![sized(100), sized(100), sized(100)];

    assert!(matches!(
        observer.on_turn("s", &mut messages),
        TurnOutcome::Launched { .. }
    ));
    observer.coordinator().wait_for("s").await;
    assert!(observer.coordinator().has_pending("s"));

    // The host rewrote its history into something shorter than the capture.
    messages = vec![sized(1_200)];
    let outcome = observer.on_turn("s", &mut messages);
    assert!(matches!(
        outcome,
        TurnOutcome::StaleDiscarded { relaunched: Some(_) }
    ));
    assert_eq!(messages.len(), 1);
    assert_eq!(continuity_count(&messages), 0);
    assert!(observer.memory("s").unwrap().is_fresh());

    observer.coordinator().wait_for("s").await;
    assert!(matches!(
        observer.on_turn("s", &mut messages),
        TurnOutcome::Applied { removed: 1, .. }
    ));
}

#[tokio::test]
async fn failed_job_changes_nothing_and_next_turn_relaunches() {
    let compressor = Arc::new(ScriptedCompressor::new());
    // One attempt plus two retries.
    compressor.fail_next(3);
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let (observer, store) = observer_with(compressor.clone());
    let observer = observer.with_event_handler(Arc::new(FnEventHandler::new(
        move |event: &ObserverEvent<'_>| {
            if let ObserverEvent::JobFailed { .. } = event {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        },
    )));

    let mut messages = vec![sized(300)];
    assert!(matches!(
        observer.on_turn("s", &mut messages),
        TurnOutcome::Launched { .. }
    ));
    let outcome = observer.coordinator().wait_for("s").await;
    assert!(matches!(outcome, Some(JobOutcome::Failed { .. })));
    assert_eq!(compressor.extraction_calls(), 3);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(!observer.coordinator().is_busy("s"));
    assert!(store.is_empty());

    assert!(matches!(
        observer.on_turn("s", &mut messages),
        TurnOutcome::Launched { .. }
    ));
    assert_eq!(
        observer.coordinator().wait_for("s").await,
        Some(JobOutcome::Succeeded)
    );
}

#[tokio::test]
async fn sessions_are_independent() {
    let compressor = Arc::new(ScriptedCompressor::new());
    let (observer, _) = observer_with(compressor);
    let mut a = vec![sized(300)];
    let mut b = vec![sized(50)];

    assert!(matches!(
        observer.on_turn("a", &mut a),
        TurnOutcome::Launched { .. }
    ));
    assert_eq!(observer.on_turn("b", &mut b), TurnOutcome::Idle);
    assert!(!observer.coordinator().is_busy("b"));

    let outcomes = observer.coordinator().wait_all().await;
    assert_eq!(outcomes, vec![("a".to_string(), JobOutcome::Succeeded)]);
}

#[tokio::test]
async fn applied_memory_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let compressor = Arc::new(ScriptedCompressor::new());
    let mut messages = vec![Message::system("sys"), sized(300)];

    {
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let observer = Observer::new(small_config(), store, compressor.clone());
        observer.on_turn("s", &mut messages);
        observer.coordinator().wait_for("s").await;
        messages.push(sized(800));
        assert!(matches!(
            observer.on_turn("s", &mut messages),
            TurnOutcome::Applied { .. }
        ));
    }

    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    assert_eq!(store.list_sessions().unwrap(), vec!["s".to_string()]);
    let observer = Observer::new(small_config(), store, compressor);
    let memory = observer.memory("s").unwrap();
    assert_eq!(memory.last_observed_index, Some(1));
    assert_eq!(memory.entry_count(), 1);

    let prompt = observer.observations_prompt("s").unwrap();
    assert!(prompt.contains("observation number 1"));
}

#[tokio::test]
async fn events_arrive_in_lifecycle_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let compressor = Arc::new(ScriptedCompressor::new());
    let (observer, _) = observer_with(compressor);
    let observer = observer.with_event_handler(Arc::new(FnEventHandler::new(
        move |event: &ObserverEvent<'_>| {
            let name = match event {
                ObserverEvent::JobLaunched { .. } => "launched",
                ObserverEvent::JobSucceeded { .. } => "succeeded",
                ObserverEvent::ResultApplied { .. } => "applied",
                _ => "other",
            };
            sink.lock().unwrap().push(name);
        },
    )));

    let mut messages = vec![sized(300)];
    observer.on_turn("s", &mut messages);
    observer.coordinator().wait_for("s").await;
    messages.push(sized(800));
    observer.on_turn("s", &mut messages);

    assert_eq!(*seen.lock().unwrap(), vec!["launched", "succeeded", "applied"]);
}
