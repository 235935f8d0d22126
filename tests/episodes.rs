//! Full train/run cycles with a scripted backend and the arithmetic
//! environment.

use tempfile::TempDir;

use tracebank::agent::Agent;
use tracebank::config::TracebankConfig;
use tracebank::env::{AnyEnv, ArithmeticEnv};
use tracebank::model::{HashEmbedder, ScriptedBackend};
use tracebank::storage::{FileStorage, MemoryStorage};
use tracebank::trajectory::TrajectoryStore;

fn memory_agent(answer: &str) -> Agent<MemoryStorage, HashEmbedder, ScriptedBackend> {
    let config = TracebankConfig::default();
    let store = TrajectoryStore::new(
        MemoryStorage::new(),
        HashEmbedder::new(128),
        config.store.clone(),
    );
    Agent::new(store, ScriptedBackend::fixed(answer), &config)
}

fn file_agent(dir: &TempDir, answer: &str) -> Agent<FileStorage, HashEmbedder, ScriptedBackend> {
    let config = TracebankConfig::default();
    let store = TrajectoryStore::new(
        FileStorage::new(dir.path()),
        HashEmbedder::new(128),
        config.store.clone(),
    );
    Agent::new(store, ScriptedBackend::fixed(answer), &config)
}

#[tokio::test]
async fn scripted_episode_is_deterministic() {
    let mut agent = memory_agent("answer:10");
    let mut env = AnyEnv::Arithmetic(ArithmeticEnv::new());

    let trajectory = agent.run(&mut env, "add 9 and 1").await.unwrap();

    assert_eq!(trajectory.goal, "add 9 and 1");
    assert_eq!(trajectory.steps.len(), 1);
    assert_eq!(trajectory.steps[0].action, "answer:10");
    assert!(trajectory.success);
    assert!(agent.store().is_empty());
}

#[tokio::test]
async fn trained_memory_survives_restart_and_feeds_later_runs() {
    let dir = TempDir::new().unwrap();
    let stored_id = {
        let mut agent = file_agent(&dir, "answer:10");
        let outcome = agent
            .train(&mut ArithmeticEnv::new(), "add 9 and 1")
            .await
            .unwrap();
        assert!(outcome.stored);
        outcome.trajectory.id
    };

    let mut agent = file_agent(&dir, "answer:10");
    let trajectory = agent
        .run(&mut ArithmeticEnv::new(), "add 9 and 1")
        .await
        .unwrap();
    assert!(trajectory.success);
    assert_eq!(agent.store().len(), 1);

    // The stored episode was offered as an example and credited.
    let calls = agent.decision_loop().backend().calls();
    assert!(calls[0][0].content.contains("Example 1:"));
    let meta = agent.store().curation(&stored_id).unwrap();
    assert_eq!(meta.times_retrieved, 1);
    assert_eq!(meta.times_led_to_success, 1);

    // And the credit is persisted.
    let mut reopened = file_agent(&dir, "answer:10");
    reopened.ensure_loaded().await.unwrap();
    assert_eq!(
        reopened.store().curation(&stored_id).unwrap().times_retrieved,
        1
    );
}

#[tokio::test]
async fn failing_runs_blame_retrieved_examples() {
    let mut agent = memory_agent("answer:10");
    let seeded = agent
        .train(&mut ArithmeticEnv::new(), "add 9 and 1")
        .await
        .unwrap();

    // Same memory, wrong answers from now on.
    let config = TracebankConfig::default();
    let store = std::mem::replace(
        agent.store_mut(),
        TrajectoryStore::new(MemoryStorage::new(), HashEmbedder::new(128), config.store.clone()),
    );
    let mut agent = Agent::new(store, ScriptedBackend::fixed("answer:0"), &config);

    let goals: Vec<String> = (0..3).map(|i| format!("add {i} and 1")).collect();
    let runs = agent.run_batch(&goals, ArithmeticEnv::new).await.unwrap();
    assert!(runs.iter().all(|t| !t.success));

    let meta = agent.store().curation(&seeded.trajectory.id).unwrap();
    assert_eq!(meta.times_retrieved, 3);
    assert_eq!(meta.times_led_to_success, 0);
    assert_eq!(meta.retrieval_score, Some(0.0));
    assert_eq!(meta.utility_score, 0.0);
}
