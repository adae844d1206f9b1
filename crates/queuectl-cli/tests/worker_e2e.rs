//! End-to-end scenarios exercising the real `Worker`/`Manager` loop
//! against a real `SqliteStore`, the kind of thing the CLI glues
//! together but that no single crate's unit tests can see on its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use queuectl_core::{
    Executor, JobSpec, JobState, NoOpMetricsSink, SchedulerConfig, Store, SystemClock, Worker,
};
use queuectl_store::SqliteStore;
use queuectl_testing::FakeClock;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

async fn wait_for_state(store: &dyn Store, job_id: &str, state: JobState, timeout: Duration) {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let job = store.get(job_id).await.unwrap().expect("job must exist");
        if job.state == state {
            return;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for {job_id} to reach {state:?}, currently {:?}",
            job.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn happy_path_completes_on_first_attempt() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
    let id = store
        .enqueue(JobSpec {
            command: "true".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let worker = Worker::new(
        "worker-1",
        Arc::clone(&store),
        Arc::new(FakeClock::new(Utc::now())),
        Arc::new(Executor::new()),
        Arc::new(NoOpMetricsSink),
        POLL_INTERVAL,
        SchedulerConfig::default(),
        cancel.clone(),
    );
    let handle = tokio::spawn(worker.run());

    wait_for_state(store.as_ref(), &id, JobState::Completed, Duration::from_secs(2)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    assert!(job.locked_by.is_none());
}

#[tokio::test]
async fn exhausted_retries_bury_the_job() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
    let id = store
        .enqueue(JobSpec {
            command: "false".to_string(),
            max_retries: Some(0),
            backoff_base: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let worker = Worker::new(
        "worker-1",
        Arc::clone(&store),
        Arc::new(FakeClock::new(Utc::now())),
        Arc::new(Executor::new()),
        Arc::new(NoOpMetricsSink),
        POLL_INTERVAL,
        SchedulerConfig::default(),
        cancel.clone(),
    );
    let handle = tokio::spawn(worker.run());

    wait_for_state(store.as_ref(), &id, JobState::Dead, Duration::from_secs(2)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().starts_with("Exit Code 1"));
}

#[tokio::test]
async fn retry_then_succeed_reaches_completed() {
    // A job that fails on the first attempt and succeeds on the second:
    // `sh -c` with a marker file standing in for "this is the Nth run".
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran_once");
    let command = format!(
        "test -e {0} && exit 0 || (touch {0} && exit 1)",
        marker.display()
    );

    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
    let id = store
        .enqueue(JobSpec {
            command,
            max_retries: Some(1),
            backoff_base: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();

    // Real clock here: the 1s backoff between the two attempts needs to
    // actually elapse for the job to become claimable again.
    let cancel = CancellationToken::new();
    let worker = Worker::new(
        "worker-1",
        Arc::clone(&store),
        Arc::new(SystemClock),
        Arc::new(Executor::new()),
        Arc::new(NoOpMetricsSink),
        POLL_INTERVAL,
        SchedulerConfig::default(),
        cancel.clone(),
    );
    let handle = tokio::spawn(worker.run());

    wait_for_state(store.as_ref(), &id, JobState::Completed, Duration::from_secs(5)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 2);
}

#[tokio::test]
async fn only_one_of_several_workers_claims_a_single_job() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
    let id = store
        .enqueue(JobSpec {
            command: "true".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for i in 0..4 {
        let worker = Worker::new(
            format!("worker-{i}"),
            Arc::clone(&store),
            Arc::new(FakeClock::new(Utc::now())),
            Arc::new(Executor::new()),
            Arc::new(NoOpMetricsSink),
            POLL_INTERVAL,
            SchedulerConfig::default(),
            cancel.clone(),
        );
        handles.push(tokio::spawn(worker.run()));
    }

    wait_for_state(store.as_ref(), &id, JobState::Completed, Duration::from_secs(2)).await;
    cancel.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    // `claim_one`'s conditional UPDATE means exactly one worker could ever
    // have incremented `attempts`, regardless of how many raced for it.
    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn shutdown_during_backoff_wait_is_prompt_and_leaves_job_pending() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
    let id = store
        .enqueue(JobSpec {
            command: "false".to_string(),
            max_retries: Some(3),
            backoff_base: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();

    // A clock that never advances on its own: the worker's poll-interval
    // sleep after the retry is scheduled would block forever were it not
    // cancellable, standing in for a long real backoff sleep.
    let clock = Arc::new(FakeClock::new(Utc::now()));
    let cancel = CancellationToken::new();
    let worker = Worker::new(
        "worker-1",
        Arc::clone(&store),
        Arc::clone(&clock) as Arc<dyn queuectl_core::Clock>,
        Arc::new(Executor::new()),
        Arc::new(NoOpMetricsSink),
        Duration::from_secs(3600),
        SchedulerConfig::default(),
        cancel.clone(),
    );
    let handle = tokio::spawn(worker.run());

    // Wait for the single failing attempt to land the job back in
    // `pending` with a future `run_at`, then request shutdown.
    loop {
        let job = store.get(&id).await.unwrap().unwrap();
        if job.attempts >= 1 && job.locked_by.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let shutdown_started = std::time::Instant::now();
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker must exit promptly on shutdown even mid-backoff")
        .unwrap();
    assert!(shutdown_started.elapsed() < Duration::from_secs(1));

    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert!(job.run_at > Utc::now());
}

#[tokio::test]
async fn reap_recovers_a_job_abandoned_by_a_dead_worker() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
    let id = store
        .enqueue(JobSpec {
            command: "true".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    // Simulate a worker that claimed the job and then vanished, without
    // ever calling complete/retry/bury.
    store.claim_one("worker-doomed", Utc::now()).await.unwrap();
    let claimed = store.get(&id).await.unwrap().unwrap();
    assert_eq!(claimed.state, JobState::Processing);

    let reaped = store.reap(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
    assert_eq!(reaped, 1);

    let recovered = store.get(&id).await.unwrap().unwrap();
    assert_eq!(recovered.state, JobState::Pending);
    assert!(recovered.locked_by.is_none());
    assert_eq!(recovered.last_error.as_deref(), Some(queuectl_core::REAPED_ERROR_MESSAGE));

    // And it is genuinely re-claimable afterward.
    let reclaimed = store.claim_one("worker-2", Utc::now()).await.unwrap();
    assert!(reclaimed.is_some());
}
