use notebox_core::{
    ChannelError, Command, CommandChannel, Record, RecordId, RecordStore, SqliteRecordStore,
    StoreConfig, StoreConnector, StoreResult,
};
use std::time::{Duration, Instant};

const SLOW_FILTER: &str = "slow";
const PANICKING_ID: RecordId = 13;

/// In-memory store that stalls on one filter text and panics on one id.
struct FaultyStore {
    inner: SqliteRecordStore,
    stall: Duration,
}

impl RecordStore for FaultyStore {
    fn create(&mut self, record: &Record) -> StoreResult<RecordId> {
        self.inner.create(record)
    }

    fn read(&self, id: RecordId) -> StoreResult<Option<Record>> {
        if id == PANICKING_ID {
            panic!("storage engine crashed reading {id}");
        }
        self.inner.read(id)
    }

    fn update(&mut self, record: &Record) -> StoreResult<RecordId> {
        self.inner.update(record)
    }

    fn delete(&mut self, id: RecordId) -> StoreResult<()> {
        self.inner.delete(id)
    }

    fn list_all(&self) -> StoreResult<Vec<Record>> {
        self.inner.list_all()
    }

    fn filter(&mut self, title_substring: &str) -> StoreResult<Vec<Record>> {
        if title_substring == SLOW_FILTER {
            std::thread::sleep(self.stall);
        }
        self.inner.filter(title_substring)
    }

    fn disconnect(&mut self) {
        self.inner.disconnect();
    }
}

struct FaultyConnector {
    stall: Duration,
}

impl StoreConnector for FaultyConnector {
    type Store = FaultyStore;

    fn connect(&self) -> StoreResult<FaultyStore> {
        Ok(FaultyStore {
            inner: SqliteRecordStore::connect(&StoreConfig::in_memory())?,
            stall: self.stall,
        })
    }
}

fn memory_channel() -> CommandChannel {
    CommandChannel::open(StoreConfig::in_memory()).unwrap()
}

#[tokio::test]
async fn scenario_runs_end_to_end_over_the_channel() {
    let channel = memory_channel();
    channel.init().await.unwrap();

    let created = channel
        .create(Record::new("Groceries", "milk"))
        .await
        .unwrap();
    let id = created.id.unwrap();
    assert_eq!(created, Record::new("Groceries", "milk").with_id(id));

    assert_eq!(channel.read(id).await.unwrap(), Some(created.clone()));

    let updated = channel
        .update(Record::new("Groceries", "milk, eggs").with_id(id))
        .await
        .unwrap();
    assert_eq!(updated.notes, "milk, eggs");

    assert_eq!(channel.filter("Groc").await.unwrap(), vec![updated]);
    assert_eq!(channel.delete(id).await.unwrap(), id);
    assert!(channel.list_all().await.unwrap().is_empty());
    assert_eq!(channel.read(id).await.unwrap(), None);
    assert_eq!(channel.pending_calls(), 0);
}

#[tokio::test]
async fn concurrent_calls_resolve_with_their_own_results() {
    let channel = memory_channel();
    channel.init().await.unwrap();

    let (first, second, third, listed) = tokio::join!(
        channel.create(Record::new("first", "1")),
        channel.create(Record::new("second", "2")),
        channel.create(Record::new("third", "3")),
        channel.filter("zzz"),
    );

    assert_eq!(first.unwrap().title, "first");
    assert_eq!(second.unwrap().title, "second");
    assert_eq!(third.unwrap().title, "third");
    assert!(listed.unwrap().is_empty());
    assert_eq!(channel.list_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn command_errors_surface_their_code() {
    let channel = memory_channel();

    let err = channel.list_all().await.unwrap_err();
    assert_eq!(err.command_code(), Some("not_initialized"));

    channel.init().await.unwrap();
    let created = channel.create(Record::new("taken", "")).await.unwrap();
    let err = channel
        .create(Record::new("clash", "").with_id(created.id.unwrap()))
        .await
        .unwrap_err();
    assert_eq!(err.command_code(), Some("write_error"));

    // the failed write left the store usable
    assert_eq!(channel.list_all().await.unwrap(), vec![created]);
}

#[tokio::test]
async fn slow_call_times_out_and_channel_recovers() {
    let channel = CommandChannel::open_with(
        FaultyConnector {
            stall: Duration::from_millis(300),
        },
        Duration::from_millis(100),
    )
    .unwrap();
    channel.init().await.unwrap();

    let err = channel.filter(SLOW_FILTER).await.unwrap_err();
    match err {
        ChannelError::Timeout { kind, after, .. } => {
            assert_eq!(kind.as_str(), "filter");
            assert_eq!(after, Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(channel.pending_calls(), 0);

    // Queued behind the stalled filter; its late result is discarded.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let created = channel.create(Record::new("after", "")).await.unwrap();
    assert_eq!(created.title, "after");
}

#[tokio::test]
async fn panic_rejects_only_the_offending_call() {
    let channel = CommandChannel::open_with(
        FaultyConnector {
            stall: Duration::ZERO,
        },
        Duration::from_secs(5),
    )
    .unwrap();
    channel.init().await.unwrap();

    let (crashed, created) = tokio::join!(
        channel.read(PANICKING_ID),
        channel.create(Record::new("survivor", "")),
    );

    match crashed.unwrap_err() {
        ChannelError::Fault(fault) => {
            assert!(fault.correlation_id.is_some());
            assert!(fault.message.contains("crashed"));
        }
        other => panic!("expected worker fault, got {other}"),
    }
    assert_eq!(created.unwrap().title, "survivor");

    assert!(channel.is_open());
    assert_eq!(channel.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn calls_after_close_are_disconnected() {
    let mut channel = memory_channel();
    channel.init().await.unwrap();

    channel.close();
    channel.close();
    assert!(!channel.is_open());

    let err = channel.call(Command::ListAll).await.unwrap_err();
    assert!(matches!(err, ChannelError::Disconnected));
    assert_eq!(channel.pending_calls(), 0);
}

#[tokio::test]
async fn file_backed_channel_sees_data_from_a_previous_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::in_dir(dir.path());

    let id = {
        let channel = CommandChannel::open(config.clone()).unwrap();
        channel.init().await.unwrap();
        channel
            .create(Record::new("persisted", "body"))
            .await
            .unwrap()
            .id
            .unwrap()
    };

    let channel = CommandChannel::open(config).unwrap();
    channel.init().await.unwrap();
    assert_eq!(channel.read(id).await.unwrap().unwrap().title, "persisted");
}

#[test]
fn open_rejects_invalid_config() {
    let config = StoreConfig {
        call_timeout_ms: 0,
        ..StoreConfig::in_memory()
    };
    assert!(matches!(
        CommandChannel::open(config),
        Err(ChannelError::Config(_))
    ));
}

#[tokio::test]
async fn unvalidated_config_is_rejected_at_init() {
    let root = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        name: "../escaped".to_string(),
        ..StoreConfig::in_dir(root.path().join("data"))
    };

    let channel = CommandChannel::open_with(config, Duration::from_secs(5)).unwrap();
    let err = channel.init().await.unwrap_err();
    assert_eq!(err.command_code(), Some("invalid_config"));
    assert!(!root.path().join("escaped.sqlite3").exists());
}

#[tokio::test]
async fn dropping_channel_does_not_wait_for_a_stalled_worker() {
    let stall = Duration::from_millis(1000);
    let channel = CommandChannel::open_with(
        FaultyConnector { stall },
        Duration::from_millis(150),
    )
    .unwrap();
    channel.init().await.unwrap();

    // The worker keeps stalling after the call gives up.
    let err = channel.filter(SLOW_FILTER).await.unwrap_err();
    assert!(matches!(err, ChannelError::Timeout { .. }));

    let started = Instant::now();
    drop(channel);
    assert!(started.elapsed() < Duration::from_millis(500));
}
