//! The persisted, bounded-concurrency upload queue

use crate::api::UploadApi;
use crate::constants::{BASE_BACKOFF_MS, MAX_RETRIES};
use crate::queue::{QueueError, QueueState, UploadItem, UploadStatus};
use crate::source::ChunkSource;
use crate::store::QueueStore;
use crate::transfer::{Transfer, TransferEvent, UploadFailure};
use anyhow::Result;
use common::FileRecord;
use drive::ResumableTransport;
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Delay before automatic retry number `retry_count + 1`
pub fn backoff_delay(retry_count: u32) -> Duration {
    Duration::from_millis(2u64.saturating_pow(retry_count).saturating_mul(BASE_BACKOFF_MS))
}

struct Inner {
    state: QueueState,
    /// Resident binary handles, keyed by item id
    sources: HashMap<String, Arc<dyn ChunkSource>>,
    /// Items started but not yet finished; guards against double starts
    claimed: HashSet<String>,
    in_flight: usize,
    cancels: HashMap<String, CancellationToken>,
    /// Pending items waiting out a backoff delay
    not_before: HashMap<String, Instant>,
}

impl Inner {
    fn is_runnable(&self, item: &UploadItem, now: Instant) -> bool {
        item.status == UploadStatus::Pending
            && !self.claimed.contains(&item.id)
            && self.sources.contains_key(&item.id)
            && self.not_before.get(&item.id).map_or(true, |at| *at <= now)
    }
}

struct Shared {
    inner: Mutex<Inner>,
    store: QueueStore,
    api: Arc<dyn UploadApi>,
    transport: Arc<dyn ResumableTransport>,
    changed: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &QueueState) {
        if let Err(e) = self.store.save(state) {
            error!("Failed to persist upload queue: {:#}", e);
        }
    }
}

/// Client-side upload queue. Every mutation is persisted before it returns.
#[derive(Clone)]
pub struct UploadQueue {
    shared: Arc<Shared>,
}

impl UploadQueue {
    /// Load the persisted queue. Nothing is resident in a fresh process,
    /// so every unfinished item comes back `paused`.
    pub fn open(
        store: QueueStore,
        api: Arc<dyn UploadApi>,
        transport: Arc<dyn ResumableTransport>,
    ) -> Result<Self> {
        let mut state = store.load()?;
        state.rehydrate(|_| false);
        let queue = Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state,
                    sources: HashMap::new(),
                    claimed: HashSet::new(),
                    in_flight: 0,
                    cancels: HashMap::new(),
                    not_before: HashMap::new(),
                }),
                store,
                api,
                transport,
                changed: Notify::new(),
            }),
        };
        queue.mutate(|_| Ok(()))?;
        Ok(queue)
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T, QueueError>) -> Result<T> {
        let result = {
            let mut inner = self.shared.lock();
            let result = f(&mut inner)?;
            self.shared.persist(&inner.state);
            result
        };
        self.shared.changed.notify_one();
        Ok(result)
    }

    pub fn snapshot(&self) -> QueueState {
        self.shared.lock().state.clone()
    }

    pub fn item(&self, id: &str) -> Option<UploadItem> {
        self.shared.lock().state.get(id).cloned()
    }

    pub fn set_concurrency(&self, concurrency: usize) -> Result<()> {
        self.mutate(|inner| {
            inner.state.concurrency = concurrency.max(1);
            Ok(())
        })
    }

    /// Add a new item with its bytes resident
    pub fn enqueue(
        &self,
        file_name: &str,
        mime_type: &str,
        parent_id: Option<String>,
        source: Arc<dyn ChunkSource>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let item = UploadItem::new(
            id.clone(),
            file_name.to_string(),
            source.len(),
            mime_type.to_string(),
            parent_id,
        );
        info!("Queued {} ({} bytes) as {}", file_name, item.size, id);
        self.mutate(|inner| {
            inner.sources.insert(id.clone(), source);
            inner.state.queue.push(item);
            Ok(id)
        })
    }

    /// Give a paused item its bytes back
    pub fn attach(&self, id: &str, source: Arc<dyn ChunkSource>) -> Result<()> {
        self.mutate(|inner| {
            let item = inner.state.get_mut(id)?;
            if item.size != source.len() {
                return Err(QueueError::Mismatch(format!(
                    "{} was queued with {} bytes, the attached file has {}",
                    item.file_name,
                    item.size,
                    source.len()
                )));
            }
            if item.status == UploadStatus::Paused {
                item.transition(UploadStatus::Pending)?;
            }
            inner.sources.insert(id.to_string(), source);
            Ok(())
        })
    }

    /// Manual retry of a failed item; without resident bytes it waits in `paused`
    pub fn retry(&self, id: &str) -> Result<UploadStatus> {
        self.mutate(|inner| {
            let resident = inner.sources.contains_key(id);
            let item = inner.state.get_mut(id)?;
            let next = if resident {
                UploadStatus::Pending
            } else {
                UploadStatus::Paused
            };
            item.transition(next)?;
            item.retry_count = 0;
            item.error = None;
            inner.not_before.remove(id);
            Ok(next)
        })
    }

    /// Dismiss an item, aborting its transfer if one is running
    pub fn remove(&self, id: &str) -> Result<Option<UploadItem>> {
        self.mutate(|inner| {
            if let Some(cancel) = inner.cancels.get(id) {
                cancel.cancel();
            }
            inner.sources.remove(id);
            inner.not_before.remove(id);
            Ok(inner.state.remove(id))
        })
    }

    /// Abort everything and drop the queue (logout)
    pub fn clear(&self) -> Result<()> {
        {
            let mut inner = self.shared.lock();
            for cancel in inner.cancels.values() {
                cancel.cancel();
            }
            inner.state.queue.clear();
            inner.sources.clear();
            inner.not_before.clear();
        }
        self.shared.store.delete()?;
        self.shared.changed.notify_one();
        Ok(())
    }

    /// Start as many runnable items as there are free slots. Safe to call at
    /// any time; claimed items are never started twice.
    pub fn dispatch(&self) {
        let started = {
            let mut inner = self.shared.lock();
            let now = Instant::now();
            let free = inner.state.concurrency.saturating_sub(inner.in_flight);
            let ids: Vec<String> = inner
                .state
                .queue
                .iter()
                .filter(|item| inner.is_runnable(item, now))
                .take(free)
                .map(|item| item.id.clone())
                .collect();

            let mut started = Vec::new();
            for id in ids {
                let Some(source) = inner.sources.get(&id).cloned() else {
                    continue;
                };
                let Ok(item) = inner.state.get_mut(&id) else {
                    continue;
                };
                if item.transition(UploadStatus::Uploading).is_err() {
                    continue;
                }
                let snapshot = item.clone();
                let cancel = CancellationToken::new();
                inner.claimed.insert(id.clone());
                inner.not_before.remove(&id);
                inner.cancels.insert(id.clone(), cancel.clone());
                inner.in_flight += 1;
                started.push((snapshot, source, cancel));
            }
            if !started.is_empty() {
                self.shared.persist(&inner.state);
            }
            started
        };

        for (item, source, cancel) in started {
            info!("Uploading {} ({})", item.file_name, item.id);
            let shared = self.shared.clone();
            tokio::spawn(async move {
                let id = item.id.clone();
                let result = Transfer::new(shared.api.as_ref(), shared.transport.as_ref())
                    .run(&item, source.as_ref(), &cancel, &mut |event| {
                        apply_event(&shared, &id, event)
                    })
                    .await;
                finish(&shared, &id, result);
            });
        }
    }

    /// Drive the queue until nothing is running, runnable or waiting on a backoff
    pub async fn run_until_idle(&self) {
        loop {
            // Registered before dispatching so no wake-up is missed
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            self.dispatch();

            let wake_at = {
                let inner = self.shared.lock();
                let now = Instant::now();
                let runnable = inner
                    .state
                    .queue
                    .iter()
                    .any(|item| inner.is_runnable(item, now));
                let next_retry = inner
                    .state
                    .queue
                    .iter()
                    .filter(|item| item.status == UploadStatus::Pending)
                    .filter_map(|item| inner.not_before.get(&item.id))
                    .min()
                    .copied();
                if inner.in_flight == 0 && !runnable && next_retry.is_none() {
                    return;
                }
                next_retry
            };

            match wake_at {
                Some(at) => {
                    tokio::select! {
                        _ = &mut changed => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => changed.await,
            }
        }
    }
}

fn apply_event(shared: &Shared, id: &str, event: TransferEvent) {
    let mut inner = shared.lock();
    let Ok(item) = inner.state.get_mut(id) else {
        return;
    };
    match event {
        TransferEvent::SessionOpened {
            session_url,
            unique_file_name,
        } => {
            item.session_url = Some(session_url);
            item.unique_file_name = Some(unique_file_name);
        }
        TransferEvent::SessionDiscarded => item.forget_session(),
        TransferEvent::Progress(percent) => item.advance_progress(percent),
    }
    shared.persist(&inner.state);
}

/// Settle one execution attempt. Runs exactly once per `dispatch` start,
/// so the slot is released exactly once.
fn finish(shared: &Shared, id: &str, result: Result<FileRecord, UploadFailure>) {
    {
        let mut inner = shared.lock();
        inner.claimed.remove(id);
        inner.cancels.remove(id);
        inner.in_flight = inner.in_flight.saturating_sub(1);

        if inner.state.get(id).is_some() {
            if let Err(e) = settle(&mut inner, id, result) {
                error!("Upload {} left in an unexpected state: {}", id, e);
            }
        }
        shared.persist(&inner.state);
    }
    shared.changed.notify_one();
}

fn settle(
    inner: &mut Inner,
    id: &str,
    result: Result<FileRecord, UploadFailure>,
) -> Result<(), QueueError> {
    match result {
        Ok(record) => {
            let item = inner.state.get_mut(id)?;
            item.complete(record.id)?;
            item.retry_count = 0;
            info!("Completed {} ({})", item.file_name, id);
            inner.sources.remove(id);
        }
        Err(UploadFailure::Cancelled) => {
            // A cancelled item is dropped, not paused
            inner.state.remove(id);
            inner.sources.remove(id);
            info!("Cancelled upload {}", id);
        }
        Err(UploadFailure::Transient(message)) => {
            let item = inner.state.get_mut(id)?;
            if item.retry_count < MAX_RETRIES {
                let delay = backoff_delay(item.retry_count);
                item.retry_count += 1;
                item.transition(UploadStatus::Pending)?;
                warn!(
                    "{} failed ({}); retry {}/{} in {:?}",
                    item.file_name, message, item.retry_count, MAX_RETRIES, delay
                );
                inner.not_before.insert(id.to_string(), Instant::now() + delay);
            } else {
                warn!("{} failed after {} retries: {}", item.file_name, MAX_RETRIES, message);
                item.fail(message)?;
            }
        }
        Err(UploadFailure::Fatal(message)) => {
            let item = inner.state.get_mut(id)?;
            warn!("{} failed: {}", item.file_name, message);
            item.fail(message)?;
        }
    }
    Ok(())
}
