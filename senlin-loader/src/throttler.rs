use async_channel::{Receiver, Sender};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

/// What a request is deduplicated on. Requests with equal keys share one
/// physical fetch and resolve together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub url: String,
    /// Query parameters, sorted at construction so ordering never splits a
    /// key in two.
    pub params: Vec<(String, String)>,
}

impl RequestKey {
    pub fn from_url(url: impl Into<String>) -> Self {
        RequestKey {
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(url: impl Into<String>, mut params: Vec<(String, String)>) -> Self {
        params.sort();
        RequestKey {
            url: url.into(),
            params,
        }
    }

    /// The URL actually fetched, query string included.
    pub fn request_url(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }
        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.url, query)
    }
}

/// Smaller is more urgent. Derived from distance to the viewpoint.
pub type Priority = u32;

/// A decoded texture, RGBA8 row major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("cancelled")]
    Cancelled,
}

pub type LoadResult = Result<Arc<DecodedImage>, LoadError>;

/// One caller's handle on a load. Dropping it abandons the caller's interest
/// without affecting the shared fetch.
pub struct RequestTicket {
    receiver: Receiver<LoadResult>,
}

impl RequestTicket {
    /// The result, once the shared fetch has resolved.
    pub fn try_take(&self) -> Option<LoadResult> {
        self.receiver.try_recv().ok()
    }
}

/// Work the caller must start: spawn a fetch task for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCommand {
    pub key: RequestKey,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy)]
pub struct ThrottlerConfig {
    /// Fetches allowed to start while the camera is in motion.
    pub moving_limit: usize,
    /// Fetches allowed once the camera has settled.
    pub settled_limit: usize,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        ThrottlerConfig {
            moving_limit: 2,
            settled_limit: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Queued,
    InFlight,
}

struct RequestEntry {
    state: RequestState,
    best_priority: Priority,
    waiters: Vec<Sender<LoadResult>>,
}

struct HeapEntry {
    priority: Priority,
    seq: u64,
    key: RequestKey,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest entry: flip priorities so the most
        // urgent request wins, newer requests break ties
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Deduplicating, concurrency-capped request queue. It decides which fetches
/// start and when; actually running them is the caller's business, which
/// keeps this fully synchronous and testable.
///
/// Raising a priority re-pushes the key and leaves the old heap entry to be
/// skipped on pop.
pub struct RequestThrottler {
    config: ThrottlerConfig,
    heap: BinaryHeap<HeapEntry>,
    entries: HashMap<RequestKey, RequestEntry>,
    active: usize,
    seq: u64,
    moving: bool,
    paused: bool,
}

impl RequestThrottler {
    pub fn new(config: ThrottlerConfig) -> Self {
        RequestThrottler {
            config,
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            active: 0,
            seq: 0,
            moving: false,
            paused: false,
        }
    }

    /// Queues a fetch, or attaches to one already queued or in flight.
    /// Re-requesting may only make a queued key more urgent, never less.
    pub fn request(&mut self, key: RequestKey, priority: Priority) -> RequestTicket {
        let (tx, rx) = async_channel::unbounded();
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.waiters.push(tx);
                if entry.state == RequestState::Queued && priority < entry.best_priority {
                    entry.best_priority = priority;
                    self.seq += 1;
                    self.heap.push(HeapEntry {
                        priority,
                        seq: self.seq,
                        key,
                    });
                }
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    RequestEntry {
                        state: RequestState::Queued,
                        best_priority: priority,
                        waiters: vec![tx],
                    },
                );
                self.seq += 1;
                self.heap.push(HeapEntry {
                    priority,
                    seq: self.seq,
                    key,
                });
            }
        }
        RequestTicket { receiver: rx }
    }

    /// Hands out fetches to start, most urgent first, up to the current
    /// concurrency limit. No-op while paused.
    pub fn pump(&mut self) -> Vec<StartCommand> {
        let mut started = Vec::new();
        if self.paused {
            return started;
        }
        while self.active < self.current_limit() {
            let Some(top) = self.heap.pop() else {
                break;
            };
            let Some(entry) = self.entries.get_mut(&top.key) else {
                // completed or cancelled while queued
                continue;
            };
            if entry.state != RequestState::Queued || top.priority != entry.best_priority {
                // stale heap entry left behind by a priority raise
                continue;
            }
            entry.state = RequestState::InFlight;
            self.active += 1;
            started.push(StartCommand {
                key: top.key,
                priority: top.priority,
            });
        }
        started
    }

    /// Resolves every waiter of `key`. Completions for unknown keys, such as
    /// a fetch that outlived `cancel_all`, are ignored.
    pub fn complete(&mut self, key: &RequestKey, result: LoadResult) {
        let Some(entry) = self.entries.remove(key) else {
            return;
        };
        if entry.state == RequestState::InFlight {
            self.active -= 1;
        }
        for waiter in entry.waiters {
            let _ = waiter.try_send(result.clone());
        }
    }

    /// Rejects every queued and in-flight request with
    /// [`LoadError::Cancelled`] and returns the keys whose fetch tasks the
    /// caller has to abort.
    pub fn cancel_all(&mut self) -> Vec<RequestKey> {
        let mut in_flight = Vec::new();
        for (key, entry) in self.entries.drain() {
            if entry.state == RequestState::InFlight {
                in_flight.push(key);
            }
            for waiter in entry.waiters {
                let _ = waiter.try_send(Err(LoadError::Cancelled));
            }
        }
        self.heap.clear();
        self.active = 0;
        in_flight
    }

    /// Swaps the concurrency cap. Fetches already in flight keep running
    /// even when the cap shrinks below them.
    pub fn set_moving(&mut self, moving: bool) {
        self.moving = moving;
    }

    /// Stops handing out new fetches. In-flight work is unaffected.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current_limit(&self) -> usize {
        if self.moving {
            self.config.moving_limit
        } else {
            self.config.settled_limit
        }
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn queued_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.state == RequestState::Queued)
            .count()
    }
}
