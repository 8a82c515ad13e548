//! In-memory artifact cache with single-flight computation and TTL expiry.
//!
//! Every distinct [`Fingerprint`] is computed at most once at a time: the first caller runs the
//! computation while later callers for the same fingerprint block until it settles (or until their
//! own deadline passes). Successful results are shared as `Arc<CacheEntry>`; failures are handed to
//! the waiters of that flight and never stored. A leader's timeout is not shared: a waiter whose own
//! deadline still holds takes over the computation instead.
//!
//! Memory is bounded by optional entry and byte limits; the oldest entries go first.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crate::cache::disk::DiskStore;
use crate::cache::fingerprint::Fingerprint;
use crate::config::CacheConfig;
use crate::foundation::error::{ErrorKind, GridmojiError, GridmojiResult};
use crate::transform::normalize::EmojiArtifact;

/// Tiles of one sampled video frame, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameArtifacts {
    pub timestamp_sec: f64,
    pub tiles: Vec<EmojiArtifact>,
}

/// The complete output of one job.
#[derive(Clone, Debug, PartialEq)]
pub enum ArtifactSet {
    /// `x*y` tiles in row-major order.
    Image { tiles: Vec<EmojiArtifact> },
    /// One row-major tile set per sampled frame, in timestamp order.
    Video { frames: Vec<FrameArtifacts> },
}

impl ArtifactSet {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
        }
    }

    /// `(timestamp, tiles)` per frame; images are a single frame without a timestamp.
    pub fn frames(&self) -> Vec<(Option<f64>, &[EmojiArtifact])> {
        match self {
            Self::Image { tiles } => vec![(None, tiles.as_slice())],
            Self::Video { frames } => frames
                .iter()
                .map(|f| (Some(f.timestamp_sec), f.tiles.as_slice()))
                .collect(),
        }
    }

    pub fn artifact_count(&self) -> usize {
        self.frames().iter().map(|(_, t)| t.len()).sum()
    }

    pub fn byte_len(&self) -> usize {
        self.frames()
            .iter()
            .flat_map(|(_, t)| t.iter())
            .map(EmojiArtifact::byte_len)
            .sum()
    }
}

/// A stored result and its lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub artifacts: ArtifactSet,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// Result of [`ArtifactCache::get_or_compute`].
#[derive(Clone, Debug)]
pub struct CacheLookup {
    pub entry: Arc<CacheEntry>,
    /// `true` when this call ran the computation.
    pub computed: bool,
}

/// Point-in-time counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to stay within the limits.
    pub evictions: u64,
    pub max_entries: Option<usize>,
    pub max_bytes: Option<u64>,
}

type FlightResult = GridmojiResult<Arc<CacheEntry>>;

#[derive(Default)]
struct Flight {
    result: Mutex<Option<FlightResult>>,
    done: Condvar,
}

impl Flight {
    fn settle(&self, result: &FlightResult) {
        let shared = match result {
            Ok(entry) => Ok(Arc::clone(entry)),
            Err(e) => Err(e.share()),
        };
        *lock(&self.result) = Some(shared);
        self.done.notify_all();
    }

    fn wait(&self, deadline: Option<Instant>) -> FlightResult {
        let started = Instant::now();
        let mut slot = lock(&self.result);
        loop {
            if let Some(r) = slot.as_ref() {
                return match r {
                    Ok(entry) => Ok(Arc::clone(entry)),
                    Err(e) => Err(e.share()),
                };
            }
            match deadline {
                None => {
                    slot = self.done.wait(slot).unwrap_or_else(|p| p.into_inner());
                }
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(GridmojiError::timeout(
                            "cache wait",
                            now.duration_since(started),
                        ));
                    }
                    slot = self
                        .done
                        .wait_timeout(slot, d - now)
                        .unwrap_or_else(|p| p.into_inner())
                        .0;
                }
            }
        }
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<Fingerprint, Arc<CacheEntry>>,
    in_flight: HashMap<Fingerprint, Arc<Flight>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    closed: bool,
}

impl State {
    /// Drop the oldest entries until both limits hold. `keep` is never evicted.
    fn enforce_limits(&mut self, limits: CacheLimits, keep: Fingerprint) -> usize {
        let over = |st: &State| {
            let bytes: u64 = st
                .entries
                .values()
                .map(|e| e.artifacts.byte_len() as u64)
                .sum();
            limits.max_entries.is_some_and(|m| st.entries.len() > m)
                || limits.max_bytes.is_some_and(|m| bytes > m)
        };
        if !over(self) {
            return 0;
        }

        let mut oldest = self
            .entries
            .values()
            .filter(|e| e.fingerprint != keep)
            .map(|e| (e.created_at, e.fingerprint))
            .collect::<Vec<_>>();
        oldest.sort();

        let mut evicted = 0;
        for (_, fp) in oldest {
            if !over(self) {
                break;
            }
            self.entries.remove(&fp);
            evicted += 1;
        }
        self.evictions += evicted as u64;
        evicted
    }
}

/// Optional in-memory bounds. `None` means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: Option<usize>,
    pub max_bytes: Option<u64>,
}

impl From<&CacheConfig> for CacheLimits {
    fn from(cfg: &CacheConfig) -> Self {
        Self {
            max_entries: cfg.max_entries,
            max_bytes: cfg.max_bytes,
        }
    }
}

struct Shared {
    state: Mutex<State>,
    /// Signalled whenever a flight leaves `in_flight`.
    idle: Condvar,
    ttl: Duration,
    limits: CacheLimits,
    disk: Option<DiskStore>,
    stop: Mutex<bool>,
    stop_cv: Condvar,
}

impl Shared {
    fn new(ttl: Duration, limits: CacheLimits, disk: Option<DiskStore>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            idle: Condvar::new(),
            ttl,
            limits,
            disk,
            stop: Mutex::new(false),
            stop_cv: Condvar::new(),
        }
    }

    fn sweep(&self, now: SystemTime) -> usize {
        let removed = {
            let mut st = lock(&self.state);
            let before = st.entries.len();
            st.entries.retain(|_, e| !e.is_expired_at(now));
            before - st.entries.len()
        };
        if let Some(disk) = &self.disk
            && let Err(e) = disk.purge_expired(now)
        {
            tracing::warn!(error = %e, "disk sweep failed");
        }
        if removed > 0 {
            tracing::info!(removed, "expired cache entries evicted");
        }
        removed
    }
}

/// Content-addressed artifact store shared by every job of a pipeline.
pub struct ArtifactCache {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("ttl", &self.shared.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl ArtifactCache {
    /// Build a cache from config: opens the persistence directory if one is set and starts the
    /// background sweeper if a sweep interval is set.
    pub fn new(cfg: &CacheConfig) -> GridmojiResult<Self> {
        let disk = cfg
            .persist_dir
            .as_deref()
            .map(DiskStore::open)
            .transpose()?;
        let shared = Arc::new(Shared::new(cfg.ttl(), CacheLimits::from(cfg), disk));

        let sweeper = match cfg.sweep_interval_secs {
            Some(secs) if secs > 0 => Some(spawn_sweeper(
                Arc::clone(&shared),
                Duration::from_secs(secs),
            )?),
            _ => None,
        };

        Ok(Self {
            shared,
            sweeper: Mutex::new(sweeper),
        })
    }

    /// Unbounded memory-only cache without a sweeper.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::bounded(ttl, CacheLimits::default())
    }

    /// Memory-only cache without a sweeper, evicting past `limits`.
    pub fn bounded(ttl: Duration, limits: CacheLimits) -> Self {
        Self {
            shared: Arc::new(Shared::new(ttl, limits, None)),
            sweeper: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.shared.limits
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    /// Return a live entry without computing anything. Expired entries are evicted.
    pub fn get(&self, fp: Fingerprint) -> Option<Arc<CacheEntry>> {
        let mut st = lock(&self.shared.state);
        let entry = live_entry(&mut st, fp, SystemTime::now())?;
        st.hits += 1;
        Some(entry)
    }

    /// Return the entry for `fp`, running `compute` only if no live entry exists and no other
    /// caller is already computing it.
    ///
    /// A waiter gives up with a timeout once `deadline` passes; the in-flight computation itself
    /// keeps running for its owner. If the owner fails with a timeout while the waiter's deadline
    /// still holds, the waiter starts over and may run `compute` itself.
    #[tracing::instrument(skip_all, fields(fingerprint = %fp))]
    pub fn get_or_compute<F>(
        &self,
        fp: Fingerprint,
        deadline: Option<Instant>,
        compute: F,
    ) -> GridmojiResult<CacheLookup>
    where
        F: FnOnce() -> GridmojiResult<ArtifactSet>,
    {
        let flight = loop {
            let joined = {
                let mut st = lock(&self.shared.state);
                if st.closed {
                    return Err(GridmojiError::processing("artifact cache is shut down"));
                }
                if let Some(entry) = live_entry(&mut st, fp, SystemTime::now()) {
                    st.hits += 1;
                    tracing::debug!("cache hit");
                    return Ok(CacheLookup {
                        entry,
                        computed: false,
                    });
                }
                match st.in_flight.get(&fp).map(Arc::clone) {
                    Some(flight) => flight,
                    None => {
                        let flight = Arc::new(Flight::default());
                        st.in_flight.insert(fp, Arc::clone(&flight));
                        st.misses += 1;
                        break flight;
                    }
                }
            };

            tracing::debug!("joining in-flight computation");
            match joined.wait(deadline) {
                Ok(entry) => {
                    lock(&self.shared.state).hits += 1;
                    return Ok(CacheLookup {
                        entry,
                        computed: false,
                    });
                }
                Err(e)
                    if e.kind() == ErrorKind::Timeout
                        && deadline.is_none_or(|d| Instant::now() < d) =>
                {
                    tracing::debug!(error = %e, "in-flight computation timed out, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        let mut guard = FlightGuard {
            shared: &self.shared,
            fp,
            flight,
            settled: false,
        };

        if let Some(entry) = self.load_from_disk(fp) {
            let entry = Arc::new(entry);
            guard.finish(Ok(Arc::clone(&entry)));
            tracing::debug!("cache hit on disk");
            return Ok(CacheLookup {
                entry,
                computed: false,
            });
        }

        tracing::debug!("cache miss, computing");
        let result = compute().map(|artifacts| {
            let created_at = SystemTime::now();
            Arc::new(CacheEntry {
                fingerprint: fp,
                artifacts,
                created_at,
                expires_at: created_at + self.shared.ttl,
            })
        });

        if let (Ok(entry), Some(disk)) = (&result, &self.shared.disk)
            && let Err(e) = disk.store(entry)
        {
            tracing::warn!(error = %e, "cache write-through failed");
        }

        guard.finish(result.as_ref().map(Arc::clone).map_err(GridmojiError::share));
        result.map(|entry| CacheLookup {
            entry,
            computed: true,
        })
    }

    fn load_from_disk(&self, fp: Fingerprint) -> Option<CacheEntry> {
        let disk = self.shared.disk.as_ref()?;
        match disk.load(fp, SystemTime::now()) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(fingerprint = %fp, error = %e, "ignoring unreadable disk entry");
                None
            }
        }
    }

    /// Evict every entry expired at `now`, in memory and on disk. Returns the in-memory count.
    pub fn sweep_expired_at(&self, now: SystemTime) -> usize {
        self.shared.sweep(now)
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(SystemTime::now())
    }

    /// Drop every stored entry regardless of TTL. In-flight computations are unaffected.
    pub fn purge(&self) -> GridmojiResult<usize> {
        let removed = {
            let mut st = lock(&self.shared.state);
            let n = st.entries.len();
            st.entries.clear();
            n
        };
        if let Some(disk) = &self.shared.disk {
            disk.purge_all()?;
        }
        tracing::info!(removed, "cache purged");
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let st = lock(&self.shared.state);
        CacheStats {
            entries: st.entries.len(),
            in_flight: st.in_flight.len(),
            bytes: st.entries.values().map(|e| e.artifacts.byte_len()).sum(),
            hits: st.hits,
            misses: st.misses,
            evictions: st.evictions,
            max_entries: self.shared.limits.max_entries,
            max_bytes: self.shared.limits.max_bytes,
        }
    }

    /// Refuse new work, wait for in-flight computations to settle, and stop the sweeper.
    ///
    /// Writes are synchronous, so nothing is pending once the flights drain. Safe to call twice.
    pub fn shutdown(&self) {
        {
            let mut st = lock(&self.shared.state);
            st.closed = true;
            while !st.in_flight.is_empty() {
                st = self
                    .shared
                    .idle
                    .wait(st)
                    .unwrap_or_else(|p| p.into_inner());
            }
        }
        self.stop_sweeper();
        tracing::debug!("artifact cache shut down");
    }

    fn stop_sweeper(&self) {
        *lock(&self.shared.stop) = true;
        self.shared.stop_cv.notify_all();
        if let Some(handle) = lock(&self.sweeper).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ArtifactCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

fn live_entry(st: &mut State, fp: Fingerprint, now: SystemTime) -> Option<Arc<CacheEntry>> {
    let entry = st.entries.get(&fp)?;
    if entry.is_expired_at(now) {
        st.entries.remove(&fp);
        tracing::debug!(fingerprint = %fp, "evicted expired entry on access");
        return None;
    }
    Some(Arc::clone(entry))
}

fn spawn_sweeper(shared: Arc<Shared>, every: Duration) -> GridmojiResult<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("gridmoji-cache-sweeper".to_string())
        .spawn(move || {
            loop {
                let stopped = {
                    let stop = lock(&shared.stop);
                    let (stop, _) = shared
                        .stop_cv
                        .wait_timeout_while(stop, every, |s| !*s)
                        .unwrap_or_else(|p| p.into_inner());
                    *stop
                };
                if stopped {
                    break;
                }
                shared.sweep(SystemTime::now());
            }
        })
        .map_err(|e| GridmojiError::processing(format!("failed to spawn cache sweeper: {e}")))
}

/// Settles a flight exactly once, even if the computation unwinds.
struct FlightGuard<'a> {
    shared: &'a Shared,
    fp: Fingerprint,
    flight: Arc<Flight>,
    settled: bool,
}

impl FlightGuard<'_> {
    fn finish(&mut self, result: FlightResult) {
        {
            let mut st = lock(&self.shared.state);
            if let Ok(entry) = &result {
                st.entries.insert(self.fp, Arc::clone(entry));
                let evicted = st.enforce_limits(self.shared.limits, self.fp);
                if evicted > 0 {
                    tracing::debug!(evicted, entries = st.entries.len(), "cache over capacity");
                }
            }
            st.in_flight.remove(&self.fp);
        }
        self.shared.idle.notify_all();
        self.flight.settle(&result);
        self.settled = true;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.finish(Err(GridmojiError::processing(
                "artifact computation panicked",
            )));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
