//! Open cursors parked between requests, with idle expiry.
//!
//! A [`CursorCache`] owns every cursor registered with it. Each entry carries
//! its own TTL; a background sweeper thread (started on first registration
//! and stopped when the cache runs empty) closes entries that have been idle
//! longer than their TTL. [`CursorCache::sweep_now`] runs the same pass on
//! the caller's thread.
//!
//! [`CursorCache::next_batch`] pages through a parked cursor. The entry is
//! terminated as soon as a page comes back short.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use nocturne_sql::Cursor;
use parking_lot::{Condvar, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::config::CursorCacheConfig;
use crate::error::{Error, Result};
use crate::plan::Materializer;
use crate::shape::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(u64);

impl CursorId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CursorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(CursorId)
            .map_err(|_| Error::InvalidCursorId(s.to_string()))
    }
}

struct Tracked {
    id: CursorId,
    cursor: Box<dyn Cursor>,
    sql: String,
    close_connection: bool,
    closed: bool,
    // Set once a page read hit the end; the cursor is not advanced again.
    exhausted: bool,
}

impl Tracked {
    fn next_page<S: Shape>(&mut self, materializer: &Materializer, n: usize) -> Result<Vec<S>> {
        if self.exhausted {
            return Ok(Vec::new());
        }
        let mut extractor = materializer
            .extractor::<S, _>(&mut *self.cursor)?
            .with_sql(self.sql.as_str());
        let page = extractor.extract(n)?;
        self.exhausted = extractor.is_empty();
        Ok(page)
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.cursor.close() {
            warn!("Failed to close cursor {}: {}", self.id, e);
        }
        if self.close_connection {
            if let Err(e) = self.cursor.close_connection() {
                warn!("Failed to close connection of cursor {}: {}", self.id, e);
            }
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared access to a cached cursor. Using the handle after the entry was
/// evicted or terminated fails with [`Error::StaleCursor`].
#[derive(Clone)]
pub struct CursorHandle {
    id: CursorId,
    cursor: Arc<Mutex<Tracked>>,
}

impl CursorHandle {
    pub fn id(&self) -> CursorId {
        self.id
    }

    /// Run `f` with exclusive access to the cursor.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Cursor) -> R) -> Result<R> {
        let mut tracked = self.cursor.lock();
        if tracked.closed {
            return Err(Error::StaleCursor(self.id));
        }
        Ok(f(&mut *tracked.cursor))
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.lock().closed
    }
}

impl fmt::Debug for CursorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorHandle").field("id", &self.id).finish()
    }
}

struct Slot {
    ttl_secs: u64,
    last_access: u64,
    cursor: Arc<Mutex<Tracked>>,
}

#[derive(Default)]
struct State {
    entries: HashMap<CursorId, Slot>,
    sweeper: Option<JoinHandle<()>>,
    // Bumped whenever the running sweeper is told to stop.
    generation: u64,
}

struct Inner {
    state: Mutex<State>,
    wake: Condvar,
    clock: Arc<dyn Clock>,
    config: CursorCacheConfig,
    next_id: AtomicU64,
}

impl Inner {
    fn evict_idle(&self, state: &mut State) -> Vec<Arc<Mutex<Tracked>>> {
        let now = self.clock.now_epoch_secs();
        let mut evicted = Vec::new();
        state.entries.retain(|id, slot| {
            let idle = now.saturating_sub(slot.last_access);
            if idle > slot.ttl_secs {
                trace!("Evicting cursor {} after {}s idle (ttl {}s)", id, idle, slot.ttl_secs);
                evicted.push(Arc::clone(&slot.cursor));
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Tell the sweeper to exit and hand back its thread for joining.
    fn stop_sweeper(&self, state: &mut State) -> Option<JoinHandle<()>> {
        state.generation += 1;
        let thread = state.sweeper.take()?;
        self.wake.notify_all();
        debug!("Stopping cursor sweeper");
        Some(thread)
    }
}

fn close_all(cursors: Vec<Arc<Mutex<Tracked>>>) {
    for cursor in cursors {
        cursor.lock().shutdown();
    }
}

fn join(thread: Option<JoinHandle<()>>) {
    if let Some(thread) = thread {
        if thread.thread().id() != thread::current().id() && thread.join().is_err() {
            warn!("Cursor sweeper panicked");
        }
    }
}

fn sweeper_loop(inner: Weak<Inner>, generation: u64) {
    loop {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let interval = Duration::from_millis(inner.config.sweep_interval_ms.max(1));
        let deadline = Instant::now() + interval;

        let mut state = inner.state.lock();
        while state.generation == generation
            && !inner.wake.wait_until(&mut state, deadline).timed_out()
        {}
        if state.generation != generation {
            return;
        }

        let evicted = inner.evict_idle(&mut state);
        let done = state.entries.is_empty();
        if done {
            state.generation += 1;
            state.sweeper = None;
            debug!("Cursor cache is empty; sweeper exiting");
        }
        drop(state);

        close_all(evicted);
        if done {
            return;
        }
    }
}

/// Registry of open cursors keyed by [`CursorId`].
///
/// ```
/// use std::sync::Arc;
/// use nocturne::clock::ManualClock;
/// use nocturne::config::CursorCacheConfig;
/// use nocturne::cursor_cache::CursorCache;
/// use nocturne::nocturne_sql::memory::MemoryCursor;
///
/// let clock = Arc::new(ManualClock::new(0));
/// let cache = CursorCache::with_clock(CursorCacheConfig::manual(), clock.clone());
/// let id = cache.register(MemoryCursor::empty(), 60, false).unwrap();
///
/// clock.advance(61);
/// assert_eq!(cache.sweep_now(), 1);
/// assert!(cache.get(id).is_err());
/// ```
pub struct CursorCache {
    inner: Arc<Inner>,
}

impl CursorCache {
    pub fn new(config: CursorCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CursorCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                wake: Condvar::new(),
                clock,
                config,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CursorCacheConfig {
        &self.inner.config
    }

    /// Take ownership of `cursor` under a fresh id. When
    /// `close_connection` is set, evicting or terminating the entry also
    /// closes the cursor's connection.
    pub fn register<C: Cursor + 'static>(
        &self,
        cursor: C,
        ttl_secs: u64,
        close_connection: bool,
    ) -> Result<CursorId> {
        let mut state = self.inner.state.lock();
        let id = self.fresh_id(&state);
        self.insert(&mut state, id, Box::new(cursor), String::new(), ttl_secs, close_connection);
        Ok(id)
    }

    /// Like [`register`](Self::register), remembering the statement the
    /// cursor came from so driver errors raised while paging carry it.
    pub fn register_query<C: Cursor + 'static>(
        &self,
        sql: &str,
        cursor: C,
        ttl_secs: u64,
        close_connection: bool,
    ) -> Result<CursorId> {
        let mut state = self.inner.state.lock();
        let id = self.fresh_id(&state);
        self.insert(&mut state, id, Box::new(cursor), sql.to_string(), ttl_secs, close_connection);
        Ok(id)
    }

    fn fresh_id(&self, state: &State) -> CursorId {
        loop {
            let id = CursorId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
            if !state.entries.contains_key(&id) {
                return id;
            }
        }
    }

    /// Register with the configured default TTL.
    pub fn register_default<C: Cursor + 'static>(&self, cursor: C) -> Result<CursorId> {
        self.register(cursor, self.inner.config.default_ttl_secs, false)
    }

    /// Register under a caller-chosen id. A rejected cursor is closed.
    pub fn register_as<C: Cursor + 'static>(
        &self,
        id: CursorId,
        cursor: C,
        ttl_secs: u64,
        close_connection: bool,
    ) -> Result<CursorId> {
        let mut state = self.inner.state.lock();
        if state.entries.contains_key(&id) {
            drop(state);
            let mut rejected = cursor;
            if let Err(e) = rejected.close() {
                warn!("Failed to close rejected cursor {}: {}", id, e);
            }
            return Err(Error::DuplicateCursor(id));
        }
        self.insert(&mut state, id, Box::new(cursor), String::new(), ttl_secs, close_connection);
        Ok(id)
    }

    fn insert(
        &self,
        state: &mut State,
        id: CursorId,
        cursor: Box<dyn Cursor>,
        sql: String,
        ttl_secs: u64,
        close_connection: bool,
    ) {
        let tracked = Tracked {
            id,
            cursor,
            sql,
            close_connection,
            closed: false,
            exhausted: false,
        };
        state.entries.insert(
            id,
            Slot {
                ttl_secs,
                last_access: self.inner.clock.now_epoch_secs(),
                cursor: Arc::new(Mutex::new(tracked)),
            },
        );
        trace!("Registered cursor {} (ttl {}s)", id, ttl_secs);

        if self.inner.config.auto_sweep && state.sweeper.is_none() {
            self.start_sweeper(state);
        }
    }

    fn start_sweeper(&self, state: &mut State) {
        state.generation += 1;
        let generation = state.generation;
        let inner = Arc::downgrade(&self.inner);
        match thread::Builder::new()
            .name(self.inner.config.thread_name.clone())
            .spawn(move || sweeper_loop(inner, generation))
        {
            Ok(thread) => {
                debug!(
                    "Started cursor sweeper ({}ms interval)",
                    self.inner.config.sweep_interval_ms
                );
                state.sweeper = Some(thread);
            }
            Err(e) => warn!("Failed to start cursor sweeper: {}", e),
        }
    }

    /// The cursor registered under `id`. Counts as an access.
    pub fn get(&self, id: CursorId) -> Result<CursorHandle> {
        let now = self.inner.clock.now_epoch_secs();
        let mut state = self.inner.state.lock();
        let slot = state.entries.get_mut(&id).ok_or(Error::StaleCursor(id))?;
        slot.last_access = now;
        Ok(CursorHandle {
            id,
            cursor: Arc::clone(&slot.cursor),
        })
    }

    /// Look up `id` and run `f` on its cursor. The cache lock is not held
    /// while `f` runs.
    pub fn with_cursor<R>(&self, id: CursorId, f: impl FnOnce(&mut dyn Cursor) -> R) -> Result<R> {
        self.get(id)?.with(f)
    }

    /// Materialize the next (up to) `n` rows of the cursor under `id` as `S`.
    /// Counts as an access. A page shorter than `n` means the cursor ran
    /// out: the entry is terminated and later calls fail with
    /// [`Error::StaleCursor`].
    pub fn next_batch<S: Shape>(
        &self,
        id: CursorId,
        materializer: &Materializer,
        n: usize,
    ) -> Result<Vec<S>> {
        let handle = self.get(id)?;
        let (page, finished) = {
            let mut tracked = handle.cursor.lock();
            if tracked.closed {
                return Err(Error::StaleCursor(id));
            }
            let page = tracked.next_page::<S>(materializer, n)?;
            let finished = tracked.exhausted || page.len() < n;
            (page, finished)
        };
        if finished {
            trace!("Cursor {} exhausted after a page of {}", id, page.len());
            self.terminate(id);
        }
        Ok(page)
    }

    /// Close and forget the cursor registered under `id`. Returns `false`
    /// when there was no such entry.
    pub fn terminate(&self, id: CursorId) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.entries.remove(&id) else {
            return false;
        };
        let sweeper = if state.entries.is_empty() {
            self.inner.stop_sweeper(&mut state)
        } else {
            None
        };
        drop(state);

        slot.cursor.lock().shutdown();
        join(sweeper);
        true
    }

    /// Stop the sweeper and close every cursor.
    pub fn terminate_all(&self) {
        let mut state = self.inner.state.lock();
        let cursors: Vec<_> = state.entries.drain().map(|(_, slot)| slot.cursor).collect();
        let sweeper = self.inner.stop_sweeper(&mut state);
        drop(state);

        close_all(cursors);
        join(sweeper);
    }

    /// Run one eviction pass now. Returns the number of evicted cursors.
    pub fn sweep_now(&self) -> usize {
        let mut state = self.inner.state.lock();
        let evicted = self.inner.evict_idle(&mut state);
        let sweeper = if state.entries.is_empty() {
            self.inner.stop_sweeper(&mut state)
        } else {
            None
        };
        drop(state);

        let count = evicted.len();
        close_all(evicted);
        join(sweeper);
        count
    }

    pub fn contains(&self, id: CursorId) -> bool {
        self.inner.state.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    /// Whether a sweeper thread is currently running.
    pub fn is_sweeping(&self) -> bool {
        self.inner.state.lock().sweeper.is_some()
    }
}

impl Default for CursorCache {
    fn default() -> Self {
        Self::new(CursorCacheConfig::default())
    }
}

impl Drop for CursorCache {
    fn drop(&mut self) {
        self.terminate_all();
    }
}
