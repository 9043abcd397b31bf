//! Bounded in-memory session table.
//!
//! Sessions are keyed by an opaque id and ordered by a monotonic activity
//! counter, so "least recently active" is exact even when wall-clock
//! timestamps collide.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{Session, Turn};
use crate::utils;

struct Entry {
    session: Session,
    /// Activity sequence number; larger is more recent.
    seq: u64,
}

#[derive(Default)]
struct Table {
    entries: HashMap<String, Entry>,
    clock: u64,
}

impl Table {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Drop least-recently-active sessions until there is room for one more.
    fn make_room(&mut self, capacity: usize) {
        while self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                    debug!(session_id = %id, "Evicted least-recently-active session");
                }
                None => break,
            }
        }
    }

    /// Touch an existing session or insert a new one, evicting first if full.
    fn touch_or_insert(&mut self, id: &str, user_id: Option<&str>, capacity: usize) -> &mut Entry {
        let seq = self.tick();
        if !self.entries.contains_key(id) {
            self.make_room(capacity);
        }
        let entry = self.entries.entry(id.to_string()).or_insert_with(|| {
            debug!(session_id = %id, "Created session");
            Entry {
                session: Session::new(id),
                seq,
            }
        });
        entry.seq = seq;
        entry.session.last_active_at = Utc::now();
        if entry.session.user_id.is_none() {
            entry.session.user_id = user_id.map(str::to_string);
        }
        entry
    }
}

/// Process-wide session table with capacity and idle-time bounds.
///
/// All mutation of one session happens under a single lock acquisition, so a
/// turn record is either fully appended or not at all.
pub struct SessionStore {
    table: Mutex<Table>,
    capacity: usize,
    max_turns: usize,
}

/// Turns kept per session unless configured otherwise.
pub const DEFAULT_MAX_TURNS: usize = 50;

impl SessionStore {
    /// Create a store holding at most `capacity` sessions (minimum 1).
    pub fn new(capacity: usize) -> Self {
        SessionStore {
            table: Mutex::new(Table::default()),
            capacity: capacity.max(1),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    /// Keep at most `max_turns` turns per session (minimum 1); older turns
    /// are dropped on append.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get an existing session (marking it active) or create one, returning
    /// its id.
    ///
    /// `None` mints a fresh id. Creating a session when the table is full
    /// evicts the least-recently-active session before inserting.
    pub fn get_or_create(&self, session_id: Option<&str>, user_id: Option<&str>) -> String {
        let id = match session_id.filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => utils::new_session_id(),
        };
        self.lock().touch_or_insert(&id, user_id, self.capacity);
        id
    }

    /// Append a completed turn.
    ///
    /// A session evicted while the turn was in flight is recreated so the
    /// record is not lost. Past the turn cap the oldest turns are dropped.
    pub fn append_turn(&self, session_id: &str, turn: Turn) {
        let mut table = self.lock();
        let turns = &mut table.touch_or_insert(session_id, None, self.capacity).session.turns;
        turns.push(turn);
        if turns.len() > self.max_turns {
            let excess = turns.len() - self.max_turns;
            turns.drain(..excess);
        }
    }

    /// The last `n` turns of a session, oldest first. Does not count as activity.
    pub fn history(&self, session_id: &str, n: usize) -> Vec<Turn> {
        let table = self.lock();
        table
            .entries
            .get(session_id)
            .map(|e| e.session.recent_turns(n).to_vec())
            .unwrap_or_default()
    }

    /// Snapshot of a session without touching it.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.lock().entries.get(session_id).map(|e| e.session.clone())
    }

    /// Remove sessions idle for longer than `idle_timeout` as of `now`.
    ///
    /// Returns the number removed.
    pub fn evict_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> usize {
        let Ok(limit) = chrono::Duration::from_std(idle_timeout) else {
            return 0;
        };
        let mut table = self.lock();
        let before = table.entries.len();
        table
            .entries
            .retain(|_, e| now.signed_duration_since(e.session.last_active_at) <= limit);
        let removed = before - table.entries.len();
        if removed > 0 {
            debug!(removed, "Evicted idle sessions");
        }
        removed
    }

    /// Clear a session's turns, keeping the id.
    pub fn clear(&self, session_id: &str) {
        if let Some(entry) = self.lock().entries.get_mut(session_id) {
            entry.session.turns.clear();
        }
    }

    /// Delete a session. Returns `true` if it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        self.lock().entries.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
