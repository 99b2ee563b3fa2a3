//! Statement Cache - fixed slot array with LRU reuse
//!
//! **Purpose**: Skip the engine's prepare step for SQL text that was executed
//! before.
//!
//! **Key**: the exact remaining SQL text from the checkout offset. Equal text
//! always compiles to the same first statement, so a slot also remembers how
//! much of that text the statement used.
//!
//! **Ownership**: a statement handle has exactly one owner at a time. Idle
//! handles live in their slot; a checked-out handle lives in the
//! [`CachedStatement`] given to the caller, and its slot is marked
//! `checked_out` so it is neither matched nor evicted until checkin.

use crate::engine::Engine;
use crate::Result;
use ahash::RandomState;
use tracing::{debug, trace, warn};

/// A statement handle on loan from the cache.
///
/// Must go back through [`StatementCache::checkin`] or
/// [`StatementCache::evict`] on the cache that issued it.
#[derive(Debug)]
pub struct CachedStatement<S> {
    stmt: S,
    /// `None` when the statement bypassed the cache.
    slot: Option<usize>,
}

impl<S> CachedStatement<S> {
    pub fn stmt(&self) -> &S {
        &self.stmt
    }

    pub fn stmt_mut(&mut self) -> &mut S {
        &mut self.stmt
    }

    /// Whether checkin will keep this statement for reuse.
    pub fn is_cached(&self) -> bool {
        self.slot.is_some()
    }
}

/// Result of [`StatementCache::checkout`].
#[derive(Debug)]
pub struct Checkout<S> {
    /// `None` when the text held nothing executable.
    pub statement: Option<CachedStatement<S>>,
    /// Length of the statement text itself.
    pub sql_len: usize,
    /// Bytes up to the start of the next statement (statement text plus any
    /// whitespace and `;` separators after it).
    pub consumed: usize,
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Checkouts served from an idle slot
    pub hits: u64,
    /// Checkouts that had to prepare
    pub misses: u64,
    /// Idle statements finalized to make room
    pub evictions: u64,
    /// Prepared statements handed out without a slot
    pub bypassed: u64,
    /// Slots currently holding a statement (idle or checked out)
    pub size: usize,
    /// Slots currently checked out
    pub in_use: usize,
    /// Number of slots
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheSlot<S> {
    checked_out: bool,
    /// Present exactly when the slot is keyed and idle.
    handle: Option<S>,
    key: Option<Box<str>>,
    hash: u64,
    sql_len: usize,
    consumed: usize,
    lru_stamp: u64,
}

impl<S> CacheSlot<S> {
    fn empty() -> Self {
        Self {
            checked_out: false,
            handle: None,
            key: None,
            hash: 0,
            sql_len: 0,
            consumed: 0,
            lru_stamp: 0,
        }
    }

    fn is_idle(&self) -> bool {
        !self.checked_out && self.handle.is_some()
    }

    fn matches(&self, hash: u64, text: &str) -> bool {
        self.hash == hash && self.key.as_deref() == Some(text)
    }
}

/// Skip the whitespace and `;` separators that follow a statement.
fn skip_separators(text: &str, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b';') {
        i += 1;
    }
    i
}

/// Fixed-capacity statement cache
pub struct StatementCache<S> {
    slots: Vec<CacheSlot<S>>,
    hasher: RandomState,
    /// Monotonic LRU counter
    next_stamp: u64,
    max_sql_len: usize,
    stats: CacheStats,
}

impl<S> StatementCache<S> {
    /// Create a cache with `capacity` slots; 0 makes it a pass-through.
    pub fn new(capacity: usize, max_sql_len: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| CacheSlot::empty()).collect(),
            hasher: RandomState::new(),
            next_stamp: 0,
            max_sql_len,
            stats: CacheStats {
                capacity,
                ..Default::default()
            },
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Obtain a statement for the text starting at `offset`.
    ///
    /// A matching idle slot is handed out without calling the engine.
    /// Otherwise the engine prepares the statement and, when caching is
    /// allowed, it is installed in an empty slot or in place of the least
    /// recently used idle one. With every slot checked out the statement
    /// bypasses the cache.
    pub fn checkout<E>(&mut self, engine: &mut E, sql: &str, offset: usize, can_cache: bool) -> Result<Checkout<S>>
    where
        E: Engine<Statement = S>,
    {
        let text = &sql[offset..];
        let cacheable = can_cache && !self.slots.is_empty() && text.len() <= self.max_sql_len;
        let hash = if cacheable { self.hasher.hash_one(text) } else { 0 };

        if cacheable {
            if let Some(index) = self.slots.iter().position(|s| s.is_idle() && s.matches(hash, text)) {
                let slot = &mut self.slots[index];
                slot.checked_out = true;
                self.stats.hits += 1;
                trace!("[StatementCache] hit slot {}", index);
                return Ok(Checkout {
                    statement: slot.handle.take().map(|stmt| CachedStatement {
                        stmt,
                        slot: Some(index),
                    }),
                    sql_len: slot.sql_len,
                    consumed: slot.consumed,
                });
            }
        }

        self.stats.misses += 1;
        // Nothing below touches a slot until prepare has succeeded.
        let prepared = engine.prepare(text)?;
        let sql_len = prepared.consumed;
        let consumed = skip_separators(text, sql_len);
        let Some(stmt) = prepared.statement else {
            return Ok(Checkout {
                statement: None,
                sql_len,
                consumed,
            });
        };

        let slot = if cacheable && !self.slots.iter().any(|s| s.matches(hash, text)) {
            self.claim_slot(engine)
        } else {
            None
        };

        match slot {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.checked_out = true;
                slot.key = Some(text.into());
                slot.hash = hash;
                slot.sql_len = sql_len;
                slot.consumed = consumed;
                debug!("[StatementCache] prepared into slot {} ({} bytes)", index, sql_len);
            }
            None => {
                self.stats.bypassed += 1;
                trace!("[StatementCache] prepared without a slot ({} bytes)", sql_len);
            }
        }

        Ok(Checkout {
            statement: Some(CachedStatement { stmt, slot }),
            sql_len,
            consumed,
        })
    }

    /// Pick a slot for a freshly prepared statement: the first empty one,
    /// else the idle one with the oldest stamp (finalizing its statement).
    fn claim_slot<E>(&mut self, engine: &mut E) -> Option<usize>
    where
        E: Engine<Statement = S>,
    {
        if let Some(index) = self.slots.iter().position(|s| s.key.is_none() && !s.checked_out) {
            return Some(index);
        }

        let index = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_idle())
            .min_by_key(|(_, s)| s.lru_stamp)
            .map(|(i, _)| i)?;

        let victim = std::mem::replace(&mut self.slots[index], CacheSlot::empty());
        if let Some(stmt) = victim.handle {
            if let Err(e) = engine.finalize(stmt) {
                warn!("[StatementCache] finalize of evicted statement failed: {}", e);
            }
        }
        self.stats.evictions += 1;
        debug!("[StatementCache] evicted slot {}", index);
        Some(index)
    }

    /// Give a statement back.
    ///
    /// A cached statement is reset, has its bindings cleared, and becomes the
    /// most recently used idle entry. A bypass statement is finalized. If the
    /// reset fails the statement is finalized and its slot emptied; the reset
    /// error is still returned.
    pub fn checkin<E>(&mut self, engine: &mut E, statement: CachedStatement<S>) -> Result<()>
    where
        E: Engine<Statement = S>,
    {
        let CachedStatement { mut stmt, slot } = statement;
        let Some(index) = slot else {
            return engine.finalize(stmt);
        };

        match engine
            .reset(&mut stmt)
            .and_then(|_| engine.clear_bindings(&mut stmt))
        {
            Ok(()) => {
                self.next_stamp += 1;
                let slot = &mut self.slots[index];
                slot.handle = Some(stmt);
                slot.checked_out = false;
                slot.lru_stamp = self.next_stamp;
                Ok(())
            }
            Err(e) => {
                self.slots[index] = CacheSlot::empty();
                if let Err(finalize) = engine.finalize(stmt) {
                    warn!("[StatementCache] finalize after failed reset also failed: {}", finalize);
                }
                Err(e)
            }
        }
    }

    /// Finalize a statement regardless of cache membership and forget its slot.
    pub fn evict<E>(&mut self, engine: &mut E, statement: CachedStatement<S>) -> Result<()>
    where
        E: Engine<Statement = S>,
    {
        let CachedStatement { stmt, slot } = statement;
        if let Some(index) = slot {
            self.slots[index] = CacheSlot::empty();
        }
        engine.finalize(stmt)
    }

    /// Finalize every idle statement. Checked-out statements stay with their
    /// owners and come back through checkin as usual.
    pub fn clear<E>(&mut self, engine: &mut E) -> Result<()>
    where
        E: Engine<Statement = S>,
    {
        let mut first_error = None;
        for slot in self.slots.iter_mut().filter(|s| !s.checked_out) {
            if let Some(stmt) = std::mem::replace(slot, CacheSlot::empty()).handle {
                if let Err(e) = engine.finalize(stmt) {
                    warn!("[StatementCache] finalize during clear failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.slots.iter().filter(|s| s.key.is_some()).count(),
            in_use: self.slots.iter().filter(|s| s.checked_out).count(),
            ..self.stats.clone()
        }
    }
}
