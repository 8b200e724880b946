//! Flat arena owning every node of one compiled formula.
//!
//! Nodes live in a contiguous `Vec` and reference each other by
//! [`ExprId`] index; interned strings (symbols, fact names, preserved
//! printed forms) are owned by the arena and shared by `Rc`, so
//! anything a node points at outlives the node.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashSet;

use crate::expr::Expr;

/// Process-wide arena id source. Ids are never reused, so stale cache
/// entries in a long-lived context can never be mistaken for entries
/// of a newer arena.
static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Index of a node inside its [`ExprArena`].
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

#[cold]
#[inline(never)]
fn panic_capacity_exceeded(len: usize) -> ! {
    panic!("arena capacity exceeded: {len} expressions, max is {}", u32::MAX)
}

/// Contiguous storage for all expressions of a compiled formula.
pub struct ExprArena {
    exprs: Vec<Expr>,
    strings: FxHashSet<Rc<str>>,
    arena_id: u64,
    next_fact_slot: u32,
    next_memo_slot: u32,
}

impl Default for ExprArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprArena {
    pub fn new() -> Self {
        ExprArena {
            exprs: Vec::new(),
            strings: FxHashSet::default(),
            arena_id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            next_fact_slot: 0,
            next_memo_slot: 0,
        }
    }

    /// Create with estimated capacity based on source size.
    /// Heuristic: one node per eight bytes of formula text.
    pub fn with_capacity(source_len: usize) -> Self {
        let mut arena = Self::new();
        arena.exprs.reserve(source_len / 8);
        arena
    }

    /// Identity of this arena generation; caches key on it.
    #[inline]
    pub fn arena_id(&self) -> u64 {
        self.arena_id
    }

    /// Intern a string; repeated symbols and names share one allocation.
    pub fn intern(&mut self, s: &str) -> Rc<str> {
        if let Some(existing) = self.strings.get(s) {
            return existing.clone();
        }
        let rc: Rc<str> = Rc::from(s);
        self.strings.insert(rc.clone());
        rc
    }

    /// Store a node, returning its id.
    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        let index = self.exprs.len();
        if index > u32::MAX as usize {
            panic_capacity_exceeded(index);
        }
        self.exprs.push(expr);
        ExprId(index as u32)
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub(crate) fn next_fact_slot(&mut self) -> u32 {
        let slot = self.next_fact_slot;
        self.next_fact_slot += 1;
        slot
    }

    pub(crate) fn next_memo_slot(&mut self) -> u32 {
        let slot = self.next_memo_slot;
        self.next_memo_slot += 1;
        slot
    }

    /// Drop every node and interned string, keeping the storage for
    /// reuse. The arena takes a fresh identity so caches keyed on the
    /// old one lapse.
    pub fn clean(&mut self) {
        self.exprs.clear();
        self.strings.clear();
        self.arena_id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        self.next_fact_slot = 0;
        self.next_memo_slot = 0;
    }
}
