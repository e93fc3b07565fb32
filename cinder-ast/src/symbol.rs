#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Globally unique name.
///
/// The only way to obtain a `Symbol` is [`Symbol::fresh`], so two symbols are
/// equal exactly when they come from the same call. The hint is kept for
/// display only and takes no part in equality, ordering or hashing.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    hint: Arc<str>,
}

impl Symbol {
    pub fn fresh(hint: impl AsRef<str>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, AtomicOrdering::Relaxed),
            hint: Arc::from(hint.as_ref()),
        }
    }

    /// A new symbol carrying the same display hint.
    pub fn fresh_like(&self) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, AtomicOrdering::Relaxed),
            hint: Arc::clone(&self.hint),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn hint(&self) -> &str {
        &self.hint
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hint)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.hint, self.id)
    }
}
