use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

/// Id of an interned symbol.
///
/// Symbols, strings and instance names all share one table; the kind of a
/// value is carried by the [`Value`](crate::Value) variant, not the atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

impl Atom {
    pub const FALSE: Atom = Atom(0);
    pub const TRUE: Atom = Atom(1);
    pub const NIL: Atom = Atom(2);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct Entry {
    value: Arc<str>,
    count: u32,
}

pub struct SymbolsImpl {
    table: Vec<Entry>,
    mappings: HashMap<Arc<str>, Atom, ahash::RandomState>,
}

/// Shared interned-symbol table.
///
/// Cloning the handle shares the table. Entries are never removed, so an
/// [`Atom`] stays valid for the lifetime of the table; the per-entry count
/// only tracks how many installed owners currently reference it.
#[derive(Clone)]
pub struct Symbols(Arc<RwLock<SymbolsImpl>>);

impl SymbolsImpl {
    fn new() -> Self {
        let mut new = Self {
            table: Vec::new(),
            mappings: HashMap::default(),
        };
        // fixed atoms, see Atom::FALSE and friends
        new.get_or_add("FALSE");
        new.get_or_add("TRUE");
        new.get_or_add("nil");
        new
    }

    fn get_or_add(&mut self, value: &str) -> Atom {
        if let Some(&id) = self.mappings.get(value) {
            return id;
        }
        let id = Atom(self.table.len() as u32);
        let interned = Arc::<str>::from(value);
        self.mappings.insert(interned.clone(), id);
        self.table.push(Entry {
            value: interned,
            count: 0,
        });
        id
    }
}

impl Symbols {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(SymbolsImpl::new())))
    }

    pub fn intern(&self, value: &str) -> Atom {
        if let Some(&id) = self.0.read().mappings.get(value) {
            return id;
        }
        self.0.write().get_or_add(value)
    }

    /// Look a name up without interning it.
    pub fn find(&self, value: &str) -> Option<Atom> {
        self.0.read().mappings.get(value).copied()
    }

    pub fn name(&self, atom: Atom) -> Arc<str> {
        self.0
            .read()
            .table
            .get(atom.index())
            .map(|entry| entry.value.clone())
            .unwrap_or_else(|| Arc::from("<unknown>"))
    }

    pub fn retain(&self, atom: Atom) {
        if let Some(entry) = self.0.write().table.get_mut(atom.index()) {
            entry.count += 1;
        }
    }

    pub fn release(&self, atom: Atom) {
        if let Some(entry) = self.0.write().table.get_mut(atom.index()) {
            debug_assert!(entry.count > 0, "symbol released more than retained");
            entry.count = entry.count.saturating_sub(1);
        }
    }

    pub fn count(&self, atom: Atom) -> u32 {
        self.0
            .read()
            .table
            .get(atom.index())
            .map_or(0, |entry| entry.count)
    }

    pub fn len(&self) -> usize {
        self.0.read().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Symbols {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Symbols {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Symbols").field("len", &self.len()).finish()
    }
}
