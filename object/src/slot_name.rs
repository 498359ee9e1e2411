use crate::{Atom, Symbols};

/// Number of hash buckets in the slot-name table.
pub const SLOT_NAME_TABLE_HASH_SIZE: usize = 167;

const SLOT_NAME_HASH_PRIME: usize = 127;

/// Small dense id of a slot name, shared by every class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotNameId(pub u16);

impl SlotNameId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct SlotName {
    pub name: Atom,
    pub id: SlotNameId,
    /// `put-<name>`, the message used to write the slot.
    pub put_handler_name: Atom,
    pub use_count: u32,
}

/// Global table mapping slot-name symbols to [`SlotNameId`]s.
#[derive(Debug)]
pub struct SlotNameRegistry {
    buckets: Vec<Vec<SlotName>>,
    next_id: u16,
    /// Ids below `next_id` whose name was released.
    free: Vec<u16>,
}

#[inline]
fn bucket_of(name: Atom) -> usize {
    (name.index().wrapping_mul(SLOT_NAME_HASH_PRIME)) % SLOT_NAME_TABLE_HASH_SIZE
}

impl SlotNameRegistry {
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); SLOT_NAME_TABLE_HASH_SIZE],
            next_id: 0,
            free: Vec::new(),
        }
    }

    /// Add a reference to `name`, creating the entry on first use.
    ///
    /// `forced_id` is only used when restoring a saved image; a forced id
    /// already held by a different name means the image does not match this
    /// process and is fatal.
    pub fn intern(
        &mut self,
        symbols: &Symbols,
        name: Atom,
        forced_id: Option<SlotNameId>,
    ) -> SlotNameId {
        let bucket = bucket_of(name);
        if let Some(entry) = self.buckets[bucket].iter_mut().find(|e| e.name == name) {
            if let Some(forced) = forced_id {
                assert_eq!(
                    entry.id, forced,
                    "slot name {} already has id {:?}, cannot force {:?}",
                    symbols.name(name),
                    entry.id,
                    forced
                );
            }
            entry.use_count += 1;
            return entry.id;
        }

        let id = match forced_id {
            Some(forced) => {
                if let Some(other) = self.lookup_by_id(forced) {
                    panic!(
                        "slot name id {:?} already in use by {}",
                        forced,
                        symbols.name(other.name)
                    );
                }
                if forced.0 >= self.next_id {
                    self.free.extend(self.next_id..forced.0);
                    self.next_id = forced.0 + 1;
                } else {
                    self.free.retain(|&free| free != forced.0);
                }
                forced
            }
            None => self.fresh_id(),
        };

        symbols.retain(name);
        let put_handler_name = symbols.intern(&format!("put-{}", symbols.name(name)));
        symbols.retain(put_handler_name);

        log::debug!("slot name {} -> {:?}", symbols.name(name), id);
        self.buckets[bucket].push(SlotName {
            name,
            id,
            put_handler_name,
            use_count: 1,
        });
        id
    }

    /// Drop one reference; the entry goes away when nothing uses it.
    pub fn release(&mut self, symbols: &Symbols, id: SlotNameId) {
        for bucket in self.buckets.iter_mut() {
            let Some(pos) = bucket.iter().position(|e| e.id == id) else {
                continue;
            };
            let entry = &mut bucket[pos];
            entry.use_count = entry.use_count.saturating_sub(1);
            if entry.use_count == 0 {
                let entry = bucket.remove(pos);
                symbols.release(entry.name);
                symbols.release(entry.put_handler_name);
                self.free.push(entry.id.0);
            }
            return;
        }
    }

    /// Lowest released id, or the next unused one.
    fn fresh_id(&mut self) -> SlotNameId {
        if let Some(pos) = (0..self.free.len()).min_by_key(|&i| self.free[i]) {
            return SlotNameId(self.free.swap_remove(pos));
        }
        let id = SlotNameId(self.next_id);
        assert!(self.next_id < u16::MAX, "slot name id space exhausted");
        self.next_id += 1;
        id
    }

    pub fn find(&self, name: Atom) -> Option<&SlotName> {
        self.buckets[bucket_of(name)].iter().find(|e| e.name == name)
    }

    /// Linear scan; only used when resolving slot references, never per send.
    pub fn lookup_by_id(&self, id: SlotNameId) -> Option<&SlotName> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter())
            .find(|e| e.id == id)
    }

    /// Upper bound (exclusive) of ids handed out so far.
    pub fn id_limit(&self) -> usize {
        self.next_id as usize
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SlotNameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_shares_entries() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        let x = symbols.intern("x");
        let a = names.intern(&symbols, x, None);
        let b = names.intern(&symbols, x, None);
        assert_eq!(a, b);
        assert_eq!(names.find(x).map(|e| e.use_count), Some(2));
        assert_eq!(
            &*symbols.name(names.find(x).map(|e| e.put_handler_name).unwrap()),
            "put-x"
        );
    }

    #[test]
    fn release_deletes_at_zero() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        let x = symbols.intern("x");
        let id = names.intern(&symbols, x, None);
        names.intern(&symbols, x, None);
        names.release(&symbols, id);
        assert!(names.lookup_by_id(id).is_some());
        names.release(&symbols, id);
        assert!(names.lookup_by_id(id).is_none());
        assert!(names.is_empty());
        assert_eq!(symbols.count(x), 0);
    }

    #[test]
    fn released_ids_are_reused() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        let a = names.intern(&symbols, symbols.intern("a"), None);
        let b = names.intern(&symbols, symbols.intern("b"), None);
        names.release(&symbols, a);
        let c = names.intern(&symbols, symbols.intern("c"), None);
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(names.id_limit(), 2);
    }

    #[test]
    fn define_release_churn_stays_bounded() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        for round in 0..(u16::MAX as usize + 10) {
            let name = symbols.intern(&format!("s{}", round % 7));
            let id = names.intern(&symbols, name, None);
            names.release(&symbols, id);
        }
        assert!(names.is_empty());
        assert_eq!(names.id_limit(), 1);
    }

    #[test]
    fn forced_id_is_honoured() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        let id = names.intern(&symbols, symbols.intern("z"), Some(SlotNameId(40)));
        assert_eq!(id, SlotNameId(40));
        let next = names.intern(&symbols, symbols.intern("w"), None);
        assert_eq!(next, SlotNameId(0));
        names.intern(&symbols, symbols.intern("v"), Some(SlotNameId(1)));
        assert_eq!(names.intern(&symbols, symbols.intern("u"), None), SlotNameId(2));
        assert_eq!(names.id_limit(), 41);
    }

    #[test]
    #[should_panic(expected = "already in use")]
    fn forced_id_collision_is_fatal() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        names.intern(&symbols, symbols.intern("a"), Some(SlotNameId(3)));
        names.intern(&symbols, symbols.intern("b"), Some(SlotNameId(3)));
    }
}
