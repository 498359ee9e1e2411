use crate::{Atom, ClassId, ClassRegistry, InstanceSlot, SlotRef, Value};

/// Default number of buckets in the instance name hash table.
pub const INSTANCE_TABLE_HASH_SIZE: usize = 8191;

const INSTANCE_HASH_PRIME: usize = 131;

/// Generation-tagged arena index of an instance.
///
/// A stale id (its instance was freed and the entry reused) never resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId {
    pub index: u32,
    pub generation: u32,
}

/// Where the value of one template position lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAddress {
    /// Index into [`Instance::slots`].
    Local(u16),
    /// The shared cell on a slot descriptor.
    Shared(SlotRef),
}

#[derive(Debug, Clone, Copy, Default)]
struct Links {
    prev_list: Option<InstanceId>,
    next_list: Option<InstanceId>,
    prev_class: Option<InstanceId>,
    next_class: Option<InstanceId>,
    prev_hash: Option<InstanceId>,
    next_hash: Option<InstanceId>,
}

#[derive(Debug)]
pub struct Instance {
    pub name: Atom,
    pub class: ClassId,
    /// Cells of the non-shared slots.
    pub slots: Vec<InstanceSlot>,
    /// One entry per position of the class's instance template.
    pub slot_addresses: Vec<SlotAddress>,
    /// Outstanding references (dispatches, host pins, pattern matches).
    pub busy: u32,
    /// Deleted; waiting for `busy` to drop to zero.
    pub garbage: bool,
    /// Name and slot symbols are retained.
    pub installed: bool,
    pub initialize_in_progress: bool,
    pub init_slots_called: bool,
    /// Announced to the pattern network.
    pub in_network: bool,
    /// Snapshot of slot values held for the logical-dependency tracker.
    pub basis: Option<Vec<Value>>,
    links: Links,
    linked: bool,
}

impl Instance {
    pub fn new(name: Atom, class: ClassId) -> Self {
        Self {
            name,
            class,
            slots: Vec::new(),
            slot_addresses: Vec::new(),
            busy: 0,
            garbage: false,
            installed: false,
            initialize_in_progress: false,
            init_slots_called: false,
            in_network: false,
            basis: None,
            links: Links::default(),
            linked: false,
        }
    }

    /// Whether the instance is still in the lists, i.e. not deleted.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    instance: Option<Instance>,
}

/// Arena of instances plus the name hash chains, the global list and the
/// per-class lists.
///
/// Deleting an instance unlinks it from every list at once; the arena entry
/// stays valid until [`InstanceStore::free`] is called for it.
#[derive(Debug)]
pub struct InstanceStore {
    entries: Vec<Entry>,
    free: Vec<u32>,
    buckets: Vec<Option<InstanceId>>,
    list_head: Option<InstanceId>,
    list_tail: Option<InstanceId>,
    garbage: Vec<InstanceId>,
    linked_count: usize,
}

impl InstanceStore {
    pub fn new(hash_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            buckets: vec![None; hash_size.max(1)],
            list_head: None,
            list_tail: None,
            garbage: Vec::new(),
            linked_count: 0,
        }
    }

    #[inline]
    fn bucket_of(&self, name: Atom) -> usize {
        name.index().wrapping_mul(INSTANCE_HASH_PRIME) % self.buckets.len()
    }

    /// Place an instance in the arena without linking it anywhere.
    pub fn allocate(&mut self, instance: Instance) -> InstanceId {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.instance = Some(instance);
            return InstanceId {
                index,
                generation: entry.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            instance: Some(instance),
        });
        InstanceId {
            index,
            generation: 0,
        }
    }

    /// Drop an arena entry. Its id, and every copy of it, goes stale.
    pub fn free(&mut self, id: InstanceId) -> Option<Instance> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let instance = entry.instance.take()?;
        debug_assert!(!instance.linked, "freeing a linked instance");
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
        self.garbage.retain(|&g| g != id);
        Some(instance)
    }

    /// Live or garbage instance.
    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        let entry = self.entries.get(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.instance.as_ref()
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.instance.as_mut()
    }

    /// Exists and has not been deleted.
    pub fn is_live(&self, id: InstanceId) -> bool {
        self.get(id).is_some_and(|i| !i.garbage && i.linked)
    }

    // ── Lists ──────────────────────────────────────────────────────

    /// Link into the hash chain, the global list and the class list.
    pub fn link(&mut self, id: InstanceId, classes: &mut ClassRegistry) {
        let Some(instance) = self.get(id) else {
            return;
        };
        if instance.linked {
            return;
        }
        let (name, class) = (instance.name, instance.class);

        let bucket = self.bucket_of(name);
        let head = self.buckets[bucket];
        let list_tail = self.list_tail;
        let class_tail = classes[class].instance_list_bottom;
        {
            let Some(inst) = self.get_mut(id) else {
                return;
            };
            inst.links = Links {
                prev_hash: None,
                next_hash: head,
                prev_list: list_tail,
                next_list: None,
                prev_class: class_tail,
                next_class: None,
            };
            inst.linked = true;
        }

        if let Some(next) = head.and_then(|h| self.get_mut(h)) {
            next.links.prev_hash = Some(id);
        }
        self.buckets[bucket] = Some(id);

        match list_tail.and_then(|t| self.get_mut(t)) {
            Some(tail) => tail.links.next_list = Some(id),
            None => self.list_head = Some(id),
        }
        self.list_tail = Some(id);

        match class_tail.and_then(|t| self.get_mut(t)) {
            Some(tail) => tail.links.next_class = Some(id),
            None => classes[class].instance_list = Some(id),
        }
        classes[class].instance_list_bottom = Some(id);
        self.linked_count += 1;
    }

    /// Remove from every list. The arena entry is untouched.
    pub fn unlink(&mut self, id: InstanceId, classes: &mut ClassRegistry) {
        let Some(instance) = self.get_mut(id) else {
            return;
        };
        if !instance.linked {
            return;
        }
        instance.linked = false;
        let links = std::mem::take(&mut instance.links);
        let (name, class) = (instance.name, instance.class);

        match links.prev_hash.and_then(|p| self.get_mut(p)) {
            Some(prev) => prev.links.next_hash = links.next_hash,
            None => {
                let bucket = self.bucket_of(name);
                self.buckets[bucket] = links.next_hash;
            }
        }
        if let Some(next) = links.next_hash.and_then(|n| self.get_mut(n)) {
            next.links.prev_hash = links.prev_hash;
        }

        match links.prev_list.and_then(|p| self.get_mut(p)) {
            Some(prev) => prev.links.next_list = links.next_list,
            None => self.list_head = links.next_list,
        }
        match links.next_list.and_then(|n| self.get_mut(n)) {
            Some(next) => next.links.prev_list = links.prev_list,
            None => self.list_tail = links.prev_list,
        }

        match links.prev_class.and_then(|p| self.get_mut(p)) {
            Some(prev) => prev.links.next_class = links.next_class,
            None => classes[class].instance_list = links.next_class,
        }
        match links.next_class.and_then(|n| self.get_mut(n)) {
            Some(next) => next.links.prev_class = links.prev_class,
            None => classes[class].instance_list_bottom = links.prev_class,
        }
        self.linked_count -= 1;
    }

    /// Live instance with this name.
    pub fn find_by_name(&self, name: Atom) -> Option<InstanceId> {
        let mut cursor = self.buckets[self.bucket_of(name)];
        while let Some(id) = cursor {
            let instance = self.get(id)?;
            if instance.name == name {
                return Some(id);
            }
            cursor = instance.links.next_hash;
        }
        None
    }

    pub fn first(&self) -> Option<InstanceId> {
        self.list_head
    }

    pub fn next(&self, id: InstanceId) -> Option<InstanceId> {
        self.get(id).and_then(|i| i.links.next_list)
    }

    pub fn first_of_class(&self, class: ClassId, classes: &ClassRegistry) -> Option<InstanceId> {
        classes.get(class).and_then(|c| c.instance_list)
    }

    pub fn next_of_class(&self, id: InstanceId) -> Option<InstanceId> {
        self.get(id).and_then(|i| i.links.next_class)
    }

    /// Ids on the global list, oldest first.
    pub fn ids(&self) -> Vec<InstanceId> {
        let mut ids = Vec::with_capacity(self.linked_count);
        let mut cursor = self.list_head;
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.next(id);
        }
        ids
    }

    /// Ids on the list of exactly `class`.
    pub fn ids_of_class(&self, class: ClassId, classes: &ClassRegistry) -> Vec<InstanceId> {
        let mut ids = Vec::new();
        let mut cursor = self.first_of_class(class, classes);
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.next_of_class(id);
        }
        ids
    }

    /// Number of linked instances.
    pub fn len(&self) -> usize {
        self.linked_count
    }

    pub fn is_empty(&self) -> bool {
        self.linked_count == 0
    }

    // ── Garbage ────────────────────────────────────────────────────

    /// Park an unlinked instance until its references are gone.
    pub fn push_garbage(&mut self, id: InstanceId) {
        if let Some(instance) = self.get_mut(id) {
            instance.garbage = true;
            self.garbage.push(id);
        }
    }

    pub fn garbage(&self) -> &[InstanceId] {
        &self.garbage
    }
}
