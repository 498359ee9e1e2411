use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use crate::{
    Atom, Class, ClassId, SlotDescriptor, SlotNameRegistry, SlotRef, Symbols,
};

/// Growth step of the id → class map.
pub const CLASS_ID_MAP_CHUNK: usize = 30;

/// Depth of the traversal id stack.
pub const MAX_TRAVERSALS: usize = 256;

const TRAVERSAL_RECORD_BYTES: usize = MAX_TRAVERSALS / 8;

/// One bit per class id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassBitMap {
    bits: Vec<u8>,
}

impl ClassBitMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: ClassId) {
        let byte = id.index() / 8;
        if byte >= self.bits.len() {
            self.bits.resize(byte + 1, 0);
        }
        self.bits[byte] |= 1 << (id.index() % 8);
    }

    pub fn clear(&mut self, id: ClassId) {
        if let Some(byte) = self.bits.get_mut(id.index() / 8) {
            *byte &= !(1 << (id.index() % 8));
        }
    }

    pub fn test(&self, id: ClassId) -> bool {
        self.bits
            .get(id.index() / 8)
            .is_some_and(|byte| byte & (1 << (id.index() % 8)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }
}

/// Owner of every class, addressed by dense [`ClassId`]s.
#[derive(Debug)]
pub struct ClassRegistry {
    /// Indexed by id; its length is one past the highest id in use.
    classes: Vec<Option<Class>>,
    names: HashMap<Atom, ClassId, ahash::RandomState>,
    capacity: usize,
    chunk: usize,
    max_traversals: usize,
    traversal_depth: usize,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::with_limits(CLASS_ID_MAP_CHUNK, MAX_TRAVERSALS)
    }

    pub fn with_limits(chunk: usize, max_traversals: usize) -> Self {
        Self {
            classes: Vec::new(),
            names: HashMap::default(),
            capacity: 0,
            chunk: chunk.max(1),
            max_traversals: max_traversals.clamp(1, MAX_TRAVERSALS),
            traversal_depth: 0,
        }
    }

    // ── Ids ────────────────────────────────────────────────────────

    /// Give `class` the lowest free id and take ownership of it.
    pub fn install(&mut self, mut class: Class) -> ClassId {
        let slot = match self.classes.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                let len = self.classes.len();
                assert!(len < u16::MAX as usize, "class id space exhausted");
                if len == self.capacity {
                    self.capacity = (len + self.chunk).min(u16::MAX as usize);
                    self.classes.reserve_exact(self.capacity - len);
                }
                self.classes.push(None);
                len
            }
        };
        let id = ClassId(slot as u16);
        class.id = id;
        class.traversal_record = vec![0; TRAVERSAL_RECORD_BYTES];
        self.names.insert(class.name, id);
        self.classes[slot] = Some(class);
        id
    }

    fn free_id(&mut self, id: ClassId) -> Option<Class> {
        let class = self.classes.get_mut(id.index())?.take();
        while matches!(self.classes.last(), Some(None)) {
            self.classes.pop();
        }
        class
    }

    /// One past the highest id in use. Shrinks only when trailing ids are
    /// freed, never by compaction.
    pub fn id_map_len(&self) -> usize {
        self.classes.len()
    }

    /// Allocated id slots; grows in chunks.
    pub fn id_map_capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut Class> {
        self.classes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn find(&self, name: Atom) -> Option<ClassId> {
        self.names.get(&name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    // ── Links ──────────────────────────────────────────────────────

    /// Insert `superclass` into the direct superclasses of `class`, at
    /// `position` or at the end.
    pub fn add_superclass_link(&mut self, class: ClassId, superclass: ClassId, position: Option<usize>) {
        let links = &mut self[class].direct_superclasses;
        if links.contains(&superclass) {
            return;
        }
        let at = position.unwrap_or(links.len()).min(links.len());
        links.insert(at, superclass);
    }

    pub fn remove_superclass_link(&mut self, class: ClassId, superclass: ClassId) {
        self[class].direct_superclasses.retain(|&c| c != superclass);
    }

    pub fn add_subclass_link(&mut self, class: ClassId, subclass: ClassId, position: Option<usize>) {
        let links = &mut self[class].direct_subclasses;
        if links.contains(&subclass) {
            return;
        }
        let at = position.unwrap_or(links.len()).min(links.len());
        links.insert(at, subclass);
    }

    pub fn remove_subclass_link(&mut self, class: ClassId, subclass: ClassId) {
        self[class].direct_subclasses.retain(|&c| c != subclass);
    }

    /// Precedence list of `class`: itself first, then a depth-first walk of
    /// the direct superclasses in declaration order. A class reached a
    /// second time keeps the position of its first visit.
    pub fn compute_linearization(&self, class: ClassId) -> Vec<ClassId> {
        let mut order = vec![class];
        self.collect_superclasses(class, &mut order);
        order
    }

    fn collect_superclasses(&self, class: ClassId, order: &mut Vec<ClassId>) {
        for &sup in &self[class].direct_superclasses {
            if order.contains(&sup) {
                continue;
            }
            order.push(sup);
            self.collect_superclasses(sup, order);
        }
    }

    /// Recompute and store the precedence list of `class`.
    pub fn linearize(&mut self, class: ClassId) {
        let order = self.compute_linearization(class);
        self[class].all_superclasses = order;
    }

    pub fn is_subclass_or_same(&self, class: ClassId, ancestor: ClassId) -> bool {
        class == ancestor
            || self
                .get(class)
                .is_some_and(|c| c.all_superclasses.contains(&ancestor))
    }

    pub fn is_class_in_use(&self, class: ClassId) -> bool {
        let c = &self[class];
        c.busy > 0
            || c
                .direct_subclasses
                .iter()
                .any(|&sub| self.is_class_in_use(sub))
    }

    // ── Slots ──────────────────────────────────────────────────────

    #[inline]
    pub fn slot(&self, slot: SlotRef) -> &SlotDescriptor {
        &self[slot.class].slots[slot.index as usize]
    }

    #[inline]
    pub fn slot_mut(&mut self, slot: SlotRef) -> &mut SlotDescriptor {
        &mut self[slot.class].slots[slot.index as usize]
    }

    /// Rebuild the instance template, local slot count and slot-name map of
    /// `class` from its precedence list.
    ///
    /// Slots are laid out most general class first. A slot redefined by a
    /// more specific class keeps its position but uses the more specific
    /// descriptor.
    pub fn build_template(&mut self, class: ClassId) {
        let mut template: Vec<SlotRef> = Vec::new();
        let mut names = Vec::new();
        for &owner in self[class].all_superclasses.iter().rev() {
            for (index, desc) in self[owner].slots.iter().enumerate() {
                let slot = SlotRef {
                    class: owner,
                    index: index as u16,
                };
                match names.iter().position(|&n| n == desc.slot_name) {
                    Some(pos) => template[pos] = slot,
                    None => {
                        names.push(desc.slot_name);
                        template.push(slot);
                    }
                }
            }
        }

        let map_len = names.iter().map(|n| n.index() + 1).max().unwrap_or(0);
        let mut slot_name_map = vec![0u16; map_len];
        for (pos, name) in names.iter().enumerate() {
            slot_name_map[name.index()] = pos as u16 + 1;
        }
        let local_slot_count = template.iter().filter(|&&s| !self.slot(s).shared).count();

        let c = &mut self[class];
        c.instance_template = template;
        c.slot_name_map = slot_name_map;
        c.local_slot_count = local_slot_count;
    }

    // ── Deletion ───────────────────────────────────────────────────

    /// Remove a class that is not in use and has no subclasses.
    ///
    /// Releases the slot names of its local slots and returns the class so
    /// the caller can dispose of handler bodies.
    pub fn delete_class(
        &mut self,
        class: ClassId,
        slot_names: &mut SlotNameRegistry,
        symbols: &Symbols,
    ) -> Option<Class> {
        {
            let c = self.get(class)?;
            debug_assert!(!self.is_class_in_use(class), "deleting a class in use");
            debug_assert!(c.direct_subclasses.is_empty(), "deleting a class with subclasses");
        }
        let supers = self[class].direct_superclasses.clone();
        for sup in supers {
            self.remove_subclass_link(sup, class);
        }
        let removed = self.free_id(class)?;
        self.names.remove(&removed.name);
        for desc in &removed.slots {
            slot_names.release(symbols, desc.slot_name);
        }
        log::debug!("deleted class {} ({:?})", symbols.name(removed.name), class);
        Some(removed)
    }

    /// Set or clear the bit of `class` and every class below it.
    pub fn mark_subtree_bitmap(&self, bitmap: &mut ClassBitMap, class: ClassId, set: bool) {
        if set {
            bitmap.set(class);
        } else {
            bitmap.clear(class);
        }
        for &sub in &self[class].direct_subclasses {
            self.mark_subtree_bitmap(bitmap, sub, set);
        }
    }

    // ── Traversal ids ──────────────────────────────────────────────

    /// Acquire a traversal id. Ids are released in reverse order of
    /// acquisition; `None` when the stack is exhausted.
    pub fn get_traversal_id(&mut self) -> Option<usize> {
        if self.traversal_depth >= self.max_traversals {
            return None;
        }
        let id = self.traversal_depth;
        self.traversal_depth += 1;
        let (byte, bit) = (id / 8, 1u8 << (id % 8));
        for class in self.classes.iter_mut().flatten() {
            class.traversal_record[byte] &= !bit;
        }
        Some(id)
    }

    pub fn release_traversal_id(&mut self) {
        debug_assert!(self.traversal_depth > 0, "traversal id released twice");
        self.traversal_depth = self.traversal_depth.saturating_sub(1);
    }

    pub fn test_traversed(&self, class: ClassId, traversal: usize) -> bool {
        self[class].traversal_record[traversal / 8] & (1 << (traversal % 8)) != 0
    }

    pub fn set_traversed(&mut self, class: ClassId, traversal: usize) {
        self[class].traversal_record[traversal / 8] |= 1 << (traversal % 8);
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<ClassId> for ClassRegistry {
    type Output = Class;

    fn index(&self, id: ClassId) -> &Class {
        match self.get(id) {
            Some(class) => class,
            None => panic!("no class with id {id:?}"),
        }
    }
}

impl IndexMut<ClassId> for ClassRegistry {
    fn index_mut(&mut self, id: ClassId) -> &mut Class {
        match self.get_mut(id) {
            Some(class) => class,
            None => panic!("no class with id {id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Accessors, Constraint, DefaultValue, InstanceSlot, SlotAccess, SlotNameId,
    };

    fn class(reg: &mut ClassRegistry, symbols: &Symbols, name: &str, supers: &[ClassId]) -> ClassId {
        let id = reg.install(Class::new(symbols.intern(name)));
        for &sup in supers {
            reg.add_superclass_link(id, sup, None);
            reg.add_subclass_link(sup, id, None);
        }
        reg.linearize(id);
        id
    }

    fn slot(class: ClassId, name: SlotNameId, atom: Atom, shared: bool) -> SlotDescriptor {
        SlotDescriptor {
            slot_name: name,
            name: atom,
            class,
            shared,
            multiple: false,
            default: DefaultValue::Derive,
            access: SlotAccess::ReadWrite,
            public: true,
            reactive: true,
            accessors: Accessors::all(),
            constraint: Constraint::any(),
            override_message: atom,
            shared_value: InstanceSlot::new(SlotRef {
                class,
                index: 0,
            }),
            shared_count: 0,
        }
    }

    // ── Ids ────────────────────────────────────────────────────────

    #[test]
    fn ids_are_reused_lowest_first() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, &symbols, "A", &[]);
        let b = class(&mut reg, &symbols, "B", &[]);
        let c = class(&mut reg, &symbols, "C", &[]);
        assert_eq!((a, b, c), (ClassId(0), ClassId(1), ClassId(2)));
        assert_eq!(reg.id_map_len(), 3);
        assert_eq!(reg.id_map_capacity(), CLASS_ID_MAP_CHUNK);

        reg.delete_class(b, &mut names, &symbols);
        assert!(reg.find(symbols.intern("B")).is_none());
        let d = class(&mut reg, &symbols, "D", &[]);
        assert_eq!(d, ClassId(1));
    }

    #[test]
    fn id_map_trims_trailing_holes_only() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        let mut reg = ClassRegistry::with_limits(2, MAX_TRAVERSALS);
        let a = class(&mut reg, &symbols, "A", &[]);
        let b = class(&mut reg, &symbols, "B", &[]);
        let c = class(&mut reg, &symbols, "C", &[]);
        assert_eq!(reg.id_map_len(), 3);
        assert_eq!(reg.id_map_capacity(), 4);

        reg.delete_class(a, &mut names, &symbols);
        assert_eq!(reg.id_map_len(), 3);
        reg.delete_class(c, &mut names, &symbols);
        assert_eq!(reg.id_map_len(), 2);
        assert!(reg.get(b).is_some());
        assert_eq!(reg.id_map_capacity(), 4);
    }

    // ── Linearization ──────────────────────────────────────────────

    #[test]
    fn chain_linearization() {
        let symbols = Symbols::new();
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, &symbols, "A", &[]);
        let b = class(&mut reg, &symbols, "B", &[a]);
        let c = class(&mut reg, &symbols, "C", &[b]);
        assert_eq!(reg[c].all_superclasses, vec![c, b, a]);
        assert!(reg.is_subclass_or_same(c, a));
        assert!(!reg.is_subclass_or_same(a, c));
    }

    #[test]
    fn diamond_keeps_first_seen_order() {
        let symbols = Symbols::new();
        let mut reg = ClassRegistry::new();
        let top = class(&mut reg, &symbols, "TOP", &[]);
        let left = class(&mut reg, &symbols, "LEFT", &[top]);
        let right = class(&mut reg, &symbols, "RIGHT", &[top]);
        let bottom = class(&mut reg, &symbols, "BOTTOM", &[left, right]);
        assert_eq!(reg[bottom].all_superclasses, vec![bottom, left, top, right]);
        // deterministic for identical input
        assert_eq!(reg.compute_linearization(bottom), reg[bottom].all_superclasses);
    }

    // ── Template ───────────────────────────────────────────────────

    #[test]
    fn template_puts_general_slots_first() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        let mut reg = ClassRegistry::new();
        let x = symbols.intern("x");
        let z = symbols.intern("z");
        let xid = names.intern(&symbols, x, None);
        let zid = names.intern(&symbols, z, None);

        let point = class(&mut reg, &symbols, "POINT", &[]);
        reg[point].slots.push(slot(point, xid, x, false));
        let point3 = class(&mut reg, &symbols, "POINT3D", &[point]);
        reg[point3].slots.push(slot(point3, zid, z, true));
        reg[point3].slots.push(slot(point3, xid, x, false));
        reg.build_template(point3);

        let c = &reg[point3];
        assert_eq!(
            c.instance_template,
            vec![
                SlotRef { class: point3, index: 1 },
                SlotRef { class: point3, index: 0 },
            ]
        );
        assert_eq!(c.template_position(xid), Some(0));
        assert_eq!(c.template_position(zid), Some(1));
        assert_eq!(c.local_slot_count, 1);
    }

    // ── Use and deletion ───────────────────────────────────────────

    #[test]
    fn in_use_propagates_from_subclasses() {
        let symbols = Symbols::new();
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, &symbols, "A", &[]);
        let b = class(&mut reg, &symbols, "B", &[a]);
        assert!(!reg.is_class_in_use(a));
        reg[b].busy += 1;
        assert!(reg.is_class_in_use(a));
    }

    #[test]
    fn delete_releases_slot_names_and_links() {
        let symbols = Symbols::new();
        let mut names = SlotNameRegistry::new();
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, &symbols, "A", &[]);
        let b = class(&mut reg, &symbols, "B", &[a]);
        let y = symbols.intern("y");
        let yid = names.intern(&symbols, y, None);
        reg[b].slots.push(slot(b, yid, y, false));

        let removed = reg.delete_class(b, &mut names, &symbols);
        assert!(removed.is_some());
        assert!(reg[a].direct_subclasses.is_empty());
        assert!(names.find(y).is_none());
    }

    #[test]
    fn subtree_bitmap() {
        let symbols = Symbols::new();
        let mut reg = ClassRegistry::new();
        let a = class(&mut reg, &symbols, "A", &[]);
        let b = class(&mut reg, &symbols, "B", &[a]);
        let c = class(&mut reg, &symbols, "C", &[]);
        let mut bitmap = ClassBitMap::new();
        reg.mark_subtree_bitmap(&mut bitmap, a, true);
        assert!(bitmap.test(a) && bitmap.test(b) && !bitmap.test(c));
        reg.mark_subtree_bitmap(&mut bitmap, a, false);
        assert!(bitmap.is_empty());
    }

    // ── Traversal ids ──────────────────────────────────────────────

    #[test]
    fn traversal_ids_are_stacked() {
        let symbols = Symbols::new();
        let mut reg = ClassRegistry::with_limits(CLASS_ID_MAP_CHUNK, 2);
        let a = class(&mut reg, &symbols, "A", &[]);

        let t0 = reg.get_traversal_id().unwrap();
        reg.set_traversed(a, t0);
        let t1 = reg.get_traversal_id().unwrap();
        assert_ne!(t0, t1);
        assert!(reg.test_traversed(a, t0));
        assert!(!reg.test_traversed(a, t1));
        assert!(reg.get_traversal_id().is_none());

        reg.release_traversal_id();
        reg.release_traversal_id();
        // reacquiring clears stale marks
        let again = reg.get_traversal_id().unwrap();
        assert_eq!(again, t0);
        assert!(!reg.test_traversed(a, again));
    }
}
