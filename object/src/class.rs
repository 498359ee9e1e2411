use crate::{Atom, Handler, HandlerType, InstanceId, SlotDescriptor, SlotNameId, SlotRef};

/// Dense class id, reused after a class is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u16);

impl ClassId {
    /// Id of a class that has not been installed in a registry yet.
    pub const UNASSIGNED: ClassId = ClassId(u16::MAX);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassFlags: u8 {
        /// No direct instances.
        const ABSTRACT = 1 << 0;
        /// Instances take part in pattern matching.
        const REACTIVE = 1 << 1;
        /// Bootstrapped by the runtime; cannot be deleted.
        const SYSTEM = 1 << 2;
    }
}

#[derive(Debug)]
pub struct Class {
    pub name: Atom,
    pub id: ClassId,
    pub flags: ClassFlags,
    pub direct_superclasses: Vec<ClassId>,
    pub direct_subclasses: Vec<ClassId>,
    /// Linearized precedence list, the class itself first.
    pub all_superclasses: Vec<ClassId>,
    /// Slots declared by this class.
    pub slots: Vec<SlotDescriptor>,
    /// Every slot of an instance, inherited ones included.
    pub instance_template: Vec<SlotRef>,
    /// Indexed by slot-name id: template position + 1, 0 when absent.
    pub slot_name_map: Vec<u16>,
    /// Template entries stored per instance (not shared).
    pub local_slot_count: usize,
    pub handlers: Vec<Handler>,
    /// Handler indices sorted by (name, type).
    pub handler_order_map: Vec<u16>,
    pub instance_list: Option<InstanceId>,
    pub instance_list_bottom: Option<InstanceId>,
    /// Live instances plus in-flight dispatches pinning the class.
    pub busy: u32,
    pub(crate) traversal_record: Vec<u8>,
}

impl Class {
    pub fn new(name: Atom) -> Self {
        Self {
            name,
            id: ClassId::UNASSIGNED,
            flags: ClassFlags::empty(),
            direct_superclasses: Vec::new(),
            direct_subclasses: Vec::new(),
            all_superclasses: Vec::new(),
            slots: Vec::new(),
            instance_template: Vec::new(),
            slot_name_map: Vec::new(),
            local_slot_count: 0,
            handlers: Vec::new(),
            handler_order_map: Vec::new(),
            instance_list: None,
            instance_list_bottom: None,
            busy: 0,
            traversal_record: Vec::new(),
        }
    }

    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(ClassFlags::ABSTRACT)
    }

    #[inline]
    pub fn is_reactive(&self) -> bool {
        self.flags.contains(ClassFlags::REACTIVE)
    }

    #[inline]
    pub fn is_system(&self) -> bool {
        self.flags.contains(ClassFlags::SYSTEM)
    }

    /// Position of a slot in the instance template.
    #[inline]
    pub fn template_position(&self, slot: SlotNameId) -> Option<usize> {
        match self.slot_name_map.get(slot.index()) {
            Some(&pos) if pos != 0 => Some(pos as usize - 1),
            _ => None,
        }
    }

    pub fn local_slot(&self, name: Atom) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    // ── Handlers ───────────────────────────────────────────────────

    /// Index of the handler with this name and type.
    pub fn find_handler(&self, name: Atom, kind: HandlerType) -> Option<usize> {
        self.handlers_named(name)
            .find(|&i| self.handlers[i].kind == kind)
    }

    /// Indices of all handlers named `name`, ordered around, before,
    /// primary, after.
    pub fn handlers_named(&self, name: Atom) -> impl Iterator<Item = usize> + '_ {
        let start = self
            .handler_order_map
            .partition_point(|&i| self.handlers[i as usize].name < name);
        self.handler_order_map[start..]
            .iter()
            .map(|&i| i as usize)
            .take_while(move |&i| self.handlers[i].name == name)
    }

    /// Append a handler; returns its index. Existing indices stay valid.
    pub fn add_handler(&mut self, handler: Handler) -> usize {
        self.handlers.push(handler);
        self.rebuild_handler_order_map();
        self.handlers.len() - 1
    }

    /// Remove a handler. Shifts the indices of later handlers, so callers
    /// must ensure no dispatch core holds handlers of this class.
    pub fn remove_handler(&mut self, index: usize) -> Handler {
        let handler = self.handlers.remove(index);
        self.rebuild_handler_order_map();
        handler
    }

    pub fn handlers_executing(&self) -> bool {
        self.handlers.iter().any(|h| h.busy > 0)
    }

    fn rebuild_handler_order_map(&mut self) {
        let mut order: Vec<u16> = (0..self.handlers.len() as u16).collect();
        order.sort_by_key(|&i| {
            let h = &self.handlers[i as usize];
            (h.name, h.kind)
        });
        self.handler_order_map = order;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Code;

    fn handler(name: u32, kind: HandlerType) -> Handler {
        Handler {
            name: Atom(name),
            kind,
            class: ClassId(0),
            system: false,
            min_params: 0,
            max_params: Some(0),
            local_var_count: 0,
            code: Code::Actions(0),
            busy: 0,
        }
    }

    #[test]
    fn handlers_grouped_by_name() {
        let mut class = Class::new(Atom(10));
        class.add_handler(handler(20, HandlerType::After));
        class.add_handler(handler(30, HandlerType::Primary));
        class.add_handler(handler(20, HandlerType::Before));
        class.add_handler(handler(20, HandlerType::Around));

        let kinds: Vec<HandlerType> = class
            .handlers_named(Atom(20))
            .map(|i| class.handlers[i].kind)
            .collect();
        assert_eq!(
            kinds,
            vec![HandlerType::Around, HandlerType::Before, HandlerType::After]
        );
        assert_eq!(class.find_handler(Atom(30), HandlerType::Primary), Some(1));
        assert_eq!(class.find_handler(Atom(30), HandlerType::After), None);
        assert_eq!(class.handlers_named(Atom(25)).count(), 0);
    }

    #[test]
    fn remove_handler_rebuilds_order() {
        let mut class = Class::new(Atom(10));
        class.add_handler(handler(20, HandlerType::Primary));
        class.add_handler(handler(21, HandlerType::Primary));
        class.remove_handler(0);
        assert_eq!(class.find_handler(Atom(21), HandlerType::Primary), Some(0));
        assert_eq!(class.find_handler(Atom(20), HandlerType::Primary), None);
    }

    #[test]
    fn template_position_uses_offset_map() {
        let mut class = Class::new(Atom(10));
        class.slot_name_map = vec![0, 2, 1];
        assert_eq!(class.template_position(SlotNameId(0)), None);
        assert_eq!(class.template_position(SlotNameId(1)), Some(1));
        assert_eq!(class.template_position(SlotNameId(2)), Some(0));
        assert_eq!(class.template_position(SlotNameId(9)), None);
    }
}
