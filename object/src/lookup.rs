use crate::{Atom, ClassId, ClassRegistry, HandlerType, SlotNameRegistry, SlotRef};

/// The result of a handler lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    /// Name was not found.
    None,
    /// Name was found.
    Found {
        /// The class that defines the handler (may differ from the class
        /// the lookup started at if found via a superclass).
        holder: ClassId,
        /// Index of the handler within its class.
        index: usize,
    },
}

impl LookupResult {
    pub fn is_found(&self) -> bool {
        matches!(self, LookupResult::Found { .. })
    }
}

/// Find the most specific handler `name`/`kind` applicable to instances of
/// `class`, walking its precedence list.
pub fn lookup_handler(
    classes: &ClassRegistry,
    class: ClassId,
    name: Atom,
    kind: HandlerType,
) -> LookupResult {
    let Some(c) = classes.get(class) else {
        return LookupResult::None;
    };
    for &holder in &c.all_superclasses {
        if let Some(index) = classes[holder].find_handler(name, kind) {
            return LookupResult::Found { holder, index };
        }
    }
    LookupResult::None
}

/// Whether any handler of any type named `name` applies to `class`.
pub fn handler_exists(classes: &ClassRegistry, class: ClassId, name: Atom) -> bool {
    classes.get(class).is_some_and(|c| {
        c.all_superclasses
            .iter()
            .any(|&holder| classes[holder].handlers_named(name).next().is_some())
    })
}

/// A slot located in an instance template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLookup {
    /// Position in the instance template.
    pub position: usize,
    /// The descriptor in effect for this class.
    pub slot: SlotRef,
}

/// Locate slot `name` in the template of `class`.
pub fn lookup_slot(
    classes: &ClassRegistry,
    slot_names: &SlotNameRegistry,
    class: ClassId,
    name: Atom,
) -> Option<SlotLookup> {
    let id = slot_names.find(name)?.id;
    let c = classes.get(class)?;
    let position = c.template_position(id)?;
    Some(SlotLookup {
        position,
        slot: c.instance_template[position],
    })
}

/// Whether code running in a handler of `handler_class` may access `slot`
/// of an instance: the slot is defined by that class or is public.
pub fn slot_visible(classes: &ClassRegistry, handler_class: ClassId, slot: SlotRef) -> bool {
    let desc = classes.slot(slot);
    desc.public || desc.class == handler_class
}
