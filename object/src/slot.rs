use crate::{Atom, ClassId, Code, Constraint, SlotNameId, Value};

/// How a slot obtains its value when an instance is initialized.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Derived from the slot's constraint.
    Derive,
    /// No default; every instance must supply a value.
    Required,
    /// A constant copied into each instance (or into the shared cell once).
    Static(Value),
    /// Re-evaluated for every instance.
    Dynamic(Code),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAccess {
    ReadWrite,
    ReadOnly,
    /// Writable only while the instance is being initialized.
    InitializeOnly,
}

bitflags::bitflags! {
    /// Which accessor handlers are generated for a slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Accessors: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// Location of a slot descriptor: the defining class and its index in that
/// class's local slot array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub class: ClassId,
    pub index: u16,
}

/// One value cell of an instance.
///
/// Shared slots keep a single cell on their descriptor; every instance
/// whose template maps the slot to that descriptor reads the same cell.
#[derive(Debug, Clone)]
pub struct InstanceSlot {
    pub desc: SlotRef,
    pub value: Value,
    /// Explicitly set during the current initialization.
    pub overridden: bool,
    pub value_required: bool,
}

impl InstanceSlot {
    pub fn new(desc: SlotRef) -> Self {
        Self {
            desc,
            value: Value::Void,
            overridden: false,
            value_required: false,
        }
    }
}

/// A slot as declared by one class.
#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    pub slot_name: SlotNameId,
    pub name: Atom,
    pub class: ClassId,
    pub shared: bool,
    pub multiple: bool,
    pub default: DefaultValue,
    pub access: SlotAccess,
    pub public: bool,
    pub reactive: bool,
    pub accessors: Accessors,
    pub constraint: Constraint,
    /// Message sent to write the slot, normally `put-<name>`.
    pub override_message: Atom,
    pub shared_value: InstanceSlot,
    /// Number of live instances referencing the shared cell.
    pub shared_count: u32,
}

impl SlotDescriptor {
    #[inline]
    pub fn no_write(&self) -> bool {
        self.access != SlotAccess::ReadWrite
    }

    #[inline]
    pub fn initialize_only(&self) -> bool {
        self.access == SlotAccess::InitializeOnly
    }

    #[inline]
    pub fn dynamic_default(&self) -> bool {
        matches!(self.default, DefaultValue::Dynamic(_))
    }

    #[inline]
    pub fn no_default(&self) -> bool {
        matches!(self.default, DefaultValue::Required)
    }
}
