mod symbol;
mod value;
mod slot_name;
mod constraint;
mod slot;
mod handler;
mod class;
mod registry;
mod instance;
mod generic;
mod lookup;
mod special;

pub use symbol::{Atom, Symbols};
pub use value::{External, PrimitiveType, Value};
pub use slot_name::{SLOT_NAME_TABLE_HASH_SIZE, SlotName, SlotNameId, SlotNameRegistry};
pub use constraint::{Constraint, PutSlotError, TypeSet};
pub use slot::{Accessors, DefaultValue, InstanceSlot, SlotAccess, SlotDescriptor, SlotRef};
pub use handler::{Code, Handler, HandlerType};
pub use class::{Class, ClassFlags, ClassId};
pub use registry::{CLASS_ID_MAP_CHUNK, ClassBitMap, ClassRegistry, MAX_TRAVERSALS};
pub use instance::{INSTANCE_TABLE_HASH_SIZE, Instance, InstanceId, InstanceStore, SlotAddress};
pub use generic::{Generic, GenericId, GenericRegistry, Method, Restriction, method_precedence};
pub use lookup::{
    LookupResult, SlotLookup, handler_exists, lookup_handler, lookup_slot, slot_visible,
};
pub use special::SpecialClasses;

#[cfg(test)]
mod tests {
    use super::*;

    // ── Cross-module wiring ────────────────────────────────────────

    #[test]
    fn value_types_match_type_sets() {
        let symbols = Symbols::new();
        let values = [
            Value::Integer(1),
            Value::Float(1.5),
            Value::Symbol(symbols.intern("s")),
            Value::String(symbols.intern("s")),
            Value::InstanceName(symbols.intern("i")),
        ];
        for v in &values {
            assert!(!TypeSet::of(v).is_empty(), "{v:?} has no type bit");
        }
        assert!(TypeSet::of(&Value::empty_multifield()).is_empty());
    }

    #[test]
    fn instance_slot_starts_void() {
        let cell = InstanceSlot::new(SlotRef {
            class: ClassId(3),
            index: 1,
        });
        assert!(cell.value.is_void());
        assert!(!cell.overridden);
    }

    #[test]
    fn store_and_registry_cooperate() {
        let symbols = Symbols::new();
        let mut classes = ClassRegistry::new();
        let class = classes.install(Class::new(symbols.intern("A")));
        classes.linearize(class);
        let mut store = InstanceStore::new(INSTANCE_TABLE_HASH_SIZE);
        let id = store.allocate(Instance::new(symbols.intern("a1"), class));
        store.link(id, &mut classes);
        assert_eq!(classes[class].instance_list, Some(id));
        assert!(store.is_live(id));
        assert!(Value::InstanceAddress(id).as_instance() == Some(id));
    }
}
