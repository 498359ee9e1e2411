use object::{
    Atom, ClassId, Code, DefaultValue, Instance, InstanceId, InstanceSlot, SlotAccess,
    SlotAddress, SlotLookup, SlotRef, Value, lookup_slot,
};

use crate::interpreter::{Frame, run_code};
use crate::network::NetworkAction;
use crate::primitives::type_error;
use crate::{RuntimeError, VM};

/// Shape a value for a slot: a one-element multifield fills a single slot,
/// a single value becomes a one-element multifield.
pub(crate) fn coerce(value: Value, multiple: bool) -> Value {
    if multiple {
        if value.is_multifield() {
            return value;
        }
        return Value::multifield(vec![value]);
    }
    if let Value::Multifield(fields) = &value {
        if fields.len() == 1 {
            return fields[0].clone();
        }
    }
    value
}

impl VM {
    // ── Resolution ─────────────────────────────────────────────────

    #[inline]
    pub(crate) fn instance(&self, id: InstanceId) -> &Instance {
        match self.instances.get(id) {
            Some(instance) => instance,
            None => panic!("dangling instance {id:?}"),
        }
    }

    #[inline]
    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        match self.instances.get_mut(id) {
            Some(instance) => instance,
            None => panic!("dangling instance {id:?}"),
        }
    }

    /// Live instance an address, instance name or symbol refers to.
    pub(crate) fn resolve_instance(&mut self, value: &Value) -> Result<InstanceId, RuntimeError> {
        match value {
            Value::InstanceAddress(id) if self.instances.is_live(*id) => Ok(*id),
            Value::InstanceAddress(_) => self.fail(RuntimeError::InstanceDeleted),
            Value::InstanceName(atom) | Value::Symbol(atom) => match self.instances.find_by_name(*atom) {
                Some(id) => Ok(id),
                None => self.fail(RuntimeError::InstanceNotFound(self.name_of(*atom))),
            },
            other => {
                let err = type_error(self, "instance", other);
                self.fail(err)
            }
        }
    }

    /// Class used to dispatch on `value`.
    pub(crate) fn value_class(&mut self, value: &Value) -> Result<ClassId, RuntimeError> {
        match value {
            Value::InstanceAddress(_) | Value::InstanceName(_) => {
                let id = self.resolve_instance(value)?;
                Ok(self.instance(id).class)
            }
            other => Ok(self.special.primitive_class(other.primitive_type())),
        }
    }

    /// Class of a live instance reference, for allowed-class checks.
    pub(crate) fn referenced_class(&self, value: &Value) -> Option<ClassId> {
        let id = match value {
            Value::InstanceAddress(id) if self.instances.is_live(*id) => *id,
            Value::InstanceName(atom) => self.instances.find_by_name(*atom)?,
            _ => return None,
        };
        self.instances.get(id).map(|i| i.class)
    }

    pub(crate) fn resolve_slot(&mut self, id: InstanceId, name: Atom) -> Result<SlotLookup, RuntimeError> {
        let class = self.instance(id).class;
        match lookup_slot(&self.classes, &self.slot_names, class, name) {
            Some(lookup) => Ok(lookup),
            None => self.fail(RuntimeError::SlotNotFound {
                slot: self.name_of(name),
                class: self.name_of(self.classes[class].name),
            }),
        }
    }

    // ── Cells ──────────────────────────────────────────────────────

    pub(crate) fn cell(&self, id: InstanceId, position: usize) -> &InstanceSlot {
        let instance = self.instance(id);
        match instance.slot_addresses[position] {
            SlotAddress::Local(index) => &instance.slots[index as usize],
            SlotAddress::Shared(slot) => &self.classes.slot(slot).shared_value,
        }
    }

    pub(crate) fn cell_mut(&mut self, id: InstanceId, position: usize) -> &mut InstanceSlot {
        let address = self.instance(id).slot_addresses[position];
        match address {
            SlotAddress::Local(index) => &mut self.instance_mut(id).slots[index as usize],
            SlotAddress::Shared(slot) => &mut self.classes.slot_mut(slot).shared_value,
        }
    }

    #[inline]
    pub(crate) fn slot_value(&self, id: InstanceId, position: usize) -> Value {
        self.cell(id, position).value.clone()
    }

    pub(crate) fn retain_value(&self, value: &Value) {
        match value {
            Value::Symbol(atom) | Value::String(atom) | Value::InstanceName(atom) => {
                self.symbols.retain(*atom)
            }
            Value::Multifield(fields) => fields.iter().for_each(|v| self.retain_value(v)),
            _ => {}
        }
    }

    pub(crate) fn release_value(&self, value: &Value) {
        match value {
            Value::Symbol(atom) | Value::String(atom) | Value::InstanceName(atom) => {
                self.symbols.release(*atom)
            }
            Value::Multifield(fields) => fields.iter().for_each(|v| self.release_value(v)),
            _ => {}
        }
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Reject writes to read-only slots, and to initialize-only slots
    /// outside of initialization.
    pub(crate) fn check_writable(&mut self, id: InstanceId, position: usize) -> Result<(), RuntimeError> {
        let desc = self.classes.slot(self.cell(id, position).desc);
        let writable = match desc.access {
            SlotAccess::ReadWrite => true,
            SlotAccess::ReadOnly => false,
            SlotAccess::InitializeOnly => self.instance(id).initialize_in_progress,
        };
        if writable {
            return Ok(());
        }
        let name = self.name_of(desc.name);
        self.fail(RuntimeError::ReadOnlySlot(name))
    }

    /// Validate and store a slot value. Writing [`Value::Void`] resets the
    /// slot to its default.
    pub(crate) fn put_slot_value(
        &mut self,
        id: InstanceId,
        position: usize,
        value: Value,
    ) -> Result<Value, RuntimeError> {
        let slot = self.cell(id, position).desc;
        let value = match value {
            Value::Void => self.default_value(id, slot)?,
            other => other,
        };
        let desc = self.classes.slot(slot);
        let value = coerce(value, desc.multiple);
        let checked = desc.constraint.check(&value, desc.multiple, &self.classes, &|v| {
            self.referenced_class(v)
        });
        if let Err(source) = checked {
            let slot = self.name_of(desc.name);
            return self.fail(RuntimeError::Constraint { slot, source });
        }

        self.retain_value(&value);
        let old = std::mem::replace(&mut self.cell_mut(id, position).value, value.clone());
        self.release_value(&old);
        self.announce_slot_change(id, slot)?;
        Ok(value)
    }

    pub(crate) fn default_value(&mut self, id: InstanceId, slot: SlotRef) -> Result<Value, RuntimeError> {
        let desc = self.classes.slot(slot);
        match desc.default.clone() {
            DefaultValue::Static(value) => Ok(value),
            DefaultValue::Derive => Ok(desc.constraint.derive_default(desc.multiple, &self.symbols)),
            DefaultValue::Dynamic(code) => self.eval_default(code, id),
            DefaultValue::Required => {
                let slot = self.name_of(desc.name);
                let instance = self.name_of(self.instance(id).name);
                self.fail(RuntimeError::SlotValueRequired { slot, instance })
            }
        }
    }

    pub(crate) fn eval_default(&mut self, code: Code, id: InstanceId) -> Result<Value, RuntimeError> {
        run_code(self, code, Frame::default_for(Value::InstanceAddress(id)))
    }

    // ── Reactive slots ─────────────────────────────────────────────

    fn announce_slot_change(&mut self, id: InstanceId, slot: SlotRef) -> Result<(), RuntimeError> {
        let desc = self.classes.slot(slot);
        if !desc.reactive {
            return Ok(());
        }
        if desc.shared {
            return self.broadcast_shared_slot(slot);
        }
        let slot_name = desc.slot_name;
        let instance = self.instance(id);
        if instance.in_network && self.classes[instance.class].is_reactive() {
            self.notify_network(NetworkAction::Modify, id, Some(slot_name));
        }
        Ok(())
    }

    /// Announce a shared slot change for every reactive instance whose
    /// class maps the slot to this descriptor.
    fn broadcast_shared_slot(&mut self, slot: SlotRef) -> Result<(), RuntimeError> {
        let Some(traversal) = self.classes.get_traversal_id() else {
            return self.fail(RuntimeError::TraversalIdsExhausted);
        };
        self.broadcast_from(slot.class, slot, traversal);
        self.classes.release_traversal_id();
        Ok(())
    }

    fn broadcast_from(&mut self, class: ClassId, slot: SlotRef, traversal: usize) {
        if self.classes.test_traversed(class, traversal) {
            return;
        }
        self.classes.set_traversed(class, traversal);
        let slot_name = self.classes.slot(slot).slot_name;
        let c = &self.classes[class];
        let uses_slot = c
            .template_position(slot_name)
            .is_some_and(|p| c.instance_template[p] == slot);
        if uses_slot && c.is_reactive() {
            for id in self.instances.ids_of_class(class, &self.classes) {
                if self.instances.get(id).is_some_and(|i| i.in_network) {
                    self.notify_network(NetworkAction::Modify, id, Some(slot_name));
                }
            }
        }
        let subclasses = self.classes[class].direct_subclasses.clone();
        for sub in subclasses {
            if self.classes.get(sub).is_some() {
                self.broadcast_from(sub, slot, traversal);
            }
        }
    }

    // ── Host API ───────────────────────────────────────────────────

    /// Read a slot directly, bypassing message handlers.
    pub fn get_slot(&mut self, id: InstanceId, slot: &str) -> Result<Value, RuntimeError> {
        let name = self.atom(slot);
        self.top_level(|vm| {
            let id = vm.resolve_instance(&Value::InstanceAddress(id))?;
            let lookup = vm.resolve_slot(id, name)?;
            Ok(vm.slot_value(id, lookup.position))
        })
    }

    /// Write a slot directly with access and constraint checks.
    pub fn put_slot(&mut self, id: InstanceId, slot: &str, value: Value) -> Result<Value, RuntimeError> {
        let name = self.atom(slot);
        self.top_level(|vm| {
            let id = vm.resolve_instance(&Value::InstanceAddress(id))?;
            let lookup = vm.resolve_slot(id, name)?;
            vm.check_writable(id, lookup.position)?;
            vm.put_slot_value(id, lookup.position, value)
        })
    }

    pub fn find_instance(&self, name: &str) -> Option<InstanceId> {
        let atom = self.symbols.find(name)?;
        self.instances.find_by_name(atom)
    }

    pub fn instance_name(&self, id: InstanceId) -> Option<String> {
        self.instances.get(id).map(|i| self.name_of(i.name))
    }

    pub fn instance_class(&self, id: InstanceId) -> Option<ClassId> {
        self.instances.get(id).map(|i| i.class)
    }

    /// Live, i.e. neither deleted nor freed.
    pub fn instance_exists(&self, id: InstanceId) -> bool {
        self.instances.is_live(id)
    }

    /// Pin an instance so its storage outlives deletion.
    pub fn retain_instance(&mut self, id: InstanceId) {
        if let Some(instance) = self.instances.get_mut(id) {
            instance.busy += 1;
        }
    }

    pub fn release_instance(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.get_mut(id) else {
            return;
        };
        instance.busy = instance.busy.saturating_sub(1);
        if instance.garbage && instance.busy == 0 && instance.basis.is_none() {
            self.free_instance(id);
        }
    }

    /// Direct instances of `class`, oldest first.
    pub fn instances_of(&self, class: ClassId) -> Vec<InstanceId> {
        self.instances.ids_of_class(class, &self.classes)
    }

    pub fn all_instances(&self) -> Vec<InstanceId> {
        self.instances.ids()
    }

    /// Snapshot the slot values of an instance for the logical-dependency
    /// tracker. The snapshot keeps the instance storage alive after
    /// deletion until [`VM::release_basis`].
    pub fn take_basis(&mut self, id: InstanceId) -> bool {
        if !self.instances.is_live(id) {
            return false;
        }
        let count = self.instance(id).slot_addresses.len();
        let values: Vec<Value> = (0..count).map(|p| self.slot_value(id, p)).collect();
        values.iter().for_each(|v| self.retain_value(v));
        if let Some(old) = self.instance_mut(id).basis.replace(values) {
            old.iter().for_each(|v| self.release_value(v));
        }
        true
    }

    pub fn basis_value(&self, id: InstanceId, slot: &str) -> Option<Value> {
        let instance = self.instances.get(id)?;
        let lookup = lookup_slot(&self.classes, &self.slot_names, instance.class, self.symbols.find(slot)?)?;
        instance.basis.as_ref()?.get(lookup.position).cloned()
    }

    pub fn release_basis(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.get_mut(id) else {
            return;
        };
        let Some(basis) = instance.basis.take() else {
            return;
        };
        let free = instance.garbage && instance.busy == 0;
        basis.iter().for_each(|v| self.release_value(v));
        if free {
            self.free_instance(id);
        }
    }
}
