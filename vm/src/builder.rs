//! Staging areas for instance creation and modification.
//!
//! Values are validated against the slot constraints as they are staged
//! and applied in one step, so a partially configured instance is never
//! visible to handlers or the pattern network.

use object::{Atom, ClassId, InstanceId, Value, lookup_slot};

use crate::instances::coerce;
use crate::{RuntimeError, VM};

/// Position and checked value of a slot put against `class`.
fn stage_value(
    vm: &mut VM,
    class: ClassId,
    slot: &str,
    value: Value,
) -> Result<(usize, Value), RuntimeError> {
    let name = vm.atom(slot);
    let Some(lookup) = lookup_slot(&vm.classes, &vm.slot_names, class, name) else {
        return Err(RuntimeError::SlotNotFound {
            slot: slot.to_string(),
            class: vm.name_of(vm.classes[class].name),
        });
    };
    let desc = vm.classes.slot(lookup.slot);
    let value = coerce(value, desc.multiple);
    let checked = desc
        .constraint
        .check(&value, desc.multiple, &vm.classes, &|v| vm.referenced_class(v));
    match checked {
        Ok(()) => Ok((lookup.position, value)),
        Err(source) => Err(RuntimeError::Constraint {
            slot: vm.name_of(desc.name),
            source,
        }),
    }
}

fn replace_staged(vm: &VM, staged: &mut [Option<Value>], position: usize, value: Option<Value>) {
    if let Some(value) = &value {
        vm.retain_value(value);
    }
    if let Some(old) = std::mem::replace(&mut staged[position], value) {
        vm.release_value(&old);
    }
}

fn clear_staged(vm: &VM, staged: &mut [Option<Value>]) {
    for value in staged.iter_mut().filter_map(Option::take) {
        vm.release_value(&value);
    }
}

// ── Builder ───────────────────────────────────────────────────────────

/// Accumulates slot values for a new instance of one class.
///
/// The class stays pinned until [`InstanceBuilder::dispose`].
#[derive(Debug)]
pub struct InstanceBuilder {
    class: ClassId,
    staged: Vec<Option<Value>>,
}

impl InstanceBuilder {
    pub fn new(vm: &mut VM, class: &str) -> Result<Self, RuntimeError> {
        let Some(id) = vm.find_class(class) else {
            return Err(RuntimeError::ClassNotFound(class.to_string()));
        };
        vm.classes[id].busy += 1;
        let staged = vec![None; vm.classes[id].instance_template.len()];
        Ok(Self { class: id, staged })
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Stage `value` for `slot`. [`Value::Void`] unstages it so the
    /// default applies.
    pub fn put(&mut self, vm: &mut VM, slot: &str, value: Value) -> Result<(), RuntimeError> {
        if value.is_void() {
            let name = vm.atom(slot);
            if let Some(lookup) = lookup_slot(&vm.classes, &vm.slot_names, self.class, name) {
                replace_staged(vm, &mut self.staged, lookup.position, None);
            }
            return Ok(());
        }
        let (position, value) = stage_value(vm, self.class, slot, value)?;
        replace_staged(vm, &mut self.staged, position, Some(value));
        Ok(())
    }

    /// Create and initialize an instance with the staged values as its
    /// overrides. The staging area is emptied either way.
    pub fn make(&mut self, vm: &mut VM, name: Option<&str>) -> Result<InstanceId, RuntimeError> {
        let name: Option<Atom> = name.map(|n| vm.atom(n));
        let overrides: Vec<(usize, Value)> = self
            .staged
            .iter()
            .enumerate()
            .filter_map(|(position, value)| value.clone().map(|v| (position, v)))
            .collect();
        let class = self.class;
        let result = vm.top_level(|vm| {
            let id = vm.build_instance(name, class)?;
            vm.initialize_with(id, |vm, id| {
                for (position, value) in overrides {
                    vm.check_writable(id, position)?;
                    vm.put_slot_value(id, position, value)?;
                    vm.cell_mut(id, position).overridden = true;
                }
                Ok(())
            })
        });
        clear_staged(vm, &mut self.staged);
        result
    }

    /// Drop staged values and unpin the class.
    pub fn dispose(mut self, vm: &mut VM) {
        clear_staged(vm, &mut self.staged);
        vm.classes[self.class].busy -= 1;
    }
}

// ── Modifier ──────────────────────────────────────────────────────────

/// Accumulates changes to an existing instance. Puts equal to the current
/// value are not changes.
///
/// The instance stays pinned until [`InstanceModifier::dispose`].
#[derive(Debug)]
pub struct InstanceModifier {
    instance: InstanceId,
    class: ClassId,
    staged: Vec<Option<Value>>,
}

impl InstanceModifier {
    pub fn new(vm: &mut VM, instance: InstanceId) -> Result<Self, RuntimeError> {
        if !vm.instances.is_live(instance) {
            return Err(RuntimeError::InstanceDeleted);
        }
        vm.retain_instance(instance);
        let (class, count) = {
            let i = vm.instance(instance);
            (i.class, i.slot_addresses.len())
        };
        Ok(Self {
            instance,
            class,
            staged: vec![None; count],
        })
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Number of slots that would change.
    pub fn changes(&self) -> usize {
        self.staged.iter().filter(|v| v.is_some()).count()
    }

    pub fn put(&mut self, vm: &mut VM, slot: &str, value: Value) -> Result<(), RuntimeError> {
        if !vm.instances.is_live(self.instance) {
            return Err(RuntimeError::InstanceDeleted);
        }
        let (position, value) = stage_value(vm, self.class, slot, value)?;
        let staged = (vm.slot_value(self.instance, position) != value).then_some(value);
        replace_staged(vm, &mut self.staged, position, staged);
        Ok(())
    }

    /// Write the staged changes. Without changes the instance is returned
    /// untouched.
    pub fn modify(&mut self, vm: &mut VM) -> Result<InstanceId, RuntimeError> {
        if self.changes() == 0 {
            return Ok(self.instance);
        }
        let changes: Vec<(usize, Value)> = self
            .staged
            .iter()
            .enumerate()
            .filter_map(|(position, value)| value.clone().map(|v| (position, v)))
            .collect();
        let instance = self.instance;
        let result = vm.top_level(|vm| {
            let id = vm.resolve_instance(&Value::InstanceAddress(instance))?;
            for (position, value) in changes {
                vm.check_writable(id, position)?;
                vm.put_slot_value(id, position, value)?;
            }
            Ok(id)
        });
        clear_staged(vm, &mut self.staged);
        result
    }

    /// Drop staged changes and unpin the instance.
    pub fn dispose(mut self, vm: &mut VM) {
        clear_staged(vm, &mut self.staged);
        vm.release_instance(self.instance);
    }
}
