use std::rc::Rc;

use object::{Atom, External, InstanceId, Value, handler_exists};

use crate::manager::{OverrideMode, put_args};
use crate::primitives::type_error;
use crate::{RuntimeError, VM};

/// Slot overrides passed to the modify and duplicate handlers.
#[derive(Debug, Clone)]
pub(crate) struct SlotOverrides(pub Vec<(Atom, Value)>);

impl SlotOverrides {
    fn into_value(overrides: Vec<(Atom, Value)>) -> Value {
        Value::External(External::new(SlotOverrides(overrides)))
    }
}

/// Overrides carried by a handler argument.
pub(crate) fn overrides_arg(vm: &VM, value: &Value) -> Result<Vec<(Atom, Value)>, RuntimeError> {
    match value {
        Value::External(ext) => match ext.downcast::<SlotOverrides>() {
            Some(overrides) => Ok(overrides.0.clone()),
            None => Err(type_error(vm, "slot overrides", value)),
        },
        other => Err(type_error(vm, "slot overrides", other)),
    }
}

impl VM {
    // ── Modify ─────────────────────────────────────────────────────

    /// Send `direct-modify` or `message-modify` to the instance.
    pub(crate) fn modify_with(
        &mut self,
        target: &Value,
        overrides: Vec<(Atom, Value)>,
        mode: OverrideMode,
    ) -> Result<Value, RuntimeError> {
        let id = self.resolve_instance(target)?;
        let message = match mode {
            OverrideMode::Direct => self.names.direct_modify,
            OverrideMode::Message => self.names.message_modify,
        };
        let args: Rc<[Value]> = Rc::from(vec![SlotOverrides::into_value(overrides)]);
        self.send_message(Value::InstanceAddress(id), message, args)
    }

    pub(crate) fn apply_modify(
        &mut self,
        id: InstanceId,
        overrides: &[(Atom, Value)],
        mode: OverrideMode,
    ) -> Result<(), RuntimeError> {
        let result = self.apply_overrides(id, overrides, mode);
        self.clear_overrides(id);
        result
    }

    // ── Duplicate ──────────────────────────────────────────────────

    fn send_duplicate(
        &mut self,
        source: InstanceId,
        name: Option<Atom>,
        overrides: Vec<(Atom, Value)>,
        mode: OverrideMode,
    ) -> Result<InstanceId, RuntimeError> {
        let name = match name {
            Some(name) => name,
            None => self.gensym_name(),
        };
        let message = match mode {
            OverrideMode::Direct => self.names.direct_duplicate,
            OverrideMode::Message => self.names.message_duplicate,
        };
        let args: Rc<[Value]> = Rc::from(vec![
            Value::InstanceName(name),
            SlotOverrides::into_value(overrides),
        ]);
        let result = self.send_message(Value::InstanceAddress(source), message, args)?;
        match result {
            Value::InstanceAddress(id) => Ok(id),
            other => self.resolve_instance(&other),
        }
    }

    /// Send `direct-duplicate` or `message-duplicate`; yields the name of
    /// the copy.
    pub(crate) fn duplicate_with(
        &mut self,
        source: &Value,
        name: Option<Atom>,
        overrides: Vec<(Atom, Value)>,
        mode: OverrideMode,
    ) -> Result<Value, RuntimeError> {
        let source = self.resolve_instance(source)?;
        let copy = self.send_duplicate(source, name, overrides, mode)?;
        Ok(Value::InstanceName(self.instance(copy).name))
    }

    /// Build `name` as a copy of `source`: overrides first, then every
    /// other local slot copied, then `init` for whatever is left.
    pub(crate) fn apply_duplicate(
        &mut self,
        source: InstanceId,
        name: Atom,
        overrides: &[(Atom, Value)],
        mode: OverrideMode,
    ) -> Result<InstanceId, RuntimeError> {
        let (source_name, class) = {
            let instance = self.instance(source);
            (instance.name, instance.class)
        };
        if name == source_name {
            return self.fail(RuntimeError::DuplicateSameName(self.name_of(name)));
        }
        self.retain_instance(source);
        let result = self.build_instance(Some(name), class).and_then(|copy| {
            self.initialize_with(copy, |vm, copy| {
                vm.apply_overrides(copy, overrides, mode)?;
                vm.copy_slots(source, copy, mode)
            })
        });
        self.release_instance(source);
        result
    }

    fn copy_slots(&mut self, source: InstanceId, copy: InstanceId, mode: OverrideMode) -> Result<(), RuntimeError> {
        let count = self.instance(copy).slot_addresses.len();
        let class = self.instance(copy).class;
        for position in 0..count {
            self.check_halt()?;
            if !self.instances.is_live(source) {
                return self.fail(RuntimeError::InstanceDeleted);
            }
            let cell = self.cell(copy, position);
            let desc = self.classes.slot(cell.desc);
            if cell.overridden || desc.shared {
                continue;
            }
            let message = desc.override_message;
            let value = self.slot_value(source, position);
            if mode == OverrideMode::Message && handler_exists(&self.classes, class, message) {
                self.send_message(Value::InstanceAddress(copy), message, put_args(&value))?;
            } else {
                self.put_slot_value(copy, position, value)?;
            }
            self.cell_mut(copy, position).overridden = true;
        }
        Ok(())
    }

    // ── Host API ───────────────────────────────────────────────────

    fn intern_overrides(&self, overrides: &[(&str, Value)]) -> Vec<(Atom, Value)> {
        overrides
            .iter()
            .map(|(slot, value)| (self.atom(slot), value.clone()))
            .collect()
    }

    /// `modify-instance`, or `message-modify-instance` when `message`.
    pub fn modify_instance(
        &mut self,
        id: InstanceId,
        overrides: &[(&str, Value)],
        message: bool,
    ) -> Result<(), RuntimeError> {
        let overrides = self.intern_overrides(overrides);
        let mode = if message { OverrideMode::Message } else { OverrideMode::Direct };
        self.top_level(|vm| vm.modify_with(&Value::InstanceAddress(id), overrides, mode).map(|_| ()))
    }

    /// `duplicate-instance`, or `message-duplicate-instance` when
    /// `message`.
    pub fn duplicate_instance(
        &mut self,
        id: InstanceId,
        name: Option<&str>,
        overrides: &[(&str, Value)],
        message: bool,
    ) -> Result<InstanceId, RuntimeError> {
        let name = name.map(|n| self.atom(n));
        let overrides = self.intern_overrides(overrides);
        let mode = if message { OverrideMode::Message } else { OverrideMode::Direct };
        self.top_level(|vm| {
            let source = vm.resolve_instance(&Value::InstanceAddress(id))?;
            vm.send_duplicate(source, name, overrides, mode)
        })
    }
}
