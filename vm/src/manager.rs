use std::rc::Rc;

use object::{
    Atom, ClassId, DefaultValue, Instance, InstanceId, InstanceSlot, SlotAddress, Value,
    handler_exists,
};

use crate::network::NetworkAction;
use crate::{RuntimeError, VM};

/// How slot overrides reach an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OverrideMode {
    /// Written straight into the slot.
    Direct,
    /// Sent as `put-<slot>` messages when the class has such a handler.
    Message,
}

pub(crate) fn no_args() -> Rc<[Value]> {
    Rc::from(Vec::new())
}

/// Arguments of a `put-<slot>` message carrying `value`. `Void` sends none,
/// which the accessor turns back into a reset to the default; an empty
/// multifield travels as itself so the slot ends up empty.
pub(crate) fn put_args(value: &Value) -> Rc<[Value]> {
    match value {
        Value::Multifield(fields) if fields.is_empty() => Rc::from(vec![value.clone()]),
        other => other.fields().into(),
    }
}

impl VM {
    // ── Building ───────────────────────────────────────────────────

    /// First `gen<N>` name no instance uses.
    pub(crate) fn gensym_name(&mut self) -> Atom {
        loop {
            self.gensym += 1;
            let atom = self.atom(&format!("gen{}", self.gensym));
            if self.instances.find_by_name(atom).is_none() {
                return atom;
            }
        }
    }

    /// Allocate, link and install an uninitialized instance. An existing
    /// instance of the same class and name is deleted first.
    pub(crate) fn build_instance(
        &mut self,
        name: Option<Atom>,
        class: ClassId,
    ) -> Result<InstanceId, RuntimeError> {
        let c = &self.classes[class];
        let class_name = self.name_of(c.name);
        if c.is_abstract() {
            return self.fail(RuntimeError::AbstractClass(class_name));
        }
        if c.is_reactive() && self.join_in_progress {
            return self.fail(RuntimeError::ReactiveClassDuringJoin(class_name));
        }
        let name = match name {
            Some(name) => name,
            None => self.gensym_name(),
        };

        if let Some(old) = self.instances.find_by_name(name) {
            let (old_class, initializing) = {
                let existing = self.instance(old);
                (existing.class, existing.initialize_in_progress)
            };
            if old_class != class {
                return self.fail(RuntimeError::DuplicateInstanceName {
                    name: self.name_of(name),
                    class: self.name_of(self.classes[old_class].name),
                });
            }
            if initializing {
                return self.fail(RuntimeError::InstanceInitializing(self.name_of(name)));
            }
            log::debug!("replacing instance [{}]", self.symbols.name(name));
            self.send_message(Value::InstanceAddress(old), self.names.delete, no_args())?;
            if self.instances.is_live(old) {
                return self.fail(RuntimeError::InstanceInUse(self.name_of(name)));
            }
        }

        // 1. Cells
        let template = self.classes[class].instance_template.clone();
        let mut slots = Vec::with_capacity(self.classes[class].local_slot_count);
        let mut addresses = Vec::with_capacity(template.len());
        for slot in template {
            let desc = self.classes.slot_mut(slot);
            if desc.shared {
                desc.shared_count += 1;
                addresses.push(SlotAddress::Shared(slot));
            } else {
                let mut cell = InstanceSlot::new(slot);
                cell.value_required = desc.no_default();
                addresses.push(SlotAddress::Local(slots.len() as u16));
                slots.push(cell);
            }
        }

        // 2. Link and install
        let mut instance = Instance::new(name, class);
        instance.slots = slots;
        instance.slot_addresses = addresses;
        instance.installed = true;
        let id = self.instances.allocate(instance);
        self.instances.link(id, &mut self.classes);
        self.symbols.retain(name);
        self.classes[class].busy += 1;
        log::trace!("built instance [{}] of {class_name}", self.symbols.name(name));

        // 3. Logical support
        if !self.logical_dependencies(id) {
            self.quash_instance(id)?;
            return self.fail(RuntimeError::LogicalSupportLost(self.name_of(name)));
        }
        Ok(id)
    }

    // ── Initialization ─────────────────────────────────────────────

    /// Run the initialization protocol: `create`, the overrides, then
    /// `init`. A failed initialization deletes the instance.
    pub(crate) fn initialize_with(
        &mut self,
        id: InstanceId,
        apply: impl FnOnce(&mut VM, InstanceId) -> Result<(), RuntimeError>,
    ) -> Result<InstanceId, RuntimeError> {
        let name = self.instance(id).name;
        let (create, init) = (self.names.create, self.names.init);
        self.retain_instance(id);
        {
            let instance = self.instance_mut(id);
            instance.initialize_in_progress = true;
            instance.init_slots_called = false;
        }

        let run = |vm: &mut VM| -> Result<(), RuntimeError> {
            vm.send_message(Value::InstanceAddress(id), create, no_args())?;
            apply(vm, id)?;
            vm.send_message(Value::InstanceAddress(id), init, no_args())?;
            Ok(())
        };
        let result = run(self);

        let called = {
            let instance = self.instance_mut(id);
            instance.initialize_in_progress = false;
            instance.init_slots_called
        };
        self.clear_overrides(id);
        self.release_instance(id);

        if let Err(err) = result {
            self.discard_uninitialized(id);
            return Err(err);
        }
        if !called || !self.instances.is_live(id) {
            self.discard_uninitialized(id);
            return self.fail(RuntimeError::InitFailed(self.name_of(name)));
        }

        let class = self.instance(id).class;
        if self.classes[class].is_reactive() {
            self.instance_mut(id).in_network = true;
            self.notify_network(NetworkAction::Assert, id, None);
        }
        Ok(id)
    }

    /// Remove an instance whose initialization failed. The original error
    /// wins; a failure here is only logged.
    fn discard_uninitialized(&mut self, id: InstanceId) {
        if !self.instances.is_live(id) {
            return;
        }
        let name = self.instance(id).name;
        if let Err(err) = self.quash_instance(id) {
            log::warn!(
                "could not remove [{}] after failed initialization: {err}",
                self.symbols.name(name)
            );
        }
    }

    pub(crate) fn clear_overrides(&mut self, id: InstanceId) {
        let Some(count) = self.instances.get(id).map(|i| i.slot_addresses.len()) else {
            return;
        };
        for position in 0..count {
            self.cell_mut(id, position).overridden = false;
        }
    }

    /// Write `overrides` into the instance, marking each slot so default
    /// evaluation skips it.
    pub(crate) fn apply_overrides(
        &mut self,
        id: InstanceId,
        overrides: &[(Atom, Value)],
        mode: OverrideMode,
    ) -> Result<(), RuntimeError> {
        for (slot, value) in overrides {
            self.check_halt()?;
            let id = self.resolve_instance(&Value::InstanceAddress(id))?;
            let lookup = self.resolve_slot(id, *slot)?;
            let class = self.instance(id).class;
            let message = self.classes.slot(lookup.slot).override_message;
            if mode == OverrideMode::Message && handler_exists(&self.classes, class, message) {
                self.send_message(Value::InstanceAddress(id), message, put_args(value))?;
            } else {
                self.check_writable(id, lookup.position)?;
                self.put_slot_value(id, lookup.position, value.clone())?;
            }
            if self.instances.is_live(id) {
                self.cell_mut(id, lookup.position).overridden = true;
            }
        }
        Ok(())
    }

    /// Evaluate the defaults of every slot not overridden during this
    /// initialization. Backs the `init` handler.
    pub(crate) fn init_slots(&mut self, id: InstanceId) -> Result<(), RuntimeError> {
        if !self.instance(id).initialize_in_progress {
            return self.fail(RuntimeError::NotInitializing(self.name_of(self.instance(id).name)));
        }
        let count = self.instance(id).slot_addresses.len();
        for position in 0..count {
            self.check_halt()?;
            let cell = self.cell(id, position);
            if cell.overridden {
                continue;
            }
            let (slot, current_void) = (cell.desc, cell.value.is_void());
            let desc = self.classes.slot(slot);
            let apply = match desc.default {
                DefaultValue::Dynamic(_) => true,
                DefaultValue::Required => {
                    if current_void {
                        let slot = self.name_of(desc.name);
                        let instance = self.name_of(self.instance(id).name);
                        return self.fail(RuntimeError::SlotValueRequired { slot, instance });
                    }
                    false
                }
                // A shared cell keeps the value an earlier instance gave it.
                _ => !desc.shared || desc.shared_count == 1 || current_void,
            };
            if apply {
                let value = self.default_value(id, slot)?;
                self.put_slot_value(id, position, value)?;
            }
        }
        self.instance_mut(id).init_slots_called = true;
        Ok(())
    }

    // ── Deletion ───────────────────────────────────────────────────

    /// Remove an instance from the store. The storage is freed at once
    /// unless something still references it. Backs the `delete` handler.
    pub(crate) fn quash_instance(&mut self, id: InstanceId) -> Result<bool, RuntimeError> {
        let Some(instance) = self.instances.get(id) else {
            return Ok(false);
        };
        if !instance.is_linked() {
            return Ok(false);
        }
        let (name, class) = (instance.name, instance.class);
        let settled = instance.installed && !instance.initialize_in_progress;
        let in_network = instance.in_network;
        if self.join_in_progress && self.classes[class].is_reactive() {
            return self.fail(RuntimeError::ReactiveClassDuringJoin(
                self.name_of(self.classes[class].name),
            ));
        }
        if !settled {
            return self.fail(RuntimeError::InstanceInitializing(self.name_of(name)));
        }

        if in_network {
            self.notify_network(NetworkAction::Retract, id, None);
            self.instance_mut(id).in_network = false;
        }
        self.instances.unlink(id, &mut self.classes);
        self.deinstall(id);
        log::debug!("deleted instance [{}]", self.symbols.name(self.instance(id).name));

        let instance = self.instance(id);
        if instance.busy == 0 && instance.basis.is_none() {
            self.free_instance(id);
        } else {
            self.instances.push_garbage(id);
        }
        Ok(true)
    }

    /// Release the name and slot values an instance holds.
    fn deinstall(&mut self, id: InstanceId) {
        let instance = self.instance_mut(id);
        instance.installed = false;
        let name = instance.name;
        let addresses = instance.slot_addresses.clone();
        let locals: Vec<Value> = instance
            .slots
            .iter_mut()
            .map(|cell| std::mem::replace(&mut cell.value, Value::Void))
            .collect();
        self.symbols.release(name);
        locals.iter().for_each(|v| self.release_value(v));

        for address in addresses {
            let SlotAddress::Shared(slot) = address else {
                continue;
            };
            let desc = self.classes.slot_mut(slot);
            desc.shared_count = desc.shared_count.saturating_sub(1);
            if desc.shared_count == 0 {
                let old = std::mem::replace(&mut desc.shared_value.value, Value::Void);
                self.release_value(&old);
            }
        }
    }

    pub(crate) fn free_instance(&mut self, id: InstanceId) {
        let Some(instance) = self.instances.free(id) else {
            return;
        };
        if let Some(class) = self.classes.get_mut(instance.class) {
            class.busy = class.busy.saturating_sub(1);
        }
        if let Some(basis) = instance.basis {
            basis.iter().for_each(|v| self.release_value(v));
        }
    }

    /// Free deleted instances nothing references any more. Returns how
    /// many were freed.
    pub fn cleanup_instances(&mut self) -> usize {
        let ready: Vec<InstanceId> = self
            .instances
            .garbage()
            .iter()
            .copied()
            .filter(|&id| {
                self.instances
                    .get(id)
                    .is_some_and(|i| i.busy == 0 && i.basis.is_none())
            })
            .collect();
        for &id in &ready {
            self.free_instance(id);
        }
        if !ready.is_empty() {
            log::trace!("freed {} garbage instance(s)", ready.len());
        }
        ready.len()
    }

    // ── Entry points ───────────────────────────────────────────────

    /// Build and initialize an instance, routing overrides through
    /// `put-` handlers.
    pub(crate) fn create_instance(
        &mut self,
        name: Option<Atom>,
        class: Atom,
        overrides: Vec<(Atom, Value)>,
    ) -> Result<InstanceId, RuntimeError> {
        let Some(class_id) = self.classes.find(class) else {
            return self.fail(RuntimeError::ClassNotFound(self.name_of(class)));
        };
        let id = self.build_instance(name, class_id)?;
        self.initialize_with(id, |vm, id| {
            vm.apply_overrides(id, &overrides, OverrideMode::Message)
        })
    }

    /// Send `delete`; true when the instance is gone afterwards.
    pub(crate) fn delete_instance(&mut self, id: InstanceId) -> Result<bool, RuntimeError> {
        let result = self.send_message(Value::InstanceAddress(id), self.names.delete, no_args())?;
        Ok(result.is_true() && !self.instances.is_live(id))
    }

    /// `make-instance`: a generated name is used when `name` is `None`.
    pub fn make_instance(
        &mut self,
        name: Option<&str>,
        class: &str,
        overrides: &[(&str, Value)],
    ) -> Result<InstanceId, RuntimeError> {
        let name = name.map(|n| self.atom(n));
        let class = self.atom(class);
        let overrides = overrides
            .iter()
            .map(|(slot, value)| (self.atom(slot), value.clone()))
            .collect();
        self.top_level(|vm| vm.create_instance(name, class, overrides))
    }

    /// `unmake-instance` through the `delete` message.
    pub fn unmake_instance(&mut self, id: InstanceId) -> Result<bool, RuntimeError> {
        self.top_level(|vm| {
            vm.resolve_instance(&Value::InstanceAddress(id))?;
            vm.delete_instance(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassDef, Expr, HandlerDef, RecordingNetwork, SlotDef, VMCreateInfo};
    use object::HandlerType;

    fn vm() -> VM {
        let mut vm = VM::new(VMCreateInfo::default()).unwrap();
        vm.define_class(
            ClassDef::new("ITEM")
                .slot(SlotDef::new("label").default_value(vm.symbol("none")))
                .slot(SlotDef::new("count").shared().default_value(Value::Integer(0))),
        )
        .unwrap();
        vm
    }

    // ── Creation ───────────────────────────────────────────────────

    #[test]
    fn generated_names() {
        let mut vm = vm();
        let a = vm.make_instance(None, "ITEM", &[]).unwrap();
        let b = vm.make_instance(None, "ITEM", &[]).unwrap();
        assert_eq!(vm.instance_name(a).as_deref(), Some("gen1"));
        assert_eq!(vm.instance_name(b).as_deref(), Some("gen2"));
        vm.make_instance(Some("gen3"), "ITEM", &[]).unwrap();
        let d = vm.make_instance(None, "ITEM", &[]).unwrap();
        assert_eq!(vm.instance_name(d).as_deref(), Some("gen4"));
    }

    #[test]
    fn overrides_and_defaults() {
        let mut vm = vm();
        let box_ = vm.symbol("box");
        let a = vm.make_instance(Some("a"), "ITEM", &[("label", box_.clone())]).unwrap();
        assert_eq!(vm.get_slot(a, "label"), Ok(box_));
        assert_eq!(vm.get_slot(a, "count"), Ok(Value::Integer(0)));
        let b = vm.make_instance(Some("b"), "ITEM", &[]).unwrap();
        assert_eq!(vm.get_slot(b, "label"), Ok(vm.symbol("none")));
    }

    #[test]
    fn unknown_and_abstract_classes() {
        let mut vm = vm();
        assert_eq!(
            vm.make_instance(None, "NOPE", &[]),
            Err(RuntimeError::ClassNotFound("NOPE".into()))
        );
        assert_eq!(
            vm.make_instance(None, "USER", &[]),
            Err(RuntimeError::AbstractClass("USER".into()))
        );
        assert!(vm.make_instance(None, "INITIAL-OBJECT", &[]).is_ok());
    }

    #[test]
    fn same_name_replaces_instance() {
        let mut vm = vm();
        let first = vm.make_instance(Some("x"), "ITEM", &[]).unwrap();
        let second = vm.make_instance(Some("x"), "ITEM", &[]).unwrap();
        assert!(!vm.instance_exists(first));
        assert!(vm.instance_exists(second));
        assert_eq!(vm.find_instance("x"), Some(second));
        assert_eq!(vm.instances.len(), 1);
    }

    #[test]
    fn same_name_other_class_is_rejected() {
        let mut vm = vm();
        vm.define_class(ClassDef::new("OTHER")).unwrap();
        vm.make_instance(Some("x"), "ITEM", &[]).unwrap();
        assert_eq!(
            vm.make_instance(Some("x"), "OTHER", &[]),
            Err(RuntimeError::DuplicateInstanceName {
                name: "x".into(),
                class: "ITEM".into()
            })
        );
    }

    // ── Initialization ─────────────────────────────────────────────

    #[test]
    fn required_slot_without_value_fails() {
        let mut vm = vm();
        vm.define_class(ClassDef::new("NEEDY").slot(SlotDef::new("must").required()))
            .unwrap();
        assert_eq!(
            vm.make_instance(Some("n"), "NEEDY", &[]),
            Err(RuntimeError::SlotValueRequired {
                slot: "must".into(),
                instance: "n".into()
            })
        );
        assert_eq!(vm.find_instance("n"), None);
        let ok = vm.make_instance(Some("n"), "NEEDY", &[("must", Value::Integer(1))]);
        assert!(ok.is_ok());
    }

    #[test]
    fn failed_initialization_leaves_no_instance() {
        let mut vm = vm();
        let s = vm.symbols.clone();
        let bad = Expr::call(&s, "+", vec![Expr::int(1), Expr::string(&s, "oops")]);
        vm.define_handler("ITEM", "init", HandlerType::After, HandlerDef::new(bad))
            .unwrap();
        assert!(matches!(
            vm.make_instance(Some("broken"), "ITEM", &[]),
            Err(RuntimeError::TypeError { .. })
        ));
        assert_eq!(vm.find_instance("broken"), None);
        assert_eq!(vm.instances.len(), 0);
    }

    #[test]
    fn void_override_takes_default() {
        let mut vm = vm();
        vm.define_class(
            ClassDef::new("LIST").slot(
                SlotDef::new("items")
                    .multiple()
                    .default_value(Value::multifield(vec![Value::Integer(1)])),
            ),
        )
        .unwrap();
        let a = vm.make_instance(None, "ITEM", &[("label", Value::Void)]).unwrap();
        assert_eq!(vm.get_slot(a, "label"), Ok(vm.symbol("none")));
        let l = vm.make_instance(None, "LIST", &[("items", Value::Void)]).unwrap();
        assert_eq!(vm.get_slot(l, "items"), Ok(Value::multifield(vec![Value::Integer(1)])));
        let empty = vm.make_instance(None, "LIST", &[("items", Value::empty_multifield())]).unwrap();
        assert_eq!(vm.get_slot(empty, "items"), Ok(Value::empty_multifield()));
    }

    #[test]
    fn init_slots_stops_when_halted() {
        let mut vm = vm();
        let a = vm.make_instance(None, "ITEM", &[]).unwrap();
        let box_ = vm.symbol("box");
        vm.put_slot(a, "label", box_.clone()).unwrap();
        {
            let instance = vm.instance_mut(a);
            instance.initialize_in_progress = true;
            instance.init_slots_called = false;
        }
        vm.set_halt();
        assert_eq!(vm.init_slots(a), Err(RuntimeError::Halted));
        assert!(!vm.instance(a).init_slots_called);
        vm.instance_mut(a).initialize_in_progress = false;
        assert_eq!(vm.get_slot(a, "label"), Ok(box_));
    }

    #[test]
    fn dynamic_defaults_run_per_instance() {
        let mut vm = vm();
        let s = vm.symbols.clone();
        vm.define_class(
            ClassDef::new("COUNTED").slot(
                SlotDef::new("serial").dynamic_default(Expr::call(&s, "+", vec![Expr::int(1), Expr::int(1)])),
            ),
        )
        .unwrap();
        let a = vm.make_instance(None, "COUNTED", &[]).unwrap();
        assert_eq!(vm.get_slot(a, "serial"), Ok(Value::Integer(2)));
    }

    #[test]
    fn initialize_only_slot() {
        let mut vm = vm();
        vm.define_class(ClassDef::new("ONCE").slot(SlotDef::new("v").initialize_only()))
            .unwrap();
        let a = vm.make_instance(None, "ONCE", &[("v", Value::Integer(4))]).unwrap();
        assert_eq!(vm.get_slot(a, "v"), Ok(Value::Integer(4)));
        assert_eq!(
            vm.put_slot(a, "v", Value::Integer(5)),
            Err(RuntimeError::ReadOnlySlot("v".into()))
        );
    }

    #[test]
    fn protocol_order() {
        let mut vm = vm();
        let s = vm.symbols.clone();
        let say = |text: &str| Expr::call(&s, "printout", vec![Expr::sym(&s, "t"), Expr::string(&s, text)]);
        vm.define_handler("ITEM", "create", HandlerType::After, HandlerDef::new(say("create ")))
            .unwrap();
        vm.define_handler("ITEM", "put-label", HandlerType::Before, HandlerDef::new(say("put ")).wildcard().params(1))
            .unwrap();
        vm.define_handler("ITEM", "init", HandlerType::After, HandlerDef::new(say("init")))
            .unwrap();
        vm.make_instance(None, "ITEM", &[("label", vm.symbol("z"))]).unwrap();
        assert_eq!(vm.take_output(), "create put init");
    }

    #[test]
    fn init_outside_initialization() {
        let mut vm = vm();
        let a = vm.make_instance(None, "ITEM", &[]).unwrap();
        assert_eq!(
            vm.send(Value::InstanceAddress(a), "init", &[]),
            Err(RuntimeError::NotInitializing("gen1".into()))
        );
    }

    // ── Shared slots ───────────────────────────────────────────────

    #[test]
    fn shared_slot_keeps_value_across_instances() {
        let mut vm = vm();
        let a = vm.make_instance(None, "ITEM", &[]).unwrap();
        vm.put_slot(a, "count", Value::Integer(9)).unwrap();
        let b = vm.make_instance(None, "ITEM", &[]).unwrap();
        assert_eq!(vm.get_slot(b, "count"), Ok(Value::Integer(9)));

        vm.unmake_instance(a).unwrap();
        vm.unmake_instance(b).unwrap();
        let item = vm.find_class("ITEM").unwrap();
        let slot = vm.classes[item].instance_template[1];
        assert_eq!(vm.classes.slot(slot).shared_count, 0);
        assert_eq!(vm.classes.slot(slot).shared_value.value, Value::Void);

        let c = vm.make_instance(None, "ITEM", &[]).unwrap();
        assert_eq!(vm.get_slot(c, "count"), Ok(Value::Integer(0)));
    }

    // ── Deletion ───────────────────────────────────────────────────

    #[test]
    fn delete_frees_and_unpins_class() {
        let mut vm = vm();
        let item = vm.find_class("ITEM").unwrap();
        let a = vm.make_instance(None, "ITEM", &[]).unwrap();
        assert_eq!(vm.classes[item].busy, 1);
        assert_eq!(vm.delete_class("ITEM"), Err(RuntimeError::ClassInUse("ITEM".into())));
        assert_eq!(vm.unmake_instance(a), Ok(true));
        assert_eq!(vm.classes[item].busy, 0);
        assert!(vm.instances.get(a).is_none());
        assert_eq!(vm.unmake_instance(a), Err(RuntimeError::InstanceDeleted));
        assert!(vm.delete_class("ITEM").is_ok());
    }

    #[test]
    fn garbage_is_swept_when_released() {
        let mut vm = vm();
        let a = vm.make_instance(None, "ITEM", &[]).unwrap();
        vm.retain_instance(a);
        vm.unmake_instance(a).unwrap();
        assert_eq!(vm.instances.garbage(), &[a]);
        assert_eq!(vm.cleanup_instances(), 0);
        vm.instance_mut(a).busy = 0;
        assert_eq!(vm.cleanup_instances(), 1);
        assert!(vm.instances.garbage().is_empty());
    }

    // ── Pattern network ────────────────────────────────────────────

    #[test]
    fn reactive_instances_are_announced() {
        let mut vm = vm();
        let net = RecordingNetwork::new();
        let events = net.events.clone();
        vm.set_network(Box::new(net));
        let a = vm.make_instance(None, "ITEM", &[]).unwrap();
        vm.put_slot(a, "label", vm.symbol("q")).unwrap();
        vm.unmake_instance(a).unwrap();
        let kinds: Vec<NetworkAction> = events.borrow().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![NetworkAction::Assert, NetworkAction::Modify, NetworkAction::Retract]
        );
    }

    #[test]
    fn reactive_classes_locked_during_join() {
        let mut vm = vm();
        let a = vm.make_instance(None, "ITEM", &[]).unwrap();
        vm.set_join_in_progress(true);
        assert_eq!(
            vm.make_instance(None, "ITEM", &[]),
            Err(RuntimeError::ReactiveClassDuringJoin("ITEM".into()))
        );
        assert_eq!(
            vm.unmake_instance(a),
            Err(RuntimeError::ReactiveClassDuringJoin("ITEM".into()))
        );
        vm.set_join_in_progress(false);
        assert_eq!(vm.unmake_instance(a), Ok(true));
    }

    #[test]
    fn withdrawn_logical_support() {
        let mut vm = vm();
        let net = RecordingNetwork {
            withdraw_support: true,
            ..RecordingNetwork::default()
        };
        vm.set_network(Box::new(net));
        assert_eq!(
            vm.make_instance(Some("lost"), "ITEM", &[]),
            Err(RuntimeError::LogicalSupportLost("lost".into()))
        );
        assert_eq!(vm.find_instance("lost"), None);
    }
}
