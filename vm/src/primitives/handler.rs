//! Bodies of the system message handlers attached to `USER`.

use object::Value;

use crate::manager::OverrideMode;
use crate::modify::overrides_arg;
use crate::primitives::{expect_self, type_error};
use crate::{RuntimeError, VM};

/// `init`: apply slot defaults.
pub fn init_slots(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let id = expect_self(vm, &receiver)?;
    vm.init_slots(id)?;
    Ok(receiver)
}

/// `delete`: remove the instance; TRUE when it was removed.
pub fn delete_instance(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let id = expect_self(vm, &receiver)?;
    vm.quash_instance(id).map(Value::from_bool)
}

/// `print`: name and class, then one `(slot value)` line per slot.
pub fn print_instance(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let id = expect_self(vm, &receiver)?;
    let Some(instance) = vm.instances.get(id) else {
        return Err(RuntimeError::InstanceDeleted);
    };
    let class = &vm.classes[instance.class];
    let mut text = format!(
        "[{}] of {}\n",
        vm.symbols.name(instance.name),
        vm.symbols.name(class.name)
    );
    for position in 0..class.instance_template.len() {
        let slot = vm.classes.slot(class.instance_template[position]);
        let value = vm.slot_value(id, position);
        let shown = match &value {
            Value::Multifield(_) => {
                let inner = vm.repr(&value);
                inner[1..inner.len() - 1].to_string()
            }
            other => vm.repr(other),
        };
        text.push_str(&format!("({} {})\n", vm.symbols.name(slot.name), shown));
    }
    vm.write_output(&text);
    Ok(Value::FALSE)
}

/// `create`: runs before any slot is set. Nothing to do by default.
pub fn instance_created(_vm: &mut VM, _receiver: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::FALSE)
}

fn modify(vm: &mut VM, receiver: Value, args: &[Value], mode: OverrideMode) -> Result<Value, RuntimeError> {
    let id = expect_self(vm, &receiver)?;
    let overrides = overrides_arg(vm, &args[0])?;
    vm.apply_modify(id, &overrides, mode)?;
    Ok(Value::TRUE)
}

pub fn direct_modify(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    modify(vm, receiver, args, OverrideMode::Direct)
}

pub fn message_modify(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    modify(vm, receiver, args, OverrideMode::Message)
}

fn duplicate(vm: &mut VM, receiver: Value, args: &[Value], mode: OverrideMode) -> Result<Value, RuntimeError> {
    let id = expect_self(vm, &receiver)?;
    let name = match &args[0] {
        Value::InstanceName(atom) | Value::Symbol(atom) => *atom,
        other => return Err(type_error(vm, "instance name", other)),
    };
    let overrides = overrides_arg(vm, &args[1])?;
    vm.apply_duplicate(id, name, &overrides, mode)
        .map(Value::InstanceAddress)
}

pub fn direct_duplicate(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    duplicate(vm, receiver, args, OverrideMode::Direct)
}

pub fn message_duplicate(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    duplicate(vm, receiver, args, OverrideMode::Message)
}
