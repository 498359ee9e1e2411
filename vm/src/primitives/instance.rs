use object::Value;

use crate::manager::OverrideMode;
use crate::primitives::{expect_lexeme, slot_value_pairs, type_error};
use crate::{RuntimeError, VM};

fn instance_name_arg(vm: &VM, value: &Value) -> Result<Option<object::Atom>, RuntimeError> {
    match value {
        Value::Symbol(atom) if *atom == object::Atom::NIL => Ok(None),
        Value::Symbol(atom) | Value::InstanceName(atom) => Ok(Some(*atom)),
        other => Err(type_error(vm, "instance name", other)),
    }
}

/// `(make-instance <name>|nil <class> <slot> <value> ...)`; returns the
/// name of the new instance.
pub fn make_instance(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = instance_name_arg(vm, &args[0])?;
    let class = expect_lexeme(vm, &args[1])?;
    let overrides = slot_value_pairs(vm, &args[2..])?;
    let id = vm.create_instance(name, class, overrides)?;
    let name = vm.instances.get(id).map(|i| i.name);
    Ok(name.map_or(Value::FALSE, Value::InstanceName))
}

/// `(unmake-instance <instance>|*)`.
pub fn unmake_instance(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let all = vm.atom("*");
    if args[0] == Value::Symbol(all) {
        let mut ok = true;
        for id in vm.instances.ids() {
            if vm.instances.is_live(id) {
                ok &= vm.delete_instance(id)?;
            }
        }
        return Ok(Value::from_bool(ok));
    }
    let id = vm.resolve_instance(&args[0])?;
    vm.delete_instance(id).map(Value::from_bool)
}

/// `(send <receiver> <message> <arg>*)`.
pub fn send(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let message = match &args[1] {
        Value::Symbol(atom) => *atom,
        other => return Err(type_error(vm, "message name", other)),
    };
    vm.send_message(args[0].clone(), message, args[2..].into())
}

pub fn instance_name(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let id = vm.resolve_instance(&args[0])?;
    let name = vm.instances.get(id).map(|i| i.name);
    Ok(name.map_or(Value::FALSE, Value::InstanceName))
}

pub fn instance_address(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    vm.resolve_instance(&args[0]).map(Value::InstanceAddress)
}

pub fn instance_existp(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let exists = match &args[0] {
        Value::InstanceAddress(id) => vm.instances.is_live(*id),
        Value::InstanceName(atom) | Value::Symbol(atom) => vm.instances.find_by_name(*atom).is_some(),
        _ => false,
    };
    Ok(Value::from_bool(exists))
}

/// Class name of any value; primitive values report their system class.
pub fn class(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let class = vm.value_class(&args[0])?;
    Ok(Value::Symbol(vm.classes[class].name))
}

fn modify(vm: &mut VM, args: &[Value], mode: OverrideMode) -> Result<Value, RuntimeError> {
    let overrides = slot_value_pairs(vm, &args[1..])?;
    vm.modify_with(&args[0], overrides, mode)
}

pub fn modify_instance(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    modify(vm, args, OverrideMode::Direct)
}

pub fn message_modify_instance(
    vm: &mut VM,
    _receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    modify(vm, args, OverrideMode::Message)
}

/// `(duplicate-instance <source> [<new-name>|nil <slot> <value> ...])`.
fn duplicate(vm: &mut VM, args: &[Value], mode: OverrideMode) -> Result<Value, RuntimeError> {
    let name = match args.get(1) {
        Some(value) => instance_name_arg(vm, value)?,
        None => None,
    };
    let overrides = slot_value_pairs(vm, args.get(2..).unwrap_or(&[]))?;
    vm.duplicate_with(&args[0], name, overrides, mode)
}

pub fn duplicate_instance(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    duplicate(vm, args, OverrideMode::Direct)
}

pub fn message_duplicate_instance(
    vm: &mut VM,
    _receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    duplicate(vm, args, OverrideMode::Message)
}

/// `(slot-get <instance> <slot>)`, bypassing handlers.
pub fn slot_get(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let id = vm.resolve_instance(&args[0])?;
    let slot = expect_lexeme(vm, &args[1])?;
    let lookup = vm.resolve_slot(id, slot)?;
    Ok(vm.slot_value(id, lookup.position))
}

/// `(slot-put <instance> <slot> <value>)`, bypassing handlers but not
/// access or constraint checks.
pub fn slot_put(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let id = vm.resolve_instance(&args[0])?;
    let slot = expect_lexeme(vm, &args[1])?;
    let lookup = vm.resolve_slot(id, slot)?;
    vm.check_writable(id, lookup.position)?;
    vm.put_slot_value(id, lookup.position, args[2].clone())
}
