use object::Value;

use crate::primitives::{expect_integer, type_error};
use crate::{RuntimeError, VM};

/// Flattens multifield arguments into one multifield.
pub fn create(_vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::multifield(args.iter().flat_map(Value::fields).collect()))
}

pub fn length(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Multifield(fields) => Ok(Value::Integer(fields.len() as i64)),
        Value::String(atom) | Value::Symbol(atom) => {
            Ok(Value::Integer(vm.symbols.name(*atom).chars().count() as i64))
        }
        other => Err(type_error(vm, "multifield or lexeme", other)),
    }
}

/// `(nth$ <index> <multifield>)`, 1-based.
pub fn nth(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let index = expect_integer(vm, &args[0])?;
    let Value::Multifield(fields) = &args[1] else {
        return Err(type_error(vm, "multifield", &args[1]));
    };
    if index < 1 || index as usize > fields.len() {
        return Err(RuntimeError::IndexOutOfRange {
            index,
            len: fields.len(),
        });
    }
    Ok(fields[index as usize - 1].clone())
}
