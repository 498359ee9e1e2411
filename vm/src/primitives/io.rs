use object::Value;

use crate::{RuntimeError, VM};

/// `(printout <router> <item>*)`. Only the `t` router is known; `crlf`
/// writes a newline.
pub fn printout(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Symbol(router) if *router == vm.names.router_t => {}
        other => {
            log::warn!("printout to unknown router {}", vm.repr(other));
            return Ok(Value::FALSE);
        }
    }
    let mut text = String::new();
    for item in &args[1..] {
        match item {
            Value::Symbol(atom) if *atom == vm.names.crlf => text.push('\n'),
            other => text.push_str(&vm.display(other)),
        }
    }
    vm.write_output(&text);
    Ok(Value::FALSE)
}

fn concat(vm: &VM, args: &[Value]) -> String {
    args.iter().map(|v| vm.display(v)).collect()
}

pub fn str_cat(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let text = concat(vm, args);
    Ok(vm.string(&text))
}

pub fn sym_cat(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let text = concat(vm, args);
    Ok(vm.symbol(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VMCreateInfo;

    #[test]
    fn printout_to_t() {
        let mut vm = VM::new(VMCreateInfo::default()).unwrap();
        let args = [
            vm.symbol("t"),
            vm.string("x = "),
            Value::Integer(3),
            vm.symbol("crlf"),
        ];
        printout(&mut vm, Value::Void, &args).unwrap();
        assert_eq!(vm.take_output(), "x = 3\n");
        assert_eq!(vm.output(), "");
    }

    #[test]
    fn concatenation() {
        let mut vm = VM::new(VMCreateInfo::default()).unwrap();
        let args = [vm.symbol("get-"), vm.string("x")];
        let s = str_cat(&mut vm, Value::Void, &args).unwrap();
        assert_eq!(s, vm.string("get-x"));
        let s = sym_cat(&mut vm, Value::Void, &args).unwrap();
        assert_eq!(s, vm.symbol("get-x"));
    }
}
