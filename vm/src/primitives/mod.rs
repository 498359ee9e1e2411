use object::{Atom, InstanceId, Value};

use crate::{RuntimeError, VM};

pub mod handler;
pub mod instance;
pub mod io;
pub mod math;
pub mod multifield;

/// Receiver is `?self` when the primitive backs a message handler and
/// [`Value::Void`] otherwise.
pub type PrimitiveFn = fn(&mut VM, Value, &[Value]) -> Result<Value, RuntimeError>;

#[derive(Clone, Copy)]
pub struct PrimitiveDesc {
    pub name: &'static str,
    /// Exact argument count, or the minimum when `variadic`.
    pub arity: u8,
    pub variadic: bool,
    pub func: PrimitiveFn,
}

impl PrimitiveDesc {
    pub const fn new(name: &'static str, arity: u8, func: PrimitiveFn) -> Self {
        Self {
            name,
            arity,
            variadic: false,
            func,
        }
    }

    pub const fn variadic(name: &'static str, min: u8, func: PrimitiveFn) -> Self {
        Self {
            name,
            arity: min,
            variadic: true,
            func,
        }
    }

    pub fn accepts(&self, argc: usize) -> bool {
        if self.variadic {
            argc >= self.arity as usize
        } else {
            argc == self.arity as usize
        }
    }
}

impl core::fmt::Debug for PrimitiveDesc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrimitiveDesc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("variadic", &self.variadic)
            .finish()
    }
}

pub fn default_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::variadic("+", 2, math::add),
        PrimitiveDesc::variadic("-", 2, math::sub),
        PrimitiveDesc::variadic("*", 2, math::mul),
        PrimitiveDesc::variadic("/", 2, math::div),
        PrimitiveDesc::variadic("=", 2, math::num_eq),
        PrimitiveDesc::variadic("<", 2, math::lt),
        PrimitiveDesc::variadic(">", 2, math::gt),
        PrimitiveDesc::variadic("<=", 2, math::le),
        PrimitiveDesc::variadic(">=", 2, math::ge),
        PrimitiveDesc::variadic("eq", 2, math::eq),
        PrimitiveDesc::variadic("neq", 2, math::neq),
        PrimitiveDesc::new("not", 1, math::not),
        PrimitiveDesc::variadic("printout", 1, io::printout),
        PrimitiveDesc::variadic("str-cat", 0, io::str_cat),
        PrimitiveDesc::variadic("sym-cat", 0, io::sym_cat),
        PrimitiveDesc::variadic("create$", 0, multifield::create),
        PrimitiveDesc::new("length$", 1, multifield::length),
        PrimitiveDesc::new("nth$", 2, multifield::nth),
        PrimitiveDesc::variadic("make-instance", 2, instance::make_instance),
        PrimitiveDesc::new("unmake-instance", 1, instance::unmake_instance),
        PrimitiveDesc::variadic("send", 2, instance::send),
        PrimitiveDesc::new("instance-name", 1, instance::instance_name),
        PrimitiveDesc::new("instance-address", 1, instance::instance_address),
        PrimitiveDesc::new("instance-existp", 1, instance::instance_existp),
        PrimitiveDesc::new("class", 1, instance::class),
        PrimitiveDesc::variadic("modify-instance", 1, instance::modify_instance),
        PrimitiveDesc::variadic(
            "message-modify-instance",
            1,
            instance::message_modify_instance,
        ),
        PrimitiveDesc::variadic("duplicate-instance", 1, instance::duplicate_instance),
        PrimitiveDesc::variadic(
            "message-duplicate-instance",
            1,
            instance::message_duplicate_instance,
        ),
        PrimitiveDesc::new("slot-get", 2, instance::slot_get),
        PrimitiveDesc::new("slot-put", 3, instance::slot_put),
        PrimitiveDesc::new("init-slots", 0, handler::init_slots),
        PrimitiveDesc::new("delete-instance", 0, handler::delete_instance),
        PrimitiveDesc::new("print-instance", 0, handler::print_instance),
        PrimitiveDesc::new("instance-created", 0, handler::instance_created),
        PrimitiveDesc::new("direct-modify", 1, handler::direct_modify),
        PrimitiveDesc::new("message-modify", 1, handler::message_modify),
        PrimitiveDesc::new("direct-duplicate", 2, handler::direct_duplicate),
        PrimitiveDesc::new("message-duplicate", 2, handler::message_duplicate),
    ]
}

pub fn primitive_index_by_name(prims: &[PrimitiveDesc], name: &str) -> Option<usize> {
    prims.iter().position(|p| p.name == name)
}

/// Invoke primitive `index`. Errors the primitive returns without
/// reporting are reported here.
pub(crate) fn call_primitive(
    vm: &mut VM,
    index: usize,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let desc = vm.primitives[index];
    if !desc.accepts(args.len()) {
        let expected = if desc.variadic {
            format!("at least {}", desc.arity)
        } else {
            desc.arity.to_string()
        };
        return vm.fail(RuntimeError::WrongArgCount {
            name: desc.name.to_string(),
            expected,
            got: args.len(),
        });
    }
    (desc.func)(vm, receiver, args).map_err(|e| vm.report(e))
}

impl VM {
    /// Call a function by name: a primitive, else a generic function.
    pub(crate) fn call_function(&mut self, name: Atom, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if let Some(&index) = self.primitive_index.get(&name) {
            return call_primitive(self, index, Value::Void, &args);
        }
        if self.generics.find(name).is_some() {
            return self.call_generic_named(name, None, args.into());
        }
        self.fail(RuntimeError::FunctionNotFound(self.name_of(name)))
    }

    pub(crate) fn primitive_code(&self, name: &str) -> Option<object::Code> {
        let atom = self.symbols.find(name)?;
        self.primitive_index
            .get(&atom)
            .map(|&i| object::Code::Primitive(i as u32))
    }
}

// ── Argument helpers ──────────────────────────────────────────────────

pub(crate) fn type_error(vm: &VM, expected: &'static str, got: &Value) -> RuntimeError {
    RuntimeError::TypeError {
        expected,
        got: vm.repr(got),
    }
}

pub(crate) fn expect_integer(vm: &VM, value: &Value) -> Result<i64, RuntimeError> {
    value
        .as_integer()
        .ok_or_else(|| type_error(vm, "integer", value))
}

pub(crate) fn expect_number(vm: &VM, value: &Value) -> Result<f64, RuntimeError> {
    value.as_number().ok_or_else(|| type_error(vm, "number", value))
}

pub(crate) fn expect_lexeme(vm: &VM, value: &Value) -> Result<Atom, RuntimeError> {
    match value {
        Value::Symbol(atom) | Value::String(atom) => Ok(*atom),
        other => Err(type_error(vm, "symbol or string", other)),
    }
}

/// Instance a primitive receiver refers to.
pub(crate) fn expect_self(vm: &mut VM, receiver: &Value) -> Result<InstanceId, RuntimeError> {
    if receiver.is_void() {
        return vm.fail(RuntimeError::NoSelf);
    }
    vm.resolve_instance(receiver)
}

/// Parse trailing `slot value` pairs.
pub(crate) fn slot_value_pairs(vm: &VM, args: &[Value]) -> Result<Vec<(Atom, Value)>, RuntimeError> {
    if args.len() % 2 != 0 {
        return Err(RuntimeError::WrongArgCount {
            name: "slot override list".to_string(),
            expected: "slot/value pairs".to_string(),
            got: args.len(),
        });
    }
    args.chunks(2)
        .map(|pair| Ok((expect_lexeme(vm, &pair[0])?, pair[1].clone())))
        .collect()
}
