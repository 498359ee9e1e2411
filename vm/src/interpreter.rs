use std::rc::Rc;

use object::{Atom, ClassId, Code, Symbols, Value, slot_visible};

use crate::{RuntimeError, VM};

/// Action tree of a handler, method, query or dynamic default.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    /// `?self`.
    SelfRef,
    /// Positional parameter, counting from 0.
    Arg(usize),
    /// Arguments bound to the wildcard parameter, as a multifield.
    Rest,
    /// Wildcard arguments as a slot value: `Void` when there are none, the
    /// argument itself when there is one, a multifield otherwise.
    RestValue,
    Local(usize),
    Bind(usize, Box<Expr>),
    /// Direct read of a slot of `?self`.
    SlotGet(Atom),
    /// Direct write of a slot of `?self`; yields the stored value.
    SlotSet(Atom, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Progn(Vec<Expr>),
    While(Box<Expr>, Box<Expr>),
    /// Primitive call, falling back to a generic function of that name.
    Call(Atom, Vec<Expr>),
    Send(Box<Expr>, Atom, Vec<Expr>),
    Generic(Atom, Vec<Expr>),
    CallNextHandler,
    OverrideNextHandler(Vec<Expr>),
    NextHandlerp,
    CallNextMethod,
    OverrideNextMethod(Vec<Expr>),
    NextMethodp,
    CallSpecificMethod(Atom, u16, Vec<Expr>),
    CurrentArgument,
}

impl Expr {
    pub fn int(n: i64) -> Expr {
        Expr::Const(Value::Integer(n))
    }

    pub fn float(f: f64) -> Expr {
        Expr::Const(Value::Float(f))
    }

    pub fn sym(symbols: &Symbols, name: &str) -> Expr {
        Expr::Const(Value::Symbol(symbols.intern(name)))
    }

    pub fn string(symbols: &Symbols, text: &str) -> Expr {
        Expr::Const(Value::String(symbols.intern(text)))
    }

    pub fn slot(symbols: &Symbols, name: &str) -> Expr {
        Expr::SlotGet(symbols.intern(name))
    }

    pub fn set_slot(symbols: &Symbols, name: &str, value: Expr) -> Expr {
        Expr::SlotSet(symbols.intern(name), Box::new(value))
    }

    pub fn call(symbols: &Symbols, name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(symbols.intern(name), args)
    }

    pub fn send(receiver: Expr, symbols: &Symbols, message: &str, args: Vec<Expr>) -> Expr {
        Expr::Send(Box::new(receiver), symbols.intern(message), args)
    }

    pub fn generic(symbols: &Symbols, name: &str, args: Vec<Expr>) -> Expr {
        Expr::Generic(symbols.intern(name), args)
    }

    pub fn if_(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::If(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    pub fn bind(local: usize, value: Expr) -> Expr {
        Expr::Bind(local, Box::new(value))
    }

    pub fn progn(body: Vec<Expr>) -> Expr {
        Expr::Progn(body)
    }

    pub fn while_(cond: Expr, body: Expr) -> Expr {
        Expr::While(Box::new(cond), Box::new(body))
    }
}

// ── Frames ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    TopLevel,
    Handler,
    Method,
    Query,
    Default,
}

/// Bindings of one executing body.
#[derive(Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub self_value: Option<Value>,
    pub args: Rc<[Value]>,
    /// First argument bound to the wildcard.
    pub rest_start: usize,
    pub locals: Vec<Value>,
    /// Class whose handler is executing; decides slot visibility.
    pub class: Option<ClassId>,
}

impl Frame {
    pub fn top_level() -> Self {
        Self {
            kind: FrameKind::TopLevel,
            self_value: None,
            args: Rc::from(Vec::new()),
            rest_start: 0,
            locals: Vec::new(),
            class: None,
        }
    }

    pub fn handler(
        receiver: Value,
        args: Rc<[Value]>,
        rest_start: usize,
        locals: u16,
        class: ClassId,
    ) -> Self {
        Self {
            kind: FrameKind::Handler,
            self_value: Some(receiver),
            args,
            rest_start,
            locals: vec![Value::FALSE; locals as usize],
            class: Some(class),
        }
    }

    pub fn method(args: Rc<[Value]>, rest_start: usize, locals: u16) -> Self {
        Self {
            kind: FrameKind::Method,
            self_value: None,
            args,
            rest_start,
            locals: vec![Value::FALSE; locals as usize],
            class: None,
        }
    }

    pub fn query(args: Rc<[Value]>) -> Self {
        Self {
            kind: FrameKind::Query,
            self_value: None,
            args,
            rest_start: 0,
            locals: Vec::new(),
            class: None,
        }
    }

    /// Dynamic defaults see the instance being initialized as `?self`.
    pub fn default_for(receiver: Value) -> Self {
        Self {
            kind: FrameKind::Default,
            self_value: Some(receiver),
            args: Rc::from(Vec::new()),
            rest_start: 0,
            locals: Vec::new(),
            class: None,
        }
    }
}

fn frame(vm: &VM) -> &Frame {
    vm.frames.last().expect("evaluation without a frame")
}

fn frame_mut(vm: &mut VM) -> &mut Frame {
    vm.frames.last_mut().expect("evaluation without a frame")
}

// ── Execution ─────────────────────────────────────────────────────────

/// Run a handler, method, query or default body in `frame`.
pub(crate) fn run_code(vm: &mut VM, code: Code, frame: Frame) -> Result<Value, RuntimeError> {
    vm.check_halt()?;
    match code {
        Code::Primitive(index) => {
            let receiver = frame.self_value.clone().unwrap_or(Value::Void);
            crate::primitives::call_primitive(vm, index as usize, receiver, &frame.args)
        }
        Code::Actions(index) => {
            if vm.depth >= vm.settings.max_depth {
                return vm.fail(RuntimeError::MaxDepth(vm.settings.max_depth));
            }
            let body = vm.body(index);
            vm.depth += 1;
            vm.frames.push(frame);
            let result = evaluate(vm, &body);
            vm.frames.pop();
            vm.depth -= 1;
            result
        }
    }
}

fn evaluate_args(vm: &mut VM, args: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
    args.iter().map(|arg| evaluate(vm, arg)).collect()
}

pub(crate) fn evaluate(vm: &mut VM, expr: &Expr) -> Result<Value, RuntimeError> {
    vm.check_halt()?;
    match expr {
        Expr::Const(value) => Ok(value.clone()),
        Expr::SelfRef => match frame(vm).self_value.clone() {
            Some(receiver) => Ok(receiver),
            None => vm.fail(RuntimeError::NoSelf),
        },
        Expr::Arg(index) => {
            let args = &frame(vm).args;
            match args.get(*index) {
                Some(value) => Ok(value.clone()),
                None => {
                    let got = args.len();
                    vm.fail(RuntimeError::WrongArgCount {
                        name: format!("parameter {}", index + 1),
                        expected: format!("at least {}", index + 1),
                        got,
                    })
                }
            }
        }
        Expr::Rest => {
            let f = frame(vm);
            let rest = f.args.get(f.rest_start..).unwrap_or(&[]).to_vec();
            Ok(Value::multifield(rest))
        }
        Expr::RestValue => {
            let f = frame(vm);
            Ok(match f.args.get(f.rest_start..).unwrap_or(&[]) {
                [] => Value::Void,
                [single] => single.clone(),
                rest => Value::multifield(rest.to_vec()),
            })
        }
        Expr::Local(index) => Ok(frame(vm)
            .locals
            .get(*index)
            .cloned()
            .unwrap_or(Value::FALSE)),
        Expr::Bind(index, value) => {
            let value = evaluate(vm, value)?;
            let locals = &mut frame_mut(vm).locals;
            if locals.len() <= *index {
                locals.resize(index + 1, Value::FALSE);
            }
            locals[*index] = value.clone();
            Ok(value)
        }
        Expr::SlotGet(name) => self_slot_get(vm, *name),
        Expr::SlotSet(name, value) => {
            let value = evaluate(vm, value)?;
            self_slot_put(vm, *name, value)
        }
        Expr::If(cond, then, otherwise) => {
            if evaluate(vm, cond)?.is_true() {
                evaluate(vm, then)
            } else {
                evaluate(vm, otherwise)
            }
        }
        Expr::Progn(body) => {
            let mut last = Value::FALSE;
            for e in body {
                last = evaluate(vm, e)?;
            }
            Ok(last)
        }
        Expr::While(cond, body) => {
            while evaluate(vm, cond)?.is_true() {
                evaluate(vm, body)?;
            }
            Ok(Value::FALSE)
        }
        Expr::Call(name, args) => {
            let args = evaluate_args(vm, args)?;
            vm.call_function(*name, args)
        }
        Expr::Send(receiver, message, args) => {
            let receiver = evaluate(vm, receiver)?;
            let args = evaluate_args(vm, args)?;
            vm.send_message(receiver, *message, Rc::from(args))
        }
        Expr::Generic(name, args) => {
            let args = evaluate_args(vm, args)?;
            vm.call_generic_named(*name, None, Rc::from(args))
        }
        Expr::CallNextHandler => vm.call_next_handler(None),
        Expr::OverrideNextHandler(args) => {
            let args = evaluate_args(vm, args)?;
            vm.call_next_handler(Some(Rc::from(args)))
        }
        Expr::NextHandlerp => Ok(Value::from_bool(vm.next_handler_available())),
        Expr::CallNextMethod => vm.call_next_method(None),
        Expr::OverrideNextMethod(args) => {
            let args = evaluate_args(vm, args)?;
            vm.call_next_method(Some(Rc::from(args)))
        }
        Expr::NextMethodp => vm.next_method_available().map(Value::from_bool),
        Expr::CallSpecificMethod(name, index, args) => {
            let args = evaluate_args(vm, args)?;
            vm.call_generic_named(*name, Some(*index), Rc::from(args))
        }
        Expr::CurrentArgument => match vm.current_arguments.last() {
            Some(value) => Ok(value.clone()),
            None => vm.fail(RuntimeError::NoCurrentArgument),
        },
    }
}

// ── Slot access through ?self ─────────────────────────────────────────

fn self_slot_target(vm: &mut VM, name: Atom) -> Result<(object::InstanceId, usize), RuntimeError> {
    let (receiver, handler_class) = {
        let f = frame(vm);
        (f.self_value.clone(), f.class)
    };
    let Some(receiver) = receiver else {
        return vm.fail(RuntimeError::NoSelf);
    };
    let id = vm.resolve_instance(&receiver)?;
    let lookup = vm.resolve_slot(id, name)?;
    if let Some(handler_class) = handler_class {
        if !slot_visible(&vm.classes, handler_class, lookup.slot) {
            let class = vm.name_of(vm.classes[handler_class].name);
            return vm.fail(RuntimeError::SlotNotVisible {
                slot: vm.name_of(name),
                class,
            });
        }
    }
    Ok((id, lookup.position))
}

fn self_slot_get(vm: &mut VM, name: Atom) -> Result<Value, RuntimeError> {
    let (id, position) = self_slot_target(vm, name)?;
    Ok(vm.slot_value(id, position))
}

fn self_slot_put(vm: &mut VM, name: Atom, value: Value) -> Result<Value, RuntimeError> {
    let (id, position) = self_slot_target(vm, name)?;
    vm.check_writable(id, position)?;
    vm.put_slot_value(id, position, value)
}
