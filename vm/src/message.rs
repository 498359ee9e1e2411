use std::rc::Rc;

use object::{Atom, ClassId, HandlerType, InstanceId, Value};

use crate::interpreter::{Frame, FrameKind, run_code};
use crate::{RuntimeError, VM};

/// One handler of a dispatch core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HandlerLink {
    pub class: ClassId,
    pub index: usize,
    pub kind: HandlerType,
}

/// An executing message: the applicable handlers in execution order and
/// the one currently running.
#[derive(Debug)]
pub(crate) struct MessageFrame {
    pub name: Atom,
    pub receiver: Value,
    pub args: Rc<[Value]>,
    pub core: Rc<[HandlerLink]>,
    pub current: usize,
}

impl VM {
    /// Send `message` to `receiver`.
    pub fn send(&mut self, receiver: Value, message: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let name = self.atom(message);
        self.top_level(|vm| vm.send_message(receiver, name, Rc::from(args)))
    }

    /// Applicable handlers of `name` for `class`: arounds and befores most
    /// specific first, then primaries, then afters most general first.
    fn build_core(&self, class: ClassId, name: Atom) -> Vec<HandlerLink> {
        let mut groups: [Vec<HandlerLink>; 4] = Default::default();
        for &holder in &self.classes[class].all_superclasses {
            let c = &self.classes[holder];
            for index in c.handlers_named(name) {
                let kind = c.handlers[index].kind;
                groups[kind as usize].push(HandlerLink {
                    class: holder,
                    index,
                    kind,
                });
            }
        }
        groups[HandlerType::After as usize].reverse();
        groups.into_iter().flatten().collect()
    }

    fn pin_core(&mut self, core: &[HandlerLink], pin: bool) {
        for link in core {
            let class = &mut self.classes[link.class];
            let handler = &mut class.handlers[link.index];
            if pin {
                handler.busy += 1;
                class.busy += 1;
            } else {
                handler.busy -= 1;
                class.busy -= 1;
            }
        }
    }

    fn pin_instance(&mut self, instance: Option<InstanceId>, pin: bool) {
        let Some(id) = instance else {
            return;
        };
        if pin {
            self.retain_instance(id);
        } else {
            self.release_instance(id);
        }
    }

    pub(crate) fn send_message(
        &mut self,
        receiver: Value,
        message: Atom,
        args: Rc<[Value]>,
    ) -> Result<Value, RuntimeError> {
        self.check_halt()?;
        let (receiver, instance) = match receiver {
            Value::InstanceAddress(_) | Value::InstanceName(_) => {
                let id = self.resolve_instance(&receiver)?;
                (Value::InstanceAddress(id), Some(id))
            }
            other => (other, None),
        };
        let class = match instance {
            Some(id) => self.instance(id).class,
            None => self.special.primitive_class(receiver.primitive_type()),
        };

        let core = self.build_core(class, message);
        if !core.iter().any(|l| l.kind == HandlerType::Primary) {
            return self.fail(RuntimeError::NoPrimaryHandler {
                message: self.name_of(message),
                class: self.name_of(self.classes[class].name),
            });
        }
        log::trace!(
            "send {} to {} ({} handler(s))",
            self.symbols.name(message),
            self.repr(&receiver),
            core.len()
        );

        let core: Rc<[HandlerLink]> = core.into();
        self.pin_instance(instance, true);
        self.pin_core(&core, true);
        self.messages.push(MessageFrame {
            name: message,
            receiver,
            args,
            core: core.clone(),
            current: 0,
        });
        let result = self.call_handlers(0);
        self.messages.pop();
        self.pin_core(&core, false);
        self.pin_instance(instance, false);
        result
    }

    fn top_message(&self) -> &MessageFrame {
        self.messages.last().expect("no message is executing")
    }

    /// Execute the core from `start`: an around handler runs alone and
    /// continues the chain itself; otherwise befores, the first primary and
    /// the afters run in order. The result is the primary's.
    fn call_handlers(&mut self, start: usize) -> Result<Value, RuntimeError> {
        let core = self.top_message().core.clone();
        let mut pos = start;
        if core[pos].kind == HandlerType::Around {
            return self.execute_handler(pos);
        }
        while pos < core.len() && core[pos].kind == HandlerType::Before {
            self.execute_handler(pos)?;
            pos += 1;
        }
        let mut result = Value::FALSE;
        if pos < core.len() && core[pos].kind == HandlerType::Primary {
            result = self.execute_handler(pos)?;
            while pos < core.len() && core[pos].kind == HandlerType::Primary {
                pos += 1;
            }
        }
        while pos < core.len() && core[pos].kind == HandlerType::After {
            self.execute_handler(pos)?;
            pos += 1;
        }
        Ok(result)
    }

    fn execute_handler(&mut self, pos: usize) -> Result<Value, RuntimeError> {
        self.check_halt()?;
        let (link, receiver, args, previous) = {
            let frame = self.messages.last_mut().expect("no message is executing");
            let previous = frame.current;
            frame.current = pos;
            (frame.core[pos], frame.receiver.clone(), frame.args.clone(), previous)
        };
        let handler = &self.classes[link.class].handlers[link.index];
        let (code, min, locals) = (handler.code, handler.min_params, handler.local_var_count);
        if !handler.accepts(args.len()) {
            let expected = match handler.max_params {
                Some(max) if max == min => max.to_string(),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            let name = format!("message-handler {} {}", self.symbols.name(handler.name), handler.kind);
            return self.fail(RuntimeError::WrongArgCount {
                name,
                expected,
                got: args.len(),
            });
        }
        let frame = Frame::handler(receiver, args, min as usize, locals, link.class);
        let result = run_code(self, code, frame);
        if let Some(frame) = self.messages.last_mut() {
            frame.current = previous;
        }
        result
    }

    fn in_handler(&self) -> bool {
        !self.messages.is_empty()
            && self
                .frames
                .last()
                .is_some_and(|f| f.kind == FrameKind::Handler)
    }

    /// Whether `call-next-handler` would find a handler: from an around,
    /// anything after it; from a primary, a following primary.
    pub(crate) fn next_handler_available(&self) -> bool {
        if !self.in_handler() {
            return false;
        }
        let frame = self.top_message();
        let next = frame.current + 1;
        match frame.core[frame.current].kind {
            HandlerType::Around => next < frame.core.len(),
            HandlerType::Primary => frame
                .core
                .get(next)
                .is_some_and(|l| l.kind == HandlerType::Primary),
            _ => false,
        }
    }

    /// Continue with the next shadowed handler, optionally with new
    /// arguments.
    pub(crate) fn call_next_handler(&mut self, args: Option<Rc<[Value]>>) -> Result<Value, RuntimeError> {
        if !self.next_handler_available() {
            return self.fail(RuntimeError::NoNextHandler);
        }
        let (current, kind, next_kind) = {
            let frame = self.top_message();
            let current = frame.current;
            (current, frame.core[current].kind, frame.core[current + 1].kind)
        };
        let saved = args.map(|args| {
            let frame = self.messages.last_mut().expect("no message is executing");
            std::mem::replace(&mut frame.args, args)
        });
        let result = if kind == HandlerType::Around && next_kind != HandlerType::Around {
            self.call_handlers(current + 1)
        } else {
            self.execute_handler(current + 1)
        };
        if let Some(frame) = self.messages.last_mut() {
            frame.current = current;
            if let Some(args) = saved {
                frame.args = args;
            }
        }
        result
    }

    /// Name of the message being handled, for diagnostics.
    pub fn current_message(&self) -> Option<String> {
        self.messages.last().map(|m| self.name_of(m.name))
    }
}
