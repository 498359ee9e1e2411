use std::rc::Rc;

use object::{Atom, GenericId, Value};

use crate::interpreter::{Frame, FrameKind, run_code};
use crate::{RuntimeError, VM};

/// An executing generic function call.
#[derive(Debug)]
pub(crate) struct GenericFrame {
    pub generic: GenericId,
    pub args: Rc<[Value]>,
    /// Index of the method currently running.
    pub method: u16,
}

impl VM {
    /// Call a generic function with already evaluated arguments.
    pub fn call_generic(&mut self, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let atom = self.atom(name);
        self.top_level(|vm| vm.call_generic_named(atom, None, Rc::from(args)))
    }

    /// Call one method directly; it must be applicable to `args`.
    pub fn call_specific_method(
        &mut self,
        name: &str,
        index: u16,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let atom = self.atom(name);
        self.top_level(|vm| vm.call_generic_named(atom, Some(index), Rc::from(args)))
    }

    pub(crate) fn call_generic_named(
        &mut self,
        name: Atom,
        method: Option<u16>,
        args: Rc<[Value]>,
    ) -> Result<Value, RuntimeError> {
        match self.generics.find(name) {
            Some(generic) => self.generic_dispatch(generic, method, args),
            None => self.fail(RuntimeError::GenericNotFound(self.name_of(name))),
        }
    }

    fn generic_name(&self, generic: GenericId) -> String {
        self.generics
            .get(generic)
            .map_or_else(String::new, |g| self.name_of(g.name))
    }

    fn pin_generic(&mut self, generic: GenericId, pin: bool) {
        if let Some(g) = self.generics.get_mut(generic) {
            if pin {
                g.busy += 1;
            } else {
                g.busy -= 1;
            }
        }
    }

    /// Run the most specific applicable method, or `specific` when given.
    pub(crate) fn generic_dispatch(
        &mut self,
        generic: GenericId,
        specific: Option<u16>,
        args: Rc<[Value]>,
    ) -> Result<Value, RuntimeError> {
        self.check_halt()?;
        self.pin_generic(generic, true);
        let result = self.select_method(generic, specific, &args).and_then(|position| {
            let index = self.generics.get(generic).expect("unknown generic id").methods[position].index;
            log::trace!("{} dispatches to method #{index}", self.generic_name(generic));
            self.calls.push(GenericFrame {
                generic,
                args: args.clone(),
                method: index,
            });
            let result = self.execute_method(generic, position, args);
            self.calls.pop();
            result
        });
        self.pin_generic(generic, false);
        result
    }

    fn select_method(
        &mut self,
        generic: GenericId,
        specific: Option<u16>,
        args: &Rc<[Value]>,
    ) -> Result<usize, RuntimeError> {
        let Some(index) = specific else {
            return match self.find_applicable_method(generic, 0, args)? {
                Some(position) => Ok(position),
                None => self.fail(RuntimeError::NoApplicableMethod(self.generic_name(generic))),
            };
        };
        let position = self.generics.get(generic).and_then(|g| g.method_position(index));
        let Some(position) = position else {
            return self.fail(RuntimeError::MethodNotFound {
                generic: self.generic_name(generic),
                index,
            });
        };
        if !self.is_method_applicable(generic, position, args)? {
            return self.fail(RuntimeError::MethodNotApplicable {
                generic: self.generic_name(generic),
                index,
            });
        }
        Ok(position)
    }

    /// First applicable method at or after `start`. Each candidate is
    /// pinned while its restrictions are tested.
    fn find_applicable_method(
        &mut self,
        generic: GenericId,
        start: usize,
        args: &Rc<[Value]>,
    ) -> Result<Option<usize>, RuntimeError> {
        let count = self.generics.get(generic).map_or(0, |g| g.methods.len());
        for position in start..count {
            self.pin_method(generic, position, true);
            let applicable = self.is_method_applicable(generic, position, args);
            self.pin_method(generic, position, false);
            if applicable? {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    fn pin_method(&mut self, generic: GenericId, position: usize, pin: bool) {
        let method = &mut self.generics.get_mut(generic).expect("unknown generic id").methods[position];
        if pin {
            method.busy += 1;
        } else {
            method.busy -= 1;
        }
    }

    /// Arity first, then each argument against its restriction: the
    /// argument's class must be one of the listed classes or a subclass,
    /// and the query, if any, must hold.
    fn is_method_applicable(
        &mut self,
        generic: GenericId,
        position: usize,
        args: &Rc<[Value]>,
    ) -> Result<bool, RuntimeError> {
        let method = self.generics.get(generic).expect("unknown generic id").methods[position].clone();
        if !method.accepts(args.len()) {
            return Ok(false);
        }
        for (i, arg) in args.iter().enumerate() {
            let Some(restriction) = method.restriction(i) else {
                continue;
            };
            if !restriction.types.is_empty() {
                let class = self.value_class(arg)?;
                let allowed = restriction
                    .types
                    .iter()
                    .any(|&t| self.classes.is_subclass_or_same(class, t));
                if !allowed {
                    return Ok(false);
                }
            }
            if let Some(query) = restriction.query {
                self.current_arguments.push(arg.clone());
                let holds = run_code(self, query, Frame::query(args.clone()));
                self.current_arguments.pop();
                if holds?.is_false() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn execute_method(
        &mut self,
        generic: GenericId,
        position: usize,
        args: Rc<[Value]>,
    ) -> Result<Value, RuntimeError> {
        self.check_halt()?;
        let (index, code, min, locals) = {
            let m = &self.generics.get(generic).expect("unknown generic id").methods[position];
            (m.index, m.code, m.min_restrictions, m.local_var_count)
        };
        let previous = self.calls.last_mut().map(|call| std::mem::replace(&mut call.method, index));
        self.pin_method(generic, position, true);
        let result = run_code(self, code, Frame::method(args, min as usize, locals));
        self.pin_method(generic, position, false);
        if let (Some(call), Some(previous)) = (self.calls.last_mut(), previous) {
            call.method = previous;
        }
        result
    }

    fn in_method(&self) -> bool {
        !self.calls.is_empty() && self.frames.last().is_some_and(|f| f.kind == FrameKind::Method)
    }

    /// Position of the running method and of the next applicable one.
    fn next_method(&mut self, args: &Rc<[Value]>) -> Result<Option<(GenericId, usize)>, RuntimeError> {
        if !self.in_method() {
            return Ok(None);
        }
        let (generic, index) = {
            let call = self.calls.last().expect("no generic call is executing");
            (call.generic, call.method)
        };
        let current = self.generics.get(generic).and_then(|g| g.method_position(index));
        let Some(current) = current else {
            return Ok(None);
        };
        Ok(self
            .find_applicable_method(generic, current + 1, args)?
            .map(|next| (generic, next)))
    }

    /// `next-methodp`.
    pub(crate) fn next_method_available(&mut self) -> Result<bool, RuntimeError> {
        let Some(args) = self.calls.last().map(|c| c.args.clone()) else {
            return Ok(false);
        };
        Ok(self.next_method(&args)?.is_some())
    }

    /// `call-next-method`, or `override-next-method` when `args` is given.
    pub(crate) fn call_next_method(&mut self, args: Option<Rc<[Value]>>) -> Result<Value, RuntimeError> {
        let Some(current) = self.calls.last().map(|c| c.args.clone()) else {
            return self.fail(RuntimeError::NoNextMethod);
        };
        let args = args.unwrap_or(current);
        let Some((generic, next)) = self.next_method(&args)? else {
            return self.fail(RuntimeError::NoNextMethod);
        };
        let saved = self
            .calls
            .last_mut()
            .map(|call| std::mem::replace(&mut call.args, args.clone()));
        let result = self.execute_method(generic, next, args);
        if let (Some(call), Some(saved)) = (self.calls.last_mut(), saved) {
            call.args = saved;
        }
        result
    }
}
