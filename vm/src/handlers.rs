use object::{Atom, ClassId, Handler, HandlerType, LookupResult, lookup_handler};

use crate::interpreter::Expr;
use crate::{RuntimeError, VM};

/// A user message handler.
#[derive(Debug, Clone)]
pub struct HandlerDef {
    /// Positional parameters, not counting `?self`.
    pub params: u16,
    /// The last parameter collects any remaining arguments.
    pub wildcard: bool,
    pub locals: u16,
    pub body: Expr,
}

impl HandlerDef {
    pub fn new(body: Expr) -> Self {
        Self {
            params: 0,
            wildcard: false,
            locals: 0,
            body,
        }
    }

    pub fn params(mut self, params: u16) -> Self {
        self.params = params;
        self
    }

    pub fn wildcard(mut self) -> Self {
        self.wildcard = true;
        self
    }

    pub fn locals(mut self, locals: u16) -> Self {
        self.locals = locals;
        self
    }
}

impl VM {
    fn handler_class(&mut self, class: &str) -> Result<ClassId, RuntimeError> {
        match self.find_class(class) {
            Some(id) => Ok(id),
            None => self.fail(RuntimeError::ClassNotFound(class.to_string())),
        }
    }

    /// Define a handler, replacing an existing one of the same name and
    /// type on the class.
    pub fn define_handler(
        &mut self,
        class: &str,
        name: &str,
        kind: HandlerType,
        def: HandlerDef,
    ) -> Result<(), RuntimeError> {
        self.top_level(|vm| {
            let class_id = vm.handler_class(class)?;
            let atom = vm.atom(name);
            if let Some(index) = vm.classes[class_id].find_handler(atom, kind) {
                vm.remove_handler(class_id, index)?;
            } else if vm.classes[class_id].handlers_executing() {
                return vm.fail(RuntimeError::HandlerBusy {
                    handler: format!("{name} {kind}"),
                    class: class.to_string(),
                });
            }

            // Wildcard parameters count towards the minimum minus one.
            let (min, max) = if def.wildcard {
                (def.params.saturating_sub(1), None)
            } else {
                (def.params, Some(def.params))
            };
            let code = vm.add_body(def.body);
            vm.symbols.retain(atom);
            vm.classes[class_id].add_handler(Handler {
                name: atom,
                kind,
                class: class_id,
                system: false,
                min_params: min,
                max_params: max,
                local_var_count: def.locals,
                code,
                busy: 0,
            });
            log::debug!("defined message-handler {class} {name} {kind}");
            Ok(())
        })
    }

    pub fn undefine_handler(
        &mut self,
        class: &str,
        name: &str,
        kind: HandlerType,
    ) -> Result<(), RuntimeError> {
        self.top_level(|vm| {
            let class_id = vm.handler_class(class)?;
            let atom = vm.atom(name);
            let Some(index) = vm.classes[class_id].find_handler(atom, kind) else {
                return vm.fail(RuntimeError::HandlerNotFound {
                    handler: format!("{name} {kind}"),
                    class: class.to_string(),
                });
            };
            vm.remove_handler(class_id, index)
        })
    }

    /// Remove a non-system handler. Refused while any handler of the class
    /// is part of an executing dispatch, since removal renumbers them.
    fn remove_handler(&mut self, class: ClassId, index: usize) -> Result<(), RuntimeError> {
        let c = &self.classes[class];
        let h = &c.handlers[index];
        let handler = format!("{} {}", self.symbols.name(h.name), h.kind);
        let class_name = self.name_of(c.name);
        if h.system {
            return self.fail(RuntimeError::SystemHandler {
                handler,
                class: class_name,
            });
        }
        if c.handlers_executing() {
            return self.fail(RuntimeError::HandlerBusy {
                handler,
                class: class_name,
            });
        }
        let removed = self.classes[class].remove_handler(index);
        self.free_body(removed.code);
        self.symbols.release(removed.name);
        Ok(())
    }

    /// `"<name> <type>"` for each handler of the class, in definition
    /// order.
    pub fn handler_names(&self, class: ClassId) -> Vec<String> {
        self.classes.get(class).map_or_else(Vec::new, |c| {
            c.handlers
                .iter()
                .map(|h| format!("{} {}", self.symbols.name(h.name), h.kind))
                .collect()
        })
    }

    /// Most specific handler of this name and type applicable to `class`.
    pub fn find_handler(&self, class: ClassId, name: &str, kind: HandlerType) -> Option<(ClassId, usize)> {
        let atom: Atom = self.symbols.find(name)?;
        match lookup_handler(&self.classes, class, atom, kind) {
            LookupResult::Found { holder, index } => Some((holder, index)),
            LookupResult::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassDef, VMCreateInfo};
    use object::Value;

    fn vm() -> VM {
        let mut vm = VM::new(VMCreateInfo::default()).unwrap();
        vm.define_class(ClassDef::new("A")).unwrap();
        vm.define_class(ClassDef::new("B").is_a(&["A"])).unwrap();
        vm
    }

    #[test]
    fn define_replace_and_undefine() {
        let mut vm = vm();
        vm.define_handler("A", "hello", HandlerType::Primary, HandlerDef::new(Expr::int(1)))
            .unwrap();
        vm.define_handler("A", "hello", HandlerType::Primary, HandlerDef::new(Expr::int(2)))
            .unwrap();
        let a = vm.find_class("A").unwrap();
        assert_eq!(vm.handler_names(a), vec!["hello primary"]);
        let b = vm.find_class("B").unwrap();
        assert_eq!(vm.find_handler(b, "hello", HandlerType::Primary), Some((a, 0)));

        let p = vm.make_instance(None, "B", &[]).unwrap();
        assert_eq!(vm.send(Value::InstanceAddress(p), "hello", &[]), Ok(Value::Integer(2)));

        vm.undefine_handler("A", "hello", HandlerType::Primary).unwrap();
        assert!(vm.handler_names(a).is_empty());
        assert_eq!(
            vm.undefine_handler("A", "hello", HandlerType::Primary),
            Err(RuntimeError::HandlerNotFound {
                handler: "hello primary".into(),
                class: "A".into()
            })
        );
    }

    #[test]
    fn system_handlers_are_protected() {
        let mut vm = vm();
        assert!(matches!(
            vm.define_handler("USER", "init", HandlerType::Primary, HandlerDef::new(Expr::int(0))),
            Err(RuntimeError::SystemHandler { .. })
        ));
        assert!(matches!(
            vm.undefine_handler("USER", "delete", HandlerType::Primary),
            Err(RuntimeError::SystemHandler { .. })
        ));
    }

    #[test]
    fn busy_handler_cannot_be_redefined() {
        let mut vm = vm();
        vm.define_handler("A", "self-change", HandlerType::Primary, HandlerDef::new(Expr::int(1)))
            .unwrap();
        let a = vm.find_class("A").unwrap();
        let p = vm.make_instance(None, "A", &[]).unwrap();
        // Pin the handler as an executing dispatch would.
        vm.classes[a].handlers.iter_mut().for_each(|h| {
            if !h.system {
                h.busy += 1;
            }
        });
        assert!(matches!(
            vm.define_handler("A", "self-change", HandlerType::Primary, HandlerDef::new(Expr::int(0))),
            Err(RuntimeError::HandlerBusy { .. })
        ));
        assert!(vm.instance_exists(p));
    }
}
