use object::{Code, GenericId, Method, Restriction};

use crate::interpreter::Expr;
use crate::{RuntimeError, VM};

/// Restriction on one method parameter: the classes it accepts and an
/// optional query over `?current-argument`.
#[derive(Debug, Clone, Default)]
pub struct RestrictionDef {
    pub types: Vec<String>,
    pub query: Option<Expr>,
}

impl RestrictionDef {
    /// Accepts any argument.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn of(types: &[&str]) -> Self {
        Self {
            types: types.iter().map(|t| t.to_string()).collect(),
            query: None,
        }
    }

    pub fn query(mut self, query: Expr) -> Self {
        self.query = Some(query);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Explicit method index; the next free one when `None`.
    pub index: Option<u16>,
    pub restrictions: Vec<RestrictionDef>,
    /// The last restriction applies to every remaining argument.
    pub wildcard: bool,
    pub locals: u16,
    pub body: Expr,
}

impl MethodDef {
    pub fn new(body: Expr) -> Self {
        Self {
            index: None,
            restrictions: Vec::new(),
            wildcard: false,
            locals: 0,
            body,
        }
    }

    pub fn index(mut self, index: u16) -> Self {
        self.index = Some(index);
        self
    }

    pub fn restriction(mut self, restriction: RestrictionDef) -> Self {
        self.restrictions.push(restriction);
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
    /// Existing generic function of this name, or a new one without
    /// methods.
    pub fn define_generic(&mut self, name: &str) -> GenericId {
        let atom = self.atom(name);
        if let Some(id) = self.generics.find(atom) {
            return id;
        }
        self.symbols.retain(atom);
        log::debug!("defined generic function {name}");
        self.generics.define(atom)
    }

    fn generic_named(&mut self, name: &str) -> Result<GenericId, RuntimeError> {
        match self.symbols.find(name).and_then(|atom| self.generics.find(atom)) {
            Some(id) => Ok(id),
            None => self.fail(RuntimeError::GenericNotFound(name.to_string())),
        }
    }

    /// Refuse changes while any method of the generic is executing, since
    /// they would reorder the methods under a running dispatch.
    fn check_alterable(&mut self, generic: GenericId) -> Result<(), RuntimeError> {
        let g = self.generics.get(generic).expect("unknown generic id");
        if g.busy > 0 || g.methods_executing() {
            let name = self.name_of(g.name);
            return self.fail(RuntimeError::MethodAlter(name));
        }
        Ok(())
    }

    fn resolve_restrictions(&mut self, defs: Vec<RestrictionDef>) -> Result<Vec<Restriction>, RuntimeError> {
        let mut types = Vec::with_capacity(defs.len());
        for def in &defs {
            let mut classes = Vec::with_capacity(def.types.len());
            for name in &def.types {
                match self.find_class(name) {
                    Some(class) => classes.push(class),
                    None => return self.fail(RuntimeError::ClassNotFound(name.clone())),
                }
            }
            types.push(classes);
        }
        Ok(defs
            .into_iter()
            .zip(types)
            .map(|(def, types)| Restriction {
                types,
                query: def.query.map(|q| self.add_body(q)),
            })
            .collect())
    }

    fn install_method(
        &mut self,
        generic: &str,
        index: Option<u16>,
        restrictions: Vec<RestrictionDef>,
        wildcard: bool,
        locals: u16,
        code: Code,
        system: bool,
    ) -> Result<u16, RuntimeError> {
        let gid = self.define_generic(generic);
        let checked = self
            .check_alterable(gid)
            .and_then(|()| self.resolve_restrictions(restrictions));
        let restrictions = match checked {
            Ok(r) => r,
            Err(err) => {
                self.free_body(code);
                return Err(err);
            }
        };

        let g = self.generics.get(gid).expect("unknown generic id");
        let index = index.unwrap_or_else(|| g.next_index());
        if let Some(pos) = g.method_position(index) {
            self.drop_method(gid, pos);
        }

        let n = restrictions.len() as u16;
        let (min, max) = if wildcard {
            (n.saturating_sub(1), None)
        } else {
            (n, Some(n))
        };
        let method = Method {
            index,
            restrictions,
            min_restrictions: min,
            max_restrictions: max,
            local_var_count: locals,
            code,
            system,
            busy: 0,
        };
        let classes = &self.classes;
        let generics = &mut self.generics;
        let pos = generics
            .get_mut(gid)
            .expect("unknown generic id")
            .insert_method(method, classes);
        log::debug!("defined method {generic} #{index} at position {pos}");
        Ok(index)
    }

    /// Define a method with an action body; returns its index.
    pub fn define_method(&mut self, generic: &str, def: MethodDef) -> Result<u16, RuntimeError> {
        self.top_level(|vm| {
            let code = vm.add_body(def.body);
            vm.install_method(
                generic,
                def.index,
                def.restrictions,
                def.wildcard,
                def.locals,
                code,
                false,
            )
        })
    }

    /// Define a method whose body is a registered primitive.
    pub fn define_system_method(
        &mut self,
        generic: &str,
        restrictions: Vec<RestrictionDef>,
        wildcard: bool,
        primitive: &str,
    ) -> Result<u16, RuntimeError> {
        self.top_level(|vm| {
            let Some(code) = vm.primitive_code(primitive) else {
                return vm.fail(RuntimeError::FunctionNotFound(primitive.to_string()));
            };
            vm.install_method(generic, None, restrictions, wildcard, 0, code, true)
        })
    }

    fn drop_method(&mut self, generic: GenericId, position: usize) {
        let method = self
            .generics
            .get_mut(generic)
            .expect("unknown generic id")
            .remove_method(position);
        self.free_body(method.code);
        for restriction in &method.restrictions {
            if let Some(query) = restriction.query {
                self.free_body(query);
            }
        }
    }

    pub fn undefine_method(&mut self, generic: &str, index: u16) -> Result<(), RuntimeError> {
        self.top_level(|vm| {
            let gid = vm.generic_named(generic)?;
            vm.check_alterable(gid)?;
            let position = vm.generics.get(gid).and_then(|g| g.method_position(index));
            let Some(position) = position else {
                return vm.fail(RuntimeError::MethodNotFound {
                    generic: generic.to_string(),
                    index,
                });
            };
            vm.drop_method(gid, position);
            Ok(())
        })
    }

    /// Remove a generic function and all of its methods.
    pub fn undefine_generic(&mut self, generic: &str) -> Result<(), RuntimeError> {
        self.top_level(|vm| {
            let gid = vm.generic_named(generic)?;
            vm.check_alterable(gid)?;
            while vm.generics.get(gid).is_some_and(|g| !g.methods.is_empty()) {
                vm.drop_method(gid, 0);
            }
            if let Some(removed) = vm.generics.remove(gid) {
                vm.symbols.release(removed.name);
            }
            Ok(())
        })
    }

    /// Method indices in precedence order, most specific first.
    pub fn method_indices(&self, generic: &str) -> Vec<u16> {
        self.symbols
            .find(generic)
            .and_then(|atom| self.generics.find(atom))
            .and_then(|gid| self.generics.get(gid))
            .map_or_else(Vec::new, |g| g.methods.iter().map(|m| m.index).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassDef, VMCreateInfo};

    fn vm() -> VM {
        let mut vm = VM::new(VMCreateInfo::default()).unwrap();
        vm.define_class(ClassDef::new("SHAPE")).unwrap();
        vm.define_class(ClassDef::new("CIRCLE").is_a(&["SHAPE"])).unwrap();
        vm
    }

    #[test]
    fn methods_sorted_by_precedence() {
        let mut vm = vm();
        let any = vm.define_method("area", MethodDef::new(Expr::int(0)).restriction(RestrictionDef::any()));
        let shape = vm.define_method(
            "area",
            MethodDef::new(Expr::int(1)).restriction(RestrictionDef::of(&["SHAPE"])),
        );
        let circle = vm.define_method(
            "area",
            MethodDef::new(Expr::int(2)).restriction(RestrictionDef::of(&["CIRCLE"])),
        );
        assert_eq!((any, shape, circle), (Ok(1), Ok(2), Ok(3)));
        assert_eq!(vm.method_indices("area"), vec![3, 2, 1]);
    }

    #[test]
    fn explicit_index_replaces() {
        let mut vm = vm();
        vm.define_method("f", MethodDef::new(Expr::int(1)).index(5)).unwrap();
        vm.define_method("f", MethodDef::new(Expr::int(2)).index(5)).unwrap();
        assert_eq!(vm.method_indices("f"), vec![5]);
        assert_eq!(vm.define_method("f", MethodDef::new(Expr::int(3))), Ok(6));
    }

    #[test]
    fn unknown_restriction_class() {
        let mut vm = vm();
        let err = vm.define_method(
            "f",
            MethodDef::new(Expr::int(1)).restriction(RestrictionDef::of(&["SQUARE"])),
        );
        assert_eq!(err, Err(RuntimeError::ClassNotFound("SQUARE".into())));
        assert!(vm.method_indices("f").is_empty());
    }

    #[test]
    fn undefine() {
        let mut vm = vm();
        vm.define_method("f", MethodDef::new(Expr::int(1))).unwrap();
        vm.define_method("f", MethodDef::new(Expr::int(2)).restriction(RestrictionDef::any()))
            .unwrap();
        vm.undefine_method("f", 1).unwrap();
        assert_eq!(vm.method_indices("f"), vec![2]);
        assert_eq!(
            vm.undefine_method("f", 1),
            Err(RuntimeError::MethodNotFound {
                generic: "f".into(),
                index: 1
            })
        );
        vm.undefine_generic("f").unwrap();
        assert_eq!(
            vm.undefine_generic("f"),
            Err(RuntimeError::GenericNotFound("f".into()))
        );
    }

    #[test]
    fn restriction_class_cannot_be_deleted() {
        let mut vm = vm();
        vm.define_method(
            "f",
            MethodDef::new(Expr::int(1)).restriction(RestrictionDef::of(&["CIRCLE"])),
        )
        .unwrap();
        assert_eq!(vm.delete_class("CIRCLE"), Err(RuntimeError::ClassInUse("CIRCLE".into())));
        vm.undefine_generic("f").unwrap();
        assert!(vm.delete_class("CIRCLE").is_ok());
    }

    #[test]
    fn busy_generic_cannot_change() {
        let mut vm = vm();
        vm.define_method("f", MethodDef::new(Expr::int(1))).unwrap();
        let gid = vm.generics.find(vm.atom("f")).unwrap();
        vm.generics.get_mut(gid).unwrap().methods[0].busy = 1;
        assert_eq!(
            vm.define_method("f", MethodDef::new(Expr::int(2))),
            Err(RuntimeError::MethodAlter("f".into()))
        );
        assert_eq!(vm.undefine_generic("f"), Err(RuntimeError::MethodAlter("f".into())));
    }
}
