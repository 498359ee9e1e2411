use object::{
    Accessors, Class, ClassFlags, ClassId, Code, Constraint, DefaultValue, Handler, HandlerType,
    InstanceSlot, SlotAccess, SlotDescriptor, SlotRef, Value,
};

use crate::interpreter::Expr;
use crate::{RuntimeError, VM};

/// How a slot of a class being defined gets its initial value.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultDef {
    Derive,
    Required,
    Static(Value),
    Dynamic(Expr),
}

#[derive(Debug, Clone)]
pub struct SlotDef {
    pub name: String,
    pub shared: bool,
    pub multiple: bool,
    pub default: DefaultDef,
    pub access: SlotAccess,
    pub public: bool,
    pub reactive: bool,
    pub accessors: Accessors,
    pub constraint: Constraint,
    /// Class names an instance value must belong to.
    pub allowed_classes: Vec<String>,
}

impl SlotDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shared: false,
            multiple: false,
            default: DefaultDef::Derive,
            access: SlotAccess::ReadWrite,
            public: false,
            reactive: true,
            accessors: Accessors::READ | Accessors::WRITE,
            constraint: Constraint::any(),
            allowed_classes: Vec::new(),
        }
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = DefaultDef::Static(value);
        self
    }

    pub fn dynamic_default(mut self, expr: Expr) -> Self {
        self.default = DefaultDef::Dynamic(expr);
        self
    }

    pub fn required(mut self) -> Self {
        self.default = DefaultDef::Required;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access = SlotAccess::ReadOnly;
        self
    }

    pub fn initialize_only(mut self) -> Self {
        self.access = SlotAccess::InitializeOnly;
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn non_reactive(mut self) -> Self {
        self.reactive = false;
        self
    }

    pub fn accessors(mut self, accessors: Accessors) -> Self {
        self.accessors = accessors;
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn allowed_classes(mut self, classes: &[&str]) -> Self {
        self.allowed_classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// A user class definition. Inherits from `USER` unless told otherwise.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub superclasses: Vec<String>,
    pub abstract_: bool,
    pub reactive: bool,
    pub slots: Vec<SlotDef>,
}

impl ClassDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            superclasses: vec!["USER".to_string()],
            abstract_: false,
            reactive: true,
            slots: Vec::new(),
        }
    }

    /// Direct superclasses, most important first.
    pub fn is_a(mut self, superclasses: &[&str]) -> Self {
        self.superclasses = superclasses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.abstract_ = true;
        self
    }

    pub fn non_reactive(mut self) -> Self {
        self.reactive = false;
        self
    }

    pub fn slot(mut self, slot: SlotDef) -> Self {
        self.slots.push(slot);
        self
    }
}

/// Slot definition with names resolved, ready to install.
struct ResolvedSlot {
    def: SlotDef,
    constraint: Constraint,
    default: Option<Value>,
}

impl VM {
    /// Define or redefine a class.
    pub fn define_class(&mut self, def: ClassDef) -> Result<ClassId, RuntimeError> {
        self.top_level(|vm| vm.install_class(def))
    }

    fn install_class(&mut self, def: ClassDef) -> Result<ClassId, RuntimeError> {
        let name = self.atom(&def.name);

        // 1. Superclasses
        if def.superclasses.is_empty() {
            return self.fail(RuntimeError::NoSuperclass(def.name));
        }
        let mut supers: Vec<ClassId> = Vec::with_capacity(def.superclasses.len());
        for sup_name in &def.superclasses {
            let atom = self.atom(sup_name);
            let Some(sup) = self.classes.find(atom) else {
                return self.fail(RuntimeError::ClassNotFound(sup_name.clone()));
            };
            if atom == name
                || supers.contains(&sup)
                || !self.classes.is_subclass_or_same(sup, self.special.user)
            {
                return self.fail(RuntimeError::InvalidSuperclass {
                    class: def.name.clone(),
                    superclass: sup_name.clone(),
                });
            }
            supers.push(sup);
        }

        // 2. Slots
        let slots = self.resolve_slots(&def)?;

        // 3. Redefinition
        if let Some(old) = self.classes.find(name) {
            self.check_deletable(old)?;
            log::debug!("redefining class {}", def.name);
            self.remove_class(old);
        }

        // 4. Install
        let mut class = Class::new(name);
        if def.abstract_ {
            class.flags |= ClassFlags::ABSTRACT;
        }
        if def.reactive {
            class.flags |= ClassFlags::REACTIVE;
        }
        self.symbols.retain(name);
        let id = self.classes.install(class);
        for &sup in &supers {
            self.classes.add_superclass_link(id, sup, None);
            self.classes.add_subclass_link(sup, id, None);
        }
        self.classes.linearize(id);

        let mut descriptors = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            let slot_atom = self.atom(&slot.def.name);
            let slot_name = self.slot_names.intern(&self.symbols, slot_atom, None);
            let override_message = match self.slot_names.lookup_by_id(slot_name) {
                Some(entry) => entry.put_handler_name,
                None => self.atom(&format!("put-{}", slot.def.name)),
            };
            let default = match (slot.def.default, slot.default) {
                (DefaultDef::Dynamic(expr), _) => DefaultValue::Dynamic(self.add_body(expr)),
                (DefaultDef::Required, _) => DefaultValue::Required,
                (_, Some(value)) => {
                    self.retain_value(&value);
                    DefaultValue::Static(value)
                }
                (_, None) => DefaultValue::Derive,
            };
            let mut shared_value = InstanceSlot::new(SlotRef {
                class: id,
                index: index as u16,
            });
            shared_value.value_required = default == DefaultValue::Required;
            descriptors.push(SlotDescriptor {
                slot_name,
                name: slot_atom,
                class: id,
                shared: slot.def.shared,
                multiple: slot.def.multiple,
                default,
                access: slot.def.access,
                public: slot.def.public,
                reactive: slot.def.reactive,
                accessors: slot.def.accessors,
                constraint: slot.constraint,
                override_message,
                shared_value,
                shared_count: 0,
            });
        }
        self.classes[id].slots = descriptors;
        self.classes.build_template(id);

        // 5. Accessors
        let accessors: Vec<(object::Atom, Accessors, SlotAccess)> = self.classes[id]
            .slots
            .iter()
            .map(|s| (s.name, s.accessors, s.access))
            .collect();
        for (slot, wanted, access) in accessors {
            let slot_text = self.name_of(slot);
            if wanted.contains(Accessors::READ) {
                let getter = self.atom(&format!("get-{slot_text}"));
                let code = self.add_body(Expr::SlotGet(slot));
                self.add_system_handler(id, getter, 0, Some(0), code);
            }
            if wanted.contains(Accessors::WRITE) && access != SlotAccess::ReadOnly {
                let setter = self.atom(&format!("put-{slot_text}"));
                let code = self.add_body(Expr::SlotSet(slot, Box::new(Expr::RestValue)));
                self.add_system_handler(id, setter, 0, None, code);
            }
        }

        log::debug!(
            "defined class {} ({:?}), {} slot(s) in template",
            def.name,
            id,
            self.classes[id].instance_template.len()
        );
        Ok(id)
    }

    fn resolve_slots(&mut self, def: &ClassDef) -> Result<Vec<ResolvedSlot>, RuntimeError> {
        let mut resolved: Vec<ResolvedSlot> = Vec::with_capacity(def.slots.len());
        for slot in &def.slots {
            if resolved.iter().any(|r| r.def.name == slot.name) {
                return self.fail(RuntimeError::DuplicateSlot {
                    class: def.name.clone(),
                    slot: slot.name.clone(),
                });
            }
            let mut constraint = slot.constraint.clone();
            for class_name in &slot.allowed_classes {
                match self.classes.find(self.atom(class_name)) {
                    Some(class) => constraint.allowed_classes.push(class),
                    None => return self.fail(RuntimeError::ClassNotFound(class_name.clone())),
                }
            }
            let default = match &slot.default {
                DefaultDef::Static(value) => {
                    let value = match (slot.multiple, value) {
                        (true, Value::Multifield(_)) | (false, _) => value.clone(),
                        (true, single) => Value::multifield(vec![single.clone()]),
                    };
                    let checked = constraint.check(&value, slot.multiple, &self.classes, &|_| None);
                    if let Err(source) = checked {
                        return self.fail(RuntimeError::Constraint {
                            slot: slot.name.clone(),
                            source,
                        });
                    }
                    Some(value)
                }
                _ => None,
            };
            resolved.push(ResolvedSlot {
                def: slot.clone(),
                constraint,
                default,
            });
        }
        Ok(resolved)
    }

    fn add_system_handler(
        &mut self,
        class: ClassId,
        name: object::Atom,
        min: u16,
        max: Option<u16>,
        code: Code,
    ) {
        self.symbols.retain(name);
        self.classes[class].add_handler(Handler {
            name,
            kind: HandlerType::Primary,
            class,
            system: true,
            min_params: min,
            max_params: max,
            local_var_count: 0,
            code,
            busy: 0,
        });
    }

    // ── Deletion ───────────────────────────────────────────────────

    fn check_deletable(&mut self, class: ClassId) -> Result<(), RuntimeError> {
        let c = &self.classes[class];
        let name = self.name_of(c.name);
        if c.is_system() {
            return self.fail(RuntimeError::SystemClass(name));
        }
        if !c.direct_subclasses.is_empty() {
            return self.fail(RuntimeError::ClassHasSubclasses(name));
        }
        if self.classes.is_class_in_use(class) || self.class_referenced(class) {
            return self.fail(RuntimeError::ClassInUse(name));
        }
        Ok(())
    }

    /// Referenced by a method restriction or by an allowed-classes facet of
    /// another class.
    fn class_referenced(&self, class: ClassId) -> bool {
        let by_method = self.generics.iter().any(|g| {
            g.methods
                .iter()
                .any(|m| m.restrictions.iter().any(|r| r.types.contains(&class)))
        });
        let by_slot = self.classes.iter().any(|c| {
            c.id != class
                && c
                    .slots
                    .iter()
                    .any(|s| s.constraint.allowed_classes.contains(&class))
        });
        by_method || by_slot
    }

    fn remove_class(&mut self, class: ClassId) {
        let Some(removed) = self
            .classes
            .delete_class(class, &mut self.slot_names, &self.symbols)
        else {
            return;
        };
        for handler in &removed.handlers {
            self.free_body(handler.code);
            self.symbols.release(handler.name);
        }
        for slot in &removed.slots {
            match &slot.default {
                DefaultValue::Dynamic(code) => self.free_body(*code),
                DefaultValue::Static(value) => self.release_value(value),
                _ => {}
            }
        }
        self.symbols.release(removed.name);
    }

    pub fn delete_class(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.top_level(|vm| {
            let Some(class) = vm.find_class(name) else {
                return vm.fail(RuntimeError::ClassNotFound(name.to_string()));
            };
            vm.check_deletable(class)?;
            vm.remove_class(class);
            Ok(())
        })
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.classes.find(self.symbols.find(name)?)
    }

    pub fn class_name(&self, class: ClassId) -> Option<String> {
        self.classes.get(class).map(|c| self.name_of(c.name))
    }

    /// Class a value dispatches through.
    pub fn class_of(&mut self, value: &Value) -> Result<ClassId, RuntimeError> {
        self.top_level(|vm| vm.value_class(value))
    }

    /// Strict: a class is not its own subclass.
    pub fn is_subclass(&self, class: ClassId, ancestor: ClassId) -> bool {
        class != ancestor && self.classes.is_subclass_or_same(class, ancestor)
    }

    /// Precedence list without the class itself.
    pub fn superclass_names(&self, class: ClassId) -> Vec<String> {
        self.classes.get(class).map_or_else(Vec::new, |c| {
            c.all_superclasses[1..]
                .iter()
                .map(|&s| self.name_of(self.classes[s].name))
                .collect()
        })
    }

    /// Full precedence list, starting with the class itself.
    pub fn class_precedence(&self, class: ClassId) -> Vec<String> {
        self.classes.get(class).map_or_else(Vec::new, |c| {
            c.all_superclasses
                .iter()
                .map(|&s| self.name_of(self.classes[s].name))
                .collect()
        })
    }

    /// Slot names in instance template order.
    pub fn slot_names(&self, class: ClassId) -> Vec<String> {
        self.classes.get(class).map_or_else(Vec::new, |c| {
            c.instance_template
                .iter()
                .map(|&s| self.name_of(self.classes.slot(s).name))
                .collect()
        })
    }

    pub fn class_abstract(&self, class: ClassId) -> bool {
        self.classes.get(class).is_some_and(|c| c.is_abstract())
    }

    pub fn class_reactive(&self, class: ClassId) -> bool {
        self.classes.get(class).is_some_and(|c| c.is_reactive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VMCreateInfo;

    fn vm() -> VM {
        VM::new(VMCreateInfo::default()).unwrap()
    }

    fn define(vm: &mut VM, name: &str, supers: &[&str], slots: &[&str]) -> ClassId {
        let mut def = ClassDef::new(name).is_a(supers);
        for s in slots {
            def = def.slot(SlotDef::new(s));
        }
        vm.define_class(def).unwrap()
    }

    // ── Hierarchy ──────────────────────────────────────────────────

    #[test]
    fn diamond_precedence() {
        let mut vm = vm();
        define(&mut vm, "TOP", &["USER"], &[]);
        define(&mut vm, "LEFT", &["TOP"], &[]);
        define(&mut vm, "RIGHT", &["TOP"], &[]);
        let bottom = define(&mut vm, "BOTTOM", &["LEFT", "RIGHT"], &[]);
        assert_eq!(
            vm.superclass_names(bottom),
            vec!["LEFT", "TOP", "USER", "OBJECT", "RIGHT"]
        );
        let top = vm.find_class("TOP").unwrap();
        assert!(vm.is_subclass(bottom, top));
        assert!(!vm.is_subclass(top, top));
    }

    #[test]
    fn template_puts_general_slots_first() {
        let mut vm = vm();
        define(&mut vm, "A", &["USER"], &["a", "shared"]);
        let b = define(&mut vm, "B", &["A"], &["b", "shared"]);
        assert_eq!(vm.slot_names(b), vec!["a", "shared", "b"]);
        let c = &vm.classes[b];
        let pos = c
            .template_position(vm.slot_names.find(vm.atom("shared")).unwrap().id)
            .unwrap();
        assert_eq!(c.instance_template[pos].class, b);
    }

    #[test]
    fn accessors_are_generated() {
        let mut vm = vm();
        let id = vm
            .define_class(
                ClassDef::new("A")
                    .slot(SlotDef::new("x"))
                    .slot(SlotDef::new("ro").read_only())
                    .slot(SlotDef::new("hidden").accessors(Accessors::empty())),
            )
            .unwrap();
        let names = vm.handler_names(id);
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"get-x primary".to_string()));
        assert!(names.contains(&"put-x primary".to_string()));
        assert!(names.contains(&"get-ro primary".to_string()));
    }

    // ── Errors ─────────────────────────────────────────────────────

    #[test]
    fn invalid_superclasses() {
        let mut vm = vm();
        let err = vm.define_class(ClassDef::new("A").is_a(&["INTEGER"]));
        assert!(matches!(err, Err(RuntimeError::InvalidSuperclass { .. })));
        let err = vm.define_class(ClassDef::new("A").is_a(&["NOPE"]));
        assert_eq!(err, Err(RuntimeError::ClassNotFound("NOPE".into())));
        let err = vm.define_class(ClassDef::new("A").is_a(&[]));
        assert_eq!(err, Err(RuntimeError::NoSuperclass("A".into())));
        let err = vm.define_class(ClassDef::new("A").is_a(&["USER", "USER"]));
        assert!(matches!(err, Err(RuntimeError::InvalidSuperclass { .. })));
        assert!(vm.find_class("A").is_none());
    }

    #[test]
    fn duplicate_slot_rejected() {
        let mut vm = vm();
        let err = vm.define_class(ClassDef::new("A").slot(SlotDef::new("x")).slot(SlotDef::new("x")));
        assert!(matches!(err, Err(RuntimeError::DuplicateSlot { .. })));
    }

    #[test]
    fn bad_static_default_rejected() {
        let mut vm = vm();
        let err = vm.define_class(ClassDef::new("A").slot(
            SlotDef::new("n")
                .constraint(Constraint::of_types(object::TypeSet::INTEGER))
                .default_value(vm.symbol("abc")),
        ));
        assert!(matches!(err, Err(RuntimeError::Constraint { .. })));
    }

    #[test]
    fn delete_rules() {
        let mut vm = vm();
        define(&mut vm, "A", &["USER"], &["x"]);
        define(&mut vm, "B", &["A"], &[]);
        assert_eq!(
            vm.delete_class("A"),
            Err(RuntimeError::ClassHasSubclasses("A".into()))
        );
        assert_eq!(vm.delete_class("USER"), Err(RuntimeError::SystemClass("USER".into())));

        let b = vm.make_instance(Some("b1"), "B", &[]).unwrap();
        assert_eq!(vm.delete_class("B"), Err(RuntimeError::ClassInUse("B".into())));
        vm.unmake_instance(b).unwrap();
        assert_eq!(vm.delete_class("B"), Ok(()));
        assert_eq!(vm.delete_class("A"), Ok(()));
        assert!(vm.slot_names.find(vm.atom("x")).is_none());
    }

    #[test]
    fn class_ids_are_reused() {
        let mut vm = vm();
        let a = define(&mut vm, "A", &["USER"], &[]);
        let b = define(&mut vm, "B", &["USER"], &[]);
        vm.delete_class("A").unwrap();
        let c = define(&mut vm, "C", &["USER"], &[]);
        assert_eq!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn redefinition_replaces_slots() {
        let mut vm = vm();
        define(&mut vm, "A", &["USER"], &["x"]);
        let a = define(&mut vm, "A", &["USER"], &["y", "z"]);
        assert_eq!(vm.slot_names(a), vec!["y", "z"]);
        assert_eq!(vm.handler_names(a).len(), 4);
    }

    #[test]
    fn class_of_primitives() {
        let mut vm = vm();
        let c = vm.class_of(&Value::Float(1.0)).unwrap();
        assert_eq!(vm.class_name(c).as_deref(), Some("FLOAT"));
        let c = vm.class_of(&Value::empty_multifield()).unwrap();
        assert_eq!(vm.class_name(c).as_deref(), Some("MULTIFIELD"));
    }
}
