pub mod builder;
pub mod classes;
pub mod error;
pub mod generic;
pub mod handlers;
pub mod instances;
pub mod interpreter;
pub mod manager;
pub mod message;
pub mod methods;
pub mod modify;
pub mod network;
pub mod primitives;
pub mod special;

use std::collections::HashMap;
use std::rc::Rc;

use object::{
    Atom, ClassRegistry, Code, GenericRegistry, InstanceId, InstanceStore, SlotNameId,
    SlotNameRegistry, SpecialClasses, Symbols, Value,
};

pub use builder::{InstanceBuilder, InstanceModifier};
pub use classes::{ClassDef, DefaultDef, SlotDef};
pub use error::RuntimeError;
pub use handlers::HandlerDef;
pub use interpreter::Expr;
pub use methods::{MethodDef, RestrictionDef};
pub use network::{NetworkAction, NetworkEvent, ObjectNetwork, RecordingNetwork};

use generic::GenericFrame;
use interpreter::Frame;
use message::MessageFrame;
use primitives::PrimitiveDesc;

// ── Settings ──────────────────────────────────────────────────────────

/// Tunables of one runtime environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Buckets in the instance name hash table.
    pub instance_hash_size: usize,
    /// Growth step of the class id map.
    pub class_id_chunk: usize,
    /// Hierarchy walks that may be in progress at once (at most 256).
    pub max_traversals: usize,
    /// Maximum nesting of handler, method and default evaluations.
    pub max_depth: usize,
    /// Also write `printout` output to stdout.
    pub echo_output: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instance_hash_size: object::INSTANCE_TABLE_HASH_SIZE,
            class_id_chunk: object::CLASS_ID_MAP_CHUNK,
            max_traversals: object::MAX_TRAVERSALS,
            max_depth: 512,
            echo_output: false,
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<(), &'static str> {
        if self.instance_hash_size == 0 {
            return Err("instance_hash_size must be > 0");
        }
        if self.class_id_chunk == 0 {
            return Err("class_id_chunk must be > 0");
        }
        if self.max_traversals == 0 || self.max_traversals > object::MAX_TRAVERSALS {
            return Err("max_traversals must be between 1 and 256");
        }
        if self.max_depth == 0 {
            return Err("max_depth must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct VMCreateInfo {
    pub settings: Settings,
}

// ── Well-known names ──────────────────────────────────────────────────

/// Atoms the runtime refers to by name.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Names {
    pub init: Atom,
    pub delete: Atom,
    pub print: Atom,
    pub create: Atom,
    pub direct_modify: Atom,
    pub message_modify: Atom,
    pub direct_duplicate: Atom,
    pub message_duplicate: Atom,
    pub router_t: Atom,
    pub crlf: Atom,
}

impl Names {
    fn new(symbols: &Symbols) -> Self {
        Self {
            init: symbols.intern("init"),
            delete: symbols.intern("delete"),
            print: symbols.intern("print"),
            create: symbols.intern("create"),
            direct_modify: symbols.intern("direct-modify"),
            message_modify: symbols.intern("message-modify"),
            direct_duplicate: symbols.intern("direct-duplicate"),
            message_duplicate: symbols.intern("message-duplicate"),
            router_t: symbols.intern("t"),
            crlf: symbols.intern("crlf"),
        }
    }
}

// ── VM ────────────────────────────────────────────────────────────────

/// One runtime environment: classes, instances, generic functions and the
/// dispatch state of the calls currently executing.
pub struct VM {
    pub symbols: Symbols,
    pub slot_names: SlotNameRegistry,
    pub classes: ClassRegistry,
    pub instances: InstanceStore,
    pub generics: GenericRegistry,
    pub special: SpecialClasses,
    /// Registered primitive descriptors.
    pub primitives: Vec<PrimitiveDesc>,
    pub settings: Settings,
    pub(crate) primitive_index: HashMap<Atom, usize, ahash::RandomState>,
    /// Action bodies addressed by `Code::Actions`.
    pub(crate) bodies: Vec<Option<Rc<Expr>>>,
    pub(crate) names: Names,
    pub(crate) frames: Vec<Frame>,
    pub(crate) messages: Vec<MessageFrame>,
    pub(crate) calls: Vec<GenericFrame>,
    pub(crate) current_arguments: Vec<Value>,
    pub(crate) network: Option<Box<dyn ObjectNetwork>>,
    pub(crate) network_busy: bool,
    pub(crate) pending_network: Vec<(NetworkAction, InstanceId, Option<SlotNameId>)>,
    pub(crate) join_in_progress: bool,
    evaluation_error: bool,
    halt: bool,
    pub(crate) depth: usize,
    entry_depth: usize,
    pub(crate) gensym: u64,
    output: String,
}

impl VM {
    pub fn new(info: VMCreateInfo) -> Result<Self, RuntimeError> {
        let settings = info.settings;
        settings.validate().map_err(RuntimeError::InvalidSettings)?;

        let symbols = Symbols::new();
        let mut classes = ClassRegistry::with_limits(settings.class_id_chunk, settings.max_traversals);
        let primitives = primitives::default_primitives();
        let primitive_index = primitives
            .iter()
            .enumerate()
            .map(|(i, p)| (symbols.intern(p.name), i))
            .collect::<HashMap<_, _, ahash::RandomState>>();
        let special = special::bootstrap(&symbols, &mut classes, &primitive_index);

        log::debug!(
            "runtime ready: {} system classes, {} primitives",
            classes.len(),
            primitives.len()
        );

        Ok(Self {
            names: Names::new(&symbols),
            slot_names: SlotNameRegistry::new(),
            instances: InstanceStore::new(settings.instance_hash_size),
            generics: GenericRegistry::new(),
            symbols,
            classes,
            special,
            primitives,
            primitive_index,
            settings,
            bodies: Vec::new(),
            frames: Vec::new(),
            messages: Vec::new(),
            calls: Vec::new(),
            current_arguments: Vec::new(),
            network: None,
            network_busy: false,
            pending_network: Vec::new(),
            join_in_progress: false,
            evaluation_error: false,
            halt: false,
            depth: 0,
            entry_depth: 0,
            gensym: 0,
            output: String::new(),
        })
    }

    // ── Error state ────────────────────────────────────────────────

    /// Set by every reported error; cleared when the next top-level call
    /// starts.
    pub fn evaluation_error(&self) -> bool {
        self.evaluation_error
    }

    pub fn halted(&self) -> bool {
        self.halt
    }

    /// Request that every running operation unwind.
    pub fn set_halt(&mut self) {
        self.halt = true;
    }

    /// Log an error and halt execution. Errors raised while already halted
    /// are not logged again.
    pub(crate) fn report(&mut self, err: RuntimeError) -> RuntimeError {
        if !err.is_halt() {
            if !self.halt {
                log::error!("{err}");
            }
            self.evaluation_error = true;
            self.halt = true;
        }
        err
    }

    #[inline]
    pub(crate) fn fail<T>(&mut self, err: RuntimeError) -> Result<T, RuntimeError> {
        Err(self.report(err))
    }

    #[inline]
    pub(crate) fn check_halt(&self) -> Result<(), RuntimeError> {
        if self.halt {
            return Err(RuntimeError::Halted);
        }
        Ok(())
    }

    /// Run a host entry point. The outermost entry resets the error flags
    /// and sweeps freed instances when it returns.
    pub(crate) fn top_level<R>(
        &mut self,
        f: impl FnOnce(&mut VM) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        let outermost = self.entry_depth == 0;
        if outermost {
            self.halt = false;
            self.evaluation_error = false;
        }
        self.entry_depth += 1;
        let result = f(self);
        self.entry_depth -= 1;
        if outermost {
            self.cleanup_instances();
        }
        result
    }

    // ── Symbols ────────────────────────────────────────────────────

    #[inline]
    pub fn atom(&self, name: &str) -> Atom {
        self.symbols.intern(name)
    }

    pub fn name_of(&self, atom: Atom) -> String {
        self.symbols.name(atom).to_string()
    }

    pub fn symbol(&self, name: &str) -> Value {
        Value::Symbol(self.atom(name))
    }

    pub fn string(&self, text: &str) -> Value {
        Value::String(self.atom(text))
    }

    pub fn instance_name_value(&self, name: &str) -> Value {
        Value::InstanceName(self.atom(name))
    }

    // ── Bodies ─────────────────────────────────────────────────────

    pub(crate) fn add_body(&mut self, expr: Expr) -> Code {
        let body = Some(Rc::new(expr));
        match self.bodies.iter().position(Option::is_none) {
            Some(free) => {
                self.bodies[free] = body;
                Code::Actions(free as u32)
            }
            None => {
                self.bodies.push(body);
                Code::Actions(self.bodies.len() as u32 - 1)
            }
        }
    }

    pub(crate) fn free_body(&mut self, code: Code) {
        if let Code::Actions(index) = code {
            if let Some(body) = self.bodies.get_mut(index as usize) {
                *body = None;
            }
        }
    }

    pub(crate) fn body(&self, index: u32) -> Rc<Expr> {
        match self.bodies.get(index as usize) {
            Some(Some(body)) => body.clone(),
            _ => panic!("no action body #{index}"),
        }
    }

    // ── Output ─────────────────────────────────────────────────────

    pub(crate) fn write_output(&mut self, text: &str) {
        if self.settings.echo_output {
            print!("{text}");
        }
        self.output.push_str(text);
    }

    /// Everything written by `printout` and `print` so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    // ── Formatting ─────────────────────────────────────────────────

    /// Value as `printout` shows it: strings without quotes.
    pub fn display(&self, value: &Value) -> String {
        match value {
            Value::String(atom) => self.name_of(*atom),
            Value::Multifield(fields) => fields
                .iter()
                .map(|f| self.display(f))
                .collect::<Vec<_>>()
                .join(" "),
            other => self.repr(other),
        }
    }

    /// Value as it would be read back: strings quoted, multifields in
    /// parentheses.
    pub fn repr(&self, value: &Value) -> String {
        match value {
            Value::Void => String::new(),
            Value::Symbol(atom) => self.name_of(*atom),
            Value::String(atom) => format!("\"{}\"", self.symbols.name(*atom)),
            Value::InstanceName(atom) => format!("[{}]", self.symbols.name(*atom)),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) => format!("{f:?}"),
            Value::Multifield(fields) => format!(
                "({})",
                fields
                    .iter()
                    .map(|f| self.repr(f))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Value::InstanceAddress(id) => match self.instances.get(*id) {
                Some(instance) => format!("<Instance-{}>", self.symbols.name(instance.name)),
                None => "<Dangling-Instance>".to_string(),
            },
            Value::FactAddress(n) => format!("<Fact-{n}>"),
            Value::External(ext) => format!("<Pointer-{:p}>", Rc::as_ptr(&ext.0)),
        }
    }

    /// Evaluate an action tree at top level.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        self.top_level(|vm| {
            vm.frames.push(Frame::top_level());
            let result = interpreter::evaluate(vm, expr);
            vm.frames.pop();
            result
        })
    }
}

impl core::fmt::Debug for VM {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VM")
            .field("classes", &self.classes.len())
            .field("instances", &self.instances.len())
            .field("halt", &self.halt)
            .field("evaluation_error", &self.evaluation_error)
            .finish()
    }
}
