use object::PutSlotError;

/// Recoverable runtime errors.
///
/// Every variant except [`RuntimeError::Halted`] is logged once where it is
/// detected and sets the evaluation-error flag; `Halted` is what nested
/// steps see while an earlier error unwinds the stack.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    // ── Classes ────────────────────────────────────────────────────
    #[error("unable to find class {0}")]
    ClassNotFound(String),
    #[error("class {0} is in use and cannot be changed or deleted")]
    ClassInUse(String),
    #[error("class {0} has subclasses and cannot be deleted")]
    ClassHasSubclasses(String),
    #[error("system class {0} cannot be changed or deleted")]
    SystemClass(String),
    #[error("cannot create instances of abstract class {0}")]
    AbstractClass(String),
    #[error("cannot create or delete instances of reactive class {0} while pattern matching is in progress")]
    ReactiveClassDuringJoin(String),
    #[error("class {class} cannot inherit from {superclass}")]
    InvalidSuperclass { class: String, superclass: String },
    #[error("class {0} must have at least one superclass")]
    NoSuperclass(String),
    #[error("slot {slot} is declared twice in class {class}")]
    DuplicateSlot { class: String, slot: String },

    // ── Instances ──────────────────────────────────────────────────
    #[error("unable to find instance [{0}]")]
    InstanceNotFound(String),
    #[error("instance has been deleted")]
    InstanceDeleted,
    #[error("instance [{name}] already exists with class {class}")]
    DuplicateInstanceName { name: String, class: String },
    #[error("instance [{0}] is in use and cannot be replaced")]
    InstanceInUse(String),
    #[error("instance [{0}] is being initialized")]
    InstanceInitializing(String),
    #[error("instance [{0}] is not being initialized")]
    NotInitializing(String),
    #[error("cannot duplicate instance [{0}] onto itself")]
    DuplicateSameName(String),
    #[error("unable to initialize instance [{0}]")]
    InitFailed(String),
    #[error("logical support for instance [{0}] was removed during its creation")]
    LogicalSupportLost(String),

    // ── Slots ──────────────────────────────────────────────────────
    #[error("unable to find slot {slot} in class {class}")]
    SlotNotFound { slot: String, class: String },
    #[error("slot {slot} of class {class} is not visible here")]
    SlotNotVisible { slot: String, class: String },
    #[error("slot {0} is read-only")]
    ReadOnlySlot(String),
    #[error("slot {slot} of instance [{instance}] requires a value")]
    SlotValueRequired { slot: String, instance: String },
    #[error("invalid value for slot {slot}: {source}")]
    Constraint {
        slot: String,
        #[source]
        source: PutSlotError,
    },

    // ── Messages ───────────────────────────────────────────────────
    #[error("no primary message-handler {message} applicable to {class}")]
    NoPrimaryHandler { message: String, class: String },
    #[error("message-handler {handler} of class {class} cannot be changed while executing")]
    HandlerBusy { handler: String, class: String },
    #[error("unable to find message-handler {handler} in class {class}")]
    HandlerNotFound { handler: String, class: String },
    #[error("system message-handler {handler} of class {class} cannot be changed")]
    SystemHandler { handler: String, class: String },
    #[error("no next message-handler available")]
    NoNextHandler,
    #[error("?self is only available inside a message-handler")]
    NoSelf,

    // ── Generic functions ──────────────────────────────────────────
    #[error("unable to find generic function {0}")]
    GenericNotFound(String),
    #[error("unable to find method #{index} of generic function {generic}")]
    MethodNotFound { generic: String, index: u16 },
    #[error("no applicable methods for {0}")]
    NoApplicableMethod(String),
    #[error("method #{index} of {generic} is not applicable to these arguments")]
    MethodNotApplicable { generic: String, index: u16 },
    #[error("generic function {0} cannot be changed while executing")]
    MethodAlter(String),
    #[error("no next method available")]
    NoNextMethod,
    #[error("?current-argument is only available inside a method query")]
    NoCurrentArgument,

    // ── Evaluation ─────────────────────────────────────────────────
    #[error("unable to find function {0}")]
    FunctionNotFound(String),
    #[error("{name} expected {expected} argument(s), got {got}")]
    WrongArgCount {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("expected {expected}, got {got}")]
    TypeError { expected: &'static str, got: String },
    #[error("division by zero")]
    DivideByZero,
    #[error("index {index} out of range for multifield of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("unable to acquire a class traversal id")]
    TraversalIdsExhausted,
    #[error("maximum evaluation depth {0} exceeded")]
    MaxDepth(usize),
    #[error("invalid settings: {0}")]
    InvalidSettings(&'static str),

    /// Execution was halted by an earlier error.
    #[error("execution halted")]
    Halted,
}

impl RuntimeError {
    pub fn is_halt(&self) -> bool {
        matches!(self, RuntimeError::Halted)
    }
}
