use crate::{Atom, ClassId};

/// Executable body of a handler, method or dynamic default.
///
/// Bodies live in the runtime; the object model only stores an index into
/// either the primitive function table or the table of action lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Primitive(u32),
    Actions(u32),
}

/// Role of a message handler within a dispatch core.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerType {
    Around = 0,
    Before = 1,
    Primary = 2,
    After = 3,
}

impl HandlerType {
    pub const ALL: [HandlerType; 4] = [
        HandlerType::Around,
        HandlerType::Before,
        HandlerType::Primary,
        HandlerType::After,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerType::Around => "around",
            HandlerType::Before => "before",
            HandlerType::Primary => "primary",
            HandlerType::After => "after",
        }
    }
}

impl core::fmt::Display for HandlerType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Handler {
    pub name: Atom,
    pub kind: HandlerType,
    pub class: ClassId,
    /// Generated by the runtime (accessors, `init`, `delete`, ...).
    pub system: bool,
    pub min_params: u16,
    /// `None` when the last parameter is a wildcard.
    pub max_params: Option<u16>,
    pub local_var_count: u16,
    pub code: Code,
    /// Number of dispatch cores currently holding this handler.
    pub busy: u32,
}

impl Handler {
    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min_params as usize && self.max_params.is_none_or(|max| argc <= max as usize)
    }
}
