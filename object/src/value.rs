use std::{any::Any, rc::Rc};

use crate::{Atom, InstanceId};

/// Opaque host data carried through the runtime.
#[derive(Clone)]
pub struct External(pub Rc<dyn Any>);

impl External {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for External {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl core::fmt::Debug for External {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "External({:p})", Rc::as_ptr(&self.0))
    }
}

/// A runtime value.
///
/// The variant set is closed: every kind of value the runtime understands
/// has a [`PrimitiveType`] and therefore a class in the primitive class map.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value. Writing it to a slot resets the slot to its default.
    Void,
    Symbol(Atom),
    String(Atom),
    InstanceName(Atom),
    Integer(i64),
    Float(f64),
    Multifield(Rc<[Value]>),
    InstanceAddress(InstanceId),
    FactAddress(u64),
    External(External),
}

/// Primitive type tag of a [`Value`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Integer = 0,
    Float,
    Symbol,
    String,
    Multifield,
    ExternalAddress,
    FactAddress,
    InstanceAddress,
    InstanceName,
    Void,
}

impl PrimitiveType {
    pub const COUNT: usize = 10;

    pub const ALL: [PrimitiveType; Self::COUNT] = [
        PrimitiveType::Integer,
        PrimitiveType::Float,
        PrimitiveType::Symbol,
        PrimitiveType::String,
        PrimitiveType::Multifield,
        PrimitiveType::ExternalAddress,
        PrimitiveType::FactAddress,
        PrimitiveType::InstanceAddress,
        PrimitiveType::InstanceName,
        PrimitiveType::Void,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl Value {
    pub const FALSE: Value = Value::Symbol(Atom::FALSE);
    pub const TRUE: Value = Value::Symbol(Atom::TRUE);
    pub const NIL: Value = Value::Symbol(Atom::NIL);

    #[inline]
    pub fn from_bool(value: bool) -> Self {
        if value { Value::TRUE } else { Value::FALSE }
    }

    pub fn multifield(values: Vec<Value>) -> Self {
        Value::Multifield(Rc::from(values))
    }

    pub fn empty_multifield() -> Self {
        Value::Multifield(Rc::from(Vec::new()))
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Value::Void => PrimitiveType::Void,
            Value::Symbol(_) => PrimitiveType::Symbol,
            Value::String(_) => PrimitiveType::String,
            Value::InstanceName(_) => PrimitiveType::InstanceName,
            Value::Integer(_) => PrimitiveType::Integer,
            Value::Float(_) => PrimitiveType::Float,
            Value::Multifield(_) => PrimitiveType::Multifield,
            Value::InstanceAddress(_) => PrimitiveType::InstanceAddress,
            Value::FactAddress(_) => PrimitiveType::FactAddress,
            Value::External(_) => PrimitiveType::ExternalAddress,
        }
    }

    /// Everything except the symbol `FALSE` counts as true.
    #[inline]
    pub fn is_true(&self) -> bool {
        !self.is_false()
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Symbol(atom) if *atom == Atom::FALSE)
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    #[inline]
    pub fn is_multifield(&self) -> bool {
        matches!(self, Value::Multifield(_))
    }

    /// Numeric view used by range checks and arithmetic.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Value::Integer(n) => Some(n as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// Symbol, string and instance-name atoms.
    pub fn as_atom(&self) -> Option<Atom> {
        match *self {
            Value::Symbol(atom) | Value::String(atom) | Value::InstanceName(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<InstanceId> {
        match *self {
            Value::InstanceAddress(id) => Some(id),
            _ => None,
        }
    }

    /// Multifield contents, or the value itself as a one-element field.
    pub fn fields(&self) -> Vec<Value> {
        match self {
            Value::Multifield(values) => values.to_vec(),
            Value::Void => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// Structural equality as used by `eq` and the instance modifier:
    /// integers and floats never compare equal to each other.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || a == b,
            (Value::Multifield(a), Value::Multifield(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same(y))
            }
            _ => self == other,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::from_bool(value)
    }
}
