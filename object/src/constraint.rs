use crate::{Atom, ClassId, ClassRegistry, Symbols, Value};

bitflags::bitflags! {
    /// Set of primitive types a slot or restriction accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeSet: u16 {
        const INTEGER = 1 << 0;
        const FLOAT = 1 << 1;
        const SYMBOL = 1 << 2;
        const STRING = 1 << 3;
        const EXTERNAL_ADDRESS = 1 << 4;
        const FACT_ADDRESS = 1 << 5;
        const INSTANCE_ADDRESS = 1 << 6;
        const INSTANCE_NAME = 1 << 7;
        const NUMBER = Self::INTEGER.bits() | Self::FLOAT.bits();
        const LEXEME = Self::SYMBOL.bits() | Self::STRING.bits();
        const INSTANCE = Self::INSTANCE_ADDRESS.bits() | Self::INSTANCE_NAME.bits();
    }
}

impl TypeSet {
    /// Type bit of a single field. Multifields and void have none.
    pub fn of(value: &Value) -> TypeSet {
        match value {
            Value::Integer(_) => TypeSet::INTEGER,
            Value::Float(_) => TypeSet::FLOAT,
            Value::Symbol(_) => TypeSet::SYMBOL,
            Value::String(_) => TypeSet::STRING,
            Value::External(_) => TypeSet::EXTERNAL_ADDRESS,
            Value::FactAddress(_) => TypeSet::FACT_ADDRESS,
            Value::InstanceAddress(_) => TypeSet::INSTANCE_ADDRESS,
            Value::InstanceName(_) => TypeSet::INSTANCE_NAME,
            Value::Multifield(_) | Value::Void => TypeSet::empty(),
        }
    }
}

/// Why a slot write was rejected. The write is never partially applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PutSlotError {
    #[error("value type is not allowed")]
    Type,
    #[error("value is outside the allowed range")]
    Range,
    #[error("value violates the cardinality of the slot")]
    Cardinality,
    #[error("value is not one of the allowed values")]
    AllowedValues,
    #[error("instance is not of an allowed class")]
    AllowedClasses,
}

/// Constraint record attached to a slot.
///
/// Empty sets mean "anything". Ranges only apply to numbers and
/// cardinality only to multifield slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraint {
    pub types: Option<TypeSet>,
    pub allowed_values: Vec<Value>,
    pub allowed_classes: Vec<ClassId>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_cardinality: usize,
    pub max_cardinality: Option<usize>,
}

impl Constraint {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn of_types(types: TypeSet) -> Self {
        Self {
            types: Some(types),
            ..Self::default()
        }
    }

    /// Validate a complete slot value.
    ///
    /// `class_of` resolves instance addresses and names to their class; it
    /// returns `None` for dangling references.
    pub fn check(
        &self,
        value: &Value,
        multiple: bool,
        classes: &ClassRegistry,
        class_of: &dyn Fn(&Value) -> Option<ClassId>,
    ) -> Result<(), PutSlotError> {
        match value {
            Value::Multifield(fields) => {
                if !multiple {
                    return Err(PutSlotError::Cardinality);
                }
                if fields.len() < self.min_cardinality
                    || self.max_cardinality.is_some_and(|max| fields.len() > max)
                {
                    return Err(PutSlotError::Cardinality);
                }
                fields
                    .iter()
                    .try_for_each(|field| self.check_field(field, classes, class_of))
            }
            Value::Void => Err(PutSlotError::Type),
            single => {
                if multiple && (self.min_cardinality > 1 || self.max_cardinality == Some(0)) {
                    return Err(PutSlotError::Cardinality);
                }
                self.check_field(single, classes, class_of)
            }
        }
    }

    fn check_field(
        &self,
        field: &Value,
        classes: &ClassRegistry,
        class_of: &dyn Fn(&Value) -> Option<ClassId>,
    ) -> Result<(), PutSlotError> {
        if let Some(types) = self.types {
            if !types.intersects(TypeSet::of(field)) {
                return Err(PutSlotError::Type);
            }
        }
        if !self.allowed_values.is_empty() && !self.allowed_values.iter().any(|v| v.same(field)) {
            return Err(PutSlotError::AllowedValues);
        }
        if let Some(n) = field.as_number() {
            if self.min.is_some_and(|min| n < min) || self.max.is_some_and(|max| n > max) {
                return Err(PutSlotError::Range);
            }
        }
        if !self.allowed_classes.is_empty()
            && matches!(field, Value::InstanceAddress(_) | Value::InstanceName(_))
        {
            let Some(class) = class_of(field) else {
                return Err(PutSlotError::AllowedClasses);
            };
            if !self
                .allowed_classes
                .iter()
                .any(|&allowed| classes.is_subclass_or_same(class, allowed))
            {
                return Err(PutSlotError::AllowedClasses);
            }
        }
        Ok(())
    }

    /// The value a slot takes when its default is derived.
    pub fn derive_default(&self, multiple: bool, symbols: &Symbols) -> Value {
        let single = self.derive_single(symbols);
        if multiple {
            return Value::multifield(vec![single; self.min_cardinality]);
        }
        single
    }

    fn derive_single(&self, symbols: &Symbols) -> Value {
        if let Some(first) = self.allowed_values.first() {
            return first.clone();
        }
        let types = self.types.unwrap_or(TypeSet::SYMBOL);
        if types.contains(TypeSet::SYMBOL) {
            Value::NIL
        } else if types.contains(TypeSet::STRING) {
            Value::String(symbols.intern(""))
        } else if types.contains(TypeSet::INTEGER) {
            Value::Integer(self.min.map_or(0, |min| min.ceil() as i64))
        } else if types.contains(TypeSet::FLOAT) {
            Value::Float(self.min.unwrap_or(0.0))
        } else if types.contains(TypeSet::INSTANCE_NAME) {
            Value::InstanceName(Atom::NIL)
        } else {
            Value::NIL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_classes(_: &Value) -> Option<ClassId> {
        None
    }

    #[test]
    fn type_constraint() {
        let classes = ClassRegistry::new();
        let c = Constraint::of_types(TypeSet::INTEGER);
        assert_eq!(c.check(&Value::Integer(3), false, &classes, &no_classes), Ok(()));
        assert_eq!(
            c.check(&Value::Float(3.0), false, &classes, &no_classes),
            Err(PutSlotError::Type)
        );
    }

    #[test]
    fn range_constraint() {
        let classes = ClassRegistry::new();
        let c = Constraint {
            min: Some(0.0),
            max: Some(10.0),
            ..Constraint::any()
        };
        assert!(c.check(&Value::Integer(10), false, &classes, &no_classes).is_ok());
        assert_eq!(
            c.check(&Value::Integer(11), false, &classes, &no_classes),
            Err(PutSlotError::Range)
        );
    }

    #[test]
    fn cardinality() {
        let classes = ClassRegistry::new();
        let c = Constraint {
            min_cardinality: 1,
            max_cardinality: Some(2),
            ..Constraint::any()
        };
        let three = Value::multifield(vec![Value::NIL, Value::NIL, Value::NIL]);
        assert_eq!(
            c.check(&three, true, &classes, &no_classes),
            Err(PutSlotError::Cardinality)
        );
        assert_eq!(
            c.check(&Value::empty_multifield(), true, &classes, &no_classes),
            Err(PutSlotError::Cardinality)
        );
        // a multifield never fits a single-field slot
        assert_eq!(
            Constraint::any().check(&Value::empty_multifield(), false, &classes, &no_classes),
            Err(PutSlotError::Cardinality)
        );
    }

    #[test]
    fn allowed_values() {
        let classes = ClassRegistry::new();
        let c = Constraint {
            allowed_values: vec![Value::Integer(1), Value::Integer(2)],
            ..Constraint::any()
        };
        assert!(c.check(&Value::Integer(2), false, &classes, &no_classes).is_ok());
        assert_eq!(
            c.check(&Value::Integer(3), false, &classes, &no_classes),
            Err(PutSlotError::AllowedValues)
        );
    }

    #[test]
    fn derived_defaults() {
        let symbols = Symbols::new();
        assert_eq!(Constraint::any().derive_default(false, &symbols), Value::NIL);
        assert_eq!(
            Constraint::of_types(TypeSet::INTEGER).derive_default(false, &symbols),
            Value::Integer(0)
        );
        assert_eq!(
            Constraint::any().derive_default(true, &symbols),
            Value::empty_multifield()
        );
        let s = Constraint::of_types(TypeSet::STRING).derive_default(false, &symbols);
        assert_eq!(s, Value::String(symbols.intern("")));
    }
}
