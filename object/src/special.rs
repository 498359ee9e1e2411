use crate::{ClassId, PrimitiveType};

/// Well-known system classes.
///
/// Holds the ids of the classes the runtime needs for core operations and
/// for dispatching on primitive values, which carry no class of their own.
///
/// **Classes are not created here.** They are installed in the class
/// registry first and then recorded by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialClasses {
    // ── Roots ──────────────────────────────────────────────────────
    /// Root of every class.
    pub object: ClassId,

    /// Root of every class the user defines.
    pub user: ClassId,

    /// Concrete class of the initial instance.
    pub initial_object: ClassId,

    // ── Primitive class map ────────────────────────────────────────
    /// Indexed by [`PrimitiveType::index`].
    primitive: [ClassId; PrimitiveType::COUNT],
}

impl SpecialClasses {
    pub fn new(
        object: ClassId,
        user: ClassId,
        initial_object: ClassId,
        primitive: [ClassId; PrimitiveType::COUNT],
    ) -> Self {
        Self {
            object,
            user,
            initial_object,
            primitive,
        }
    }

    /// Class a primitive value of type `ty` dispatches through.
    #[inline]
    pub fn primitive_class(&self, ty: PrimitiveType) -> ClassId {
        self.primitive[ty.index()]
    }
}
