use std::cmp::Ordering;
use std::collections::HashMap;

use crate::{Atom, ClassId, ClassRegistry, Code};

/// Dense id of a generic function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericId(pub u32);

/// Restriction on one positional argument of a method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restriction {
    /// Allowed classes; empty accepts any argument.
    pub types: Vec<ClassId>,
    /// Evaluated with the argument bound to `?current-argument`.
    pub query: Option<Code>,
}

impl Restriction {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn of(types: Vec<ClassId>) -> Self {
        Self { types, query: None }
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    /// User-visible method index, unique within the generic.
    pub index: u16,
    pub restrictions: Vec<Restriction>,
    pub min_restrictions: u16,
    /// `None` when the last parameter is a wildcard.
    pub max_restrictions: Option<u16>,
    pub local_var_count: u16,
    pub code: Code,
    /// Wraps a primitive function.
    pub system: bool,
    pub busy: u32,
}

impl Method {
    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min_restrictions as usize
            && self.max_restrictions.is_none_or(|max| argc <= max as usize)
    }

    /// Restriction for argument `position`; arguments matched by the
    /// wildcard use the last restriction.
    pub fn restriction(&self, position: usize) -> Option<&Restriction> {
        self.restrictions
            .get(position)
            .or_else(|| match self.max_restrictions {
                None => self.restrictions.last(),
                Some(_) => None,
            })
    }
}

#[derive(Debug)]
pub struct Generic {
    pub name: Atom,
    /// Sorted by precedence, most specific first.
    pub methods: Vec<Method>,
    pub busy: u32,
    next_index: u16,
}

impl Generic {
    pub fn new(name: Atom) -> Self {
        Self {
            name,
            methods: Vec::new(),
            busy: 0,
            next_index: 1,
        }
    }

    /// Position of the method with this user index.
    pub fn method_position(&self, index: u16) -> Option<usize> {
        self.methods.iter().position(|m| m.index == index)
    }

    /// Next unused method index.
    pub fn next_index(&self) -> u16 {
        self.next_index
    }

    /// Insert in precedence order; returns the position.
    pub fn insert_method(&mut self, method: Method, classes: &ClassRegistry) -> usize {
        if method.index >= self.next_index {
            self.next_index = method.index + 1;
        }
        let pos = self
            .methods
            .partition_point(|m| method_precedence(m, &method, classes) == Ordering::Less);
        self.methods.insert(pos, method);
        pos
    }

    pub fn remove_method(&mut self, position: usize) -> Method {
        self.methods.remove(position)
    }

    pub fn methods_executing(&self) -> bool {
        self.methods.iter().any(|m| m.busy > 0)
    }
}

/// `Less` when `a` is more specific than `b`.
pub fn method_precedence(a: &Method, b: &Method, classes: &ClassRegistry) -> Ordering {
    for (ra, rb) in a.restrictions.iter().zip(b.restrictions.iter()) {
        let ord = restriction_precedence(ra, rb, classes);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    match (a.max_restrictions, b.max_restrictions) {
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        _ => {}
    }
    a.restrictions
        .len()
        .cmp(&b.restrictions.len())
        .then(a.index.cmp(&b.index))
}

fn restriction_precedence(a: &Restriction, b: &Restriction, classes: &ClassRegistry) -> Ordering {
    match (a.types.is_empty(), b.types.is_empty()) {
        (false, true) => return Ordering::Less,
        (true, false) => return Ordering::Greater,
        (false, false) => {
            let ord = type_list_precedence(&a.types, &b.types, classes);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        (true, true) => {}
    }
    match (a.query.is_some(), b.query.is_some()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn type_list_precedence(a: &[ClassId], b: &[ClassId], classes: &ClassRegistry) -> Ordering {
    for (&ta, &tb) in a.iter().zip(b.iter()) {
        if ta == tb {
            continue;
        }
        if classes.is_subclass_or_same(ta, tb) {
            return Ordering::Less;
        }
        if classes.is_subclass_or_same(tb, ta) {
            return Ordering::Greater;
        }
    }
    a.len().cmp(&b.len())
}

/// All generic functions, by name.
#[derive(Debug, Default)]
pub struct GenericRegistry {
    generics: Vec<Option<Generic>>,
    names: HashMap<Atom, GenericId, ahash::RandomState>,
}

impl GenericRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing generic of this name, or a new empty one.
    pub fn define(&mut self, name: Atom) -> GenericId {
        if let Some(&id) = self.names.get(&name) {
            return id;
        }
        let id = match self.generics.iter().position(Option::is_none) {
            Some(free) => {
                self.generics[free] = Some(Generic::new(name));
                GenericId(free as u32)
            }
            None => {
                self.generics.push(Some(Generic::new(name)));
                GenericId(self.generics.len() as u32 - 1)
            }
        };
        self.names.insert(name, id);
        id
    }

    pub fn find(&self, name: Atom) -> Option<GenericId> {
        self.names.get(&name).copied()
    }

    pub fn get(&self, id: GenericId) -> Option<&Generic> {
        self.generics.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: GenericId) -> Option<&mut Generic> {
        self.generics.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: GenericId) -> Option<Generic> {
        let generic = self.generics.get_mut(id.0 as usize)?.take()?;
        self.names.remove(&generic.name);
        Some(generic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Generic> {
        self.generics.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Class, Symbols};

    fn method(index: u16, restrictions: Vec<Restriction>, wildcard: bool) -> Method {
        let n = restrictions.len() as u16;
        Method {
            index,
            restrictions,
            min_restrictions: if wildcard { n.saturating_sub(1) } else { n },
            max_restrictions: if wildcard { None } else { Some(n) },
            local_var_count: 0,
            code: Code::Actions(index as u32),
            system: false,
            busy: 0,
        }
    }

    fn hierarchy() -> (ClassRegistry, ClassId, ClassId) {
        let symbols = Symbols::new();
        let mut classes = ClassRegistry::new();
        let number = classes.install(Class::new(symbols.intern("NUMBER")));
        let integer = classes.install(Class::new(symbols.intern("INTEGER")));
        classes.add_superclass_link(integer, number, None);
        classes.add_subclass_link(number, integer, None);
        classes.linearize(number);
        classes.linearize(integer);
        (classes, number, integer)
    }

    #[test]
    fn subclass_restriction_ranks_first() {
        let (classes, number, integer) = hierarchy();
        let mut generic = Generic::new(Atom(100));
        generic.insert_method(method(1, vec![Restriction::of(vec![number])], false), &classes);
        generic.insert_method(method(2, vec![Restriction::of(vec![integer])], false), &classes);
        generic.insert_method(method(3, vec![Restriction::any()], false), &classes);
        let order: Vec<u16> = generic.methods.iter().map(|m| m.index).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn query_and_wildcard_ordering() {
        let (classes, _, _) = hierarchy();
        let mut generic = Generic::new(Atom(100));
        let with_query = Restriction {
            types: Vec::new(),
            query: Some(Code::Actions(9)),
        };
        generic.insert_method(method(1, vec![Restriction::any()], true), &classes);
        generic.insert_method(method(2, vec![Restriction::any()], false), &classes);
        generic.insert_method(method(3, vec![with_query], false), &classes);
        let order: Vec<u16> = generic.methods.iter().map(|m| m.index).collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(generic.next_index(), 4);
    }

    #[test]
    fn wildcard_restriction_repeats() {
        let m = method(1, vec![Restriction::any(), Restriction::of(vec![ClassId(4)])], true);
        assert!(m.accepts(1));
        assert!(m.accepts(5));
        assert_eq!(m.restriction(4).map(|r| r.types.clone()), Some(vec![ClassId(4)]));
        let bounded = method(2, vec![Restriction::any()], false);
        assert!(!bounded.accepts(2));
        assert!(bounded.restriction(1).is_none());
    }

    #[test]
    fn registry_reuses_names() {
        let mut generics = GenericRegistry::new();
        let a = generics.define(Atom(10));
        assert_eq!(generics.define(Atom(10)), a);
        assert!(generics.remove(a).is_some());
        assert!(generics.find(Atom(10)).is_none());
        let b = generics.define(Atom(11));
        assert_eq!(b, a);
    }
}
