use std::collections::HashMap;

use object::{
    Atom, Class, ClassFlags, ClassId, ClassRegistry, Code, Handler, HandlerType, PrimitiveType,
    SpecialClasses, Symbols,
};

/// System handlers installed on `USER`: message, primitive, parameter count.
const USER_HANDLERS: [(&str, &str, u16); 8] = [
    ("init", "init-slots", 0),
    ("delete", "delete-instance", 0),
    ("print", "print-instance", 0),
    ("create", "instance-created", 0),
    ("direct-modify", "direct-modify", 1),
    ("message-modify", "message-modify", 1),
    ("direct-duplicate", "direct-duplicate", 2),
    ("message-duplicate", "message-duplicate", 2),
];

fn system_class(
    symbols: &Symbols,
    classes: &mut ClassRegistry,
    name: &str,
    superclasses: &[ClassId],
    concrete: bool,
) -> ClassId {
    let atom = symbols.intern(name);
    symbols.retain(atom);
    let mut class = Class::new(atom);
    class.flags = ClassFlags::SYSTEM;
    if !concrete {
        class.flags |= ClassFlags::ABSTRACT;
    }
    let id = classes.install(class);
    for &sup in superclasses {
        classes.add_superclass_link(id, sup, None);
        classes.add_subclass_link(sup, id, None);
    }
    classes.linearize(id);
    classes.build_template(id);
    id
}

fn primitive_code(
    symbols: &Symbols,
    primitives: &HashMap<Atom, usize, ahash::RandomState>,
    name: &str,
) -> Code {
    match primitives.get(&symbols.intern(name)) {
        Some(&index) => Code::Primitive(index as u32),
        None => panic!("system handler primitive {name} is not registered"),
    }
}

/// Install the predefined class hierarchy and the system handlers of
/// `USER`.
pub(crate) fn bootstrap(
    symbols: &Symbols,
    classes: &mut ClassRegistry,
    primitives: &HashMap<Atom, usize, ahash::RandomState>,
) -> SpecialClasses {
    // 1. Roots
    let object = system_class(symbols, classes, "OBJECT", &[], false);
    let primitive = system_class(symbols, classes, "PRIMITIVE", &[object], false);
    let user = system_class(symbols, classes, "USER", &[object], false);

    // 2. Primitive value classes
    let number = system_class(symbols, classes, "NUMBER", &[primitive], false);
    let integer = system_class(symbols, classes, "INTEGER", &[number], false);
    let float = system_class(symbols, classes, "FLOAT", &[number], false);
    let lexeme = system_class(symbols, classes, "LEXEME", &[primitive], false);
    let symbol = system_class(symbols, classes, "SYMBOL", &[lexeme], false);
    let string = system_class(symbols, classes, "STRING", &[lexeme], false);
    let multifield = system_class(symbols, classes, "MULTIFIELD", &[primitive], false);
    let address = system_class(symbols, classes, "ADDRESS", &[primitive], false);
    let external = system_class(symbols, classes, "EXTERNAL-ADDRESS", &[address], false);
    let fact = system_class(symbols, classes, "FACT-ADDRESS", &[address], false);
    let instance = system_class(symbols, classes, "INSTANCE", &[primitive], false);
    let instance_address =
        system_class(symbols, classes, "INSTANCE-ADDRESS", &[address, instance], false);
    let instance_name = system_class(symbols, classes, "INSTANCE-NAME", &[instance], false);

    // 3. Concrete user root
    let initial_object = system_class(symbols, classes, "INITIAL-OBJECT", &[user], true);

    // 4. System handlers
    for (message, prim, params) in USER_HANDLERS {
        let name = symbols.intern(message);
        symbols.retain(name);
        classes[user].add_handler(Handler {
            name,
            kind: HandlerType::Primary,
            class: user,
            system: true,
            min_params: params,
            max_params: Some(params),
            local_var_count: 0,
            code: primitive_code(symbols, primitives, prim),
            busy: 0,
        });
    }

    let mut map = [primitive; PrimitiveType::COUNT];
    for ty in PrimitiveType::ALL {
        map[ty.index()] = match ty {
            PrimitiveType::Integer => integer,
            PrimitiveType::Float => float,
            PrimitiveType::Symbol => symbol,
            PrimitiveType::String => string,
            PrimitiveType::Multifield => multifield,
            PrimitiveType::ExternalAddress => external,
            PrimitiveType::FactAddress => fact,
            PrimitiveType::InstanceAddress => instance_address,
            PrimitiveType::InstanceName => instance_name,
            PrimitiveType::Void => primitive,
        };
    }

    SpecialClasses::new(object, user, initial_object, map)
}
