use object::{HandlerType, Value};
use vm::{
    ClassDef, Expr, HandlerDef, InstanceBuilder, InstanceModifier, MethodDef, RecordingNetwork,
    RestrictionDef, RuntimeError, SlotDef, VM, VMCreateInfo,
};

fn vm() -> VM {
    VM::new(VMCreateInfo::default()).unwrap()
}

fn say(vm: &VM, text: &str) -> Expr {
    let s = &vm.symbols;
    Expr::call(s, "printout", vec![Expr::sym(s, "t"), Expr::string(s, text)])
}

fn define_points(vm: &mut VM) {
    vm.define_class(
        ClassDef::new("POINT")
            .slot(SlotDef::new("x").default_value(Value::Integer(0)))
            .slot(SlotDef::new("y").default_value(Value::Integer(0))),
    )
    .unwrap();
    vm.define_class(
        ClassDef::new("POINT3D")
            .is_a(&["POINT"])
            .slot(SlotDef::new("z").default_value(Value::Integer(0))),
    )
    .unwrap();
}

#[test]
fn point_walkthrough() {
    let mut vm = vm();
    define_points(&mut vm);

    let mut builder = InstanceBuilder::new(&mut vm, "POINT").unwrap();
    builder.put(&mut vm, "x", Value::Integer(3)).unwrap();
    let p1 = builder.make(&mut vm, Some("p1")).unwrap();
    builder.dispose(&mut vm);
    assert_eq!(vm.get_slot(p1, "x"), Ok(Value::Integer(3)));
    assert_eq!(vm.get_slot(p1, "y"), Ok(Value::Integer(0)));

    let name = vm.instance_name_value("p1");
    vm.send(name.clone(), "put-x", &[Value::Integer(5)]).unwrap();
    assert_eq!(vm.send(name, "get-x", &[]), Ok(Value::Integer(5)));

    let point3d = vm.find_class("POINT3D").unwrap();
    let precedence = vm.class_precedence(point3d);
    assert_eq!(&precedence[..2], ["POINT3D", "POINT"]);
    assert_eq!(vm.slot_names(point3d), vec!["x", "y", "z"]);

    for class in ["POINT", "POINT3D"] {
        for (kind, label) in [
            (HandlerType::Before, "before"),
            (HandlerType::Primary, "primary"),
            (HandlerType::After, "after"),
        ] {
            let body = say(&vm, &format!("{class}-{label} "));
            vm.define_handler(class, "describe", kind, HandlerDef::new(body))
                .unwrap();
        }
    }
    let p2 = vm.make_instance(Some("p2"), "POINT3D", &[]).unwrap();
    vm.take_output();
    vm.send(Value::InstanceAddress(p2), "describe", &[]).unwrap();
    assert_eq!(
        vm.take_output(),
        "POINT3D-before POINT-before POINT3D-primary POINT-after POINT3D-after "
    );
}

#[test]
fn deleted_instance_is_not_addressable() {
    let mut vm = vm();
    define_points(&mut vm);
    let p = vm.make_instance(Some("p"), "POINT", &[]).unwrap();
    assert_eq!(vm.unmake_instance(p), Ok(true));
    assert!(!vm.instance_exists(p));
    assert_eq!(
        vm.send(Value::InstanceAddress(p), "get-x", &[]),
        Err(RuntimeError::InstanceDeleted)
    );
    assert!(vm.find_instance("p").is_none());
}

#[test]
fn modifier_and_network_agree() {
    let mut vm = vm();
    define_points(&mut vm);
    let network = RecordingNetwork::new();
    let events = network.events.clone();
    vm.set_network(Box::new(network));

    let p = vm.make_instance(Some("p"), "POINT", &[]).unwrap();
    let mut modifier = InstanceModifier::new(&mut vm, p).unwrap();
    modifier.put(&mut vm, "x", Value::Integer(0)).unwrap();
    assert_eq!(modifier.modify(&mut vm), Ok(p));
    modifier.put(&mut vm, "y", Value::Integer(2)).unwrap();
    assert_eq!(modifier.modify(&mut vm), Ok(p));
    modifier.dispose(&mut vm);

    assert_eq!(vm.get_slot(p, "y"), Ok(Value::Integer(2)));
    assert_eq!(events.borrow().len(), 2);
}

#[test]
fn generic_over_point_classes() {
    let mut vm = vm();
    define_points(&mut vm);
    let s = vm.symbols.clone();
    vm.define_method("dims", MethodDef::new(Expr::int(2)).restriction(RestrictionDef::of(&["POINT"])))
        .unwrap();
    vm.define_method(
        "dims",
        MethodDef::new(Expr::call(&s, "+", vec![Expr::CallNextMethod, Expr::int(1)]))
            .restriction(RestrictionDef::of(&["POINT3D"])),
    )
    .unwrap();
    let p = vm.make_instance(None, "POINT", &[]).unwrap();
    let q = vm.make_instance(None, "POINT3D", &[]).unwrap();
    assert_eq!(vm.call_generic("dims", &[Value::InstanceAddress(p)]), Ok(Value::Integer(2)));
    assert_eq!(vm.call_generic("dims", &[Value::InstanceAddress(q)]), Ok(Value::Integer(3)));
    assert!(matches!(
        vm.call_generic("dims", &[Value::Integer(1)]),
        Err(RuntimeError::NoApplicableMethod(_))
    ));
}
