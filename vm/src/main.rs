use clap::{Parser as ClapParser, ValueEnum};
use std::process;

use object::{HandlerType, Value};
use vm::{
    ClassDef, Expr, HandlerDef, InstanceBuilder, MethodDef, RestrictionDef, RuntimeError, Settings,
    SlotDef, VM, VMCreateInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Classes, builder, accessors and the handler core of a point pair
    Point,
    /// Precedence lists of a diamond hierarchy
    Hierarchy,
    /// Generic function dispatch with next-method chaining
    Generic,
}

#[derive(ClapParser, Debug)]
#[command(name = "cool", author, version, about, long_about = None)]
struct Cli {
    /// Scenarios to run in order; all of them when none are given
    #[arg(long = "scenario", value_enum)]
    scenarios: Vec<Scenario>,

    /// Log runtime activity to stderr (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Buckets in the instance name hash table
    #[arg(long)]
    hash_size: Option<usize>,

    /// Maximum nesting of handler and method evaluations
    #[arg(long)]
    max_depth: Option<usize>,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    let mut settings = Settings::default();
    if let Some(size) = cli.hash_size {
        settings.instance_hash_size = size;
    }
    if let Some(depth) = cli.max_depth {
        settings.max_depth = depth;
    }

    let scenarios = if cli.scenarios.is_empty() {
        vec![Scenario::Point, Scenario::Hierarchy, Scenario::Generic]
    } else {
        cli.scenarios.clone()
    };

    for scenario in scenarios {
        let mut vm = match VM::new(VMCreateInfo { settings: settings.clone() }) {
            Ok(vm) => vm,
            Err(err) => {
                eprintln!("Error: {}", err);
                process::exit(2);
            }
        };
        println!("== {:?} ==", scenario);
        let result = match scenario {
            Scenario::Point => point(&mut vm),
            Scenario::Hierarchy => hierarchy(&mut vm),
            Scenario::Generic => generic(&mut vm),
        };
        if let Err(err) = result {
            eprintln!("Error in {:?} scenario: {}", scenario, err);
            process::exit(1);
        }
    }
}

fn printout(vm: &VM, text: &str) -> Expr {
    let s = &vm.symbols;
    Expr::call(s, "printout", vec![Expr::sym(s, "t"), Expr::string(s, text), Expr::sym(s, "crlf")])
}

fn point(vm: &mut VM) -> Result<(), RuntimeError> {
    vm.define_class(
        ClassDef::new("POINT")
            .slot(SlotDef::new("x").default_value(Value::Integer(0)).public())
            .slot(SlotDef::new("y").default_value(Value::Integer(0)).public()),
    )?;
    vm.define_class(
        ClassDef::new("POINT3D")
            .is_a(&["POINT"])
            .slot(SlotDef::new("z").default_value(Value::Integer(0))),
    )?;

    let mut builder = InstanceBuilder::new(vm, "POINT")?;
    builder.put(vm, "x", Value::Integer(3))?;
    let made = builder.make(vm, Some("p1"));
    builder.dispose(vm);
    let p1 = made?;
    let (x, y) = (vm.get_slot(p1, "x")?, vm.get_slot(p1, "y")?);
    println!("[p1] x = {}, y = {}", vm.display(&x), vm.display(&y));

    let p1 = Value::InstanceAddress(p1);
    vm.send(p1.clone(), "put-x", &[Value::Integer(5)])?;
    let x = vm.send(p1, "get-x", &[])?;
    println!("after put-x: x = {}", vm.display(&x));

    let point3d = vm.find_class("POINT3D").ok_or_else(|| RuntimeError::ClassNotFound("POINT3D".into()))?;
    println!("POINT3D precedence: {}", vm.class_precedence(point3d).join(" "));

    for class in ["POINT", "POINT3D"] {
        for (kind, label) in [
            (HandlerType::Before, "before"),
            (HandlerType::Primary, "primary"),
            (HandlerType::After, "after"),
        ] {
            let body = printout(vm, &format!("  {class} {label}"));
            vm.define_handler(class, "describe", kind, HandlerDef::new(body))?;
        }
    }
    let p2 = vm.make_instance(Some("p2"), "POINT3D", &[("z", Value::Integer(1))])?;
    vm.send(Value::InstanceAddress(p2), "describe", &[])?;
    print!("{}", vm.take_output());
    Ok(())
}

fn hierarchy(vm: &mut VM) -> Result<(), RuntimeError> {
    vm.define_class(ClassDef::new("A"))?;
    vm.define_class(ClassDef::new("B").is_a(&["A"]))?;
    vm.define_class(ClassDef::new("C").is_a(&["A"]))?;
    let d = vm.define_class(ClassDef::new("D").is_a(&["B", "C"]))?;
    println!("D precedence: {}", vm.class_precedence(d).join(" "));
    for value in [Value::Integer(1), Value::Float(1.5), vm.symbol("x")] {
        let class = vm.class_of(&value)?;
        println!("{} is a {}", vm.repr(&value), vm.class_precedence(class).join(" "));
    }
    Ok(())
}

fn generic(vm: &mut VM) -> Result<(), RuntimeError> {
    let s = vm.symbols.clone();
    let tagged = |tag: &str| {
        Expr::call(
            &s,
            "create$",
            vec![
                Expr::sym(&s, tag),
                Expr::if_(Expr::NextMethodp, Expr::CallNextMethod, Expr::Const(Value::empty_multifield())),
            ],
        )
    };
    vm.define_method("kind", MethodDef::new(tagged("integer")).restriction(RestrictionDef::of(&["INTEGER"])))?;
    vm.define_method("kind", MethodDef::new(tagged("number")).restriction(RestrictionDef::of(&["NUMBER"])))?;
    vm.define_method("kind", MethodDef::new(tagged("anything")).restriction(RestrictionDef::any()))?;
    for value in [Value::Integer(7), Value::Float(0.5), vm.symbol("abc")] {
        let chain = vm.call_generic("kind", &[value.clone()])?;
        println!("(kind {}) => {}", vm.repr(&value), vm.repr(&chain));
    }
    Ok(())
}
