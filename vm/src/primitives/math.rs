use object::Value;

use crate::primitives::expect_number;
use crate::{RuntimeError, VM};

enum Op {
    Add,
    Sub,
    Mul,
}

fn fold(vm: &VM, args: &[Value], op: Op) -> Result<Value, RuntimeError> {
    let mut acc = args[0].clone();
    for rhs in &args[1..] {
        acc = match (&acc, rhs) {
            (Value::Integer(a), Value::Integer(b)) => {
                let r = match op {
                    Op::Add => a.wrapping_add(*b),
                    Op::Sub => a.wrapping_sub(*b),
                    Op::Mul => a.wrapping_mul(*b),
                };
                Value::Integer(r)
            }
            _ => {
                let a = expect_number(vm, &acc)?;
                let b = expect_number(vm, rhs)?;
                Value::Float(match op {
                    Op::Add => a + b,
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                })
            }
        };
    }
    if args.len() == 1 {
        expect_number(vm, &acc)?;
    }
    Ok(acc)
}

pub fn add(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    fold(vm, args, Op::Add)
}

pub fn sub(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    fold(vm, args, Op::Sub)
}

pub fn mul(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    fold(vm, args, Op::Mul)
}

/// Integer division when every operand is an integer.
pub fn div(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let mut acc = args[0].clone();
    for rhs in &args[1..] {
        acc = match (&acc, rhs) {
            (Value::Integer(_), Value::Integer(0)) => return Err(RuntimeError::DivideByZero),
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(a.wrapping_div(*b)),
            _ => {
                let a = expect_number(vm, &acc)?;
                let b = expect_number(vm, rhs)?;
                if b == 0.0 {
                    return Err(RuntimeError::DivideByZero);
                }
                Value::Float(a / b)
            }
        };
    }
    Ok(acc)
}

fn compare(
    vm: &VM,
    args: &[Value],
    holds: fn(f64, f64) -> bool,
) -> Result<Value, RuntimeError> {
    let nums = args
        .iter()
        .map(|v| expect_number(vm, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from_bool(nums.windows(2).all(|w| holds(w[0], w[1]))))
}

pub fn num_eq(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    compare(vm, args, |a, b| a == b)
}

pub fn lt(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    compare(vm, args, |a, b| a < b)
}

pub fn gt(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    compare(vm, args, |a, b| a > b)
}

pub fn le(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    compare(vm, args, |a, b| a <= b)
}

pub fn ge(vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    compare(vm, args, |a, b| a >= b)
}

/// True when every argument is the same value as the first.
pub fn eq(_vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from_bool(args[1..].iter().all(|v| v.same(&args[0]))))
}

/// True when no argument after the first is the same value as the first.
pub fn neq(_vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from_bool(!args[1..].iter().any(|v| v.same(&args[0]))))
}

pub fn not(_vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::from_bool(args[0].is_false()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VMCreateInfo;

    fn vm() -> VM {
        VM::new(VMCreateInfo::default()).unwrap()
    }

    #[test]
    fn integer_and_float_arithmetic() {
        let mut vm = vm();
        let ints = [Value::Integer(7), Value::Integer(2)];
        assert_eq!(add(&mut vm, Value::Void, &ints), Ok(Value::Integer(9)));
        assert_eq!(div(&mut vm, Value::Void, &ints), Ok(Value::Integer(3)));
        let mixed = [Value::Integer(1), Value::Float(0.5)];
        assert_eq!(sub(&mut vm, Value::Void, &mixed), Ok(Value::Float(0.5)));
    }

    #[test]
    fn division_by_zero() {
        let mut vm = vm();
        let args = [Value::Float(1.0), Value::Integer(0)];
        assert_eq!(div(&mut vm, Value::Void, &args), Err(RuntimeError::DivideByZero));
    }

    #[test]
    fn comparisons_chain() {
        let mut vm = vm();
        let args = [Value::Integer(1), Value::Float(2.0), Value::Integer(3)];
        assert_eq!(lt(&mut vm, Value::Void, &args), Ok(Value::TRUE));
        assert_eq!(gt(&mut vm, Value::Void, &args), Ok(Value::FALSE));
        let bad = [Value::Integer(1), Value::NIL];
        assert!(matches!(
            lt(&mut vm, Value::Void, &bad),
            Err(RuntimeError::TypeError { expected: "number", .. })
        ));
    }

    #[test]
    fn eq_is_type_strict() {
        let mut vm = vm();
        let args = [Value::Integer(1), Value::Float(1.0)];
        assert_eq!(eq(&mut vm, Value::Void, &args), Ok(Value::FALSE));
        assert_eq!(neq(&mut vm, Value::Void, &args), Ok(Value::TRUE));
        assert_eq!(num_eq(&mut vm, Value::Void, &args), Ok(Value::TRUE));
    }
}
