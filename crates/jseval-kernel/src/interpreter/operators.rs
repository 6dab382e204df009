//! Binary operator semantics.

use std::cmp::Ordering;

use crate::ast::BinaryOp;

use super::control_flow::Exception;
use super::inspect::{inspect, InspectOptions};
use super::value::{array_index, lock, to_int32, to_property_key, to_uint32, FunctionKind, Value};

/// Apply a non-short-circuiting binary operator.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Exception> {
    let value = match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Exp => Value::Number(pow(left.to_number(), right.to_number())),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::LtEq => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::GtEq => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Shl => {
            let shift = to_uint32(right.to_number()) & 31;
            Value::Number(f64::from(to_int32(left.to_number()).wrapping_shl(shift)))
        }
        BinaryOp::Shr => {
            let shift = to_uint32(right.to_number()) & 31;
            Value::Number(f64::from(to_int32(left.to_number()) >> shift))
        }
        BinaryOp::UShr => {
            let shift = to_uint32(right.to_number()) & 31;
            Value::Number(f64::from(to_uint32(left.to_number()) >> shift))
        }
        BinaryOp::BitAnd => Value::Number(f64::from(
            to_int32(left.to_number()) & to_int32(right.to_number()),
        )),
        BinaryOp::BitOr => Value::Number(f64::from(
            to_int32(left.to_number()) | to_int32(right.to_number()),
        )),
        BinaryOp::BitXor => Value::Number(f64::from(
            to_int32(left.to_number()) ^ to_int32(right.to_number()),
        )),
        BinaryOp::In => Value::Bool(has_property(right, &to_property_key(left))?),
        BinaryOp::Instanceof => Value::Bool(instance_of(left, right)?),
    };
    Ok(value)
}

/// Objects convert to their string form before `+` and comparisons.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_) => {
            Value::String(value.to_js_string())
        }
        other => other.clone(),
    }
}

fn add(left: &Value, right: &Value) -> Value {
    let (l, r) = (to_primitive(left), to_primitive(right));
    match (&l, &r) {
        (Value::String(a), _) => Value::String(format!("{a}{}", r.to_js_string())),
        (_, Value::String(b)) => Value::String(format!("{}{b}", l.to_js_string())),
        _ => Value::Number(l.to_number() + r.to_number()),
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let (l, r) = (to_primitive(left), to_primitive(right));
    match (&l, &r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}

/// `**`, which unlike `powf` gives NaN for `1 ** NaN` and `(±1) ** ±Infinity`.
pub fn pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// Whether `key in object` holds.
pub fn has_property(object: &Value, key: &str) -> Result<bool, Exception> {
    Ok(match object {
        Value::Object(obj) => {
            let obj = lock(obj);
            obj.properties.contains_key(key)
                || matches!(key, "hasOwnProperty" | "toString")
                || !matches!(obj.class, super::value::ObjectClass::Plain)
                    && matches!(key, "name" | "message" | "stack")
        }
        Value::Array(items) => {
            key == "length" || array_index(key).is_some_and(|i| i < lock(items).len())
        }
        Value::Function(f) => {
            matches!(key, "name" | "length") || lock(&f.properties).contains_key(key)
        }
        Value::Promise(_) => matches!(key, "then" | "catch" | "finally"),
        primitive => {
            return Err(Exception::type_error(format!(
                "Cannot use 'in' operator to search for '{key}' in {}",
                inspect(primitive, &InspectOptions::default())
            )));
        }
    })
}

/// `value instanceof constructor` for the intrinsic constructors.
pub fn instance_of(value: &Value, constructor: &Value) -> Result<bool, Exception> {
    let Value::Function(ctor) = constructor else {
        return Err(Exception::type_error(
            "Right-hand side of 'instanceof' is not callable",
        ));
    };
    if matches!(ctor.kind, FunctionKind::Closure { .. } | FunctionKind::Method { .. }) {
        return Ok(false);
    }
    Ok(match ctor.name.as_str() {
        "Object" => matches!(
            value,
            Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Promise(_)
        ),
        "Array" => matches!(value, Value::Array(_)),
        "Function" => matches!(value, Value::Function(_)),
        "Promise" => matches!(value, Value::Promise(_)),
        "Error" => value.error_parts().is_some(),
        name => value.error_parts().is_some_and(|(n, _)| n == name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn n(v: f64) -> Value {
        Value::from(v)
    }

    #[rstest]
    #[case(BinaryOp::Add, n(1.0), n(2.0), n(3.0))]
    #[case(BinaryOp::Add, Value::from("a"), n(1.0), Value::from("a1"))]
    #[case(BinaryOp::Add, n(1.0), Value::Null, n(1.0))]
    #[case(BinaryOp::Sub, Value::from("5"), n(2.0), n(3.0))]
    #[case(BinaryOp::Rem, n(-7.0), n(3.0), n(-1.0))]
    #[case(BinaryOp::Exp, n(2.0), n(10.0), n(1024.0))]
    #[case(BinaryOp::Shl, n(1.0), n(33.0), n(2.0))]
    #[case(BinaryOp::Shr, n(-8.0), n(1.0), n(-4.0))]
    #[case(BinaryOp::UShr, n(-1.0), n(28.0), n(15.0))]
    #[case(BinaryOp::BitOr, n(5.0), n(2.0), n(7.0))]
    #[case(BinaryOp::Lt, Value::from("a"), Value::from("b"), Value::Bool(true))]
    #[case(BinaryOp::Lt, Value::from("10"), n(9.0), Value::Bool(false))]
    #[case(BinaryOp::GtEq, n(f64::NAN), n(1.0), Value::Bool(false))]
    #[case(BinaryOp::Eq, Value::from("1"), n(1.0), Value::Bool(true))]
    #[case(BinaryOp::StrictEq, Value::from("1"), n(1.0), Value::Bool(false))]
    fn binary_operators(#[case] op: BinaryOp, #[case] l: Value, #[case] r: Value, #[case] expected: Value) {
        assert_eq!(binary(op, &l, &r).expect("binary"), expected);
    }

    #[test]
    fn array_concatenation_uses_string_form() {
        let arr = Value::array(vec![n(1.0), n(2.0)]);
        assert_eq!(binary(BinaryOp::Add, &arr, &n(3.0)).expect("add"), Value::from("1,23"));
    }

    #[test]
    fn pow_edge_cases() {
        assert!(pow(1.0, f64::NAN).is_nan());
        assert!(pow(-1.0, f64::INFINITY).is_nan());
        assert_eq!(pow(f64::NAN, 0.0), 1.0);
    }

    #[test]
    fn in_operator() {
        let obj = Value::object_from([("a", n(1.0))]);
        assert_eq!(binary(BinaryOp::In, &Value::from("a"), &obj).expect("in"), Value::Bool(true));
        let arr = Value::array(vec![n(1.0)]);
        assert_eq!(binary(BinaryOp::In, &n(0.0), &arr).expect("in"), Value::Bool(true));
        assert_eq!(binary(BinaryOp::In, &n(1.0), &arr).expect("in"), Value::Bool(false));

        let err = binary(BinaryOp::In, &Value::from("a"), &n(1.0)).expect_err("primitive");
        assert_eq!(err.message(), "Cannot use 'in' operator to search for 'a' in 1");
    }
}
