//! Runtime values on the echo stack.

use std::fmt;

use super::engine::ScriptError;
use super::node::{format_double, Element};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
}

/// Numeric view of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Double(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Double(v) => v,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(v) => v == 0,
            Number::Double(v) => v == 0.0,
        }
    }

    pub fn is_negative(self) -> bool {
        match self {
            Number::Int(v) => v < 0,
            Number::Double(v) => v < 0.0,
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(v) => Value::Int(v),
            Number::Double(v) => Value::Double(v),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{v}"),
            Number::Double(v) => f.write_str(&format_double(*v)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => f.write_str(&format_double(*v)),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// Parse text as a number: `.`, `e` or `E` make it a double.
pub fn parse_number(text: &str) -> Result<Number, ScriptError> {
    let trimmed = text.trim();
    let parsed = if trimmed.contains(['.', 'e', 'E']) {
        trimmed.parse::<f64>().ok().map(Number::Double)
    } else {
        trimmed.parse::<i64>().ok().map(Number::Int)
    };
    parsed.ok_or_else(|| ScriptError::NotANumber(text.to_string()))
}

impl Value {
    /// Literal value of a constant element. Variables, functions and
    /// operators have no literal value.
    pub fn from_constant(element: &Element) -> Option<Value> {
        match element {
            Element::Integer(v) => Some(Value::Int(*v)),
            Element::Double(v) => Some(Value::Double(*v)),
            Element::Str(s) => Some(Value::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_number(&self) -> Result<Number, ScriptError> {
        match self {
            Value::Int(v) => Ok(Number::Int(*v)),
            Value::Double(v) => Ok(Number::Double(*v)),
            Value::Str(s) => parse_number(s),
        }
    }
}

/// Apply a binary operator. Integer operands stay integral; overflow,
/// integer division by zero and non-finite results are errors.
pub fn apply_operator(op: char, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    let (a, b) = (left.to_number()?, right.to_number()?);
    let overflow = || ScriptError::Arithmetic(format!("integer overflow in {a} {op} {b}"));

    let result = match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let value = match op {
                '+' => x.checked_add(y),
                '-' => x.checked_sub(y),
                '*' => x.checked_mul(y),
                '/' => {
                    if y == 0 {
                        return Err(ScriptError::DivisionByZero);
                    }
                    x.checked_div(y)
                }
                '^' => {
                    if y < 0 {
                        return finite(op, (x as f64).powf(y as f64));
                    }
                    u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp))
                }
                _ => return Err(ScriptError::UnknownOperator(op)),
            };
            Number::Int(value.ok_or_else(overflow)?)
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let value = match op {
                '+' => x + y,
                '-' => x - y,
                '*' => x * y,
                '/' => x / y,
                '^' => x.powf(y),
                _ => return Err(ScriptError::UnknownOperator(op)),
            };
            return finite(op, value);
        }
    };
    Ok(result.into())
}

fn finite(op: char, value: f64) -> Result<Value, ScriptError> {
    if value.is_finite() {
        Ok(Value::Double(value))
    } else {
        Err(ScriptError::Arithmetic(format!(
            "`{op}` produced a non-finite result"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_arithmetic_stays_integral() {
        assert_eq!(
            apply_operator('/', &Value::Int(7), &Value::Int(2)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            apply_operator('^', &Value::Int(2), &Value::Int(10)).unwrap(),
            Value::Int(1024)
        );
    }

    #[test]
    fn test_strings_are_coerced() {
        assert_eq!(
            apply_operator('+', &Value::Str("1.5".into()), &Value::Int(1)).unwrap(),
            Value::Double(2.5)
        );
        assert!(apply_operator('+', &Value::Str("x".into()), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_division_errors() {
        assert!(matches!(
            apply_operator('/', &Value::Int(1), &Value::Int(0)),
            Err(ScriptError::DivisionByZero)
        ));
        assert!(apply_operator('/', &Value::Double(1.0), &Value::Int(0)).is_err());
        assert!(apply_operator('+', &Value::Int(i64::MAX), &Value::Int(1)).is_err());
    }
}
