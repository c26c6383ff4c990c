//! Runtime values and the scalar/record type model.
//!
//! Stack values are a tagged variant so arithmetic, comparison, and
//! assignment can verify operand shapes. Numeric operations widen
//! INTEGER → LONG → SINGLE → DOUBLE; strings never mix with numbers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use sorrel_common::{RuntimeError, Trap};

/// A mutable variable slot. Cells are shared by reference so BYREF
/// argument passing and SHARED names alias one slot.
pub type Cell = Rc<RefCell<Value>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarTy {
    Integer,
    Long,
    Single,
    Double,
    Str,
}

impl ScalarTy {
    /// Derive a scalar type from an identifier's trailing sigil.
    pub fn from_sigil(name: &str) -> Option<ScalarTy> {
        match name.chars().last() {
            Some('%') => Some(ScalarTy::Integer),
            Some('&') => Some(ScalarTy::Long),
            Some('!') => Some(ScalarTy::Single),
            Some('#') => Some(ScalarTy::Double),
            Some('$') => Some(ScalarTy::Str),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<ScalarTy> {
        match name {
            "INTEGER" => Some(ScalarTy::Integer),
            "LONG" => Some(ScalarTy::Long),
            "SINGLE" => Some(ScalarTy::Single),
            "DOUBLE" => Some(ScalarTy::Double),
            "STRING" => Some(ScalarTy::Str),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarTy::Integer => "INTEGER",
            ScalarTy::Long => "LONG",
            ScalarTy::Single => "SINGLE",
            ScalarTy::Double => "DOUBLE",
            ScalarTy::Str => "STRING",
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            ScalarTy::Integer => Value::Integer(0),
            ScalarTy::Long => Value::Long(0),
            ScalarTy::Single => Value::Single(0.0),
            ScalarTy::Double => Value::Double(0.0),
            ScalarTy::Str => Value::Str(String::new()),
        }
    }

    pub fn is_numeric(self) -> bool {
        self != ScalarTy::Str
    }

    /// Copy a value into this type, widening or narrowing numerics and
    /// rejecting string↔numeric crossings.
    pub fn coerce(self, v: Value) -> Result<Value, ValueError> {
        match self {
            ScalarTy::Integer => Ok(Value::Integer(v.as_i64()? as i32)),
            ScalarTy::Long => Ok(Value::Long(v.as_i64()?)),
            ScalarTy::Single => Ok(Value::Single(v.as_f64()? as f32)),
            ScalarTy::Double => Ok(Value::Double(v.as_f64()?)),
            ScalarTy::Str => match v {
                Value::Str(s) => Ok(Value::Str(s)),
                other => Err(ValueError::mismatch("STRING", &other)),
            },
        }
    }
}

/// A user-defined record type: ordered fields, unique names, scalar-typed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTy {
    pub name: String,
    pub fields: Vec<(String, ScalarTy)>,
}

impl RecordTy {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(f, _)| f == name)
    }
}

#[derive(Debug, Clone)]
pub enum Type {
    Scalar(ScalarTy),
    Record(Rc<RecordTy>),
}

impl Type {
    pub fn default_value(&self) -> Value {
        match self {
            Type::Scalar(s) => s.default_value(),
            Type::Record(rt) => RecordVal::instance(rt.clone()),
        }
    }

    /// Deep-copy `v` into this type's representation.
    pub fn coerce(&self, v: Value) -> Result<Value, ValueError> {
        match self {
            Type::Scalar(s) => s.coerce(v),
            Type::Record(rt) => match v {
                Value::Record(src) if src.ty.name == rt.name => {
                    let fields = src
                        .fields
                        .iter()
                        .map(|c| Rc::new(RefCell::new(c.borrow().clone())))
                        .collect();
                    Ok(Value::Record(Rc::new(RecordVal { ty: rt.clone(), fields })))
                }
                other => Err(ValueError::mismatch(&rt.name, &other)),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Type::Scalar(s) => s.name(),
            Type::Record(rt) => &rt.name,
        }
    }
}

/// An instance of a user-defined record: one cell per field.
#[derive(Debug)]
pub struct RecordVal {
    pub ty: Rc<RecordTy>,
    pub fields: Vec<Cell>,
}

impl RecordVal {
    pub fn instance(ty: Rc<RecordTy>) -> Value {
        let fields = ty
            .fields
            .iter()
            .map(|(_, fty)| Rc::new(RefCell::new(fty.default_value())))
            .collect();
        Value::Record(Rc::new(RecordVal { ty, fields }))
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i32),
    Long(i64),
    Single(f32),
    Double(f64),
    Str(String),
    Record(Rc<RecordVal>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    TypeMismatch(String),
    DivisionByZero,
    Subscript(String),
}

impl ValueError {
    fn mismatch(wanted: &str, got: &Value) -> ValueError {
        ValueError::TypeMismatch(format!("expected {}, found {}", wanted, got.type_name()))
    }

    pub fn into_runtime(self) -> RuntimeError {
        match self {
            ValueError::TypeMismatch(m) => RuntimeError::new(Trap::IoError, m),
            ValueError::DivisionByZero => RuntimeError::new(Trap::DivisionByZero, "division by zero"),
            ValueError::Subscript(m) => RuntimeError::new(Trap::IoError, m),
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Long(_) => "LONG",
            Value::Single(_) => "SINGLE",
            Value::Double(_) => "DOUBLE",
            Value::Str(_) => "STRING",
            Value::Record(r) => &r.ty.name,
        }
    }

    /// The BASIC boolean convention: TRUE is −1, FALSE is 0.
    pub fn truth(b: bool) -> Value {
        Value::Integer(if b { -1 } else { 0 })
    }

    pub fn is_truthy(&self) -> Result<bool, ValueError> {
        Ok(self.as_f64()? != 0.0)
    }

    pub fn as_f64(&self) -> Result<f64, ValueError> {
        match self {
            Value::Integer(n) => Ok(*n as f64),
            Value::Long(n) => Ok(*n as f64),
            Value::Single(n) => Ok(*n as f64),
            Value::Double(n) => Ok(*n),
            other => Err(ValueError::mismatch("a number", other)),
        }
    }

    pub fn as_i64(&self) -> Result<i64, ValueError> {
        match self {
            Value::Integer(n) => Ok(*n as i64),
            Value::Long(n) => Ok(*n),
            Value::Single(n) => Ok(n.round() as i64),
            Value::Double(n) => Ok(n.round() as i64),
            other => Err(ValueError::mismatch("a number", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ValueError::mismatch("STRING", other)),
        }
    }

    fn widen(lhs: &Value, rhs: &Value) -> Option<ScalarTy> {
        let rank = |v: &Value| match v {
            Value::Integer(_) => Some(0),
            Value::Long(_) => Some(1),
            Value::Single(_) => Some(2),
            Value::Double(_) => Some(3),
            _ => None,
        };
        let (a, b) = (rank(lhs)?, rank(rhs)?);
        Some(match a.max(b) {
            0 => ScalarTy::Integer,
            1 => ScalarTy::Long,
            2 => ScalarTy::Single,
            _ => ScalarTy::Double,
        })
    }

    fn numeric(lhs: &Value, rhs: &Value, op: &str) -> Result<ScalarTy, ValueError> {
        Value::widen(lhs, rhs)
            .ok_or_else(|| ValueError::TypeMismatch(format!("{} needs numeric operands", op)))
    }

    pub fn neg(v: Value) -> Result<Value, ValueError> {
        match v {
            Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
            Value::Long(n) => Ok(Value::Long(n.wrapping_neg())),
            Value::Single(n) => Ok(Value::Single(-n)),
            Value::Double(n) => Ok(Value::Double(-n)),
            other => Err(ValueError::mismatch("a number", &other)),
        }
    }

    pub fn add(lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        if let (Value::Str(l), Value::Str(r)) = (&lhs, &rhs) {
            return Ok(Value::Str(format!("{}{}", l, r)));
        }
        match Value::numeric(&lhs, &rhs, "+")? {
            ScalarTy::Integer => {
                Ok(Value::Integer((lhs.as_i64()? as i32).wrapping_add(rhs.as_i64()? as i32)))
            }
            ScalarTy::Long => Ok(Value::Long(lhs.as_i64()?.wrapping_add(rhs.as_i64()?))),
            ScalarTy::Single => Ok(Value::Single((lhs.as_f64()? + rhs.as_f64()?) as f32)),
            _ => Ok(Value::Double(lhs.as_f64()? + rhs.as_f64()?)),
        }
    }

    pub fn sub(lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        match Value::numeric(&lhs, &rhs, "-")? {
            ScalarTy::Integer => {
                Ok(Value::Integer((lhs.as_i64()? as i32).wrapping_sub(rhs.as_i64()? as i32)))
            }
            ScalarTy::Long => Ok(Value::Long(lhs.as_i64()?.wrapping_sub(rhs.as_i64()?))),
            ScalarTy::Single => Ok(Value::Single((lhs.as_f64()? - rhs.as_f64()?) as f32)),
            _ => Ok(Value::Double(lhs.as_f64()? - rhs.as_f64()?)),
        }
    }

    pub fn mul(lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        match Value::numeric(&lhs, &rhs, "*")? {
            ScalarTy::Integer => {
                Ok(Value::Integer((lhs.as_i64()? as i32).wrapping_mul(rhs.as_i64()? as i32)))
            }
            ScalarTy::Long => Ok(Value::Long(lhs.as_i64()?.wrapping_mul(rhs.as_i64()?))),
            ScalarTy::Single => Ok(Value::Single((lhs.as_f64()? * rhs.as_f64()?) as f32)),
            _ => Ok(Value::Double(lhs.as_f64()? * rhs.as_f64()?)),
        }
    }

    /// `/` always divides in floating point, as the dialect does.
    pub fn div(lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        let wide = Value::numeric(&lhs, &rhs, "/")?;
        let r = rhs.as_f64()?;
        if r == 0.0 {
            return Err(ValueError::DivisionByZero);
        }
        let q = lhs.as_f64()? / r;
        if wide == ScalarTy::Double {
            Ok(Value::Double(q))
        } else {
            Ok(Value::Single(q as f32))
        }
    }

    pub fn modulo(lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        Value::numeric(&lhs, &rhs, "MOD")?;
        let r = rhs.as_i64()?;
        if r == 0 {
            return Err(ValueError::DivisionByZero);
        }
        Ok(Value::Long(lhs.as_i64()? % r).shrink())
    }

    pub fn pow(lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        let wide = Value::numeric(&lhs, &rhs, "^")?;
        let p = lhs.as_f64()?.powf(rhs.as_f64()?);
        if wide == ScalarTy::Double {
            Ok(Value::Double(p))
        } else {
            Ok(Value::Single(p as f32))
        }
    }

    /// Fold a LONG back to INTEGER when it fits; keeps MOD and the bitwise
    /// operators in the narrow type BASIC programs expect.
    fn shrink(self) -> Value {
        match self {
            Value::Long(n) if n >= i32::MIN as i64 && n <= i32::MAX as i64 => {
                Value::Integer(n as i32)
            }
            other => other,
        }
    }

    pub fn bit_and(lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        Ok(Value::Long(lhs.as_i64()? & rhs.as_i64()?).shrink())
    }

    pub fn bit_or(lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        Ok(Value::Long(lhs.as_i64()? | rhs.as_i64()?).shrink())
    }

    pub fn bit_not(v: Value) -> Result<Value, ValueError> {
        Ok(Value::Long(!v.as_i64()?).shrink())
    }

    /// Value comparison: numerics compare across widths, strings compare
    /// as text, and the two never mix.
    pub fn cmp_val(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering, ValueError> {
        match (lhs, rhs) {
            (Value::Str(l), Value::Str(r)) => Ok(l.cmp(r)),
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Err(ValueError::TypeMismatch("cannot compare STRING with a number".into()))
            }
            _ => Ok(lhs
                .as_f64()?
                .partial_cmp(&rhs.as_f64()?)
                .unwrap_or(std::cmp::Ordering::Equal)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            Value::Single(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Record(r) => write!(f, "<{}>", r.ty.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_add() {
        let v = Value::add(Value::Integer(1), Value::Single(2.5)).unwrap();
        assert!(matches!(v, Value::Single(n) if n == 3.5));
        let v = Value::add(Value::Integer(1), Value::Integer(2)).unwrap();
        assert!(matches!(v, Value::Integer(3)));
    }

    #[test]
    fn string_concat_and_mismatch() {
        let v = Value::add(Value::Str("AB".into()), Value::Str("CD".into())).unwrap();
        assert!(matches!(v, Value::Str(ref s) if s == "ABCD"));
        assert!(Value::add(Value::Str("A".into()), Value::Integer(1)).is_err());
    }

    #[test]
    fn division_traps_on_zero() {
        assert!(matches!(
            Value::div(Value::Integer(10), Value::Integer(0)),
            Err(ValueError::DivisionByZero)
        ));
        assert!(matches!(
            Value::modulo(Value::Integer(10), Value::Integer(0)),
            Err(ValueError::DivisionByZero)
        ));
    }

    #[test]
    fn division_is_floating() {
        let v = Value::div(Value::Integer(10), Value::Integer(4)).unwrap();
        assert!(matches!(v, Value::Single(n) if n == 2.5));
    }

    #[test]
    fn boolean_convention() {
        assert!(matches!(Value::truth(true), Value::Integer(-1)));
        assert!(matches!(Value::truth(false), Value::Integer(0)));
        assert!(matches!(Value::bit_not(Value::Integer(0)).unwrap(), Value::Integer(-1)));
        assert!(matches!(Value::bit_not(Value::Integer(-1)).unwrap(), Value::Integer(0)));
    }

    #[test]
    fn coercion_between_numeric_types() {
        assert!(matches!(ScalarTy::Integer.coerce(Value::Single(2.6)).unwrap(), Value::Integer(3)));
        assert!(matches!(ScalarTy::Double.coerce(Value::Integer(2)).unwrap(), Value::Double(n) if n == 2.0));
        assert!(ScalarTy::Integer.coerce(Value::Str("x".into())).is_err());
        assert!(ScalarTy::Str.coerce(Value::Integer(1)).is_err());
    }

    #[test]
    fn record_copy_is_deep() {
        let ty = Rc::new(RecordTy {
            name: "POINT".into(),
            fields: vec![("X".into(), ScalarTy::Single), ("Y".into(), ScalarTy::Single)],
        });
        let a = RecordVal::instance(ty.clone());
        if let Value::Record(inst) = &a {
            *inst.fields[0].borrow_mut() = Value::Single(5.0);
        }
        let b = Type::Record(ty).coerce(a.clone()).unwrap();
        if let (Value::Record(ia), Value::Record(ib)) = (&a, &b) {
            *ia.fields[0].borrow_mut() = Value::Single(9.0);
            assert!(matches!(*ib.fields[0].borrow(), Value::Single(n) if n == 5.0));
        } else {
            panic!("expected records");
        }
    }
}
