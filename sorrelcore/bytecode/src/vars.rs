//! Scalar and array variables as shared cells.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{Cell, Type, Value, ValueError};

/// A bound variable. Scalars carry their declared type so assignment can
/// coerce through it; arrays share one immutable topology with per-element
/// cells. Cloning a `Variable` clones the *binding*, not the storage, so a
/// clone aliases the same cells.
#[derive(Debug, Clone)]
pub enum Variable {
    Scalar { ty: Type, cell: Cell },
    Array(Rc<ArrayVar>),
}

impl Variable {
    pub fn scalar(ty: Type) -> Variable {
        let cell = Rc::new(RefCell::new(ty.default_value()));
        Variable::Scalar { ty, cell }
    }

    pub fn scalar_with(ty: Type, v: Value) -> Result<Variable, ValueError> {
        let v = ty.coerce(v)?;
        Ok(Variable::Scalar { ty, cell: Rc::new(RefCell::new(v)) })
    }

    pub fn value(&self) -> Result<Value, ValueError> {
        match self {
            Variable::Scalar { cell, .. } => Ok(cell.borrow().clone()),
            Variable::Array(a) => {
                Err(ValueError::TypeMismatch(format!("array {} used as a scalar", a.describe())))
            }
        }
    }

    pub fn assign(&self, v: Value) -> Result<(), ValueError> {
        match self {
            Variable::Scalar { ty, cell } => {
                *cell.borrow_mut() = ty.coerce(v)?;
                Ok(())
            }
            Variable::Array(a) => {
                Err(ValueError::TypeMismatch(format!("cannot assign to array {}", a.describe())))
            }
        }
    }
}

/// A statically-dimensioned array: element type, per-dimension inclusive
/// bounds, and a row-major backing store of cells initialized to the
/// element type's default.
#[derive(Debug)]
pub struct ArrayVar {
    pub elem: Type,
    pub dims: Vec<(i64, i64)>,
    cells: Vec<Cell>,
}

impl ArrayVar {
    pub fn new(elem: Type, dims: Vec<(i64, i64)>) -> Result<ArrayVar, ValueError> {
        if dims.is_empty() {
            return Err(ValueError::Subscript("array needs at least one dimension".into()));
        }
        let mut total: usize = 1;
        for (lo, hi) in &dims {
            if lo > hi {
                return Err(ValueError::Subscript(format!("bad bounds {} TO {}", lo, hi)));
            }
            total = total.saturating_mul((hi - lo + 1) as usize);
        }
        let cells = (0..total).map(|_| Rc::new(RefCell::new(elem.default_value()))).collect();
        Ok(ArrayVar { elem, dims, cells })
    }

    /// Resolve an index vector to the element cell, row-major.
    pub fn cell(&self, idxs: &[i64]) -> Result<Cell, ValueError> {
        if idxs.len() != self.dims.len() {
            return Err(ValueError::Subscript(format!(
                "expected {} subscripts, got {}",
                self.dims.len(),
                idxs.len()
            )));
        }
        let mut offset: usize = 0;
        for (idx, (lo, hi)) in idxs.iter().zip(&self.dims) {
            if idx < lo || idx > hi {
                return Err(ValueError::Subscript(format!(
                    "subscript {} out of range {} TO {}",
                    idx, lo, hi
                )));
            }
            let width = (hi - lo + 1) as usize;
            offset = offset * width + (idx - lo) as usize;
        }
        Ok(self.cells[offset].clone())
    }

    pub fn total_len(&self) -> usize {
        self.cells.len()
    }

    fn describe(&self) -> String {
        format!("{}({})", self.elem.name(), self.dims.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarTy;

    #[test]
    fn row_major_offsets_honor_lower_bounds() {
        let a = ArrayVar::new(Type::Scalar(ScalarTy::Integer), vec![(1, 3), (0, 1)]).unwrap();
        assert_eq!(a.total_len(), 6);
        *a.cell(&[2, 1]).unwrap().borrow_mut() = Value::Integer(42);
        assert!(matches!(*a.cell(&[2, 1]).unwrap().borrow(), Value::Integer(42)));
        assert!(matches!(*a.cell(&[1, 0]).unwrap().borrow(), Value::Integer(0)));
    }

    #[test]
    fn out_of_bounds_is_reported() {
        let a = ArrayVar::new(Type::Scalar(ScalarTy::Single), vec![(1, 3)]).unwrap();
        assert!(a.cell(&[0]).is_err());
        assert!(a.cell(&[4]).is_err());
        assert!(a.cell(&[1, 1]).is_err());
    }

    #[test]
    fn cloned_binding_aliases_storage() {
        let v = Variable::scalar(Type::Scalar(ScalarTy::Integer));
        let alias = v.clone();
        v.assign(Value::Integer(7)).unwrap();
        assert!(matches!(alias.value().unwrap(), Value::Integer(7)));
    }
}
