//! The compiled program: the only object exchanged between the code
//! generator and the virtual machine. Immutable once built.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::instr::Instr;
use crate::value::{RecordTy, ScalarTy, Value};

#[derive(Debug)]
pub struct Program {
    pub instrs: Vec<Instr>,
    /// User-defined record types by name.
    pub types: HashMap<String, Rc<RecordTy>>,
    /// Names whose binding lives in the main frame, visible everywhere.
    pub shared: HashSet<String>,
    /// Literals pooled from DATA statements in source order; `None` marks
    /// an empty slot from `DATA ,,`.
    pub data: Vec<Option<Value>>,
    /// Scalar type for undeclared identifiers without a sigil.
    pub default_ty: ScalarTy,
    pub test_mode: bool,
}

impl Program {
    /// Render an instruction listing, one address per line.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (addr, instr) in self.instrs.iter().enumerate() {
            out.push_str(&format!("{:5}  {}\n", addr, instr));
        }
        out
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.listing())
    }
}
