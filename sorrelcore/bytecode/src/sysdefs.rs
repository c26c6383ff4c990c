//! Declared signatures for every system routine.
//!
//! The table lives here, not in the VM, so the code generator can verify
//! each call's argument types and arity at compile time. Variadic routines
//! receive the actual argument count pushed last on the stack.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::value::ScalarTy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysArg {
    Num,
    Str,
    Any,
}

impl SysArg {
    pub fn accepts(self, ty: ScalarTy) -> bool {
        match self {
            SysArg::Any => true,
            SysArg::Num => ty.is_numeric(),
            SysArg::Str => ty == ScalarTy::Str,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysKind {
    Function(ScalarTy),
    Sub,
}

#[derive(Debug, Clone)]
pub struct SysSig {
    pub name: &'static str,
    pub kind: SysKind,
    /// Declared argument types; variadic extras check against the last.
    pub args: &'static [SysArg],
    pub min_args: usize,
    pub variadic: bool,
}

impl SysSig {
    pub fn ret(&self) -> Option<ScalarTy> {
        match self.kind {
            SysKind::Function(ty) => Some(ty),
            SysKind::Sub => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SysKind::Function(_))
    }

    pub fn arg_at(&self, i: usize) -> SysArg {
        self.args.get(i).copied().or_else(|| self.args.last().copied()).unwrap_or(SysArg::Any)
    }
}

use SysArg::{Any, Num, Str};
use SysKind::{Function, Sub};

const TABLE: &[SysSig] = &[
    // Numeric functions.
    SysSig { name: "RND", kind: Function(ScalarTy::Single), args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "INT", kind: Function(ScalarTy::Double), args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "VAL", kind: Function(ScalarTy::Double), args: &[Str], min_args: 1, variadic: false },
    SysSig { name: "TIMER", kind: Function(ScalarTy::Single), args: &[], min_args: 0, variadic: false },
    SysSig { name: "PEEK", kind: Function(ScalarTy::Integer), args: &[Num], min_args: 1, variadic: false },
    // String functions.
    SysSig { name: "CHR$", kind: Function(ScalarTy::Str), args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "STR$", kind: Function(ScalarTy::Str), args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "SPACE$", kind: Function(ScalarTy::Str), args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "LEN", kind: Function(ScalarTy::Integer), args: &[Str], min_args: 1, variadic: false },
    SysSig { name: "LEFT$", kind: Function(ScalarTy::Str), args: &[Str, Num], min_args: 2, variadic: false },
    SysSig { name: "RIGHT$", kind: Function(ScalarTy::Str), args: &[Str, Num], min_args: 2, variadic: false },
    SysSig { name: "MID$", kind: Function(ScalarTy::Str), args: &[Str, Num, Num], min_args: 2, variadic: true },
    SysSig { name: "LCASE$", kind: Function(ScalarTy::Str), args: &[Str], min_args: 1, variadic: false },
    SysSig { name: "UCASE$", kind: Function(ScalarTy::Str), args: &[Str], min_args: 1, variadic: false },
    SysSig { name: "INKEY$", kind: Function(ScalarTy::Str), args: &[], min_args: 0, variadic: false },
    // Console subroutines.
    SysSig { name: "CLS", kind: Sub, args: &[], min_args: 0, variadic: false },
    SysSig { name: "LOCATE", kind: Sub, args: &[Num, Num], min_args: 2, variadic: false },
    SysSig { name: "COLOR", kind: Sub, args: &[Num, Num, Num], min_args: 1, variadic: true },
    SysSig { name: "SCREEN", kind: Sub, args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "WIDTH", kind: Sub, args: &[Num, Num], min_args: 2, variadic: false },
    SysSig { name: "INPUT", kind: Sub, args: &[Any], min_args: 1, variadic: false },
    SysSig { name: "READ", kind: Sub, args: &[Any], min_args: 1, variadic: true },
    SysSig { name: "SWAP", kind: Sub, args: &[Any, Any], min_args: 2, variadic: false },
    // Flow subroutines.
    SysSig { name: "SLEEP", kind: Sub, args: &[Num], min_args: 0, variadic: true },
    SysSig { name: "YIELD", kind: Sub, args: &[], min_args: 0, variadic: false },
    SysSig { name: "SYSTEM", kind: Sub, args: &[], min_args: 0, variadic: false },
    SysSig { name: "BEEP", kind: Sub, args: &[], min_args: 0, variadic: false },
    SysSig { name: "RANDOMIZE", kind: Sub, args: &[Num], min_args: 0, variadic: true },
    // Audio.
    SysSig { name: "PLAY", kind: Sub, args: &[Str, Num], min_args: 1, variadic: true },
    SysSig { name: "BGMPLAY", kind: Sub, args: &[Str, Num], min_args: 1, variadic: true },
    SysSig { name: "BGMSTOP", kind: Sub, args: &[], min_args: 0, variadic: false },
    // Sprites.
    SysSig { name: "SPSET", kind: Sub, args: &[Num, Str, Num], min_args: 2, variadic: true },
    SysSig { name: "SPOFS", kind: Sub, args: &[Num, Num, Num], min_args: 3, variadic: false },
    SysSig { name: "SPSCALE", kind: Sub, args: &[Num, Num, Num], min_args: 3, variadic: false },
    SysSig { name: "SPROT", kind: Sub, args: &[Num, Num], min_args: 2, variadic: false },
    SysSig { name: "SPHOME", kind: Sub, args: &[Num, Num, Num], min_args: 3, variadic: false },
    SysSig { name: "SPHIDE", kind: Sub, args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "SPSHOW", kind: Sub, args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "SPANIM", kind: Sub, args: &[Num, Num, Num, Num], min_args: 3, variadic: true },
    SysSig { name: "SPCLR", kind: Sub, args: &[Num], min_args: 1, variadic: false },
    // Files.
    SysSig { name: "OPEN", kind: Sub, args: &[Str, Str, Num], min_args: 3, variadic: false },
    SysSig { name: "CLOSE", kind: Sub, args: &[Num], min_args: 0, variadic: true },
    SysSig { name: "WRITE#", kind: Sub, args: &[Num, Any], min_args: 1, variadic: true },
    SysSig { name: "INPUT#", kind: Sub, args: &[Num, Any], min_args: 2, variadic: true },
    // Internal opcodes exposed as syscalls.
    SysSig { name: "print", kind: Sub, args: &[Any], min_args: 1, variadic: false },
    SysSig { name: "print_comma", kind: Sub, args: &[], min_args: 0, variadic: false },
    SysSig { name: "print_tab", kind: Sub, args: &[Num], min_args: 1, variadic: false },
    SysSig { name: "print_using", kind: Sub, args: &[Any], min_args: 2, variadic: true },
    SysSig { name: "alloc_scalar", kind: Sub, args: &[Str, Str], min_args: 2, variadic: false },
    SysSig { name: "alloc_array", kind: Sub, args: &[Str, Str, Num], min_args: 4, variadic: true },
];

static BY_NAME: Lazy<HashMap<&'static str, &'static SysSig>> =
    Lazy::new(|| TABLE.iter().map(|sig| (sig.name, sig)).collect());

pub fn lookup_syscall(name: &str) -> Option<&'static SysSig> {
    BY_NAME.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functions_declare_returns() {
        assert_eq!(lookup_syscall("CHR$").unwrap().ret(), Some(ScalarTy::Str));
        assert_eq!(lookup_syscall("CLS").unwrap().ret(), None);
        assert!(lookup_syscall("NOPE").is_none());
    }

    #[test]
    fn variadic_extras_check_against_last() {
        let sig = lookup_syscall("MID$").unwrap();
        assert!(sig.variadic);
        assert_eq!(sig.arg_at(2), SysArg::Num);
        assert_eq!(sig.arg_at(9), SysArg::Num);
    }
}
