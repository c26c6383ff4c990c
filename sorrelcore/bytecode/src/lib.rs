//! Value model, instruction set, and compiled-program object shared by the
//! compiler and the virtual machine.

mod instr;
mod program;
mod sysdefs;
mod value;
mod vars;

pub use instr::{Address, Instr, Op};
pub use program::Program;
pub use sysdefs::{lookup_syscall, SysArg, SysKind, SysSig};
pub use value::{Cell, RecordTy, RecordVal, ScalarTy, Type, Value, ValueError};
pub use vars::{ArrayVar, Variable};
