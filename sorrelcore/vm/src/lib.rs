// SPDX-License-Identifier: MIT

//! Frame-based stack virtual machine with cooperative suspension.
//!
//! The dispatch loop executes `instrs[pc]` until the pc runs off the end.
//! CALL frames carry a fresh variable map; GOSUB frames share the caller's
//! map by reference. SHARED names always resolve in the main frame.
//! Syscalls that await external events park the machine in a suspended
//! state holding a pending descriptor; the host completes it and ticks the
//! machine again.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sorrel_bytecode::{Op, Program, ScalarTy, Type, Value, ValueError, Variable};
use sorrel_common::{RunResult, RuntimeError, Trap};

pub mod device;
mod syscall;

pub use device::{Audio, Console, DeviceReply, FileOpenMode, FileSys, InputReply, MemoryFiles, NullAudio, TestConsole};
pub use syscall::{register_syscalls, Registry, SysFn};

const STACK_LIMIT: usize = 10_000;
const FRAME_LIMIT: usize = 1_000;

/// Default instruction quantum per cooperative tick.
pub const TICK_QUANTUM: usize = 2048;
/// Suggested delay between cooperative ticks, in milliseconds.
pub const TICK_MILLIS: u64 = 50;

/// One operand-stack slot: a plain value or a variable reference.
#[derive(Clone)]
pub enum Slot {
    Val(Value),
    Var(Variable),
}

struct Frame {
    return_pc: usize,
    vars: Rc<RefCell<HashMap<String, Variable>>>,
}

impl Frame {
    fn fresh(return_pc: usize) -> Frame {
        Frame { return_pc, vars: Rc::new(RefCell::new(HashMap::new())) }
    }
}

/// Why the machine is parked.
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    Input,
    Sleep { seconds: Option<f64> },
    Yield,
    Music,
    Sprite,
}

/// Outcome of one cooperative quantum.
#[derive(Debug)]
pub enum Step {
    Continue,
    Suspended,
    Halted,
    Trapped(RuntimeError),
}

pub struct Vm {
    program: Program,
    stack: Vec<Slot>,
    frames: Vec<Frame>,
    pc: usize,
    data_ptr: usize,
    suspended: bool,
    pending: Option<Pending>,
    pending_input: Option<Variable>,
    rng: u64,
    last_random: f32,
    pub(crate) console: Box<dyn Console>,
    pub(crate) audio: Box<dyn Audio>,
    pub(crate) files: Box<dyn FileSys>,
    pub(crate) file_handles: HashMap<i64, u32>,
    registry: Registry,
    error_hook: Option<Box<dyn FnMut(&RuntimeError)>>,
    last_error: Option<RuntimeError>,
}

impl Vm {
    pub fn new(program: Program, mut console: Box<dyn Console>, audio: Box<dyn Audio>, files: Box<dyn FileSys>) -> Vm {
        console.reset(program.test_mode);
        let mut registry = Registry::new();
        register_syscalls(&mut registry);
        Vm {
            program,
            stack: Vec::new(),
            frames: vec![Frame::fresh(0)],
            pc: 0,
            data_ptr: 0,
            suspended: false,
            pending: None,
            pending_input: None,
            rng: 0x5DEECE66D,
            last_random: 0.0,
            console,
            audio,
            files,
            file_handles: HashMap::new(),
            registry,
            error_hook: None,
            last_error: None,
        }
    }

    /// A machine wired to a [`TestConsole`]; returns the captured-output
    /// handle alongside.
    pub fn for_test(program: Program) -> (Vm, Rc<RefCell<String>>) {
        let console = TestConsole::new();
        let out = console.buffer();
        let vm = Vm::new(program, Box::new(console), Box::new(NullAudio), Box::new(MemoryFiles::new()));
        (vm, out)
    }

    /// Register a callback invoked for every runtime error before the
    /// machine suspends on it.
    pub fn on_error(&mut self, hook: Box<dyn FnMut(&RuntimeError)>) {
        self.error_hook = Some(hook);
    }

    /// Halt anything in flight and start over on a new program.
    pub fn reset(&mut self, program: Program) {
        self.program = program;
        self.stack.clear();
        self.frames = vec![Frame::fresh(0)];
        self.pc = 0;
        self.data_ptr = 0;
        self.suspended = false;
        self.pending = None;
        self.pending_input = None;
        self.file_handles.clear();
        self.last_error = None;
        self.console.reset(self.program.test_mode);
    }

    // ---- execution modes --------------------------------------------------

    /// Run to completion. Intended for tests and batch runs; a suspension
    /// that cannot complete immediately is an error here.
    pub fn run(&mut self) -> RunResult<()> {
        while self.pc < self.program.instrs.len() {
            self.exec_one()?;
            if self.suspended {
                return Err(RuntimeError::new(Trap::IoError, "program suspended during a synchronous run"));
            }
        }
        Ok(())
    }

    /// Execute a bounded quantum of instructions and hand control back.
    pub fn step(&mut self, quantum: usize) -> Step {
        if self.suspended {
            return Step::Suspended;
        }
        for _ in 0..quantum {
            if self.pc >= self.program.instrs.len() {
                return Step::Halted;
            }
            match self.exec_one() {
                Ok(()) => {
                    if self.suspended {
                        return Step::Suspended;
                    }
                }
                Err(e) => return Step::Trapped(e),
            }
        }
        Step::Continue
    }

    fn exec_one(&mut self) -> RunResult<()> {
        let instr = self.program.instrs[self.pc].clone();
        self.pc += 1;
        match self.dispatch(&instr.op) {
            Ok(()) => Ok(()),
            Err(e) => {
                let e = e.at(instr.locus);
                self.suspended = true;
                self.last_error = Some(e.clone());
                if let Some(hook) = &mut self.error_hook {
                    hook(&e);
                }
                Err(e)
            }
        }
    }

    // ---- host-side completion --------------------------------------------

    pub fn pending(&self) -> Option<&Pending> {
        self.pending.as_ref()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn last_error(&self) -> Option<&RuntimeError> {
        self.last_error.as_ref()
    }

    /// Deliver the line a suspended INPUT was waiting for.
    pub fn provide_input(&mut self, line: String) {
        if matches!(self.pending, Some(Pending::Input)) {
            if let Some(target) = self.pending_input.take() {
                let _ = syscall::assign_input(&target, &line);
            }
            self.pending = None;
            self.suspended = false;
        }
    }

    /// Wake from any non-input suspension.
    pub fn wake(&mut self) {
        if !matches!(self.pending, Some(Pending::Input)) {
            self.pending = None;
            self.suspended = false;
        }
    }

    // ---- introspection (tests and the CLI driver) -------------------------

    pub fn operand_stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn data_ptr(&self) -> usize {
        self.data_ptr
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    // ---- dispatch ---------------------------------------------------------

    fn dispatch(&mut self, op: &Op) -> RunResult<()> {
        match op {
            Op::PushConst(v) => self.push(Slot::Val(v.clone())),
            Op::PushValue(name) => {
                let var = self.lookup(name);
                match &var {
                    Variable::Scalar { .. } => {
                        let v = var.value().map_err(rt)?;
                        self.push(Slot::Val(v))
                    }
                    Variable::Array(_) => self.push(Slot::Var(var)),
                }
            }
            Op::PushRef(name) => {
                let var = self.lookup(name);
                self.push(Slot::Var(var))
            }
            Op::PopVar(name) => {
                let var = match self.pop()? {
                    Slot::Var(v) => v,
                    Slot::Val(v) => {
                        let ty = self.name_type(name);
                        Variable::scalar_with(ty, v).map_err(rt)?
                    }
                };
                self.bind_local(name, var);
                Ok(())
            }
            Op::PopVal(name) => {
                let v = self.pop_value()?;
                let var = self.lookup(name);
                var.assign(v).map_err(rt)
            }
            Op::Dup => {
                let top = self
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| RuntimeError::new(Trap::StackUnderflow, "operand stack underflow"))?;
                self.push(top)
            }

            Op::Neg => self.unop(Value::neg),
            Op::Not => self.unop(Value::bit_not),
            Op::Pow => self.binop(Value::pow),
            Op::Mul => self.binop(Value::mul),
            Op::Div => self.binop(Value::div),
            Op::Mod => self.binop(Value::modulo),
            Op::Add => self.binop(Value::add),
            Op::Sub => self.binop(Value::sub),
            Op::Eq => self.cmpop(|o| o == std::cmp::Ordering::Equal),
            Op::Ne => self.cmpop(|o| o != std::cmp::Ordering::Equal),
            Op::Lt => self.cmpop(|o| o == std::cmp::Ordering::Less),
            Op::Le => self.cmpop(|o| o != std::cmp::Ordering::Greater),
            Op::Gt => self.cmpop(|o| o == std::cmp::Ordering::Greater),
            Op::Ge => self.cmpop(|o| o != std::cmp::Ordering::Less),
            Op::And => self.binop(Value::bit_and),
            Op::Or => self.binop(Value::bit_or),

            Op::Jmp(a) => {
                self.pc = *a;
                Ok(())
            }
            Op::Bz(a) => {
                let v = self.pop_value()?;
                if !v.is_truthy().map_err(rt)? {
                    self.pc = *a;
                }
                Ok(())
            }
            Op::Bnz(a) => {
                let v = self.pop_value()?;
                if v.is_truthy().map_err(rt)? {
                    self.pc = *a;
                }
                Ok(())
            }
            Op::Call(a) => {
                self.push_frame(Frame::fresh(self.pc))?;
                self.pc = *a;
                Ok(())
            }
            Op::Gosub(a) => {
                let vars = self.frames.last().expect("call stack never empty").vars.clone();
                self.push_frame(Frame { return_pc: self.pc, vars })?;
                self.pc = *a;
                Ok(())
            }
            Op::Ret => {
                if self.frames.len() <= 1 {
                    return Err(RuntimeError::new(Trap::StackUnderflow, "RETURN without GOSUB"));
                }
                let frame = self.frames.pop().expect("checked depth above");
                self.pc = frame.return_pc;
                Ok(())
            }
            Op::ForLoop(a) => self.forloop(*a),

            Op::ArrayDeref(want_ref) => self.array_deref(*want_ref),
            Op::MemberDeref(field) => self.member(field, true),
            Op::MemberValue(field) => self.member(field, false),
            Op::Assign => {
                let target = self.pop_var()?;
                let v = self.pop_value()?;
                target.assign(v).map_err(rt)
            }

            Op::RestoreData(k) => {
                self.data_ptr = *k;
                Ok(())
            }
            Op::Syscall(name) => self.syscall(name),
        }
    }

    fn syscall(&mut self, name: &str) -> RunResult<()> {
        match self.registry.lookup(name) {
            Some(f) => f(self),
            None => Err(RuntimeError::new(Trap::UnknownSyscall, format!("unknown syscall {}", name))),
        }
    }

    // ---- stack helpers ----------------------------------------------------

    pub(crate) fn push(&mut self, slot: Slot) -> RunResult<()> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(RuntimeError::new(Trap::StackOverflow, "operand stack overflow"));
        }
        self.stack.push(slot);
        Ok(())
    }

    pub(crate) fn push_value(&mut self, v: Value) -> RunResult<()> {
        self.push(Slot::Val(v))
    }

    pub(crate) fn pop(&mut self) -> RunResult<Slot> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::new(Trap::StackUnderflow, "operand stack underflow"))
    }

    pub(crate) fn pop_value(&mut self) -> RunResult<Value> {
        match self.pop()? {
            Slot::Val(v) => Ok(v),
            Slot::Var(var) => var.value().map_err(rt),
        }
    }

    pub(crate) fn pop_var(&mut self) -> RunResult<Variable> {
        match self.pop()? {
            Slot::Var(v) => Ok(v),
            Slot::Val(v) => Err(RuntimeError::new(
                Trap::IoError,
                format!("expected a variable reference, found {}", v.type_name()),
            )),
        }
    }

    pub(crate) fn pop_i64(&mut self) -> RunResult<i64> {
        self.pop_value()?.as_i64().map_err(rt)
    }

    pub(crate) fn pop_f64(&mut self) -> RunResult<f64> {
        self.pop_value()?.as_f64().map_err(rt)
    }

    pub(crate) fn pop_str(&mut self) -> RunResult<String> {
        let v = self.pop_value()?;
        v.as_str().map(str::to_string).map_err(rt)
    }

    /// Pop a variadic call's argument count, pushed last by the compiler.
    pub(crate) fn pop_count(&mut self) -> RunResult<usize> {
        Ok(self.pop_i64()?.max(0) as usize)
    }

    /// Pop `n` values, restoring push order.
    pub(crate) fn pop_values(&mut self, n: usize) -> RunResult<Vec<Value>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.pop_value()?);
        }
        out.reverse();
        Ok(out)
    }

    fn unop(&mut self, f: fn(Value) -> Result<Value, ValueError>) -> RunResult<()> {
        let v = self.pop_value()?;
        self.push_value(f(v).map_err(rt)?)
    }

    fn binop(&mut self, f: fn(Value, Value) -> Result<Value, ValueError>) -> RunResult<()> {
        let rhs = self.pop_value()?;
        let lhs = self.pop_value()?;
        self.push_value(f(lhs, rhs).map_err(rt)?)
    }

    fn cmpop(&mut self, f: fn(std::cmp::Ordering) -> bool) -> RunResult<()> {
        let rhs = self.pop_value()?;
        let lhs = self.pop_value()?;
        let ord = Value::cmp_val(&lhs, &rhs).map_err(rt)?;
        self.push_value(Value::truth(f(ord)))
    }

    // ---- frames and variables --------------------------------------------

    fn push_frame(&mut self, frame: Frame) -> RunResult<()> {
        if self.frames.len() >= FRAME_LIMIT {
            return Err(RuntimeError::new(Trap::StackOverflow, "call stack overflow"));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn name_type(&self, name: &str) -> Type {
        Type::Scalar(ScalarTy::from_sigil(name).unwrap_or(self.program.default_ty))
    }

    /// Resolve a name: the shared set binds to the main frame, everything
    /// else to the current frame. Unbound names spring into existence as
    /// scalars of their sigil-derived type.
    fn lookup(&mut self, name: &str) -> Variable {
        let idx = if self.program.shared.contains(name) { 0 } else { self.frames.len() - 1 };
        let vars = self.frames[idx].vars.clone();
        let mut map = vars.borrow_mut();
        if let Some(v) = map.get(name) {
            return v.clone();
        }
        let var = Variable::scalar(self.name_type(name));
        map.insert(name.to_string(), var.clone());
        var
    }

    /// Parameter binding is strictly local to the current frame; a param
    /// never rebinds a shared cell in the main frame.
    fn bind_local(&mut self, name: &str, var: Variable) {
        let frame = self.frames.last().expect("call stack never empty");
        frame.vars.borrow_mut().insert(name.to_string(), var);
    }

    /// Bind through the shared set; used by the alloc syscalls.
    pub(crate) fn bind(&mut self, name: &str, var: Variable) {
        let idx = if self.program.shared.contains(name) { 0 } else { self.frames.len() - 1 };
        self.frames[idx].vars.borrow_mut().insert(name.to_string(), var);
    }

    pub(crate) fn resolve_type(&self, name: &str) -> RunResult<Type> {
        if let Some(ty) = ScalarTy::from_name(name) {
            return Ok(Type::Scalar(ty));
        }
        match self.program.types.get(name) {
            Some(rt) => Ok(Type::Record(rt.clone())),
            None => Err(RuntimeError::new(Trap::IoError, format!("unknown type {}", name))),
        }
    }

    // ---- aggregate and loop instructions ----------------------------------

    fn array_deref(&mut self, want_ref: bool) -> RunResult<()> {
        let var = self.pop_var()?;
        let arr = match var {
            Variable::Array(a) => a,
            Variable::Scalar { .. } => {
                return Err(RuntimeError::new(Trap::IoError, "subscripted variable is not an array"))
            }
        };
        let mut idxs = Vec::with_capacity(arr.dims.len());
        for _ in 0..arr.dims.len() {
            idxs.push(self.pop_i64()?);
        }
        idxs.reverse();
        let cell = arr.cell(&idxs).map_err(rt)?;
        if want_ref {
            self.push(Slot::Var(Variable::Scalar { ty: arr.elem.clone(), cell }))
        } else {
            let v = cell.borrow().clone();
            self.push_value(v)
        }
    }

    fn member(&mut self, field: &str, want_ref: bool) -> RunResult<()> {
        let v = match self.pop()? {
            Slot::Var(var) => var.value().map_err(rt)?,
            Slot::Val(v) => v,
        };
        let inst = match v {
            Value::Record(inst) => inst,
            other => {
                return Err(RuntimeError::new(
                    Trap::IoError,
                    format!("{} has no member {}", other.type_name(), field),
                ))
            }
        };
        let idx = inst.ty.field_index(field).ok_or_else(|| {
            RuntimeError::new(Trap::IoError, format!("no field {} in {}", field, inst.ty.name))
        })?;
        let fty = inst.ty.fields[idx].1;
        let cell = inst.fields[idx].clone();
        if want_ref {
            self.push(Slot::Var(Variable::Scalar { ty: Type::Scalar(fty), cell }))
        } else {
            let v = cell.borrow().clone();
            self.push_value(v)
        }
    }

    /// The controlled FOR loop. Stack on entry: … end step counter. While
    /// the loop continues only the counter is popped; on termination all
    /// three go and control transfers past the loop.
    fn forloop(&mut self, end_addr: usize) -> RunResult<()> {
        let n = self.stack.len();
        if n < 3 {
            return Err(RuntimeError::new(Trap::StackUnderflow, "FOR loop state missing"));
        }
        let counter = self.slot_value(n - 1)?.as_f64().map_err(rt)?;
        let step = self.slot_value(n - 2)?.as_f64().map_err(rt)?;
        let end = self.slot_value(n - 3)?.as_f64().map_err(rt)?;
        let done = (step > 0.0 && counter > end) || (step < 0.0 && counter < end);
        if done {
            self.stack.truncate(n - 3);
            self.pc = end_addr;
        } else {
            self.stack.truncate(n - 1);
        }
        Ok(())
    }

    fn slot_value(&self, idx: usize) -> RunResult<Value> {
        match &self.stack[idx] {
            Slot::Val(v) => Ok(v.clone()),
            Slot::Var(var) => var.value().map_err(rt),
        }
    }

    // ---- state reached by syscall bodies ----------------------------------

    pub(crate) fn test_mode(&self) -> bool {
        self.program.test_mode
    }

    pub(crate) fn suspend(&mut self, pending: Pending) {
        self.pending = Some(pending);
        self.suspended = true;
    }

    pub(crate) fn suspend_input(&mut self, target: Variable) {
        self.pending_input = Some(target);
        self.suspend(Pending::Input);
    }

    pub(crate) fn halt(&mut self) {
        self.pc = self.program.instrs.len();
    }

    pub(crate) fn read_data(&mut self) -> RunResult<Option<Value>> {
        if self.data_ptr >= self.program.data.len() {
            return Err(RuntimeError::new(Trap::IoError, "out of DATA"));
        }
        let item = self.program.data[self.data_ptr].clone();
        self.data_ptr += 1;
        Ok(item)
    }

    pub(crate) fn next_random(&mut self) -> f32 {
        self.rng = self.rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.last_random = ((self.rng >> 33) as f64 / (1u64 << 31) as f64) as f32;
        self.last_random
    }

    pub(crate) fn last_random(&self) -> f32 {
        self.last_random
    }
}

pub(crate) fn rt(e: ValueError) -> RuntimeError {
    e.into_runtime()
}
