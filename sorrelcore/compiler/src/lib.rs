// SPDX-License-Identifier: MIT

//! AST → bytecode code generator.
//!
//! Two passes. The first collects declarations: DECLAREd and defined
//! routines, TYPE definitions, SHARED names, DIMmed arrays, and the DATA
//! pool (in source order, with every bare name marked as a potential
//! RESTORE label). The second lowers statements to instructions, emitting
//! forward branches against symbolic labels that a final link pass
//! substitutes with instruction addresses.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use sorrel_ast as ast;
use sorrel_ast::{BinOp, DataConst, Expr, ExprKind, LoopCond, Param, PrintItem, RoutineKind, Stmt, StmtKind, UnOp};
use sorrel_bytecode::{
    lookup_syscall, Address, Instr, Op, Program, RecordTy, ScalarTy, SysSig, Value,
};
use sorrel_common::{CompileError, Locus};

pub mod service;

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub test_mode: bool,
}

pub fn compile(program: &ast::Program) -> Result<Program, Vec<CompileError>> {
    compile_with(program, Options::default())
}

pub fn compile_with(program: &ast::Program, opts: Options) -> Result<Program, Vec<CompileError>> {
    let mut cg = Cg::new(opts);
    cg.collect(program);
    cg.emit_program(program);
    cg.finish()
}

type Symbol = usize;

#[derive(Clone)]
struct Routine {
    kind: RoutineKind,
    params: Vec<Param>,
    sym: Symbol,
    defined: bool,
}

struct Cg {
    instrs: Vec<Instr>,
    types: HashMap<String, Rc<RecordTy>>,
    shared: HashSet<String>,
    data: Vec<Option<Value>>,
    data_marks: HashMap<String, usize>,
    routines: HashMap<String, Routine>,
    arrays: HashSet<String>,
    labels: HashMap<String, Symbol>,
    sym_names: HashMap<Symbol, String>,
    next_sym: Symbol,
    sym_addr: HashMap<Symbol, Address>,
    unlinked: Vec<(Address, Symbol, Locus)>,
    errors: Vec<CompileError>,
    opts: Options,
}

impl Cg {
    fn new(opts: Options) -> Self {
        Self {
            instrs: Vec::new(),
            types: HashMap::new(),
            shared: HashSet::new(),
            data: Vec::new(),
            data_marks: HashMap::new(),
            routines: HashMap::new(),
            arrays: HashSet::new(),
            labels: HashMap::new(),
            sym_names: HashMap::new(),
            next_sym: 0,
            sym_addr: HashMap::new(),
            unlinked: Vec::new(),
            errors: Vec::new(),
            opts,
        }
    }

    fn error(&mut self, message: impl Into<String>, locus: Locus) {
        self.errors.push(CompileError::new(message, locus));
    }

    fn new_sym(&mut self) -> Symbol {
        let s = self.next_sym;
        self.next_sym += 1;
        s
    }

    fn define(&mut self, sym: Symbol) {
        self.sym_addr.insert(sym, self.instrs.len());
    }

    fn label_sym(&mut self, name: &str) -> Symbol {
        if let Some(s) = self.labels.get(name) {
            return *s;
        }
        let s = self.new_sym();
        self.labels.insert(name.to_string(), s);
        self.sym_names.insert(s, name.to_string());
        s
    }

    fn emit(&mut self, op: Op, locus: Locus) {
        self.instrs.push(Instr::new(op, locus));
    }

    /// Emit a branching instruction against a symbolic target; the link
    /// pass fills in the real address.
    fn emit_branch(&mut self, op: Op, sym: Symbol, locus: Locus) {
        self.unlinked.push((self.instrs.len(), sym, locus));
        self.instrs.push(Instr::new(op, locus));
    }

    // ---- pass 1: declarations --------------------------------------------

    fn collect(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Routine { kind, name, params, body } => {
                    self.register_routine(*kind, name, params, true, stmt.locus);
                    self.collect(body);
                }
                StmtKind::Declare { kind, name, params } => {
                    self.register_routine(*kind, name, params, false, stmt.locus);
                }
                StmtKind::TypeDef { name, fields } => {
                    self.register_type(name, fields, stmt.locus);
                }
                StmtKind::Dim { shared, vars } => {
                    for v in vars {
                        if *shared {
                            self.shared.insert(v.name.clone());
                        }
                        if !v.bounds.is_empty() {
                            self.arrays.insert(v.name.clone());
                        }
                    }
                }
                StmtKind::Data(items) => {
                    for item in items {
                        self.data.push(item.as_ref().map(|c| match c {
                            DataConst::Int(v) => int_value(*v),
                            DataConst::Float(v) => Value::Double(*v),
                            DataConst::Str(s) => Value::Str(s.clone()),
                        }));
                    }
                }
                StmtKind::Call { name, args } if args.is_empty() => {
                    // Potential RESTORE label: remember where the DATA
                    // pool stood when this name appeared.
                    self.data_marks.entry(name.clone()).or_insert(self.data.len());
                }
                StmtKind::If { arms, else_body } => {
                    for (_, body) in arms {
                        self.collect(body);
                    }
                    self.collect(else_body);
                }
                StmtKind::For { body, .. }
                | StmtKind::DoLoop { body, .. }
                | StmtKind::While { body, .. } => self.collect(body),
                _ => {}
            }
        }
    }

    fn register_routine(&mut self, kind: RoutineKind, name: &str, params: &[Param], defined: bool, locus: Locus) {
        if let Some(existing) = self.routines.get_mut(name) {
            if defined && existing.defined {
                self.errors.push(CompileError::new(format!("Duplicate definition of {}", name), locus));
            } else if defined {
                existing.defined = true;
                existing.kind = kind;
                existing.params = params.to_vec();
            }
            return;
        }
        let sym = self.new_sym();
        self.sym_names.insert(sym, name.to_string());
        self.routines.insert(name.to_string(), Routine { kind, params: params.to_vec(), sym, defined });
    }

    fn register_type(&mut self, name: &str, fields: &[(String, String)], locus: Locus) {
        if self.types.contains_key(name) {
            self.error(format!("Duplicate TYPE {}", name), locus);
            return;
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (fname, tyname) in fields {
            if !seen.insert(fname.clone()) {
                self.error(format!("Duplicate field {} in TYPE {}", fname, name), locus);
                continue;
            }
            match ScalarTy::from_name(tyname) {
                Some(ty) => out.push((fname.clone(), ty)),
                None => self.error(format!("Unknown type {} in TYPE {}", tyname, name), locus),
            }
        }
        self.types.insert(name.to_string(), Rc::new(RecordTy { name: name.to_string(), fields: out }));
    }

    // ---- pass 2: lowering -------------------------------------------------

    fn emit_program(&mut self, program: &ast::Program) {
        let end_sym = self.new_sym();
        self.sym_names.insert(end_sym, "(end)".to_string());
        for stmt in program {
            if matches!(stmt.kind, StmtKind::Routine { .. }) {
                continue;
            }
            self.emit_stmt(stmt, end_sym);
        }
        // Main falls off the end; routines live past this jump.
        if program.iter().any(|s| matches!(s.kind, StmtKind::Routine { .. })) {
            let locus = self.instrs.last().map(|i| i.locus).unwrap_or_default();
            self.emit_branch(Op::Jmp(0), end_sym, locus);
        }
        for stmt in program {
            if let StmtKind::Routine { kind, name, params, body } = &stmt.kind {
                self.emit_routine(*kind, name, params, body, stmt.locus, end_sym);
            }
        }
        self.define(end_sym);
    }

    fn emit_routine(
        &mut self,
        kind: RoutineKind,
        name: &str,
        params: &[Param],
        body: &[Stmt],
        locus: Locus,
        end_sym: Symbol,
    ) {
        let sym = match self.routines.get(name) {
            Some(rt) => rt.sym,
            None => return,
        };
        self.define(sym);
        // The caller pushed arguments left-to-right; bind them in reverse.
        for p in params.iter().rev() {
            self.emit(Op::PopVar(p.name.as_str().into()), locus);
        }
        for stmt in body {
            self.emit_stmt(stmt, end_sym);
        }
        let end_locus = body.last().map(|s| s.locus).unwrap_or(locus);
        if kind == RoutineKind::Function {
            // The function's result is whatever was assigned to its name.
            self.emit(Op::PushValue(name.into()), end_locus);
        }
        self.emit(Op::Ret, end_locus);
    }

    fn emit_stmt(&mut self, stmt: &Stmt, end_sym: Symbol) {
        let locus = stmt.locus;
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                self.emit_expr(value);
                self.emit_store(target);
            }
            StmtKind::Call { name, args } => self.emit_call_stmt(name, args, locus),
            StmtKind::If { arms, else_body } => {
                let done = self.new_sym();
                for (cond, body) in arms {
                    let next = self.new_sym();
                    self.emit_expr(cond);
                    self.emit_branch(Op::Bz(0), next, cond.locus);
                    for s in body {
                        self.emit_stmt(s, end_sym);
                    }
                    self.emit_branch(Op::Jmp(0), done, locus);
                    self.define(next);
                }
                for s in else_body {
                    self.emit_stmt(s, end_sym);
                }
                self.define(done);
            }
            StmtKind::For { var, from, to, step, body } => {
                self.emit_expr(to);
                match step {
                    Some(e) => self.emit_expr(e),
                    None => self.emit(Op::PushConst(Value::Integer(1)), locus),
                }
                self.emit_expr(from);
                self.emit(Op::PopVal(var.as_str().into()), locus);
                let top = self.new_sym();
                let done = self.new_sym();
                self.define(top);
                self.emit(Op::PushValue(var.as_str().into()), locus);
                self.emit_branch(Op::ForLoop(0), done, locus);
                for s in body {
                    self.emit_stmt(s, end_sym);
                }
                // NEXT: counter += step (the step sits under the stack top).
                self.emit(Op::Dup, locus);
                self.emit(Op::PushValue(var.as_str().into()), locus);
                self.emit(Op::Add, locus);
                self.emit(Op::PopVal(var.as_str().into()), locus);
                self.emit_branch(Op::Jmp(0), top, locus);
                self.define(done);
            }
            StmtKind::DoLoop { pre, post, body } => {
                let top = self.new_sym();
                let done = self.new_sym();
                self.define(top);
                if let Some(cond) = pre {
                    match cond {
                        LoopCond::While(e) => {
                            self.emit_expr(e);
                            self.emit_branch(Op::Bz(0), done, e.locus);
                        }
                        LoopCond::Until(e) => {
                            self.emit_expr(e);
                            self.emit_branch(Op::Bnz(0), done, e.locus);
                        }
                    }
                }
                for s in body {
                    self.emit_stmt(s, end_sym);
                }
                match post {
                    Some(LoopCond::While(e)) => {
                        self.emit_expr(e);
                        self.emit_branch(Op::Bnz(0), top, e.locus);
                    }
                    Some(LoopCond::Until(e)) => {
                        self.emit_expr(e);
                        self.emit_branch(Op::Bz(0), top, e.locus);
                    }
                    None => self.emit_branch(Op::Jmp(0), top, locus),
                }
                self.define(done);
            }
            StmtKind::While { cond, body } => {
                let top = self.new_sym();
                let done = self.new_sym();
                self.define(top);
                self.emit_expr(cond);
                self.emit_branch(Op::Bz(0), done, cond.locus);
                for s in body {
                    self.emit_stmt(s, end_sym);
                }
                self.emit_branch(Op::Jmp(0), top, locus);
                self.define(done);
            }
            StmtKind::Goto(name) => {
                let sym = self.label_sym(name);
                self.emit_branch(Op::Jmp(0), sym, locus);
            }
            StmtKind::Gosub(name) => {
                let sym = self.label_sym(name);
                self.emit_branch(Op::Gosub(0), sym, locus);
            }
            StmtKind::Return => self.emit(Op::Ret, locus),
            StmtKind::End => self.emit_branch(Op::Jmp(0), end_sym, locus),
            StmtKind::Dim { vars, .. } => {
                for v in vars {
                    self.emit_dim(v);
                }
            }
            StmtKind::Declare { .. } | StmtKind::TypeDef { .. } | StmtKind::Data(_) => {}
            StmtKind::Routine { .. } => {
                self.error("SUB and FUNCTION definitions must be at the top level", locus);
            }
            StmtKind::Print { items } => self.emit_print(items, locus),
            StmtKind::PrintUsing { format, args, trailing_semi } => {
                self.emit_expr(format);
                for a in args {
                    self.emit_expr(a);
                }
                let term = if *trailing_semi { ";" } else { "" };
                self.emit(Op::PushConst(Value::Str(term.into())), locus);
                self.emit(Op::PushConst(Value::Integer(args.len() as i32 + 2)), locus);
                self.emit(Op::Syscall("print_using".into()), locus);
            }
            StmtKind::Input { prompt, target } => {
                let text = prompt.clone().unwrap_or_else(|| "? ".to_string());
                self.emit(Op::PushConst(Value::Str(text)), locus);
                self.emit(Op::Syscall("print".into()), locus);
                self.emit_ref(target);
                self.emit(Op::Syscall("INPUT".into()), locus);
            }
            StmtKind::Read(targets) => {
                for t in targets {
                    self.emit_ref(t);
                }
                self.emit(Op::PushConst(Value::Integer(targets.len() as i32)), locus);
                self.emit(Op::Syscall("READ".into()), locus);
            }
            StmtKind::Restore(label) => {
                let k = match label {
                    None => 0,
                    Some(name) => match self.data_marks.get(name) {
                        Some(k) => *k,
                        None => {
                            self.error(format!("Unknown RESTORE label {}", name), locus);
                            0
                        }
                    },
                };
                self.emit(Op::RestoreData(k), locus);
            }
            StmtKind::Open { path, mode, fileno } => {
                self.emit_expr(path);
                self.emit(Op::PushConst(Value::Str(mode.name().into())), locus);
                self.emit_expr(fileno);
                self.emit(Op::Syscall("OPEN".into()), locus);
            }
            StmtKind::Close { fileno } => {
                let count = match fileno {
                    Some(e) => {
                        self.emit_expr(e);
                        1
                    }
                    None => 0,
                };
                self.emit(Op::PushConst(Value::Integer(count)), locus);
                self.emit(Op::Syscall("CLOSE".into()), locus);
            }
            StmtKind::WriteFile { fileno, args } => {
                self.emit_expr(fileno);
                for a in args {
                    self.emit_expr(a);
                }
                self.emit(Op::PushConst(Value::Integer(args.len() as i32 + 1)), locus);
                self.emit(Op::Syscall("WRITE#".into()), locus);
            }
            StmtKind::InputFile { fileno, targets } => {
                self.emit_expr(fileno);
                for t in targets {
                    self.emit_ref(t);
                }
                self.emit(Op::PushConst(Value::Integer(targets.len() as i32 + 1)), locus);
                self.emit(Op::Syscall("INPUT#".into()), locus);
            }
        }
    }

    fn emit_dim(&mut self, v: &ast::DimVar) {
        let locus = v.locus;
        let tyname = match &v.as_type {
            Some(name) => {
                if ScalarTy::from_name(name).is_none() && !self.types.contains_key(name) {
                    self.error(format!("Unknown type {}", name), locus);
                }
                name.clone()
            }
            None => ScalarTy::from_sigil(&v.name).unwrap_or(ScalarTy::Single).name().to_string(),
        };
        self.emit(Op::PushConst(Value::Str(v.name.clone())), locus);
        self.emit(Op::PushConst(Value::Str(tyname)), locus);
        if v.bounds.is_empty() {
            self.emit(Op::Syscall("alloc_scalar".into()), locus);
        } else {
            for (lo, hi) in &v.bounds {
                match lo {
                    Some(e) => self.emit_expr(e),
                    None => self.emit(Op::PushConst(Value::Integer(0)), locus),
                }
                self.emit_expr(hi);
            }
            let count = 2 + 2 * v.bounds.len();
            self.emit(Op::PushConst(Value::Integer(count as i32)), locus);
            self.emit(Op::Syscall("alloc_array".into()), locus);
        }
    }

    fn emit_print(&mut self, items: &[PrintItem], locus: Locus) {
        let n = items.len();
        for (i, item) in items.iter().enumerate() {
            match item {
                PrintItem::Expr(e) => {
                    // TAB(n) is positioning, not a value.
                    if let ExprKind::Call(name, args) = &e.kind {
                        if name == "TAB" && args.len() == 1 && !self.arrays.contains(name) {
                            self.emit_expr(&args[0]);
                            self.emit(Op::Syscall("print_tab".into()), e.locus);
                            continue;
                        }
                    }
                    self.emit_expr(e);
                    self.emit(Op::Syscall("print".into()), e.locus);
                }
                PrintItem::Semi => {
                    if i + 1 < n {
                        self.emit(Op::PushConst(Value::Str(" ".into())), locus);
                        self.emit(Op::Syscall("print".into()), locus);
                    }
                }
                PrintItem::Comma => self.emit(Op::Syscall("print_comma".into()), locus),
            }
        }
        let newline = match items.last() {
            None | Some(PrintItem::Expr(_)) => true,
            Some(PrintItem::Semi) | Some(PrintItem::Comma) => false,
        };
        if newline {
            self.emit(Op::PushConst(Value::Str("\n".into())), locus);
            self.emit(Op::Syscall("print".into()), locus);
        }
    }

    fn emit_call_stmt(&mut self, name: &str, args: &[Expr], locus: Locus) {
        if let Some(rt) = self.routines.get(name).cloned() {
            if rt.kind == RoutineKind::Function {
                self.error(format!("FUNCTION {} used as a statement", name), locus);
                return;
            }
            if args.len() != rt.params.len() {
                self.error(
                    format!("{} expects {} arguments, got {}", name, rt.params.len(), args.len()),
                    locus,
                );
                return;
            }
            for a in args {
                self.emit_arg(a);
            }
            self.emit_branch(Op::Call(0), rt.sym, locus);
            return;
        }
        if let Some(sig) = lookup_syscall(name) {
            if !sig.is_function() {
                self.check_sys_args(sig, args, locus);
                if name == "SWAP" {
                    for a in args {
                        self.emit_ref(a);
                    }
                } else {
                    for a in args {
                        self.emit_expr(a);
                    }
                    if sig.variadic {
                        self.emit(Op::PushConst(Value::Integer(args.len() as i32)), locus);
                    }
                }
                self.emit(Op::Syscall(name.into()), locus);
                return;
            }
        }
        if args.is_empty() {
            // A label definition.
            let sym = self.label_sym(name);
            if self.sym_addr.contains_key(&sym) {
                self.error(format!("Duplicate label {}", name), locus);
                return;
            }
            self.define(sym);
            return;
        }
        self.error(format!("Unknown subroutine {}", name), locus);
    }

    /// Push an argument for a BYREF call: lvalues go by reference,
    /// everything else by value (the callee wraps it in a fresh cell).
    fn emit_arg(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Ident(name) if !self.is_function_name(name) => {
                self.emit(Op::PushRef(name.as_str().into()), e.locus);
            }
            ExprKind::Call(name, _) if self.arrays.contains(name) => self.emit_ref(e),
            ExprKind::Member(..) => self.emit_ref(e),
            _ => self.emit_expr(e),
        }
    }

    fn is_function_name(&self, name: &str) -> bool {
        match self.routines.get(name) {
            Some(rt) => rt.kind == RoutineKind::Function,
            None => lookup_syscall(name).map_or(false, |s| s.is_function()),
        }
    }

    /// Push a reference to an lvalue.
    fn emit_ref(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Ident(name) => self.emit(Op::PushRef(name.as_str().into()), e.locus),
            ExprKind::Call(name, idxs) => {
                if self.routines.contains_key(name) || lookup_syscall(name).is_some() {
                    self.error(format!("{} is not assignable", name), e.locus);
                    return;
                }
                if !self.arrays.contains(name) {
                    self.error(format!("Array {} used without DIM", name), e.locus);
                    return;
                }
                for idx in idxs {
                    self.emit_expr(idx);
                }
                self.emit(Op::PushRef(name.as_str().into()), e.locus);
                self.emit(Op::ArrayDeref(true), e.locus);
            }
            ExprKind::Member(base, field) => {
                self.emit_ref(base);
                self.emit(Op::MemberDeref(field.as_str().into()), e.locus);
            }
            _ => self.error("expected a variable reference", e.locus),
        }
    }

    /// Store the stack top into an lvalue. A plain scalar uses PopVal;
    /// aggregate targets build a reference and Assign through it.
    fn emit_store(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Ident(name) => {
                if self.arrays.contains(name) {
                    self.error(format!("Array {} used as a scalar", name), target.locus);
                    return;
                }
                self.emit(Op::PopVal(name.as_str().into()), target.locus);
            }
            ExprKind::Call(..) | ExprKind::Member(..) => {
                self.emit_ref(target);
                self.emit(Op::Assign, target.locus);
            }
            _ => self.error("cannot assign to this expression", target.locus),
        }
    }

    fn emit_expr(&mut self, e: &Expr) {
        let locus = e.locus;
        match &e.kind {
            ExprKind::Int(v) => self.emit(Op::PushConst(int_value(*v)), locus),
            ExprKind::Float(v) => self.emit(Op::PushConst(Value::Double(*v)), locus),
            ExprKind::Str(s) => self.emit(Op::PushConst(Value::Str(s.clone())), locus),
            ExprKind::Ident(name) => {
                if let Some(rt) = self.routines.get(name).cloned() {
                    if rt.kind == RoutineKind::Function && rt.params.is_empty() {
                        self.emit_branch(Op::Call(0), rt.sym, locus);
                        return;
                    }
                }
                if let Some(sig) = lookup_syscall(name) {
                    if sig.is_function() && sig.min_args == 0 {
                        self.emit(Op::Syscall(name.as_str().into()), locus);
                        return;
                    }
                }
                self.emit(Op::PushValue(name.as_str().into()), locus);
            }
            ExprKind::Call(name, args) => self.emit_call_expr(name, args, locus),
            ExprKind::Member(base, field) => {
                self.emit_ref(base);
                self.emit(Op::MemberValue(field.as_str().into()), locus);
            }
            ExprKind::Unary(UnOp::Neg, inner) => {
                self.emit_expr(inner);
                self.emit(Op::Neg, locus);
            }
            ExprKind::Unary(UnOp::Not, inner) => {
                self.emit_expr(inner);
                self.emit(Op::Not, locus);
            }
            ExprKind::Binary(op, lhs, rhs) => {
                self.emit_expr(lhs);
                self.emit_expr(rhs);
                let instr = match op {
                    BinOp::Pow => Op::Pow,
                    BinOp::Mul => Op::Mul,
                    BinOp::Div => Op::Div,
                    BinOp::Mod => Op::Mod,
                    BinOp::Add => Op::Add,
                    BinOp::Sub => Op::Sub,
                    BinOp::Eq => Op::Eq,
                    BinOp::Ne => Op::Ne,
                    BinOp::Lt => Op::Lt,
                    BinOp::Le => Op::Le,
                    BinOp::Gt => Op::Gt,
                    BinOp::Ge => Op::Ge,
                    BinOp::And => Op::And,
                    BinOp::Or => Op::Or,
                };
                self.emit(instr, locus);
            }
        }
    }

    fn emit_call_expr(&mut self, name: &str, args: &[Expr], locus: Locus) {
        if let Some(rt) = self.routines.get(name).cloned() {
            match rt.kind {
                RoutineKind::Function => {
                    if args.len() != rt.params.len() {
                        self.error(
                            format!("{} expects {} arguments, got {}", name, rt.params.len(), args.len()),
                            locus,
                        );
                        return;
                    }
                    for a in args {
                        self.emit_arg(a);
                    }
                    self.emit_branch(Op::Call(0), rt.sym, locus);
                }
                RoutineKind::Sub => {
                    self.error(format!("SUB {} used in an expression", name), locus);
                }
            }
            return;
        }
        if let Some(sig) = lookup_syscall(name) {
            if sig.is_function() {
                self.check_sys_args(sig, args, locus);
                for a in args {
                    self.emit_expr(a);
                }
                if sig.variadic {
                    self.emit(Op::PushConst(Value::Integer(args.len() as i32)), locus);
                }
                self.emit(Op::Syscall(name.into()), locus);
                return;
            }
        }
        if self.arrays.contains(name) {
            for idx in args {
                self.emit_expr(idx);
            }
            self.emit(Op::PushRef(name.into()), locus);
            self.emit(Op::ArrayDeref(false), locus);
            return;
        }
        self.error(format!("Unknown function or array {}", name), locus);
    }

    /// Verify a system call against its declared signature.
    fn check_sys_args(&mut self, sig: &SysSig, args: &[Expr], locus: Locus) {
        if args.len() < sig.min_args {
            self.error(
                format!("{} expects at least {} arguments, got {}", sig.name, sig.min_args, args.len()),
                locus,
            );
            return;
        }
        let max = if sig.variadic { usize::MAX } else { sig.args.len() };
        if args.len() > max {
            self.error(
                format!("{} expects at most {} arguments, got {}", sig.name, sig.args.len(), args.len()),
                locus,
            );
            return;
        }
        for (i, arg) in args.iter().enumerate() {
            if let Some(ty) = self.infer(arg) {
                if !sig.arg_at(i).accepts(ty) {
                    self.error(
                        format!("argument {} of {} has the wrong type ({})", i + 1, sig.name, ty.name()),
                        arg.locus,
                    );
                }
            }
        }
    }

    /// Best-effort static type of an expression, from literals, sigils,
    /// and declared returns. `None` when unknowable.
    fn infer(&self, e: &Expr) -> Option<ScalarTy> {
        match &e.kind {
            ExprKind::Int(_) => Some(ScalarTy::Integer),
            ExprKind::Float(_) => Some(ScalarTy::Double),
            ExprKind::Str(_) => Some(ScalarTy::Str),
            ExprKind::Ident(name) | ExprKind::Call(name, _) => {
                if let Some(rt) = self.routines.get(name) {
                    if rt.kind == RoutineKind::Function {
                        return ScalarTy::from_sigil(name).or(Some(ScalarTy::Single));
                    }
                    return None;
                }
                if let Some(sig) = lookup_syscall(name) {
                    return sig.ret();
                }
                ScalarTy::from_sigil(name).or(Some(ScalarTy::Single))
            }
            ExprKind::Member(..) => None,
            ExprKind::Unary(UnOp::Neg, inner) => self.infer(inner),
            ExprKind::Unary(UnOp::Not, _) => Some(ScalarTy::Integer),
            ExprKind::Binary(op, lhs, rhs) => match op {
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
                | BinOp::And | BinOp::Or => Some(ScalarTy::Integer),
                BinOp::Add => {
                    let (l, r) = (self.infer(lhs)?, self.infer(rhs)?);
                    if l == ScalarTy::Str || r == ScalarTy::Str {
                        Some(ScalarTy::Str)
                    } else {
                        Some(widest(l, r))
                    }
                }
                BinOp::Div | BinOp::Pow => Some(ScalarTy::Double),
                _ => {
                    let (l, r) = (self.infer(lhs)?, self.infer(rhs)?);
                    if l == ScalarTy::Str || r == ScalarTy::Str {
                        None
                    } else {
                        Some(widest(l, r))
                    }
                }
            },
        }
    }

    // ---- linking ----------------------------------------------------------

    fn finish(mut self) -> Result<Program, Vec<CompileError>> {
        for (addr, sym, locus) in std::mem::take(&mut self.unlinked) {
            let dest = match self.sym_addr.get(&sym) {
                Some(d) => *d,
                None => {
                    let name = self.sym_names.get(&sym).cloned().unwrap_or_default();
                    self.error(format!("Undefined label or routine {}", name), locus);
                    continue;
                }
            };
            let op = &mut self.instrs[addr].op;
            *op = match op {
                Op::Jmp(_) => Op::Jmp(dest),
                Op::Bz(_) => Op::Bz(dest),
                Op::Bnz(_) => Op::Bnz(dest),
                Op::Call(_) => Op::Call(dest),
                Op::Gosub(_) => Op::Gosub(dest),
                Op::ForLoop(_) => Op::ForLoop(dest),
                other => {
                    unreachable!("link against non-branch instruction {}", other)
                }
            };
        }
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        Ok(Program {
            instrs: self.instrs,
            types: self.types,
            shared: self.shared,
            data: self.data,
            default_ty: ScalarTy::Single,
            test_mode: self.opts.test_mode,
        })
    }
}

fn int_value(v: i64) -> Value {
    if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
        Value::Integer(v as i32)
    } else {
        Value::Long(v)
    }
}

fn widest(l: ScalarTy, r: ScalarTy) -> ScalarTy {
    let rank = |t: ScalarTy| match t {
        ScalarTy::Integer => 0,
        ScalarTy::Long => 1,
        ScalarTy::Single => 2,
        ScalarTy::Double => 3,
        ScalarTy::Str => 4,
    };
    if rank(l) >= rank(r) {
        l
    } else {
        r
    }
}
