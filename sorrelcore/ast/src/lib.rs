// SPDX-License-Identifier: MIT

//! AST for the Sorrel BASIC dialect, plus the polymorphic [`Node`] value
//! the parser's semantic actions pass around.

use sorrel_common::Locus;
use sorrel_lexer::Token;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub locus: Locus,
}

impl Expr {
    pub fn new(kind: ExprKind, locus: Locus) -> Self {
        Self { kind, locus }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    /// Function call or array access; the two are syntactically identical.
    Call(String, Vec<Expr>),
    Member(Box<Expr>, String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Pow,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub locus: Locus,
}

impl Stmt {
    pub fn new(kind: StmtKind, locus: Locus) -> Self {
        Self { kind, locus }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Sub,
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub as_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimVar {
    pub name: String,
    /// `(lower, upper)` bound expressions per dimension; a lone expression
    /// is an upper bound with an implicit lower bound of 0. Empty for a
    /// scalar DIM.
    pub bounds: Vec<(Option<Expr>, Expr)>,
    pub as_type: Option<String>,
    pub locus: Locus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopCond {
    While(Expr),
    Until(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrintItem {
    Expr(Expr),
    Comma,
    Semi,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataConst {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Input,
    Output,
    Append,
}

impl FileMode {
    pub fn name(self) -> &'static str {
        match self {
            FileMode::Input => "INPUT",
            FileMode::Output => "OUTPUT",
            FileMode::Append => "APPEND",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign { target: Expr, value: Expr },
    /// Bare or CALLed invocation. A bare name that turns out to be neither
    /// a routine nor a syscall is a label definition; the code generator
    /// decides.
    Call { name: String, args: Vec<Expr> },
    If { arms: Vec<(Expr, Vec<Stmt>)>, else_body: Vec<Stmt> },
    For { var: String, from: Expr, to: Expr, step: Option<Expr>, body: Vec<Stmt> },
    DoLoop { pre: Option<LoopCond>, post: Option<LoopCond>, body: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    Goto(String),
    Gosub(String),
    Return,
    Dim { shared: bool, vars: Vec<DimVar> },
    Declare { kind: RoutineKind, name: String, params: Vec<Param> },
    Routine { kind: RoutineKind, name: String, params: Vec<Param>, body: Vec<Stmt> },
    TypeDef { name: String, fields: Vec<(String, String)> },
    Print { items: Vec<PrintItem> },
    PrintUsing { format: Expr, args: Vec<Expr>, trailing_semi: bool },
    Input { prompt: Option<String>, target: Expr },
    Read(Vec<Expr>),
    Data(Vec<Option<DataConst>>),
    Restore(Option<String>),
    Open { path: Expr, mode: FileMode, fileno: Expr },
    Close { fileno: Option<Expr> },
    WriteFile { fileno: Expr, args: Vec<Expr> },
    InputFile { fileno: Expr, targets: Vec<Expr> },
    End,
}

pub type Program = Vec<Stmt>;

/// Polymorphic value produced by grammar semantic actions. Shift nodes
/// evaluate to `Tok`; every reduction either forwards a child or builds
/// one of the typed payloads.
#[derive(Debug, Clone)]
pub enum Node {
    Empty,
    Tok(Token),
    Expr(Expr),
    Exprs(Vec<Expr>),
    Stmt(Stmt),
    Stmts(Vec<Stmt>),
    Arms(Vec<(Expr, Vec<Stmt>)>),
    Items(Vec<PrintItem>),
    Params(Vec<Param>),
    Dims(Vec<DimVar>),
    Bounds(Vec<(Option<Expr>, Expr)>),
    Fields(Vec<(String, String)>),
    Data(Vec<Option<DataConst>>),
}

impl Node {
    pub fn text(&self) -> &str {
        match self {
            Node::Tok(t) => &t.text,
            _ => "",
        }
    }

    pub fn into_expr(self) -> Expr {
        match self {
            Node::Expr(e) => e,
            other => unreachable!("expected expression node, found {:?}", other),
        }
    }

    pub fn into_stmt(self) -> Stmt {
        match self {
            Node::Stmt(s) => s,
            other => unreachable!("expected statement node, found {:?}", other),
        }
    }

    pub fn into_stmts(self) -> Vec<Stmt> {
        match self {
            Node::Stmts(v) => v,
            Node::Empty => Vec::new(),
            other => unreachable!("expected statement list node, found {:?}", other),
        }
    }

    pub fn into_exprs(self) -> Vec<Expr> {
        match self {
            Node::Exprs(v) => v,
            Node::Empty => Vec::new(),
            other => unreachable!("expected expression list node, found {:?}", other),
        }
    }

    pub fn into_program(self) -> Program {
        self.into_stmts()
    }
}
