//! Analysis service for editor tooling: parse and compile a source text
//! and report serializable diagnostics and top-level symbols.

use serde::{Deserialize, Serialize};

use sorrel_ast::{Program, RoutineKind, StmtKind};
use sorrel_parser::parse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub severity: DiagnosticSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SymbolKind {
    Sub,
    Function,
    RecordType,
    Array,
    Label,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerDiagnostics {
    pub errors: Vec<Diagnostic>,
    pub symbols: Vec<SymbolInfo>,
}

pub fn analyze_source(source: &str) -> CompilerDiagnostics {
    let mut out = CompilerDiagnostics::default();
    let ast = match parse(source) {
        Ok(ast) => ast,
        Err(errors) => {
            for e in errors {
                out.errors.push(Diagnostic {
                    message: e.message,
                    line: e.locus.line,
                    column: e.locus.col,
                    severity: DiagnosticSeverity::Error,
                });
            }
            return out;
        }
    };
    collect_symbols(&ast, &mut out.symbols);
    if let Err(errors) = crate::compile(&ast) {
        for e in errors {
            out.errors.push(Diagnostic {
                message: e.message,
                line: e.locus.line,
                column: e.locus.col,
                severity: DiagnosticSeverity::Error,
            });
        }
    }
    out
}

fn collect_symbols(ast: &Program, out: &mut Vec<SymbolInfo>) {
    for stmt in ast {
        match &stmt.kind {
            StmtKind::Routine { kind, name, .. } => out.push(SymbolInfo {
                name: name.clone(),
                kind: match kind {
                    RoutineKind::Sub => SymbolKind::Sub,
                    RoutineKind::Function => SymbolKind::Function,
                },
                line: stmt.locus.line,
                column: stmt.locus.col,
            }),
            StmtKind::TypeDef { name, .. } => out.push(SymbolInfo {
                name: name.clone(),
                kind: SymbolKind::RecordType,
                line: stmt.locus.line,
                column: stmt.locus.col,
            }),
            StmtKind::Dim { vars, .. } => {
                for v in vars {
                    if !v.bounds.is_empty() {
                        out.push(SymbolInfo {
                            name: v.name.clone(),
                            kind: SymbolKind::Array,
                            line: v.locus.line,
                            column: v.locus.col,
                        });
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_reports_symbols() {
        let d = analyze_source("DIM A(10)\nSUB S\nEND SUB\nTYPE P\nX AS SINGLE\nEND TYPE");
        assert!(d.errors.is_empty(), "{:?}", d.errors);
        assert_eq!(d.symbols.len(), 3);
    }

    #[test]
    fn analyze_reports_parse_errors() {
        let d = analyze_source("PRINT +");
        assert_eq!(d.errors.len(), 1);
        assert!(d.errors[0].message.starts_with("Syntax error"));
    }

    #[test]
    fn analyze_is_serializable() {
        let d = analyze_source("PRINT 1");
        let json = serde_json::to_string(&d);
        assert!(json.is_ok());
    }
}
