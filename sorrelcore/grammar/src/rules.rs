//! The dialect's productions and semantic actions.
//!
//! Child nodes are taken positionally out of the reduction's kid vector;
//! `take` swaps `Node::Empty` in so list nodes move without cloning.

use sorrel_ast::*;
use sorrel_common::Locus;
use sorrel_lexer::{IDENT, NEWLINE, NUMBER, STRING_LIT};

use crate::{binop, n, t, Builder};

fn take(k: &mut Vec<Node>, i: usize) -> Node {
    std::mem::replace(&mut k[i], Node::Empty)
}

fn stmt(kind: StmtKind, locus: Locus) -> Node {
    Node::Stmt(Stmt::new(kind, locus))
}

fn expr(kind: ExprKind, locus: Locus) -> Node {
    Node::Expr(Expr::new(kind, locus))
}

fn arms_of(node: Node) -> Vec<(Expr, Vec<Stmt>)> {
    match node {
        Node::Arms(v) => v,
        Node::Empty => Vec::new(),
        other => unreachable!("expected elseif arms, found {:?}", other),
    }
}

fn items_of(node: Node) -> Vec<PrintItem> {
    match node {
        Node::Items(v) => v,
        Node::Empty => Vec::new(),
        other => unreachable!("expected print items, found {:?}", other),
    }
}

fn params_of(node: Node) -> Vec<Param> {
    match node {
        Node::Params(v) => v,
        Node::Empty => Vec::new(),
        other => unreachable!("expected parameter list, found {:?}", other),
    }
}

fn dims_of(node: Node) -> Vec<DimVar> {
    match node {
        Node::Dims(v) => v,
        other => unreachable!("expected DIM list, found {:?}", other),
    }
}

fn bounds_of(node: Node) -> Vec<(Option<Expr>, Expr)> {
    match node {
        Node::Bounds(v) => v,
        other => unreachable!("expected array bounds, found {:?}", other),
    }
}

fn fields_of(node: Node) -> Vec<(String, String)> {
    match node {
        Node::Fields(v) => v,
        Node::Empty => Vec::new(),
        other => unreachable!("expected record fields, found {:?}", other),
    }
}

fn data_of(node: Node) -> Vec<Option<DataConst>> {
    match node {
        Node::Data(v) => v,
        other => unreachable!("expected DATA items, found {:?}", other),
    }
}

fn number_node(text: &str, locus: Locus) -> Node {
    if text.contains('.') || text.contains('E') {
        expr(ExprKind::Float(text.parse().unwrap_or(0.0)), locus)
    } else {
        match text.parse::<i64>() {
            Ok(v) => expr(ExprKind::Int(v), locus),
            Err(_) => expr(ExprKind::Float(text.parse().unwrap_or(0.0)), locus),
        }
    }
}

fn data_const(text: &str, negate: bool) -> DataConst {
    if text.contains('.') || text.contains('E') {
        let v: f64 = text.parse().unwrap_or(0.0);
        DataConst::Float(if negate { -v } else { v })
    } else {
        match text.parse::<i64>() {
            Ok(v) => DataConst::Int(if negate { -v } else { v }),
            Err(_) => {
                let v: f64 = text.parse().unwrap_or(0.0);
                DataConst::Float(if negate { -v } else { v })
            }
        }
    }
}

fn file_mode(text: &str) -> FileMode {
    match text {
        "INPUT" => FileMode::Input,
        "OUTPUT" => FileMode::Output,
        "APPEND" => FileMode::Append,
        other => unreachable!("no file mode for {:?}", other),
    }
}

pub(crate) fn install(b: &mut Builder) {
    // ---- program skeleton -------------------------------------------------
    b.r("_start", &[n("program")], None);
    b.r("program", &[n("ss"), n("block")], Some(|mut k, _| take(&mut k, 1)));
    b.r("program", &[n("ss"), n("block"), n("stmt")], Some(|mut k, _| {
        let mut body = take(&mut k, 1).into_stmts();
        body.push(take(&mut k, 2).into_stmt());
        Node::Stmts(body)
    }));
    b.r("block", &[], Some(|_, _| Node::Stmts(Vec::new())));
    b.r("block", &[n("block"), n("stmt"), n("ss1")], Some(|mut k, _| {
        let mut body = take(&mut k, 0).into_stmts();
        body.push(take(&mut k, 1).into_stmt());
        Node::Stmts(body)
    }));
    b.r("ss", &[], None);
    b.r("ss", &[n("ss"), n("sep")], None);
    b.r("ss1", &[n("sep"), n("ss")], None);
    b.r("sep", &[t(NEWLINE)], None);
    b.r("sep", &[t(":")], None);

    // ---- statements -------------------------------------------------------
    // Assignment (LET optional).
    b.r("stmt", &[n("lvalue"), t("="), n("expr")], Some(|mut k, lo| {
        stmt(StmtKind::Assign { target: take(&mut k, 0).into_expr(), value: take(&mut k, 2).into_expr() }, lo)
    }));
    b.r("stmt", &[t("LET"), n("lvalue"), t("="), n("expr")], Some(|mut k, lo| {
        stmt(StmtKind::Assign { target: take(&mut k, 1).into_expr(), value: take(&mut k, 3).into_expr() }, lo)
    }));

    // Single-line IF. The ELSE-less form comes first so a dangling ELSE
    // binds to the nearest IF.
    b.r("stmt", &[t("IF"), n("expr"), t("THEN"), n("stmt")], Some(|mut k, lo| {
        let cond = take(&mut k, 1).into_expr();
        let then = vec![take(&mut k, 3).into_stmt()];
        stmt(StmtKind::If { arms: vec![(cond, then)], else_body: Vec::new() }, lo)
    }));
    b.r("stmt", &[t("IF"), n("expr"), t("THEN"), n("stmt"), t("ELSE"), n("stmt")], Some(|mut k, lo| {
        let cond = take(&mut k, 1).into_expr();
        let then = vec![take(&mut k, 3).into_stmt()];
        let els = vec![take(&mut k, 5).into_stmt()];
        stmt(StmtKind::If { arms: vec![(cond, then)], else_body: els }, lo)
    }));
    // Block IF with ELSEIF chain.
    b.r(
        "stmt",
        &[t("IF"), n("expr"), t("THEN"), n("ss1"), n("block"), n("arms"), n("else_part"), t("END"), t("IF")],
        Some(|mut k, lo| {
            let cond = take(&mut k, 1).into_expr();
            let body = take(&mut k, 4).into_stmts();
            let mut arms = vec![(cond, body)];
            arms.extend(arms_of(take(&mut k, 5)));
            let else_body = take(&mut k, 6).into_stmts();
            stmt(StmtKind::If { arms, else_body }, lo)
        }),
    );
    b.r("arms", &[], Some(|_, _| Node::Arms(Vec::new())));
    b.r("arms", &[n("arms"), t("ELSEIF"), n("expr"), t("THEN"), n("ss1"), n("block")], Some(|mut k, _| {
        let mut arms = arms_of(take(&mut k, 0));
        arms.push((take(&mut k, 2).into_expr(), take(&mut k, 5).into_stmts()));
        Node::Arms(arms)
    }));
    b.r("else_part", &[], Some(|_, _| Node::Stmts(Vec::new())));
    b.r("else_part", &[t("ELSE"), n("ss1"), n("block")], Some(|mut k, _| take(&mut k, 2)));

    // FOR / NEXT.
    b.r(
        "stmt",
        &[t("FOR"), t(IDENT), t("="), n("expr"), t("TO"), n("expr"), n("ss1"), n("block"), t("NEXT"), n("nextid")],
        Some(|mut k, lo| {
            stmt(
                StmtKind::For {
                    var: k[1].text().to_string(),
                    from: take(&mut k, 3).into_expr(),
                    to: take(&mut k, 5).into_expr(),
                    step: None,
                    body: take(&mut k, 7).into_stmts(),
                },
                lo,
            )
        }),
    );
    b.r(
        "stmt",
        &[t("FOR"), t(IDENT), t("="), n("expr"), t("TO"), n("expr"), t("STEP"), n("expr"), n("ss1"), n("block"), t("NEXT"), n("nextid")],
        Some(|mut k, lo| {
            stmt(
                StmtKind::For {
                    var: k[1].text().to_string(),
                    from: take(&mut k, 3).into_expr(),
                    to: take(&mut k, 5).into_expr(),
                    step: Some(take(&mut k, 7).into_expr()),
                    body: take(&mut k, 9).into_stmts(),
                },
                lo,
            )
        }),
    );
    b.r("nextid", &[], None);
    b.r("nextid", &[t(IDENT)], None);

    // DO / LOOP in its pre- and post-test forms.
    b.r("stmt", &[t("DO"), n("ss1"), n("block"), t("LOOP")], Some(|mut k, lo| {
        stmt(StmtKind::DoLoop { pre: None, post: None, body: take(&mut k, 2).into_stmts() }, lo)
    }));
    b.r("stmt", &[t("DO"), t("WHILE"), n("expr"), n("ss1"), n("block"), t("LOOP")], Some(|mut k, lo| {
        let cond = LoopCond::While(take(&mut k, 2).into_expr());
        stmt(StmtKind::DoLoop { pre: Some(cond), post: None, body: take(&mut k, 4).into_stmts() }, lo)
    }));
    b.r("stmt", &[t("DO"), t("UNTIL"), n("expr"), n("ss1"), n("block"), t("LOOP")], Some(|mut k, lo| {
        let cond = LoopCond::Until(take(&mut k, 2).into_expr());
        stmt(StmtKind::DoLoop { pre: Some(cond), post: None, body: take(&mut k, 4).into_stmts() }, lo)
    }));
    b.r("stmt", &[t("DO"), n("ss1"), n("block"), t("LOOP"), t("WHILE"), n("expr")], Some(|mut k, lo| {
        let cond = LoopCond::While(take(&mut k, 5).into_expr());
        stmt(StmtKind::DoLoop { pre: None, post: Some(cond), body: take(&mut k, 2).into_stmts() }, lo)
    }));
    b.r("stmt", &[t("DO"), n("ss1"), n("block"), t("LOOP"), t("UNTIL"), n("expr")], Some(|mut k, lo| {
        let cond = LoopCond::Until(take(&mut k, 5).into_expr());
        stmt(StmtKind::DoLoop { pre: None, post: Some(cond), body: take(&mut k, 2).into_stmts() }, lo)
    }));
    b.r("stmt", &[t("WHILE"), n("expr"), n("ss1"), n("block"), t("WEND")], Some(|mut k, lo| {
        stmt(StmtKind::While { cond: take(&mut k, 1).into_expr(), body: take(&mut k, 3).into_stmts() }, lo)
    }));

    // Unstructured flow.
    b.r("stmt", &[t("GOTO"), t(IDENT)], Some(|k, lo| stmt(StmtKind::Goto(k[1].text().to_string()), lo)));
    b.r("stmt", &[t("GOSUB"), t(IDENT)], Some(|k, lo| stmt(StmtKind::Gosub(k[1].text().to_string()), lo)));
    b.r("stmt", &[t("RETURN")], Some(|_, lo| stmt(StmtKind::Return, lo)));
    b.r("stmt", &[t("END")], Some(|_, lo| stmt(StmtKind::End, lo)));

    // DIM.
    b.r("stmt", &[t("DIM"), n("dimlist")], Some(|mut k, lo| {
        stmt(StmtKind::Dim { shared: false, vars: dims_of(take(&mut k, 1)) }, lo)
    }));
    b.r("stmt", &[t("DIM"), t("SHARED"), n("dimlist")], Some(|mut k, lo| {
        stmt(StmtKind::Dim { shared: true, vars: dims_of(take(&mut k, 2)) }, lo)
    }));
    b.r("dimlist", &[n("dimvar")], None);
    b.r("dimlist", &[n("dimlist"), t(","), n("dimvar")], Some(|mut k, _| {
        let mut vars = dims_of(take(&mut k, 0));
        vars.extend(dims_of(take(&mut k, 2)));
        Node::Dims(vars)
    }));
    b.r("dimvar", &[t(IDENT)], Some(|k, lo| {
        Node::Dims(vec![DimVar { name: k[0].text().to_string(), bounds: Vec::new(), as_type: None, locus: lo }])
    }));
    b.r("dimvar", &[t(IDENT), t("AS"), n("typename")], Some(|k, lo| {
        Node::Dims(vec![DimVar {
            name: k[0].text().to_string(),
            bounds: Vec::new(),
            as_type: Some(k[2].text().to_string()),
            locus: lo,
        }])
    }));
    b.r("dimvar", &[t(IDENT), t("("), n("boundlist"), t(")")], Some(|mut k, lo| {
        Node::Dims(vec![DimVar {
            name: k[0].text().to_string(),
            bounds: bounds_of(take(&mut k, 2)),
            as_type: None,
            locus: lo,
        }])
    }));
    b.r("dimvar", &[t(IDENT), t("("), n("boundlist"), t(")"), t("AS"), n("typename")], Some(|mut k, lo| {
        let as_type = Some(k[5].text().to_string());
        Node::Dims(vec![DimVar {
            name: k[0].text().to_string(),
            bounds: bounds_of(take(&mut k, 2)),
            as_type,
            locus: lo,
        }])
    }));
    b.r("boundlist", &[n("bound")], None);
    b.r("boundlist", &[n("boundlist"), t(","), n("bound")], Some(|mut k, _| {
        let mut v = bounds_of(take(&mut k, 0));
        v.extend(bounds_of(take(&mut k, 2)));
        Node::Bounds(v)
    }));
    b.r("bound", &[n("expr")], Some(|mut k, _| Node::Bounds(vec![(None, take(&mut k, 0).into_expr())])));
    b.r("bound", &[n("expr"), t("TO"), n("expr")], Some(|mut k, _| {
        Node::Bounds(vec![(Some(take(&mut k, 0).into_expr()), take(&mut k, 2).into_expr())])
    }));
    b.r("typename", &[t("INTEGER")], None);
    b.r("typename", &[t("LONG")], None);
    b.r("typename", &[t("SINGLE")], None);
    b.r("typename", &[t("DOUBLE")], None);
    b.r("typename", &[t("STRING")], None);
    b.r("typename", &[t(IDENT)], None);

    // DECLARE, SUB, FUNCTION, TYPE.
    b.r("stmt", &[t("DECLARE"), t("SUB"), t(IDENT), n("paramspec")], Some(|mut k, lo| {
        let params = params_of(take(&mut k, 3));
        stmt(StmtKind::Declare { kind: RoutineKind::Sub, name: k[2].text().to_string(), params }, lo)
    }));
    b.r("stmt", &[t("DECLARE"), t("FUNCTION"), t(IDENT), n("paramspec")], Some(|mut k, lo| {
        let params = params_of(take(&mut k, 3));
        stmt(StmtKind::Declare { kind: RoutineKind::Function, name: k[2].text().to_string(), params }, lo)
    }));
    b.r("stmt", &[t("SUB"), t(IDENT), n("paramspec"), n("ss1"), n("block"), t("END"), t("SUB")], Some(|mut k, lo| {
        let params = params_of(take(&mut k, 2));
        let body = take(&mut k, 4).into_stmts();
        stmt(StmtKind::Routine { kind: RoutineKind::Sub, name: k[1].text().to_string(), params, body }, lo)
    }));
    b.r(
        "stmt",
        &[t("FUNCTION"), t(IDENT), n("paramspec"), n("ss1"), n("block"), t("END"), t("FUNCTION")],
        Some(|mut k, lo| {
            let params = params_of(take(&mut k, 2));
            let body = take(&mut k, 4).into_stmts();
            stmt(StmtKind::Routine { kind: RoutineKind::Function, name: k[1].text().to_string(), params, body }, lo)
        }),
    );
    b.r("paramspec", &[], Some(|_, _| Node::Params(Vec::new())));
    b.r("paramspec", &[t("("), t(")")], Some(|_, _| Node::Params(Vec::new())));
    b.r("paramspec", &[t("("), n("params"), t(")")], Some(|mut k, _| take(&mut k, 1)));
    b.r("params", &[n("param")], None);
    b.r("params", &[n("params"), t(","), n("param")], Some(|mut k, _| {
        let mut v = params_of(take(&mut k, 0));
        v.extend(params_of(take(&mut k, 2)));
        Node::Params(v)
    }));
    b.r("param", &[t(IDENT)], Some(|k, _| {
        Node::Params(vec![Param { name: k[0].text().to_string(), as_type: None }])
    }));
    b.r("param", &[t(IDENT), t("AS"), n("typename")], Some(|k, _| {
        Node::Params(vec![Param { name: k[0].text().to_string(), as_type: Some(k[2].text().to_string()) }])
    }));
    b.r("stmt", &[t("TYPE"), t(IDENT), n("ss1"), n("fieldlist"), t("END"), t("TYPE")], Some(|mut k, lo| {
        stmt(StmtKind::TypeDef { name: k[1].text().to_string(), fields: fields_of(take(&mut k, 3)) }, lo)
    }));
    b.r("fieldlist", &[], Some(|_, _| Node::Fields(Vec::new())));
    b.r("fieldlist", &[n("fieldlist"), t(IDENT), t("AS"), n("typename"), n("ss1")], Some(|mut k, _| {
        let mut v = fields_of(take(&mut k, 0));
        v.push((k[1].text().to_string(), k[3].text().to_string()));
        Node::Fields(v)
    }));

    // PRINT.
    b.r("stmt", &[t("PRINT")], Some(|_, lo| stmt(StmtKind::Print { items: Vec::new() }, lo)));
    b.r("stmt", &[t("PRINT"), n("pitems")], Some(|mut k, lo| {
        stmt(StmtKind::Print { items: items_of(take(&mut k, 1)) }, lo)
    }));
    b.r("stmt", &[t("PRINT"), t("USING"), n("expr"), t(";"), n("uargs")], Some(|mut k, lo| {
        stmt(
            StmtKind::PrintUsing {
                format: take(&mut k, 2).into_expr(),
                args: take(&mut k, 4).into_exprs(),
                trailing_semi: false,
            },
            lo,
        )
    }));
    b.r("stmt", &[t("PRINT"), t("USING"), n("expr"), t(";"), n("uargs"), t(";")], Some(|mut k, lo| {
        stmt(
            StmtKind::PrintUsing {
                format: take(&mut k, 2).into_expr(),
                args: take(&mut k, 4).into_exprs(),
                trailing_semi: true,
            },
            lo,
        )
    }));
    b.r("uargs", &[n("expr")], Some(|mut k, _| Node::Exprs(vec![take(&mut k, 0).into_expr()])));
    b.r("uargs", &[n("uargs"), t(";"), n("expr")], Some(|mut k, _| {
        let mut v = take(&mut k, 0).into_exprs();
        v.push(take(&mut k, 2).into_expr());
        Node::Exprs(v)
    }));
    b.r("pitems", &[n("expr")], Some(|mut k, _| Node::Items(vec![PrintItem::Expr(take(&mut k, 0).into_expr())])));
    b.r("pitems", &[n("pitems"), t(";"), n("expr")], Some(|mut k, _| {
        let mut v = items_of(take(&mut k, 0));
        v.push(PrintItem::Semi);
        v.push(PrintItem::Expr(take(&mut k, 2).into_expr()));
        Node::Items(v)
    }));
    b.r("pitems", &[n("pitems"), t(","), n("expr")], Some(|mut k, _| {
        let mut v = items_of(take(&mut k, 0));
        v.push(PrintItem::Comma);
        v.push(PrintItem::Expr(take(&mut k, 2).into_expr()));
        Node::Items(v)
    }));
    b.r("pitems", &[n("pitems"), t(";")], Some(|mut k, _| {
        let mut v = items_of(take(&mut k, 0));
        v.push(PrintItem::Semi);
        Node::Items(v)
    }));
    b.r("pitems", &[n("pitems"), t(",")], Some(|mut k, _| {
        let mut v = items_of(take(&mut k, 0));
        v.push(PrintItem::Comma);
        Node::Items(v)
    }));

    // INPUT. The `;` prompt form appends the classic "? ".
    b.r("stmt", &[t("INPUT"), n("lvalue")], Some(|mut k, lo| {
        stmt(StmtKind::Input { prompt: None, target: take(&mut k, 1).into_expr() }, lo)
    }));
    b.r("stmt", &[t("INPUT"), t(STRING_LIT), t(";"), n("lvalue")], Some(|mut k, lo| {
        let prompt = format!("{}? ", k[1].text());
        stmt(StmtKind::Input { prompt: Some(prompt), target: take(&mut k, 3).into_expr() }, lo)
    }));
    b.r("stmt", &[t("INPUT"), t(STRING_LIT), t(","), n("lvalue")], Some(|mut k, lo| {
        let prompt = Some(k[1].text().to_string());
        stmt(StmtKind::Input { prompt, target: take(&mut k, 3).into_expr() }, lo)
    }));
    b.r("stmt", &[t("INPUT"), t("#"), n("expr"), t(","), n("lvalues")], Some(|mut k, lo| {
        stmt(StmtKind::InputFile { fileno: take(&mut k, 2).into_expr(), targets: take(&mut k, 4).into_exprs() }, lo)
    }));

    // READ / DATA / RESTORE.
    b.r("stmt", &[t("READ"), n("lvalues")], Some(|mut k, lo| {
        stmt(StmtKind::Read(take(&mut k, 1).into_exprs()), lo)
    }));
    b.r("stmt", &[t("DATA"), n("datums")], Some(|mut k, lo| {
        stmt(StmtKind::Data(data_of(take(&mut k, 1))), lo)
    }));
    b.r("datums", &[n("datum")], None);
    b.r("datums", &[n("datums"), t(","), n("datum")], Some(|mut k, _| {
        let mut v = data_of(take(&mut k, 0));
        v.extend(data_of(take(&mut k, 2)));
        Node::Data(v)
    }));
    b.r("datum", &[], Some(|_, _| Node::Data(vec![None])));
    b.r("datum", &[t(NUMBER)], Some(|k, _| Node::Data(vec![Some(data_const(k[0].text(), false))])));
    b.r("datum", &[t("-"), t(NUMBER)], Some(|k, _| Node::Data(vec![Some(data_const(k[1].text(), true))])));
    b.r("datum", &[t(STRING_LIT)], Some(|k, _| Node::Data(vec![Some(DataConst::Str(k[0].text().to_string()))])));
    b.r("stmt", &[t("RESTORE")], Some(|_, lo| stmt(StmtKind::Restore(None), lo)));
    b.r("stmt", &[t("RESTORE"), t(IDENT)], Some(|k, lo| {
        stmt(StmtKind::Restore(Some(k[1].text().to_string())), lo)
    }));

    // Files.
    b.r("stmt", &[t("OPEN"), n("expr"), t("FOR"), n("fmode"), t("AS"), t("#"), n("expr")], Some(|mut k, lo| {
        let mode = file_mode(k[3].text());
        stmt(StmtKind::Open { path: take(&mut k, 1).into_expr(), mode, fileno: take(&mut k, 6).into_expr() }, lo)
    }));
    b.r("stmt", &[t("OPEN"), n("expr"), t("FOR"), n("fmode"), t("AS"), n("expr")], Some(|mut k, lo| {
        let mode = file_mode(k[3].text());
        stmt(StmtKind::Open { path: take(&mut k, 1).into_expr(), mode, fileno: take(&mut k, 5).into_expr() }, lo)
    }));
    b.r("fmode", &[t("INPUT")], None);
    b.r("fmode", &[t("OUTPUT")], None);
    b.r("fmode", &[t("APPEND")], None);
    b.r("stmt", &[t("CLOSE")], Some(|_, lo| stmt(StmtKind::Close { fileno: None }, lo)));
    b.r("stmt", &[t("CLOSE"), t("#"), n("expr")], Some(|mut k, lo| {
        stmt(StmtKind::Close { fileno: Some(take(&mut k, 2).into_expr()) }, lo)
    }));
    b.r("stmt", &[t("WRITE"), t("#"), n("expr"), t(","), n("exprs")], Some(|mut k, lo| {
        stmt(StmtKind::WriteFile { fileno: take(&mut k, 2).into_expr(), args: take(&mut k, 4).into_exprs() }, lo)
    }));

    // Invocations. The parenthesized form comes before the expression-list
    // form so `S(1)` reads its argument bare. A lone identifier is either a
    // sub call or a label; the code generator decides which.
    b.r("stmt", &[t("CALL"), t(IDENT)], Some(|k, lo| {
        stmt(StmtKind::Call { name: k[1].text().to_string(), args: Vec::new() }, lo)
    }));
    b.r("stmt", &[t("CALL"), t(IDENT), t("("), t(")")], Some(|k, lo| {
        stmt(StmtKind::Call { name: k[1].text().to_string(), args: Vec::new() }, lo)
    }));
    b.r("stmt", &[t("CALL"), t(IDENT), t("("), n("exprs"), t(")")], Some(|mut k, lo| {
        stmt(StmtKind::Call { name: k[1].text().to_string(), args: take(&mut k, 3).into_exprs() }, lo)
    }));
    b.r("stmt", &[t(IDENT), t("("), n("exprs"), t(")")], Some(|mut k, lo| {
        stmt(StmtKind::Call { name: k[0].text().to_string(), args: take(&mut k, 2).into_exprs() }, lo)
    }));
    b.r("stmt", &[t(IDENT), t("("), t(")")], Some(|k, lo| {
        stmt(StmtKind::Call { name: k[0].text().to_string(), args: Vec::new() }, lo)
    }));
    b.r("stmt", &[t(IDENT), n("exprs")], Some(|mut k, lo| {
        stmt(StmtKind::Call { name: k[0].text().to_string(), args: take(&mut k, 1).into_exprs() }, lo)
    }));
    b.r("stmt", &[t(IDENT)], Some(|k, lo| {
        stmt(StmtKind::Call { name: k[0].text().to_string(), args: Vec::new() }, lo)
    }));

    // ---- expressions ------------------------------------------------------
    b.r("expr", &[n("or_e")], None);
    b.r("or_e", &[n("or_e"), t("OR"), n("and_e")], Some(act_binop));
    b.r("or_e", &[n("and_e")], None);
    b.r("and_e", &[n("and_e"), t("AND"), n("not_e")], Some(act_binop));
    b.r("and_e", &[n("not_e")], None);
    b.r("not_e", &[t("NOT"), n("not_e")], Some(|mut k, lo| {
        expr(ExprKind::Unary(UnOp::Not, Box::new(take(&mut k, 1).into_expr())), lo)
    }));
    b.r("not_e", &[n("rel_e")], None);
    b.r("rel_e", &[n("rel_e"), t("="), n("add_e")], Some(act_binop));
    b.r("rel_e", &[n("rel_e"), t("<>"), n("add_e")], Some(act_binop));
    b.r("rel_e", &[n("rel_e"), t("<"), n("add_e")], Some(act_binop));
    b.r("rel_e", &[n("rel_e"), t("<="), n("add_e")], Some(act_binop));
    b.r("rel_e", &[n("rel_e"), t(">"), n("add_e")], Some(act_binop));
    b.r("rel_e", &[n("rel_e"), t(">="), n("add_e")], Some(act_binop));
    b.r("rel_e", &[n("add_e")], None);
    b.r("add_e", &[n("add_e"), t("+"), n("mul_e")], Some(act_binop));
    b.r("add_e", &[n("add_e"), t("-"), n("mul_e")], Some(act_binop));
    b.r("add_e", &[n("mul_e")], None);
    b.r("mul_e", &[n("mul_e"), t("*"), n("pow_e")], Some(act_binop));
    b.r("mul_e", &[n("mul_e"), t("/"), n("pow_e")], Some(act_binop));
    b.r("mul_e", &[n("mul_e"), t("MOD"), n("pow_e")], Some(act_binop));
    b.r("mul_e", &[n("pow_e")], None);
    b.r("pow_e", &[n("pow_e"), t("^"), n("neg_e")], Some(act_binop));
    b.r("pow_e", &[n("neg_e")], None);
    b.r("neg_e", &[t("-"), n("neg_e")], Some(|mut k, lo| {
        expr(ExprKind::Unary(UnOp::Neg, Box::new(take(&mut k, 1).into_expr())), lo)
    }));
    b.r("neg_e", &[n("atom_e")], None);
    b.r("atom_e", &[t(NUMBER)], Some(|k, lo| number_node(k[0].text(), lo)));
    b.r("atom_e", &[t(STRING_LIT)], Some(|k, lo| expr(ExprKind::Str(k[0].text().to_string()), lo)));
    b.r("atom_e", &[n("lvalue")], None);
    b.r("atom_e", &[t("("), n("expr"), t(")")], Some(|mut k, _| take(&mut k, 1)));

    b.r("lvalue", &[t(IDENT)], Some(|k, lo| expr(ExprKind::Ident(k[0].text().to_string()), lo)));
    b.r("lvalue", &[t(IDENT), t("("), t(")")], Some(|k, lo| {
        expr(ExprKind::Call(k[0].text().to_string(), Vec::new()), lo)
    }));
    b.r("lvalue", &[t(IDENT), t("("), n("exprs"), t(")")], Some(|mut k, lo| {
        let args = take(&mut k, 2).into_exprs();
        expr(ExprKind::Call(k[0].text().to_string(), args), lo)
    }));
    b.r("lvalue", &[n("lvalue"), t("."), t(IDENT)], Some(|mut k, lo| {
        let base = take(&mut k, 0).into_expr();
        expr(ExprKind::Member(Box::new(base), k[2].text().to_string()), lo)
    }));

    b.r("exprs", &[n("expr")], Some(|mut k, _| Node::Exprs(vec![take(&mut k, 0).into_expr()])));
    b.r("exprs", &[n("exprs"), t(","), n("expr")], Some(|mut k, _| {
        let mut v = take(&mut k, 0).into_exprs();
        v.push(take(&mut k, 2).into_expr());
        Node::Exprs(v)
    }));
    b.r("lvalues", &[n("lvalue")], Some(|mut k, _| Node::Exprs(vec![take(&mut k, 0).into_expr()])));
    b.r("lvalues", &[n("lvalues"), t(","), n("lvalue")], Some(|mut k, _| {
        let mut v = take(&mut k, 0).into_exprs();
        v.push(take(&mut k, 2).into_expr());
        Node::Exprs(v)
    }));
}

fn act_binop(mut k: Vec<Node>, lo: Locus) -> Node {
    let lhs = take(&mut k, 0).into_expr();
    let rhs = take(&mut k, 2).into_expr();
    expr(ExprKind::Binary(binop(k[1].text()), Box::new(lhs), Box::new(rhs)), lo)
}
