use sorrel_ast::*;
use sorrel_parser::parse;

fn one(src: &str) -> Stmt {
    let mut program = parse(src).expect("parse ok");
    assert_eq!(program.len(), 1, "expected one statement from {:?}", src);
    program.remove(0)
}

#[test]
fn assignment_and_expression_precedence() {
    let s = one("X = 1 + 2 * 3");
    match s.kind {
        StmtKind::Assign { target, value } => {
            assert_eq!(target.kind, ExprKind::Ident("X".into()));
            match value.kind {
                ExprKind::Binary(BinOp::Add, lhs, rhs) => {
                    assert_eq!(lhs.kind, ExprKind::Int(1));
                    assert!(matches!(rhs.kind, ExprKind::Binary(BinOp::Mul, _, _)));
                }
                other => panic!("expected addition, got {:?}", other),
            }
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn single_line_if_with_else() {
    // Ambiguous with the block IF grammar prefix; must still parse cleanly
    // as one statement with assignment branches.
    let s = one("IF A THEN B = 1 ELSE B = 2");
    match s.kind {
        StmtKind::If { arms, else_body } => {
            assert_eq!(arms.len(), 1);
            assert_eq!(arms[0].1.len(), 1);
            assert!(matches!(arms[0].1[0].kind, StmtKind::Assign { .. }));
            assert_eq!(else_body.len(), 1);
            assert!(matches!(else_body[0].kind, StmtKind::Assign { .. }));
        }
        other => panic!("expected IF, got {:?}", other),
    }
}

#[test]
fn dangling_else_binds_to_nearest_if() {
    let s = one("IF A THEN IF B THEN C = 1 ELSE C = 2");
    match s.kind {
        StmtKind::If { arms, else_body } => {
            assert!(else_body.is_empty(), "outer IF must not own the ELSE");
            match &arms[0].1[0].kind {
                StmtKind::If { else_body, .. } => assert_eq!(else_body.len(), 1),
                other => panic!("expected nested IF, got {:?}", other),
            }
        }
        other => panic!("expected IF, got {:?}", other),
    }
}

#[test]
fn block_if_with_elseif_chain() {
    let src = "IF A = 1 THEN\nPRINT 1\nELSEIF A = 2 THEN\nPRINT 2\nELSE\nPRINT 3\nEND IF";
    let s = one(src);
    match s.kind {
        StmtKind::If { arms, else_body } => {
            assert_eq!(arms.len(), 2);
            assert_eq!(else_body.len(), 1);
        }
        other => panic!("expected IF, got {:?}", other),
    }
}

#[test]
fn for_loop_on_one_line() {
    let s = one("FOR I = 1 TO 3: PRINT I: NEXT I");
    match s.kind {
        StmtKind::For { var, step, body, .. } => {
            assert_eq!(var, "I");
            assert!(step.is_none());
            assert_eq!(body.len(), 1);
        }
        other => panic!("expected FOR, got {:?}", other),
    }
}

#[test]
fn do_loop_post_test_does_not_swallow_while() {
    let program = parse("DO\nX = X + 1\nLOOP WHILE X < 3").expect("parse ok");
    match &program[0].kind {
        StmtKind::DoLoop { pre, post, body } => {
            assert!(pre.is_none());
            assert!(matches!(post, Some(LoopCond::While(_))));
            assert_eq!(body.len(), 1);
        }
        other => panic!("expected DO, got {:?}", other),
    }
}

#[test]
fn sub_definition_and_bare_call() {
    let program = parse("SUB S(): X = 5: END SUB: S: PRINT X").expect("parse ok");
    assert_eq!(program.len(), 3);
    assert!(matches!(program[0].kind, StmtKind::Routine { kind: RoutineKind::Sub, .. }));
    assert!(matches!(&program[1].kind, StmtKind::Call { name, args } if name == "S" && args.is_empty()));
    assert!(matches!(program[2].kind, StmtKind::Print { .. }));
}

#[test]
fn call_and_array_access_share_syntax() {
    let s = one("X = F(1)");
    match s.kind {
        StmtKind::Assign { value, .. } => {
            assert!(matches!(value.kind, ExprKind::Call(ref name, ref args) if name == "F" && args.len() == 1));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn gosub_label_return_line() {
    let program = parse("GOSUB L: END: L: PRINT \"HI\": RETURN").expect("parse ok");
    assert_eq!(program.len(), 5);
    assert!(matches!(&program[0].kind, StmtKind::Gosub(name) if name == "L"));
    assert!(matches!(program[1].kind, StmtKind::End));
    assert!(matches!(&program[2].kind, StmtKind::Call { name, args } if name == "L" && args.is_empty()));
    assert!(matches!(program[4].kind, StmtKind::Return));
}

#[test]
fn data_with_empty_slots() {
    let s = one("DATA 1,,\"two\",-3");
    match s.kind {
        StmtKind::Data(items) => {
            assert_eq!(items.len(), 4);
            assert_eq!(items[0], Some(DataConst::Int(1)));
            assert_eq!(items[1], None);
            assert_eq!(items[2], Some(DataConst::Str("two".into())));
            assert_eq!(items[3], Some(DataConst::Int(-3)));
        }
        other => panic!("expected DATA, got {:?}", other),
    }
}

#[test]
fn dim_with_explicit_bounds_and_type() {
    let s = one("DIM SHARED A(1 TO 3, 10) AS INTEGER, B$");
    match s.kind {
        StmtKind::Dim { shared, vars } => {
            assert!(shared);
            assert_eq!(vars.len(), 2);
            assert_eq!(vars[0].name, "A");
            assert_eq!(vars[0].bounds.len(), 2);
            assert!(vars[0].bounds[0].0.is_some());
            assert!(vars[0].bounds[1].0.is_none());
            assert_eq!(vars[0].as_type.as_deref(), Some("INTEGER"));
            assert_eq!(vars[1].name, "B$");
        }
        other => panic!("expected DIM, got {:?}", other),
    }
}

#[test]
fn type_definition() {
    let src = "TYPE POINT\nX AS SINGLE\nY AS SINGLE\nEND TYPE";
    let s = one(src);
    match s.kind {
        StmtKind::TypeDef { name, fields } => {
            assert_eq!(name, "POINT");
            assert_eq!(fields.len(), 2);
            assert_eq!(fields[0], ("X".into(), "SINGLE".into()));
        }
        other => panic!("expected TYPE, got {:?}", other),
    }
}

#[test]
fn member_access_parses() {
    let s = one("P.X = 1");
    match s.kind {
        StmtKind::Assign { target, .. } => {
            assert!(matches!(target.kind, ExprKind::Member(_, ref f) if f == "X"));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
}

#[test]
fn print_separators() {
    let s = one("PRINT X; Y, Z;");
    match s.kind {
        StmtKind::Print { items } => {
            use PrintItem::*;
            assert!(matches!(items[0], Expr(_)));
            assert!(matches!(items[1], Semi));
            assert!(matches!(items[2], Expr(_)));
            assert!(matches!(items[3], Comma));
            assert!(matches!(items[4], Expr(_)));
            assert!(matches!(items[5], Semi));
        }
        other => panic!("expected PRINT, got {:?}", other),
    }
}

#[test]
fn print_using() {
    let s = one("PRINT USING \"##.#\"; A; B");
    match s.kind {
        StmtKind::PrintUsing { args, trailing_semi, .. } => {
            assert_eq!(args.len(), 2);
            assert!(!trailing_semi);
        }
        other => panic!("expected PRINT USING, got {:?}", other),
    }
}

#[test]
fn open_write_close() {
    let program = parse("OPEN \"out.txt\" FOR OUTPUT AS #1\nWRITE #1, A, B\nCLOSE #1").expect("parse ok");
    assert!(matches!(program[0].kind, StmtKind::Open { mode: FileMode::Output, .. }));
    assert!(matches!(&program[1].kind, StmtKind::WriteFile { args, .. } if args.len() == 2));
    assert!(matches!(program[2].kind, StmtKind::Close { fileno: Some(_) }));
}

#[test]
fn deterministic_ast() {
    let src = "IF A THEN B = 1 ELSE B = 2\nFOR I = 1 TO 3: PRINT I: NEXT";
    let a = parse(src).expect("parse ok");
    let b = parse(src).expect("parse ok");
    assert_eq!(a, b);
}

#[test]
fn syntax_error_reports_locus_and_expectations() {
    let errs = parse("PRINT +").unwrap_err();
    assert_eq!(errs.len(), 1);
    let msg = errs[0].to_string();
    assert!(msg.starts_with("Syntax error"), "got: {msg}");
    assert!(msg.contains("expected"), "got: {msg}");
}

#[test]
fn bad_character_is_fatal() {
    let errs = parse("PRINT ~").unwrap_err();
    assert_eq!(errs[0].to_string(), "Bad character at 1:7");
}
