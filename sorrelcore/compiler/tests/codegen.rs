use sorrel_bytecode::{Op, Value};
use sorrel_compiler::compile;
use sorrel_parser::parse;

fn build(src: &str) -> sorrel_bytecode::Program {
    compile(&parse(src).expect("parse ok")).expect("compile ok")
}

fn errors(src: &str) -> Vec<String> {
    match compile(&parse(src).expect("parse ok")) {
        Ok(_) => Vec::new(),
        Err(es) => es.iter().map(|e| e.to_string()).collect(),
    }
}

/// Every branch target must land inside [0, len]; the one-past-the-end
/// address is the halt target.
#[test]
fn branch_targets_resolve_in_range() {
    let p = build(
        "GOSUB L: END: L: PRINT \"HI\": RETURN\n\
         FOR I = 1 TO 3: PRINT I: NEXT I\n\
         IF X THEN PRINT 1 ELSE PRINT 2\n\
         DO WHILE X < 3\nX = X + 1\nLOOP",
    );
    let len = p.instrs.len();
    for instr in &p.instrs {
        let target = match instr.op {
            Op::Jmp(a) | Op::Bz(a) | Op::Bnz(a) | Op::Call(a) | Op::Gosub(a) | Op::ForLoop(a) => a,
            _ => continue,
        };
        assert!(target <= len, "target {} out of range ({} instrs)", target, len);
    }
}

#[test]
fn data_pools_in_source_order() {
    let p = build("DATA 1, \"two\",, -3\nMARK: DATA 9\nRESTORE MARK\nREAD X");
    assert_eq!(p.data.len(), 5);
    assert!(matches!(p.data[0], Some(Value::Integer(1))));
    assert!(matches!(p.data[1], Some(Value::Str(ref s)) if s == "two"));
    assert!(p.data[2].is_none());
    assert!(matches!(p.data[3], Some(Value::Integer(-3))));
    // RESTORE MARK points past the first DATA statement.
    assert!(p.instrs.iter().any(|i| matches!(i.op, Op::RestoreData(4))));
}

#[test]
fn for_loop_uses_dedicated_instruction() {
    let p = build("FOR I = 1 TO 10 STEP 2: PRINT I: NEXT");
    assert!(p.instrs.iter().any(|i| matches!(i.op, Op::ForLoop(_))));
    assert!(p.instrs.iter().any(|i| matches!(i.op, Op::Dup)));
}

#[test]
fn shared_names_are_recorded() {
    let p = build("DIM SHARED SCORE%, BOARD(10)\nDIM LOCAL%");
    assert!(p.shared.contains("SCORE%"));
    assert!(p.shared.contains("BOARD"));
    assert!(!p.shared.contains("LOCAL%"));
}

#[test]
fn record_types_are_collected() {
    let p = build("TYPE POINT\nX AS SINGLE\nY AS SINGLE\nEND TYPE\nDIM P AS POINT");
    let ty = p.types.get("POINT").expect("POINT registered");
    assert_eq!(ty.fields.len(), 2);
}

#[test]
fn syscall_argument_types_are_checked() {
    let es = errors("X = LEN(42)");
    assert!(es.iter().any(|e| e.contains("argument 1 of LEN")), "{:?}", es);
    let es = errors("CLS 1");
    assert!(es.iter().any(|e| e.contains("at most")), "{:?}", es);
    let es = errors("X$ = LEFT$(\"abc\")");
    assert!(es.iter().any(|e| e.contains("at least")), "{:?}", es);
}

#[test]
fn unknown_goto_target_is_a_link_error() {
    let es = errors("GOTO NOWHERE");
    assert!(es.iter().any(|e| e.contains("NOWHERE")), "{:?}", es);
}

#[test]
fn undimmed_array_is_reported() {
    let es = errors("A(2) = 42");
    assert!(es.iter().any(|e| e.contains("without DIM")), "{:?}", es);
}

#[test]
fn call_arity_is_checked() {
    let es = errors("SUB S(A, B)\nEND SUB\nS 1");
    assert!(es.iter().any(|e| e.contains("expects 2 arguments")), "{:?}", es);
}

#[test]
fn sub_in_expression_is_an_error() {
    let es = errors("SUB S\nEND SUB\nX = S(1)");
    assert!(!es.is_empty());
}

#[test]
fn variadic_syscall_pushes_argument_count() {
    let p = build("COLOR 7, 0");
    let idx = p.instrs.iter().position(|i| matches!(i.op, Op::Syscall(ref s) if &**s == "COLOR")).unwrap();
    assert!(matches!(p.instrs[idx - 1].op, Op::PushConst(Value::Integer(2))));
}

#[test]
fn test_mode_flag_propagates() {
    let ast = parse("PRINT 1").unwrap();
    let p = sorrel_compiler::compile_with(&ast, sorrel_compiler::Options { test_mode: true }).unwrap();
    assert!(p.test_mode);
}
