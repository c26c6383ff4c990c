//! End-to-end scenarios driven through the whole pipeline against a test
//! console.

use sorrel_bytecode::{Instr, Op, Program, ScalarTy};
use sorrel_common::{Locus, RuntimeError};
use sorrel_compiler::{compile_with, Options};
use sorrel_parser::parse;
use sorrel_vm::{Pending, Step, TestConsole, Vm};

fn build(src: &str) -> Program {
    let ast = parse(src).expect("parse ok");
    compile_with(&ast, Options { test_mode: true }).expect("compile ok")
}

fn run_src(src: &str) -> (String, Vm) {
    let (mut vm, out) = Vm::for_test(build(src));
    vm.run().expect("run ok");
    let s = out.borrow().clone();
    (s, vm)
}

fn run_err(src: &str) -> RuntimeError {
    let ast = parse(src).expect("parse ok");
    let p = compile_with(&ast, Options { test_mode: true }).expect("compile ok");
    let (mut vm, _) = Vm::for_test(p);
    vm.run().expect_err("expected a runtime error")
}

#[test]
fn print_addition() {
    let (out, _) = run_src("PRINT 1 + 2");
    assert_eq!(out, "3\n");
}

#[test]
fn for_loop_counts_and_leaves_stack_clean() {
    let (out, vm) = run_src("FOR I = 1 TO 3: PRINT I: NEXT I");
    assert_eq!(out, "1\n2\n3\n");
    assert_eq!(vm.operand_stack_depth(), 0);
}

#[test]
fn for_loop_with_negative_step() {
    let (out, _) = run_src("FOR I = 3 TO 1 STEP -1: PRINT I: NEXT");
    assert_eq!(out, "3\n2\n1\n");
}

#[test]
fn for_loop_body_skipped_entirely() {
    let (out, vm) = run_src("FOR I = 5 TO 1: PRINT I: NEXT\nPRINT \"done\"");
    assert_eq!(out, "done\n");
    assert_eq!(vm.operand_stack_depth(), 0);
}

#[test]
fn division_by_zero_traps_with_code_101() {
    let e = run_err("X = 10 / 0");
    assert_eq!(e.code(), 101);
    assert_eq!(e.locus.line, 1);
}

#[test]
fn error_hook_sees_the_trap() {
    use std::cell::RefCell;
    use std::rc::Rc;
    let p = build("X = 10 / 0");
    let (mut vm, _) = Vm::for_test(p);
    let seen: Rc<RefCell<Vec<u16>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    vm.on_error(Box::new(move |e| sink.borrow_mut().push(e.code())));
    let _ = vm.run();
    assert_eq!(&*seen.borrow(), &[101]);
    assert!(vm.is_suspended());
}

#[test]
fn dimensioned_array_with_bounds() {
    let (out, _) = run_src("DIM A(1 TO 3): A(2) = 42: PRINT A(2)");
    assert_eq!(out, "42\n");
}

#[test]
fn array_subscript_out_of_range_traps() {
    let e = run_err("DIM A(1 TO 3): A(4) = 1");
    // No dedicated code for subscript faults; the generic 401 carries a
    // descriptive message.
    assert_eq!(e.code(), 401);
    assert!(e.message.contains("subscript"), "got {:?}", e.message);
}

#[test]
fn multidimensional_array_roundtrip() {
    let (out, _) = run_src("DIM G(2, 3)\nG(1, 2) = 7\nG(2, 3) = 9\nPRINT G(1, 2); G(2, 3)");
    assert_eq!(out, "7 9\n");
}

#[test]
fn data_read_and_pointer() {
    let (out, vm) = run_src("DATA 1,2,3: READ X, Y, Z: PRINT X; Y; Z");
    assert!(out.contains("1 2 3"), "got {:?}", out);
    assert_eq!(vm.data_ptr(), 3);
}

#[test]
fn empty_data_slot_leaves_default() {
    let (out, _) = run_src("X = 9\nDATA ,5\nREAD X, Y\nPRINT X; Y");
    // The empty slot leaves X untouched.
    assert_eq!(out, "9 5\n");
}

#[test]
fn restore_rewinds_to_a_label() {
    let (out, _) = run_src("DATA 1,2\nM: DATA 3\nREAD A\nRESTORE M\nREAD B\nPRINT A; B");
    assert_eq!(out, "1 3\n");
}

#[test]
fn out_of_data_traps() {
    let e = run_err("DATA 1\nREAD A, B");
    assert_eq!(e.code(), 401);
    assert!(e.message.contains("DATA"), "got {:?}", e.message);
}

#[test]
fn gosub_runs_once_and_halts_cleanly() {
    let (out, vm) = run_src("GOSUB L: END: L: PRINT \"HI\": RETURN");
    assert_eq!(out, "HI\n");
    assert_eq!(vm.frame_depth(), 1);
    assert_eq!(vm.operand_stack_depth(), 0);
}

#[test]
fn gosub_shares_the_variable_map() {
    let (out, _) = run_src("GOSUB BUMP: PRINT D%: END: BUMP: D% = D% + 1: RETURN");
    assert_eq!(out, "1\n");
}

#[test]
fn return_without_gosub_traps_with_202() {
    let e = run_err("RETURN");
    assert_eq!(e.code(), 202);
}

#[test]
fn sub_gets_a_fresh_frame() {
    let (out, _) = run_src("SUB S(): X = 5: END SUB: S: PRINT X");
    assert_eq!(out, "0\n");
}

#[test]
fn shared_names_bind_to_the_main_frame() {
    let src = "DIM SHARED G%\nSUB S1\nG% = 7\nEND SUB\nS1\nPRINT G%";
    let (out, _) = run_src(src);
    assert_eq!(out, "7\n");
}

#[test]
fn arguments_pass_by_reference() {
    let src = "SUB INCR(N%)\nN% = N% + 1\nEND SUB\nX% = 5\nINCR X%\nPRINT X%";
    let (out, _) = run_src(src);
    assert_eq!(out, "6\n");
}

#[test]
fn expression_arguments_do_not_alias() {
    let src = "SUB INCR(N%)\nN% = N% + 1\nEND SUB\nX% = 5\nINCR X% + 0\nPRINT X%";
    let (out, _) = run_src(src);
    assert_eq!(out, "5\n");
}

#[test]
fn function_returns_through_its_name() {
    let src = "FUNCTION TWICE%(N%)\nTWICE% = N% * 2\nEND FUNCTION\nPRINT TWICE%(21)";
    let (out, _) = run_src(src);
    assert_eq!(out, "42\n");
}

#[test]
fn recursion_overflows_the_call_stack() {
    let e = run_err("SUB R\nR\nEND SUB\nR");
    assert_eq!(e.code(), 201);
}

#[test]
fn boolean_convention() {
    let (out, _) = run_src("PRINT (1 = 1); (1 = 2); NOT 0; NOT -1");
    assert_eq!(out, "-1 0 -1 0\n");
}

#[test]
fn relational_and_logic_operators() {
    let (out, _) = run_src("PRINT (2 < 3 AND 3 <= 3); (2 > 3 OR 1 = 0)");
    assert_eq!(out, "-1 0\n");
}

#[test]
fn while_wend_and_do_loop() {
    let (out, _) = run_src("X = 0\nWHILE X < 3\nX = X + 1\nWEND\nPRINT X\nDO\nX = X - 1\nLOOP UNTIL X = 0\nPRINT X");
    assert_eq!(out, "3\n0\n");
}

#[test]
fn if_elseif_else_chain() {
    let src = "A = 2\nIF A = 1 THEN\nPRINT \"one\"\nELSEIF A = 2 THEN\nPRINT \"two\"\nELSE\nPRINT \"many\"\nEND IF";
    let (out, _) = run_src(src);
    assert_eq!(out, "two\n");
}

#[test]
fn records_hold_typed_fields() {
    let src = "TYPE POINT\nX AS SINGLE\nY AS SINGLE\nEND TYPE\nDIM P AS POINT\nP.X = 3\nP.Y = 4\nPRINT P.X + P.Y";
    let (out, _) = run_src(src);
    assert_eq!(out, "7\n");
}

#[test]
fn record_arrays() {
    let src = "TYPE POINT\nX AS SINGLE\nY AS SINGLE\nEND TYPE\nDIM PS(2) AS POINT\nPS(1).X = 9\nPRINT PS(1).X";
    let (out, _) = run_src(src);
    assert_eq!(out, "9\n");
}

#[test]
fn string_functions() {
    let (out, _) = run_src("S$ = \"Hello\"\nPRINT LEN(S$); LEFT$(S$, 2); MID$(S$, 2, 3); RIGHT$(S$, 2); UCASE$(S$)");
    assert_eq!(out, "5 He ell lo HELLO\n");
}

#[test]
fn chr_and_asc_style_roundtrip() {
    let (out, _) = run_src("PRINT CHR$(65); SPACE$(2); STR$(7)");
    // "A", separator, two spaces, separator, STR$'s sign position space.
    assert_eq!(out, "A     7\n");
}

#[test]
fn swap_exchanges_values() {
    let (out, _) = run_src("A$ = \"one\": B$ = \"two\": SWAP A$, B$: PRINT A$; B$");
    assert_eq!(out, "two one\n");
}

#[test]
fn print_comma_advances_to_zone() {
    let (out, _) = run_src("PRINT 1, 2");
    assert_eq!(out, format!("1{}2\n", " ".repeat(13)));
}

#[test]
fn print_using_pads_and_truncates() {
    let (out, _) = run_src("PRINT USING \"## items\"; 42\nPRINT USING \"##\"; 123");
    assert_eq!(out, "42 items\n23\n");
}

#[test]
fn input_assigns_scripted_lines() {
    let p = build("INPUT \"NAME\"; N$\nPRINT N$\nINPUT X%\nPRINT X% * 2");
    let console = TestConsole::with_inputs(vec!["zoe".to_string(), "21".to_string()]);
    let out = console.buffer();
    let mut vm = Vm::new(
        p,
        Box::new(console),
        Box::new(sorrel_vm::NullAudio),
        Box::new(sorrel_vm::MemoryFiles::new()),
    );
    vm.run().expect("run ok");
    assert_eq!(&*out.borrow(), "NAME? zoe\n? 42\n");
}

#[test]
fn file_write_then_read_back() {
    let src = "OPEN \"f.dat\" FOR OUTPUT AS #1\nWRITE #1, 1, \"two\"\nCLOSE #1\n\
               OPEN \"f.dat\" FOR INPUT AS #1\nINPUT #1, A, B$\nCLOSE #1\nPRINT A; B$";
    let (out, _) = run_src(src);
    assert_eq!(out, "1 two\n");
}

#[test]
fn missing_file_traps_with_401() {
    let e = run_err("OPEN \"absent.dat\" FOR INPUT AS #1");
    assert_eq!(e.code(), 401);
}

#[test]
fn unknown_syscall_traps_with_301() {
    use std::collections::{HashMap, HashSet};
    let p = Program {
        instrs: vec![Instr::new(Op::Syscall("NOPE".into()), Locus::new(1, 1))],
        types: HashMap::new(),
        shared: HashSet::new(),
        data: Vec::new(),
        default_ty: ScalarTy::Single,
        test_mode: true,
    };
    let (mut vm, _) = Vm::for_test(p);
    match vm.step(16) {
        Step::Trapped(e) => assert_eq!(e.code(), 301),
        other => panic!("expected a trap, got {:?}", other),
    }
}

#[test]
fn sleep_suspends_and_wakes_outside_test_mode() {
    let ast = parse("SLEEP 1\nPRINT \"up\"").expect("parse ok");
    let p = compile_with(&ast, Options::default()).expect("compile ok");
    let (mut vm, out) = Vm::for_test(p);
    match vm.step(1024) {
        Step::Suspended => {}
        other => panic!("expected suspension, got {:?}", other),
    }
    assert_eq!(vm.pending(), Some(&Pending::Sleep { seconds: Some(1.0) }));
    vm.wake();
    match vm.step(1024) {
        Step::Halted => {}
        other => panic!("expected halt, got {:?}", other),
    }
    assert_eq!(&*out.borrow(), "up\n");
}

#[test]
fn quantum_bounds_each_step() {
    let p = build("X = 0\nWHILE X < 100000\nX = X + 1\nWEND");
    let (mut vm, _) = Vm::for_test(p);
    assert!(matches!(vm.step(8), Step::Continue));
    assert!(matches!(vm.step(8), Step::Continue));
}

#[test]
fn reset_starts_over_on_a_new_program() {
    let (mut vm, out) = Vm::for_test(build("PRINT 1"));
    vm.run().expect("first run");
    vm.reset(build("PRINT 2"));
    vm.run().expect("second run");
    assert_eq!(&*out.borrow(), "2\n");
    assert_eq!(vm.frame_depth(), 1);
}

#[test]
fn system_halts_mid_program() {
    let (out, _) = run_src("PRINT 1\nSYSTEM\nPRINT 2");
    assert_eq!(out, "1\n");
}

#[test]
fn stub_syscalls_stay_stubbed() {
    let (out, _) = run_src("RANDOMIZE 42\nPRINT PEEK(1000)");
    assert_eq!(out, "0\n");
}

#[test]
fn rnd_repeats_last_value_for_zero() {
    let (out, _) = run_src("A = RND(1)\nB = RND(0)\nPRINT A = B");
    assert_eq!(out, "-1\n");
}

#[test]
fn inkey_reads_buffered_keys() {
    let p = build("PRINT INKEY$; LEN(INKEY$)");
    let mut console = TestConsole::new();
    console.push_key(65);
    let out = console.buffer();
    let mut vm = Vm::new(
        p,
        Box::new(console),
        Box::new(sorrel_vm::NullAudio),
        Box::new(sorrel_vm::MemoryFiles::new()),
    );
    vm.run().expect("run ok");
    assert_eq!(&*out.borrow(), "A 0\n");
}
