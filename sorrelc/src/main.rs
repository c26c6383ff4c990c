//! sorrelc — run and inspect Sorrel BASIC programs.
//!
//! `run` drives the cooperative scheduler: a bounded instruction quantum
//! per ~50 ms tick, with suspensions (INPUT, SLEEP, YIELD, PLAY, SPSET)
//! completed by this host loop. `test` executes synchronously against the
//! recording console with scripted input.

use std::io::{self, BufRead};
use std::process::exit;
use std::thread;
use std::time::Duration;

use sorrel_compiler::service::analyze_source;
use sorrel_compiler::{compile_with, Options};
use sorrel_lexer::Tokenizer;
use sorrel_parser::parse;
use sorrel_vm::{
    MemoryFiles, NullAudio, Pending, Step, TestConsole, Vm, TICK_MILLIS, TICK_QUANTUM,
};

mod files;
mod term;

use files::StdFiles;
use term::TerminalConsole;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str).unwrap_or("help");
    let rest = &args[1.min(args.len())..];
    match cmd {
        "run" => cmd_run(rest),
        "test" => cmd_test(rest),
        "lex" => cmd_lex(rest),
        "parse" => cmd_parse(rest),
        "asm" => cmd_asm(rest),
        "analyze" => cmd_analyze(rest),
        "help" | "--help" | "-h" => print_help(),
        other => {
            eprintln!("unknown command: {}", other);
            print_help();
            exit(2);
        }
    }
}

fn print_help() {
    println!("sorrelc — Sorrel BASIC");
    println!();
    println!("usage: sorrelc <command> [args]");
    println!();
    println!("  run <file.bas>              run a program interactively");
    println!("  test <file.bas> [--input f] run in test mode with scripted input");
    println!("  lex <file.bas>              dump the token stream");
    println!("  parse <file.bas>            dump the AST");
    println!("  asm <file.bas>              dump the compiled instruction listing");
    println!("  analyze <file.bas> [--json] report diagnostics and symbols");
}

fn read_source(rest: &[String]) -> (String, String) {
    let path = match rest.iter().find(|a| !a.starts_with("--")) {
        Some(p) => p.clone(),
        None => {
            eprintln!("expected a source file");
            exit(2);
        }
    };
    match std::fs::read_to_string(&path) {
        Ok(src) => (path, src),
        Err(e) => {
            eprintln!("{}: {}", path, e);
            exit(1);
        }
    }
}

fn build(src: &str, test_mode: bool) -> sorrel_bytecode::Program {
    let ast = match parse(src) {
        Ok(ast) => ast,
        Err(errors) => {
            for e in errors {
                eprintln!("?{}", e);
            }
            exit(1);
        }
    };
    match compile_with(&ast, Options { test_mode }) {
        Ok(p) => p,
        Err(errors) => {
            for e in errors {
                eprintln!("?{}", e);
            }
            exit(1);
        }
    }
}

fn cmd_run(rest: &[String]) {
    let (_, src) = read_source(rest);
    let program = build(&src, false);
    let mut vm = Vm::new(
        program,
        Box::new(TerminalConsole::new()),
        Box::new(NullAudio),
        Box::new(StdFiles::new()),
    );
    loop {
        match vm.step(TICK_QUANTUM) {
            Step::Continue => thread::sleep(Duration::from_millis(TICK_MILLIS)),
            Step::Halted => break,
            Step::Trapped(e) => {
                eprintln!("?{}", e);
                exit(1);
            }
            Step::Suspended => complete_pending(&mut vm),
        }
    }
}

/// Finish whatever the machine suspended on and wake it.
fn complete_pending(vm: &mut Vm) {
    match vm.pending().cloned() {
        Some(Pending::Input) => {
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            vm.provide_input(line);
        }
        Some(Pending::Sleep { seconds: Some(s) }) => {
            thread::sleep(Duration::from_secs_f64(s.max(0.0)));
            vm.wake();
        }
        Some(Pending::Sleep { seconds: None }) => {
            // Resume on the next keypress.
            let _ = crossterm::event::read();
            vm.wake();
        }
        Some(Pending::Yield) => {
            thread::sleep(Duration::from_millis(16));
            vm.wake();
        }
        Some(Pending::Music) | Some(Pending::Sprite) => vm.wake(),
        None => vm.wake(),
    }
}

fn cmd_test(rest: &[String]) {
    let (_, src) = read_source(rest);
    let inputs = match rest.iter().position(|a| a == "--input") {
        Some(i) => match rest.get(i + 1).map(|p| std::fs::read_to_string(p)) {
            Some(Ok(text)) => text.lines().map(str::to_string).collect(),
            _ => {
                eprintln!("--input needs a readable file");
                exit(2);
            }
        },
        None => Vec::new(),
    };
    let program = build(&src, true);
    let console = TestConsole::with_inputs(inputs).echo(true);
    let mut vm = Vm::new(
        program,
        Box::new(console),
        Box::new(NullAudio),
        Box::new(MemoryFiles::new()),
    );
    if let Err(e) = vm.run() {
        eprintln!("?{}", e);
        exit(1);
    }
}

fn cmd_lex(rest: &[String]) {
    let (_, src) = read_source(rest);
    let mut tokenizer = Tokenizer::new(&src);
    loop {
        match tokenizer.next_token() {
            Ok(tok) => {
                let eof = tok.is_eof();
                println!("{:>5}  {:<12} {:?}", tok.locus.to_string(), tok.id, tok.text);
                if eof {
                    break;
                }
            }
            Err(e) => {
                eprintln!("?{}", e);
                exit(1);
            }
        }
    }
}

fn cmd_parse(rest: &[String]) {
    let (_, src) = read_source(rest);
    match parse(&src) {
        Ok(ast) => println!("{:#?}", ast),
        Err(errors) => {
            for e in errors {
                eprintln!("?{}", e);
            }
            exit(1);
        }
    }
}

fn cmd_asm(rest: &[String]) {
    let (_, src) = read_source(rest);
    let program = build(&src, false);
    print!("{}", program.listing());
}

fn cmd_analyze(rest: &[String]) {
    let (_, src) = read_source(rest);
    let diags = analyze_source(&src);
    if rest.iter().any(|a| a == "--json") {
        match serde_json::to_string_pretty(&diags) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("json: {}", e);
                exit(1);
            }
        }
        return;
    }
    if diags.errors.is_empty() {
        println!("No errors.");
    } else {
        println!("Errors:");
        for e in &diags.errors {
            println!("- {}:{}: {}", e.line, e.column, e.message);
        }
    }
    if !diags.symbols.is_empty() {
        println!("Symbols:");
        for s in &diags.symbols {
            println!("- {:?} {} @{}:{}", s.kind, s.name, s.line, s.column);
        }
    }
}
