use std::env;
use std::fs;
use std::process::Command;

fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
    let mut p = env::temp_dir();
    p.push(format!(
        "sorrelc_{}_{}",
        name,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    fs::write(&p, contents).expect("write temp source");
    p
}

#[test]
fn test_mode_runs_a_program() {
    let src = write_temp("add.bas", "PRINT 1 + 2\n");
    let output = Command::new(env!("CARGO_BIN_EXE_sorrelc"))
        .arg("test")
        .arg(&src)
        .output()
        .expect("spawn sorrelc");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "3\n");
    let _ = fs::remove_file(&src);
}

#[test]
fn test_mode_feeds_scripted_input() {
    let src = write_temp("input.bas", "INPUT X%\nPRINT X% * 2\n");
    let input = write_temp("input.txt", "21\n");
    let output = Command::new(env!("CARGO_BIN_EXE_sorrelc"))
        .arg("test")
        .arg(&src)
        .arg("--input")
        .arg(&input)
        .output()
        .expect("spawn sorrelc");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "? 42\n");
    let _ = fs::remove_file(&src);
    let _ = fs::remove_file(&input);
}

#[test]
fn asm_lists_instructions() {
    let src = write_temp("asm.bas", "PRINT 1\n");
    let output = Command::new(env!("CARGO_BIN_EXE_sorrelc"))
        .arg("asm")
        .arg(&src)
        .output()
        .expect("spawn sorrelc");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PUSHCONST(1)"), "listing:\n{}", stdout);
    assert!(stdout.contains("SYSCALL(print)"), "listing:\n{}", stdout);
    let _ = fs::remove_file(&src);
}

#[test]
fn analyze_emits_json() {
    let src = write_temp("an.bas", "SUB S\nEND SUB\n");
    let output = Command::new(env!("CARGO_BIN_EXE_sorrelc"))
        .arg("analyze")
        .arg(&src)
        .arg("--json")
        .output()
        .expect("spawn sorrelc");
    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid JSON from analyze");
    assert!(parsed["symbols"].as_array().map_or(false, |s| !s.is_empty()));
    let _ = fs::remove_file(&src);
}

#[test]
fn compile_errors_exit_nonzero() {
    let src = write_temp("bad.bas", "GOTO NOWHERE\n");
    let output = Command::new(env!("CARGO_BIN_EXE_sorrelc"))
        .arg("run")
        .arg(&src)
        .output()
        .expect("spawn sorrelc");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("NOWHERE"));
    let _ = fs::remove_file(&src);
}
