//! The syscall layer: a registry of named system functions and
//! subroutines. Functions push exactly one result; subroutines push
//! nothing. Bodies read their operands off the stack (variadics pop the
//! actual argument count first) and delegate side effects to the device
//! interfaces.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use sorrel_bytecode::{ScalarTy, Type, Value, Variable};
use sorrel_common::{RunResult, RuntimeError, Trap};

use crate::device::{DeviceReply, FileOpenMode, InputReply};
use crate::{rt, Pending, Vm};

pub type SysFn = fn(&mut Vm) -> RunResult<()>;

/// Two tables: functions must push a result, subroutines may not.
pub struct Registry {
    functions: HashMap<&'static str, SysFn>,
    subroutines: HashMap<&'static str, SysFn>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry { functions: HashMap::new(), subroutines: HashMap::new() }
    }

    pub fn register_function(&mut self, name: &'static str, f: SysFn) {
        self.functions.insert(name, f);
    }

    pub fn register_subroutine(&mut self, name: &'static str, f: SysFn) {
        self.subroutines.insert(name, f);
    }

    pub fn lookup(&self, name: &str) -> Option<SysFn> {
        self.functions.get(name).or_else(|| self.subroutines.get(name)).copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn register_syscalls(reg: &mut Registry) {
    reg.register_function("RND", sys_rnd);
    reg.register_function("INT", sys_int);
    reg.register_function("VAL", sys_val);
    reg.register_function("TIMER", sys_timer);
    reg.register_function("PEEK", sys_peek);
    reg.register_function("CHR$", sys_chr);
    reg.register_function("STR$", sys_str);
    reg.register_function("SPACE$", sys_space);
    reg.register_function("LEN", sys_len);
    reg.register_function("LEFT$", sys_left);
    reg.register_function("RIGHT$", sys_right);
    reg.register_function("MID$", sys_mid);
    reg.register_function("LCASE$", sys_lcase);
    reg.register_function("UCASE$", sys_ucase);
    reg.register_function("INKEY$", sys_inkey);

    reg.register_subroutine("CLS", sys_cls);
    reg.register_subroutine("LOCATE", sys_locate);
    reg.register_subroutine("COLOR", sys_color);
    reg.register_subroutine("SCREEN", sys_screen);
    reg.register_subroutine("WIDTH", sys_width);
    reg.register_subroutine("INPUT", sys_input);
    reg.register_subroutine("READ", sys_read);
    reg.register_subroutine("SWAP", sys_swap);
    reg.register_subroutine("SLEEP", sys_sleep);
    reg.register_subroutine("YIELD", sys_yield);
    reg.register_subroutine("SYSTEM", sys_system);
    reg.register_subroutine("BEEP", sys_beep);
    reg.register_subroutine("RANDOMIZE", sys_randomize);
    reg.register_subroutine("PLAY", sys_play);
    reg.register_subroutine("BGMPLAY", sys_bgmplay);
    reg.register_subroutine("BGMSTOP", sys_bgmstop);
    reg.register_subroutine("SPSET", sys_spset);
    reg.register_subroutine("SPOFS", sys_spofs);
    reg.register_subroutine("SPSCALE", sys_spscale);
    reg.register_subroutine("SPROT", sys_sprot);
    reg.register_subroutine("SPHOME", sys_sphome);
    reg.register_subroutine("SPHIDE", sys_sphide);
    reg.register_subroutine("SPSHOW", sys_spshow);
    reg.register_subroutine("SPANIM", sys_spanim);
    reg.register_subroutine("SPCLR", sys_spclr);
    reg.register_subroutine("OPEN", sys_open);
    reg.register_subroutine("CLOSE", sys_close);
    reg.register_subroutine("WRITE#", sys_write_file);
    reg.register_subroutine("INPUT#", sys_input_file);
    reg.register_subroutine("print", sys_print);
    reg.register_subroutine("print_comma", sys_print_comma);
    reg.register_subroutine("print_tab", sys_print_tab);
    reg.register_subroutine("print_using", sys_print_using);
    reg.register_subroutine("alloc_scalar", sys_alloc_scalar);
    reg.register_subroutine("alloc_array", sys_alloc_array);
}

fn io_err(e: std::io::Error) -> RuntimeError {
    RuntimeError::new(Trap::IoError, e.to_string())
}

fn fmt_value(v: &Value) -> String {
    v.to_string()
}

/// Parse the leading numeric prefix of a string, VAL-style.
fn val_parse(s: &str) -> f64 {
    let t = s.trim_start();
    let mut end = 0;
    for (i, c) in t.char_indices() {
        if c.is_ascii_digit() || "+-.eE".contains(c) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    while end > 0 {
        if let Ok(v) = t[..end].parse::<f64>() {
            return v;
        }
        end -= 1;
    }
    0.0
}

/// Assign a console line into an INPUT target: string variables take the
/// text, numeric variables take its VAL.
pub(crate) fn assign_input(target: &Variable, line: &str) -> RunResult<()> {
    let is_string = matches!(target, Variable::Scalar { ty: Type::Scalar(ScalarTy::Str), .. });
    let v = if is_string { Value::Str(line.to_string()) } else { Value::Double(val_parse(line)) };
    target.assign(v).map_err(rt)
}

// ---- numeric functions ----------------------------------------------------

fn sys_rnd(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_f64()?;
    let v = if n == 0.0 { vm.last_random() } else { vm.next_random() };
    vm.push_value(Value::Single(v))
}

fn sys_int(vm: &mut Vm) -> RunResult<()> {
    let x = vm.pop_f64()?;
    vm.push_value(Value::Double(x.floor()))
}

fn sys_val(vm: &mut Vm) -> RunResult<()> {
    let s = vm.pop_str()?;
    vm.push_value(Value::Double(val_parse(&s)))
}

fn sys_timer(vm: &mut Vm) -> RunResult<()> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_millis() % 86_400_000) as f64 / 1000.0)
        .unwrap_or(0.0);
    vm.push_value(Value::Single(secs as f32))
}

/// Deliberate stub: always 0, matching the programs written against it.
fn sys_peek(vm: &mut Vm) -> RunResult<()> {
    let _addr = vm.pop_i64()?;
    vm.push_value(Value::Integer(0))
}

// ---- string functions -----------------------------------------------------

fn sys_chr(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_i64()?;
    let s = if (0..=0x10FFFF).contains(&n) {
        char::from_u32(n as u32).map(|c| c.to_string()).unwrap_or_default()
    } else {
        String::new()
    };
    vm.push_value(Value::Str(s))
}

fn sys_str(vm: &mut Vm) -> RunResult<()> {
    let v = vm.pop_value()?;
    let n = v.as_f64().map_err(rt)?;
    let s = if n >= 0.0 { format!(" {}", fmt_value(&v)) } else { fmt_value(&v) };
    vm.push_value(Value::Str(s))
}

fn sys_space(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_i64()?.max(0) as usize;
    vm.push_value(Value::Str(" ".repeat(n)))
}

fn sys_len(vm: &mut Vm) -> RunResult<()> {
    let s = vm.pop_str()?;
    vm.push_value(Value::Integer(s.chars().count() as i32))
}

fn sys_left(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_i64()?;
    let s = vm.pop_str()?;
    let out = if n <= 0 { String::new() } else { s.chars().take(n as usize).collect() };
    vm.push_value(Value::Str(out))
}

fn sys_right(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_i64()?;
    let s = vm.pop_str()?;
    let out = if n <= 0 {
        String::new()
    } else {
        let total = s.chars().count();
        let skip = total.saturating_sub(n as usize);
        s.chars().skip(skip).collect()
    };
    vm.push_value(Value::Str(out))
}

fn sys_mid(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let len = if argc >= 3 { Some(vm.pop_i64()?) } else { None };
    let start = vm.pop_i64()?;
    let s = vm.pop_str()?;
    let skip = if start <= 1 { 0 } else { (start - 1) as usize };
    let it = s.chars().skip(skip);
    let out: String = match len {
        Some(l) if l <= 0 => String::new(),
        Some(l) => it.take(l as usize).collect(),
        None => it.collect(),
    };
    vm.push_value(Value::Str(out))
}

fn sys_lcase(vm: &mut Vm) -> RunResult<()> {
    let s = vm.pop_str()?;
    vm.push_value(Value::Str(s.to_lowercase()))
}

fn sys_ucase(vm: &mut Vm) -> RunResult<()> {
    let s = vm.pop_str()?;
    vm.push_value(Value::Str(s.to_uppercase()))
}

/// Non-blocking keyboard read. A zero from the buffer prefixes a scan
/// code; the classic two-character CHR$(0) + CHR$(code) string comes back.
fn sys_inkey(vm: &mut Vm) -> RunResult<()> {
    let key = vm.console.get_key_from_buffer();
    let s = match key {
        -1 => String::new(),
        0 => {
            let scan = vm.console.get_key_from_buffer().max(0);
            let mut s = String::from('\0');
            s.push(char::from_u32(scan as u32).unwrap_or('\0'));
            s
        }
        k => char::from_u32(k as u32).map(|c| c.to_string()).unwrap_or_default(),
    };
    vm.push_value(Value::Str(s))
}

// ---- console subroutines --------------------------------------------------

fn sys_cls(vm: &mut Vm) -> RunResult<()> {
    vm.console.cls();
    Ok(())
}

fn sys_locate(vm: &mut Vm) -> RunResult<()> {
    let col = vm.pop_i64()?;
    let row = vm.pop_i64()?;
    vm.console.locate(row, col);
    Ok(())
}

fn sys_color(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let border = if argc >= 3 { Some(vm.pop_i64()?) } else { None };
    let bg = if argc >= 2 { Some(vm.pop_i64()?) } else { None };
    let fg = vm.pop_i64()?;
    vm.console.color(fg, bg, border);
    Ok(())
}

fn sys_screen(vm: &mut Vm) -> RunResult<()> {
    let mode = vm.pop_i64()?;
    vm.console.screen(mode);
    Ok(())
}

fn sys_width(vm: &mut Vm) -> RunResult<()> {
    let h = vm.pop_i64()?;
    let w = vm.pop_i64()?;
    vm.console.width(w, h);
    Ok(())
}

fn sys_input(vm: &mut Vm) -> RunResult<()> {
    let target = vm.pop_var()?;
    match vm.console.input() {
        InputReply::Ready(line) => assign_input(&target, &line),
        InputReply::Pending => {
            vm.suspend_input(target);
            Ok(())
        }
    }
}

fn sys_read(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let mut targets = Vec::with_capacity(argc);
    for _ in 0..argc {
        targets.push(vm.pop_var()?);
    }
    targets.reverse();
    for target in targets {
        match vm.read_data()? {
            Some(v) => target.assign(v).map_err(rt)?,
            None => {} // empty DATA slot leaves the default
        }
    }
    Ok(())
}

fn sys_swap(vm: &mut Vm) -> RunResult<()> {
    let b = vm.pop_var()?;
    let a = vm.pop_var()?;
    let va = a.value().map_err(rt)?;
    let vb = b.value().map_err(rt)?;
    a.assign(vb).map_err(rt)?;
    b.assign(va).map_err(rt)
}

// ---- printing -------------------------------------------------------------

const TAB_STOP: usize = 14;

fn sys_print(vm: &mut Vm) -> RunResult<()> {
    let v = vm.pop_value()?;
    vm.console.print(&fmt_value(&v));
    Ok(())
}

/// Advance to the next 14-column zone.
fn sys_print_comma(vm: &mut Vm) -> RunResult<()> {
    let col = vm.console.col();
    let pad = TAB_STOP - col % TAB_STOP;
    vm.console.print(&" ".repeat(pad));
    Ok(())
}

fn sys_print_tab(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_i64()?.max(1) as usize;
    let target = n - 1;
    let col = vm.console.col();
    if col < target {
        vm.console.print(&" ".repeat(target - col));
    }
    Ok(())
}

fn sys_print_using(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let mut all = vm.pop_values(argc)?;
    let terminator = all.pop().and_then(|v| v.as_str().map(str::to_string).ok()).unwrap_or_default();
    if all.is_empty() {
        return Err(RuntimeError::new(Trap::IoError, "PRINT USING needs a format string"));
    }
    let format = all.remove(0).as_str().map(str::to_string).map_err(rt)?;
    print_using(vm, &format, &all, &terminator);
    Ok(())
}

/// Scan the format left to right. Runs of `#` with embedded `,` delimit a
/// numeric field; the argument is stringified and right-aligned in the
/// field, truncating leading characters on overflow. Everything else goes
/// through verbatim. A non-numeric argument is a type-mismatch diagnostic
/// that stops formatting.
fn print_using(vm: &mut Vm, format: &str, args: &[Value], terminator: &str) {
    let mut out = String::new();
    let mut arg_i = 0;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.peek().copied() {
        if c == '#' {
            let mut digits = 0usize;
            let mut width = 0usize;
            while let Some(c2) = chars.peek().copied() {
                if c2 == '#' {
                    digits += 1;
                    width += 1;
                    chars.next();
                } else if c2 == ',' && digits > 0 {
                    width += 1;
                    chars.next();
                } else {
                    break;
                }
            }
            let arg = args.get(arg_i);
            let numeric = arg.and_then(|v| v.as_f64().ok());
            match (arg, numeric) {
                (Some(v), Some(_)) => {
                    arg_i += 1;
                    let mut s = fmt_value(v);
                    if s.len() > digits {
                        s = s[s.len() - digits..].to_string();
                    }
                    out.push_str(&format!("{:>1$}", s, width));
                }
                _ => {
                    vm.console.print(&out);
                    vm.console.print("%TYPE MISMATCH IN PRINT USING\n");
                    return;
                }
            }
        } else {
            out.push(c);
            chars.next();
        }
    }
    vm.console.print(&out);
    match terminator {
        "," => {
            let col = vm.console.col();
            let pad = TAB_STOP - col % TAB_STOP;
            vm.console.print(&" ".repeat(pad));
        }
        ";" => {}
        _ => vm.console.print("\n"),
    }
}

// ---- flow -----------------------------------------------------------------

fn sys_sleep(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let seconds = if argc >= 1 { Some(vm.pop_f64()?) } else { None };
    if !vm.test_mode() {
        vm.suspend(Pending::Sleep { seconds });
    }
    Ok(())
}

fn sys_yield(vm: &mut Vm) -> RunResult<()> {
    if !vm.test_mode() {
        vm.suspend(Pending::Yield);
    }
    Ok(())
}

fn sys_system(vm: &mut Vm) -> RunResult<()> {
    vm.halt();
    Ok(())
}

fn sys_beep(vm: &mut Vm) -> RunResult<()> {
    vm.console.print("\u{7}");
    Ok(())
}

/// Deliberate stub: the seed argument is discarded.
fn sys_randomize(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    for _ in 0..argc {
        let _ = vm.pop_value()?;
    }
    Ok(())
}

// ---- audio ----------------------------------------------------------------

fn sys_play(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let repeat = if argc >= 2 { vm.pop_i64()? != 0 } else { false };
    let music = vm.pop_str()?;
    let reply = vm.audio.play_music(&music, repeat);
    if matches!(reply, DeviceReply::Pending) && !vm.test_mode() {
        vm.suspend(Pending::Music);
    }
    Ok(())
}

fn sys_bgmplay(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let repeat = if argc >= 2 { vm.pop_i64()? != 0 } else { true };
    let music = vm.pop_str()?;
    let _ = vm.audio.play_music(&music, repeat);
    Ok(())
}

fn sys_bgmstop(vm: &mut Vm) -> RunResult<()> {
    vm.audio.stop_music();
    Ok(())
}

// ---- sprites ---------------------------------------------------------------

fn sys_spset(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let frames = if argc >= 3 { vm.pop_i64()? } else { 1 };
    let image = vm.pop_str()?;
    let n = vm.pop_i64()?;
    let reply = vm.console.create_sprite(n, &image, frames);
    if matches!(reply, DeviceReply::Pending) && !vm.test_mode() {
        vm.suspend(Pending::Sprite);
    }
    Ok(())
}

fn sys_spofs(vm: &mut Vm) -> RunResult<()> {
    let y = vm.pop_f64()?;
    let x = vm.pop_f64()?;
    let n = vm.pop_i64()?;
    vm.console.offset_sprite(n, x, y);
    Ok(())
}

fn sys_spscale(vm: &mut Vm) -> RunResult<()> {
    let sy = vm.pop_f64()?;
    let sx = vm.pop_f64()?;
    let n = vm.pop_i64()?;
    vm.console.scale_sprite(n, sx, sy);
    Ok(())
}

fn sys_sprot(vm: &mut Vm) -> RunResult<()> {
    let angle = vm.pop_f64()?;
    let n = vm.pop_i64()?;
    vm.console.rotate_sprite(n, angle);
    Ok(())
}

fn sys_sphome(vm: &mut Vm) -> RunResult<()> {
    let hy = vm.pop_f64()?;
    let hx = vm.pop_f64()?;
    let n = vm.pop_i64()?;
    vm.console.home_sprite(n, hx, hy);
    Ok(())
}

fn sys_sphide(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_i64()?;
    vm.console.display_sprite(n, false);
    Ok(())
}

fn sys_spshow(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_i64()?;
    vm.console.display_sprite(n, true);
    Ok(())
}

fn sys_spanim(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let loop_anim = if argc >= 4 { vm.pop_i64()? != 0 } else { false };
    let to = vm.pop_i64()?;
    let from = vm.pop_i64()?;
    let n = vm.pop_i64()?;
    vm.console.animate_sprite(n, from, to, loop_anim);
    Ok(())
}

fn sys_spclr(vm: &mut Vm) -> RunResult<()> {
    let n = vm.pop_i64()?;
    vm.console.clear_sprite(n);
    Ok(())
}

// ---- files -----------------------------------------------------------------

fn sys_open(vm: &mut Vm) -> RunResult<()> {
    let fileno = vm.pop_i64()?;
    let mode_name = vm.pop_str()?;
    let path = vm.pop_str()?;
    let mode = FileOpenMode::from_name(&mode_name)
        .ok_or_else(|| RuntimeError::new(Trap::IoError, format!("bad file mode {}", mode_name)))?;
    let handle = vm.files.open(&path, mode).map_err(io_err)?;
    vm.file_handles.insert(fileno, handle);
    Ok(())
}

fn sys_close(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    if argc == 0 {
        for (_, handle) in std::mem::take(&mut vm.file_handles) {
            vm.files.close(handle);
        }
        return Ok(());
    }
    let fileno = vm.pop_i64()?;
    if let Some(handle) = vm.file_handles.remove(&fileno) {
        vm.files.close(handle);
    }
    Ok(())
}

fn file_handle(vm: &Vm, fileno: i64) -> RunResult<u32> {
    vm.file_handles
        .get(&fileno)
        .copied()
        .ok_or_else(|| RuntimeError::new(Trap::IoError, format!("file #{} is not open", fileno)))
}

/// WRITE# prints comma-separated fields with strings quoted, the way the
/// matching INPUT# reads them back.
fn sys_write_file(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let mut vals = vm.pop_values(argc)?;
    if vals.is_empty() {
        return Err(RuntimeError::new(Trap::IoError, "WRITE# needs a file number"));
    }
    let fileno = vals.remove(0).as_i64().map_err(rt)?;
    let handle = file_handle(vm, fileno)?;
    let line = vals
        .iter()
        .map(|v| match v {
            Value::Str(s) => format!("\"{}\"", s),
            other => fmt_value(other),
        })
        .collect::<Vec<_>>()
        .join(",");
    vm.files.write_line(handle, &line).map_err(io_err)
}

fn sys_input_file(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let mut targets = Vec::with_capacity(argc.saturating_sub(1));
    for _ in 1..argc {
        targets.push(vm.pop_var()?);
    }
    targets.reverse();
    let fileno = vm.pop_i64()?;
    let handle = file_handle(vm, fileno)?;
    let line = vm
        .files
        .read_line(handle)
        .map_err(io_err)?
        .ok_or_else(|| RuntimeError::new(Trap::IoError, "input past end of file"))?;
    let mut fields = line.split(',');
    for target in targets {
        let field = fields.next().unwrap_or("").trim();
        let field = field.strip_prefix('"').and_then(|f| f.strip_suffix('"')).unwrap_or(field);
        assign_input(&target, field)?;
    }
    Ok(())
}

// ---- allocation ------------------------------------------------------------

fn sys_alloc_scalar(vm: &mut Vm) -> RunResult<()> {
    let tyname = vm.pop_str()?;
    let name = vm.pop_str()?;
    let ty = vm.resolve_type(&tyname)?;
    vm.bind(&name, Variable::scalar(ty));
    Ok(())
}

fn sys_alloc_array(vm: &mut Vm) -> RunResult<()> {
    let argc = vm.pop_count()?;
    let pairs = argc.saturating_sub(2) / 2;
    let mut bounds = Vec::with_capacity(pairs * 2);
    for _ in 0..pairs * 2 {
        bounds.push(vm.pop_i64()?);
    }
    bounds.reverse();
    let tyname = vm.pop_str()?;
    let name = vm.pop_str()?;
    let ty = vm.resolve_type(&tyname)?;
    let dims: Vec<(i64, i64)> = bounds.chunks(2).map(|c| (c[0], c[1])).collect();
    let arr = sorrel_bytecode::ArrayVar::new(ty, dims).map_err(rt)?;
    vm.bind(&name, Variable::Array(std::rc::Rc::new(arr)));
    Ok(())
}
