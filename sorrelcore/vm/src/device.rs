//! Device interfaces the engine delegates side effects to, plus the test
//! implementations used by `test_mode` runs and the test suites.
//!
//! The terminal/graphics surface and the audio device are external
//! collaborators; the engine only ever talks to these traits.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;

/// Reply from a console input request. Interactive consoles answer
/// `Pending` and deliver the line later through `Vm::provide_input`.
pub enum InputReply {
    Ready(String),
    Pending,
}

/// Reply from a device operation that may complete asynchronously.
pub enum DeviceReply {
    Done,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpenMode {
    Read,
    Write,
    Append,
}

impl FileOpenMode {
    pub fn from_name(name: &str) -> Option<FileOpenMode> {
        match name {
            "INPUT" => Some(FileOpenMode::Read),
            "OUTPUT" => Some(FileOpenMode::Write),
            "APPEND" => Some(FileOpenMode::Append),
            _ => None,
        }
    }
}

pub trait Console {
    fn reset(&mut self, test_mode: bool);
    fn cls(&mut self);
    fn locate(&mut self, row: i64, col: i64);
    fn color(&mut self, fg: i64, bg: Option<i64>, border: Option<i64>);
    fn screen(&mut self, mode: i64);
    fn width(&mut self, w: i64, h: i64);
    fn print(&mut self, s: &str);
    /// Current cursor column, 0-based, for tab-stop arithmetic.
    fn col(&self) -> usize;
    fn input(&mut self) -> InputReply;
    /// −1 when no key is buffered; 0 prefixes an escape whose scan code
    /// comes from the next read.
    fn get_key_from_buffer(&mut self) -> i32;
    fn create_sprite(&mut self, n: i64, image: &str, frames: i64) -> DeviceReply;
    fn offset_sprite(&mut self, n: i64, x: f64, y: f64);
    fn scale_sprite(&mut self, n: i64, sx: f64, sy: f64);
    fn rotate_sprite(&mut self, n: i64, angle: f64);
    fn home_sprite(&mut self, n: i64, hx: f64, hy: f64);
    fn display_sprite(&mut self, n: i64, show: bool);
    fn animate_sprite(&mut self, n: i64, from: i64, to: i64, loop_anim: bool);
    fn clear_sprite(&mut self, n: i64);
}

pub trait Audio {
    fn play_music(&mut self, music: &str, repeat: bool) -> DeviceReply;
    fn stop_music(&mut self);
}

pub trait FileSys {
    fn open(&mut self, path: &str, mode: FileOpenMode) -> io::Result<u32>;
    fn write_line(&mut self, handle: u32, line: &str) -> io::Result<()>;
    fn read_line(&mut self, handle: u32) -> io::Result<Option<String>>;
    fn close(&mut self, handle: u32);
}

/// Console that records output into a shared buffer and answers input
/// from a script. Every operation completes immediately, so a program in
/// test mode never suspends.
pub struct TestConsole {
    out: Rc<RefCell<String>>,
    inputs: VecDeque<String>,
    keys: VecDeque<i32>,
    col: usize,
    echo: bool,
}

impl TestConsole {
    pub fn new() -> TestConsole {
        TestConsole { out: Rc::new(RefCell::new(String::new())), inputs: VecDeque::new(), keys: VecDeque::new(), col: 0, echo: false }
    }

    pub fn with_inputs<I: IntoIterator<Item = String>>(lines: I) -> TestConsole {
        let mut c = TestConsole::new();
        c.inputs = lines.into_iter().collect();
        c
    }

    /// Mirror everything to stdout as well (used by the CLI's test mode).
    pub fn echo(mut self, on: bool) -> TestConsole {
        self.echo = on;
        self
    }

    pub fn push_key(&mut self, key: i32) {
        self.keys.push_back(key);
    }

    /// Shared handle to the captured output; clone it before the console
    /// moves into the VM.
    pub fn buffer(&self) -> Rc<RefCell<String>> {
        self.out.clone()
    }
}

impl Default for TestConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for TestConsole {
    fn reset(&mut self, _test_mode: bool) {
        self.out.borrow_mut().clear();
        self.col = 0;
    }

    fn cls(&mut self) {
        self.col = 0;
    }

    fn locate(&mut self, _row: i64, col: i64) {
        self.col = (col.max(1) - 1) as usize;
    }

    fn color(&mut self, _fg: i64, _bg: Option<i64>, _border: Option<i64>) {}
    fn screen(&mut self, _mode: i64) {}
    fn width(&mut self, _w: i64, _h: i64) {}

    fn print(&mut self, s: &str) {
        if self.echo {
            print!("{}", s);
        }
        self.out.borrow_mut().push_str(s);
        match s.rfind('\n') {
            Some(pos) => self.col = s[pos + 1..].chars().count(),
            None => self.col += s.chars().count(),
        }
    }

    fn col(&self) -> usize {
        self.col
    }

    fn input(&mut self) -> InputReply {
        InputReply::Ready(self.inputs.pop_front().unwrap_or_default())
    }

    fn get_key_from_buffer(&mut self) -> i32 {
        self.keys.pop_front().unwrap_or(-1)
    }

    fn create_sprite(&mut self, _n: i64, _image: &str, _frames: i64) -> DeviceReply {
        DeviceReply::Done
    }

    fn offset_sprite(&mut self, _n: i64, _x: f64, _y: f64) {}
    fn scale_sprite(&mut self, _n: i64, _sx: f64, _sy: f64) {}
    fn rotate_sprite(&mut self, _n: i64, _angle: f64) {}
    fn home_sprite(&mut self, _n: i64, _hx: f64, _hy: f64) {}
    fn display_sprite(&mut self, _n: i64, _show: bool) {}
    fn animate_sprite(&mut self, _n: i64, _from: i64, _to: i64, _loop_anim: bool) {}
    fn clear_sprite(&mut self, _n: i64) {}
}

/// Audio sink that completes every request immediately.
pub struct NullAudio;

impl Audio for NullAudio {
    fn play_music(&mut self, _music: &str, _repeat: bool) -> DeviceReply {
        DeviceReply::Done
    }

    fn stop_music(&mut self) {}
}

struct MemFile {
    path: String,
    lines: Vec<String>,
    cursor: usize,
    mode: FileOpenMode,
}

/// In-memory file store for tests: named line-oriented files that persist
/// across open/close within one VM.
pub struct MemoryFiles {
    store: HashMap<String, Vec<String>>,
    open: HashMap<u32, MemFile>,
    next: u32,
}

impl MemoryFiles {
    pub fn new() -> MemoryFiles {
        MemoryFiles { store: HashMap::new(), open: HashMap::new(), next: 1 }
    }

    pub fn seed(&mut self, path: &str, lines: &[&str]) {
        self.store.insert(path.to_string(), lines.iter().map(|s| s.to_string()).collect());
    }

    pub fn contents(&self, path: &str) -> Option<&[String]> {
        self.store.get(path).map(Vec::as_slice)
    }
}

impl Default for MemoryFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSys for MemoryFiles {
    fn open(&mut self, path: &str, mode: FileOpenMode) -> io::Result<u32> {
        let lines = match mode {
            FileOpenMode::Read => match self.store.get(path) {
                Some(lines) => lines.clone(),
                None => return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path))),
            },
            FileOpenMode::Write => Vec::new(),
            FileOpenMode::Append => self.store.get(path).cloned().unwrap_or_default(),
        };
        let handle = self.next;
        self.next += 1;
        self.open.insert(handle, MemFile { path: path.to_string(), lines, cursor: 0, mode });
        Ok(handle)
    }

    fn write_line(&mut self, handle: u32, line: &str) -> io::Result<()> {
        let file = self
            .open
            .get_mut(&handle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "bad file handle"))?;
        if file.mode == FileOpenMode::Read {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file opened for INPUT"));
        }
        file.lines.push(line.to_string());
        Ok(())
    }

    fn read_line(&mut self, handle: u32) -> io::Result<Option<String>> {
        let file = self
            .open
            .get_mut(&handle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "bad file handle"))?;
        if file.mode != FileOpenMode::Read {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file not opened for INPUT"));
        }
        match file.lines.get(file.cursor) {
            Some(line) => {
                file.cursor += 1;
                Ok(Some(line.clone()))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self, handle: u32) {
        if let Some(file) = self.open.remove(&handle) {
            if file.mode != FileOpenMode::Read {
                self.store.insert(file.path, file.lines);
            }
        }
    }
}
