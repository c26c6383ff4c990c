//! Terminal console on crossterm: ANSI clear/locate/color, raw-mode key
//! polling for INKEY$, line input delegated to the host loop. Sprites have
//! no terminal rendering and are accepted as no-ops.

use std::collections::VecDeque;
use std::io::{stdout, Write};

use crossterm::cursor::MoveTo;
use crossterm::event::{poll, read, Event, KeyCode, KeyEvent};
use crossterm::style::{Color, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use crossterm::execute;

use sorrel_vm::{Console, DeviceReply, InputReply};

pub struct TerminalConsole {
    col: usize,
    keys: VecDeque<i32>,
}

impl TerminalConsole {
    pub fn new() -> TerminalConsole {
        TerminalConsole { col: 0, keys: VecDeque::new() }
    }

    fn poll_key(&mut self) {
        if enable_raw_mode().is_err() {
            return;
        }
        if let Ok(true) = poll(std::time::Duration::from_millis(0)) {
            if let Ok(Event::Key(KeyEvent { code, .. })) = read() {
                match code {
                    KeyCode::Char(c) => self.keys.push_back(c as i32),
                    KeyCode::Enter => self.keys.push_back(13),
                    KeyCode::Backspace => self.keys.push_back(8),
                    KeyCode::Tab => self.keys.push_back(9),
                    KeyCode::Esc => self.keys.push_back(27),
                    // Extended keys arrive as a 0 prefix plus the classic
                    // scan code.
                    KeyCode::Up => self.keys.extend([0, 72]),
                    KeyCode::Down => self.keys.extend([0, 80]),
                    KeyCode::Left => self.keys.extend([0, 75]),
                    KeyCode::Right => self.keys.extend([0, 77]),
                    _ => {}
                }
            }
        }
        let _ = disable_raw_mode();
    }
}

fn basic_color(n: i64) -> Color {
    match n & 15 {
        0 => Color::Black,
        1 => Color::DarkBlue,
        2 => Color::DarkGreen,
        3 => Color::DarkCyan,
        4 => Color::DarkRed,
        5 => Color::DarkMagenta,
        6 => Color::DarkYellow,
        7 => Color::Grey,
        8 => Color::DarkGrey,
        9 => Color::Blue,
        10 => Color::Green,
        11 => Color::Cyan,
        12 => Color::Red,
        13 => Color::Magenta,
        14 => Color::Yellow,
        _ => Color::White,
    }
}

impl Console for TerminalConsole {
    fn reset(&mut self, _test_mode: bool) {
        self.col = 0;
        self.keys.clear();
        let _ = execute!(stdout(), ResetColor);
    }

    fn cls(&mut self) {
        self.col = 0;
        let _ = execute!(stdout(), Clear(ClearType::All), MoveTo(0, 0));
    }

    fn locate(&mut self, row: i64, col: i64) {
        self.col = (col.max(1) - 1) as usize;
        let _ = execute!(stdout(), MoveTo((col.max(1) - 1) as u16, (row.max(1) - 1) as u16));
    }

    fn color(&mut self, fg: i64, bg: Option<i64>, _border: Option<i64>) {
        let _ = execute!(stdout(), SetForegroundColor(basic_color(fg)));
        if let Some(bg) = bg {
            let _ = execute!(stdout(), SetBackgroundColor(basic_color(bg)));
        }
    }

    fn screen(&mut self, _mode: i64) {}
    fn width(&mut self, _w: i64, _h: i64) {}

    fn print(&mut self, s: &str) {
        print!("{}", s);
        let _ = stdout().flush();
        match s.rfind('\n') {
            Some(pos) => self.col = s[pos + 1..].chars().count(),
            None => self.col += s.chars().count(),
        }
    }

    fn col(&self) -> usize {
        self.col
    }

    fn input(&mut self) -> InputReply {
        // The host loop reads the line and resumes the machine.
        InputReply::Pending
    }

    fn get_key_from_buffer(&mut self) -> i32 {
        if self.keys.is_empty() {
            self.poll_key();
        }
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
