//! File device over the real filesystem, line-oriented.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};

use sorrel_vm::{FileOpenMode, FileSys};

enum Handle {
    Read(BufReader<File>),
    Write(File),
}

pub struct StdFiles {
    open: HashMap<u32, Handle>,
    next: u32,
}

impl StdFiles {
    pub fn new() -> StdFiles {
        StdFiles { open: HashMap::new(), next: 1 }
    }
}

impl FileSys for StdFiles {
    fn open(&mut self, path: &str, mode: FileOpenMode) -> io::Result<u32> {
        let handle = match mode {
            FileOpenMode::Read => Handle::Read(BufReader::new(File::open(path)?)),
            FileOpenMode::Write => Handle::Write(File::create(path)?),
            FileOpenMode::Append => {
                Handle::Write(OpenOptions::new().create(true).append(true).open(path)?)
            }
        };
        let id = self.next;
        self.next += 1;
        self.open.insert(id, handle);
        Ok(id)
    }

    fn write_line(&mut self, handle: u32, line: &str) -> io::Result<()> {
        match self.open.get_mut(&handle) {
            Some(Handle::Write(f)) => writeln!(f, "{}", line),
            Some(Handle::Read(_)) => {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "file opened for INPUT"))
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "bad file handle")),
        }
    }

    fn read_line(&mut self, handle: u32) -> io::Result<Option<String>> {
        match self.open.get_mut(&handle) {
            Some(Handle::Read(r)) => {
                let mut line = String::new();
                let n = r.read_line(&mut line)?;
                if n == 0 {
                    return Ok(None);
                }
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(Some(line))
            }
            Some(Handle::Write(_)) => {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "file not opened for INPUT"))
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "bad file handle")),
        }
    }

    fn close(&mut self, handle: u32) {
        self.open.remove(&handle);
    }
}
