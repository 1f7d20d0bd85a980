use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

pub const MAX_INCLUDE_DEPTH: usize = 32;

/// One open source file with a single byte of lookahead.
pub struct BufferedFile {
    reader: Box<dyn BufRead>,
    peeked: Option<u8>,
    pub filename: String,
    pub line: u32,
}

impl BufferedFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: Box::new(BufReader::new(file)),
            peeked: None,
            filename: path.display().to_string(),
            line: 1,
        })
    }

    /// An in-memory source. Used by the test suite.
    pub fn from_source(name: &str, source: &str) -> Self {
        Self {
            reader: Box::new(io::Cursor::new(source.as_bytes().to_vec())),
            peeked: None,
            filename: name.to_owned(),
            line: 1,
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }
}

/// The include stack. The lexer always reads from the innermost file;
/// reaching its end does not pop automatically.
pub struct FileStack {
    files: Vec<BufferedFile>,
}

impl FileStack {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    pub fn push(&mut self, file: BufferedFile) -> bool {
        if self.files.len() >= MAX_INCLUDE_DEPTH {
            return false;
        }
        self.files.push(file);
        true
    }

    pub fn pop(&mut self) {
        self.files.pop();
    }

    pub fn current(&self) -> Option<&BufferedFile> {
        self.files.last()
    }

    pub fn peek(&mut self) -> Option<u8> {
        let f = self.files.last_mut()?;
        if f.peeked.is_none() {
            f.peeked = f.read_byte();
        }
        f.peeked
    }

    pub fn take(&mut self) -> Option<u8> {
        let f = self.files.last_mut()?;
        let b = match f.peeked.take() {
            Some(b) => Some(b),
            None => f.read_byte(),
        };
        if b == Some(b'\n') {
            f.line += 1;
        }
        b
    }

    /// Consume the next byte only if it equals `b`.
    pub fn take_if(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.take();
            return true;
        }
        false
    }

    /// Put one consumed byte back. There is a single byte of pushback.
    pub fn unget(&mut self, b: u8) {
        if let Some(f) = self.files.last_mut() {
            f.peeked = Some(b);
        }
    }
}

impl Default for FileStack {
    fn default() -> Self {
        Self::new()
    }
}
