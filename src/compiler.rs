//! The compiler state and its lifecycle.
//!
//! One `Compiler` owns everything a translation unit needs: the include
//! stack, the current token, the four symbol stacks, the value stack, the
//! sections, and the diagnostic counters. Non-fatal diagnostics print to
//! stderr and bump a counter; only I/O failures abort compilation.

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::{error, fmt};

use crate::gen::{CodeLabel, LoopLabels, Storage, Value, VSTACK_SIZE};
use crate::lexer::{BufferedFile, FileStack, LexError, Token};
use crate::section::{Section, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS, SHT_PROGBITS};
use crate::sym::{Sym, SymStack};
use crate::types::CType;
use crate::{parser, pe};

/// Errors that abort compilation outright.
#[derive(Debug)]
pub enum FatalError {
    CannotOpen(PathBuf, io::Error),
    CannotCreate(PathBuf, io::Error),
    Write(PathBuf, io::Error),
}

impl error::Error for FatalError {}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::CannotOpen(p, e) => write!(f, "cannot open file '{}': {e}", p.display()),
            Self::CannotCreate(p, e) => {
                write!(f, "cannot create output file '{}': {e}", p.display())
            }
            Self::Write(p, e) => write!(f, "cannot write output file '{}': {e}", p.display()),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputKind {
    Exe,
    Obj,
}

/// A symbol reference into either the local or the global stack.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SymRef {
    Local(usize),
    Global(usize),
}

pub struct Compiler {
    /// include stack of open source files
    pub files: FileStack,
    /// the token being looked at
    pub tok: Token,

    /// macro definitions (the preprocessor is not implemented)
    pub defines: SymStack,
    pub globals: SymStack,
    pub locals: SymStack,
    /// named statement labels (goto is not implemented)
    pub labels: SymStack,
    pub local_scope: u32,

    pub vstack: Vec<Value>,
    pub code_labels: Vec<CodeLabel>,
    pub loops: Vec<LoopLabels>,

    pub sections: Vec<Section>,
    pub text_sec: usize,
    pub data_sec: usize,
    pub bss_sec: usize,
    pub rdata_sec: Option<usize>,

    /// current offset into the text section
    pub ind: usize,
    /// frame offset cursor for locals and spills
    pub loc: i64,
    /// return type of the function being compiled
    pub func_ret: CType,

    pub output_type: OutputKind,
    pub nb_errors: u32,
    pub nb_warnings: u32,
}

impl Compiler {
    pub fn new() -> Self {
        let sections = vec![
            Section::new(".text", SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR),
            Section::new(".data", SHT_PROGBITS, SHF_ALLOC | SHF_WRITE),
            Section::new(".bss", SHT_NOBITS, SHF_ALLOC | SHF_WRITE),
        ];
        Self {
            files: FileStack::new(),
            tok: Token::Eof,
            defines: SymStack::new(),
            globals: SymStack::new(),
            locals: SymStack::new(),
            labels: SymStack::new(),
            local_scope: 0,
            vstack: Vec::with_capacity(VSTACK_SIZE),
            code_labels: Vec::new(),
            loops: Vec::new(),
            sections,
            text_sec: 0,
            data_sec: 1,
            bss_sec: 2,
            rdata_sec: None,
            ind: 0,
            loc: 0,
            func_ret: CType::INT,
            output_type: OutputKind::Exe,
            nb_errors: 0,
            nb_warnings: 0,
        }
    }

    /// Compile one source file into the sections. Diagnostics are counted;
    /// only failing to open the file is fatal.
    pub fn compile(&mut self, path: &Path) -> Result<(), FatalError> {
        let file =
            BufferedFile::open(path).map_err(|e| FatalError::CannotOpen(path.to_owned(), e))?;
        if !self.files.push(file) {
            self.error(LexError::TooManyIncludes);
            return Ok(());
        }
        self.next();
        parser::parse_file(self);
        self.files.pop();
        Ok(())
    }

    /// Serialize the sections into a PE32+ image.
    pub fn output_file(&mut self, path: &Path) -> Result<(), FatalError> {
        pe::output_file(self, path)
    }

    pub fn error(&mut self, msg: impl Display) {
        match self.files.current() {
            Some(f) => eprintln!("{}:{}: error: {msg}", f.filename, f.line),
            None => eprintln!("tcc: error: {msg}"),
        }
        self.nb_errors += 1;
    }

    pub fn warning(&mut self, msg: impl Display) {
        match self.files.current() {
            Some(f) => eprintln!("{}:{}: warning: {msg}", f.filename, f.line),
            None => eprintln!("tcc: warning: {msg}"),
        }
        self.nb_warnings += 1;
    }

    /// Push a symbol into the stack the current scope dictates.
    pub fn sym_push(&mut self, name: String, t: CType, st: Storage, c: i64) -> SymRef {
        if self.local_scope > 0 {
            SymRef::Local(self.locals.push(name, t, st, c))
        } else {
            SymRef::Global(self.globals.push(name, t, st, c))
        }
    }

    /// Look a name up in the local scope first, then globally.
    pub fn sym_find(&self, name: &str) -> Option<SymRef> {
        if let Some(i) = self.locals.find(name) {
            return Some(SymRef::Local(i));
        }
        self.globals.find(name).map(SymRef::Global)
    }

    pub fn sym(&self, r: SymRef) -> &Sym {
        match r {
            SymRef::Local(i) => self.locals.get(i),
            SymRef::Global(i) => self.globals.get(i),
        }
    }

    /// The read-only data section, created on first use.
    pub fn rdata(&mut self) -> usize {
        if let Some(i) = self.rdata_sec {
            return i;
        }
        self.sections
            .push(Section::new(".rdata", SHT_PROGBITS, SHF_ALLOC));
        let i = self.sections.len() - 1;
        self.rdata_sec = Some(i);
        i
    }

    /// Compile from an in-memory buffer. Used by the test suite.
    pub fn compile_source(&mut self, name: &str, source: &str) {
        self.files.push(BufferedFile::from_source(name, source));
        self.next();
        parser::parse_file(self);
        self.files.pop();
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
