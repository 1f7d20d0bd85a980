use crate::types::CType;

/// x86-64 registers the generator works with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    R8 = 8,
    R9 = 9,
}

impl Reg {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Register class requested from `gv`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegClass {
    /// any integer scratch register
    Int,
    Rax,
    Rcx,
    Rdx,
}

impl RegClass {
    pub fn matches(self, r: Reg) -> bool {
        match self {
            Self::Int => matches!(r, Reg::Rax | Reg::Rcx | Reg::Rdx),
            Self::Rax => r == Reg::Rax,
            Self::Rcx => r == Reg::Rcx,
            Self::Rdx => r == Reg::Rdx,
        }
    }

    /// The register loaded when the class has to be satisfied fresh.
    pub fn pick(self) -> Reg {
        match self {
            Self::Int | Self::Rax => Reg::Rax,
            Self::Rcx => Reg::Rcx,
            Self::Rdx => Reg::Rdx,
        }
    }
}

/// Where a partially-evaluated operand currently lives.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Storage {
    /// live in a machine register
    Reg(Reg),
    /// constant held in the value's `c` field
    Const,
    /// frame-relative slot at offset `c`
    Local,
    /// address of an lvalue already materialized on the stack
    LocalAddr,
    /// value is in the CPU flags
    CmpFlags,
    /// value is the "taken" edge of a conditional jump
    Branch { inverted: bool },
}

/// One entry of the value stack: a deferred expression operand.
#[derive(Clone, Debug)]
pub struct Value {
    pub t: CType,
    pub st: Storage,
    /// the entry denotes a memory cell, not its contents
    pub lval: bool,
    /// global symbol backing a direct reference (functions)
    pub sym: Option<usize>,
    pub c: i64,
}
