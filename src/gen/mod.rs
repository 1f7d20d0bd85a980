//! Generic code generation: the value stack.
//!
//! The parser never builds a tree. Each production pushes descriptors of
//! partially-evaluated operands here and applies operators to the top of the
//! stack; `gv` materializes an operand into a register at the last possible
//! moment. The contract with the parser is strict: every expression leaves
//! exactly one value on the stack, every statement leaves it empty.

#[cfg(test)]
mod gen_tests;
mod value;

pub use value::{Reg, RegClass, Storage, Value};

use crate::compiler::Compiler;
use crate::types::{CType, VT_FLOAT, VT_LDOUBLE};

pub const VSTACK_SIZE: usize = 256;

/// Operators understood by `gen_op`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Op {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    LogicalAnd,
    LogicalOr,
    LogicalNot,
    BitNot,
}

/// An anonymous code label. While undefined, `c` heads a fix-up chain
/// threaded through the text section (-1 terminates it); once defined, `c`
/// is the resolved code offset.
#[derive(Debug)]
pub struct CodeLabel {
    pub defined: bool,
    pub c: i64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LabelId(pub usize);

/// Branch targets of the innermost enclosing loop.
#[derive(Copy, Clone, Debug)]
pub struct LoopLabels {
    pub cont: LabelId,
    pub brk: LabelId,
}

impl Compiler {
    pub fn vsetc(&mut self, t: CType, st: Storage, lval: bool, c: i64) {
        if self.vstack.len() >= VSTACK_SIZE {
            self.error("value stack overflow");
            return;
        }
        self.vstack.push(Value {
            t,
            st,
            lval,
            sym: None,
            c,
        });
    }

    pub fn vset(&mut self, t: CType, st: Storage, c: i64) {
        self.vsetc(t, st, false, c);
    }

    /// Duplicate the top of the stack.
    pub fn vpush(&mut self) {
        if self.vstack.len() >= VSTACK_SIZE {
            self.error("value stack overflow");
            return;
        }
        match self.vstack.last().cloned() {
            Some(v) => self.vstack.push(v),
            None => self.error("value stack underflow"),
        }
    }

    pub fn vpop(&mut self) {
        if self.vstack.pop().is_none() {
            self.error("value stack underflow");
        }
    }

    pub fn vswap(&mut self) {
        let n = self.vstack.len();
        if n < 2 {
            self.error("cannot swap - not enough values on stack");
            return;
        }
        self.vstack.swap(n - 1, n - 2);
    }

    /// Spill every stack entry currently living in `r` to a fresh frame slot.
    fn save_reg(&mut self, r: Reg) {
        for i in 0..self.vstack.len() {
            if self.vstack[i].st != Storage::Reg(r) {
                continue;
            }
            self.loc = (self.loc - 8) & !7;
            let spill = Value {
                t: self.vstack[i].t,
                st: Storage::Local,
                lval: true,
                sym: None,
                c: self.loc,
            };
            self.store(r, &spill);
            self.vstack[i].st = Storage::Local;
            self.vstack[i].lval = true;
            self.vstack[i].c = self.loc;
        }
    }

    /// Materialize the top of the stack into a register of class `rc`.
    pub fn gv(&mut self, rc: RegClass) -> Reg {
        let Some(top) = self.vstack.last() else {
            self.error("nothing on value stack");
            return Reg::Rax;
        };

        if let Storage::Reg(r) = top.st {
            if rc.matches(r) {
                return r;
            }
        }

        let r = rc.pick();
        self.save_reg(r);

        let v = self.vstack[self.vstack.len() - 1].clone();
        self.load(r, &v);

        let len = self.vstack.len();
        let top = &mut self.vstack[len - 1];
        top.st = Storage::Reg(r);
        top.lval = false;
        top.sym = None;
        r
    }

    /// Materialize the two top entries: RHS into RCX, then LHS into RAX.
    pub fn gv2(&mut self) {
        self.gv(RegClass::Rcx);
        self.vswap();
        self.gv(RegClass::Rax);
        self.vswap();
    }

    /// Apply `op` to the top of the stack.
    pub fn gen_op(&mut self, op: Op) {
        match op {
            Op::Assign => {
                if self.vstack.len() < 2 {
                    self.error("assignment needs two values");
                    return;
                }
                let r = self.gv(RegClass::Int);
                self.vpop();

                let dst = self.vstack[self.vstack.len() - 1].clone();
                self.store(r, &dst);

                // the stored value is the result
                let len = self.vstack.len();
                let top = &mut self.vstack[len - 1];
                top.st = Storage::Reg(r);
                top.lval = false;
                top.sym = None;
            }
            Op::LogicalNot | Op::BitNot => {
                self.gv(RegClass::Int);
                self.gen_opi(op);
            }
            _ => self.gen_opi(op),
        }
    }

    /// Cast the top of the stack to `t`.
    pub fn gen_cast(&mut self, t: CType) {
        let Some(top) = self.vstack.last() else {
            self.error("nothing on value stack");
            return;
        };
        let from = top.t.btype();
        let to = t.btype();

        let is_float = |b: u32| (VT_FLOAT..=VT_LDOUBLE).contains(&b);
        if is_float(to) && !is_float(from) {
            self.warning("integer to float conversion is not implemented");
            return;
        }
        if is_float(from) && !is_float(to) {
            self.warning("float to integer conversion is not implemented");
            return;
        }

        // integer conversions just retag the value
        if let Some(top) = self.vstack.last_mut() {
            top.t = t;
        }
    }

    /// Allocate a fresh undefined label with an empty fix-up chain.
    pub fn gind(&mut self) -> LabelId {
        self.code_labels.push(CodeLabel {
            defined: false,
            c: -1,
        });
        LabelId(self.code_labels.len() - 1)
    }
}
