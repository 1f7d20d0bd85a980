//! x86-64 instruction encoding for the Windows x64 ABI.
//!
//! All code bytes go straight into the text section; `ind` tracks the
//! current offset. Forward branches thread a fix-up chain through the
//! emitted rel32 slots, resolved when the target label is defined.


use crate::compiler::Compiler;
use crate::gen::{LabelId, Op, Reg, RegClass, Storage, Value};
use crate::types::CType;

/// REX prefix byte for the given operand size and register extensions.
pub(crate) fn rex_byte(w: bool, r: u8, x: u8, b: u8) -> u8 {
    0x40 | u8::from(w) << 3 | u8::from(r > 7) << 2 | u8::from(x > 7) << 1 | u8::from(b > 7)
}

/// ModR/M byte.
pub(crate) fn modrm_byte(md: u8, reg: u8, rm: u8) -> u8 {
    md << 6 | (reg & 7) << 3 | (rm & 7)
}

impl Compiler {
    /// Append one byte to the text section.
    pub fn g(&mut self, b: u8) {
        self.sections[self.text_sec].data.push(b);
        self.ind += 1;
    }

    pub fn gen_le32(&mut self, v: u32) {
        for b in v.to_le_bytes() {
            self.g(b);
        }
    }

    pub fn gen_le64(&mut self, v: u64) {
        for b in v.to_le_bytes() {
            self.g(b);
        }
    }

    /// Emit a REX prefix, suppressed when it would be a plain 0x40.
    fn gen_rex(&mut self, w: bool, r: u8, x: u8, b: u8) {
        let rex = rex_byte(w, r, x, b);
        if rex != 0x40 {
            self.g(rex);
        }
    }

    fn gen_modrm(&mut self, md: u8, reg: u8, rm: u8) {
        self.g(modrm_byte(md, reg, rm));
    }

    /// RBP-relative addressing with the shortest displacement that fits.
    fn gen_modrm_bp(&mut self, reg: u8, disp: i64) {
        if (-128..=127).contains(&disp) {
            self.gen_modrm(1, reg, Reg::Rbp.code());
            self.g(disp as u8);
        } else {
            self.gen_modrm(2, reg, Reg::Rbp.code());
            self.gen_le32(disp as u32);
        }
    }

    /// Load a value into register `r`.
    pub fn load(&mut self, r: Reg, sv: &Value) {
        let rc = r.code();
        match sv.st {
            Storage::Const => {
                if sv.c == 0 {
                    // xor r, r
                    self.gen_rex(true, rc, 0, rc);
                    self.g(0x31);
                    self.gen_modrm(3, rc, rc);
                } else if i32::try_from(sv.c).is_ok() {
                    // mov r, imm32 (sign-extended)
                    self.gen_rex(true, 0, 0, rc);
                    self.g(0xc7);
                    self.gen_modrm(3, 0, rc);
                    self.gen_le32(sv.c as u32);
                } else {
                    // mov r, imm64
                    self.gen_rex(true, 0, 0, rc);
                    self.g(0xb8 + (rc & 7));
                    self.gen_le64(sv.c as u64);
                }
            }
            Storage::Local | Storage::LocalAddr => {
                if sv.lval {
                    match sv.t.size() {
                        1 => {
                            // movzx/movsx r, byte [rbp + c]
                            self.gen_rex(false, rc, 0, Reg::Rbp.code());
                            self.g(0x0f);
                            self.g(if sv.t.is_unsigned() { 0xb6 } else { 0xbe });
                        }
                        2 => {
                            // movzx/movsx r, word [rbp + c]
                            self.gen_rex(false, rc, 0, Reg::Rbp.code());
                            self.g(0x0f);
                            self.g(if sv.t.is_unsigned() { 0xb7 } else { 0xbf });
                        }
                        4 => {
                            if sv.t.is_unsigned() {
                                // mov r32, [rbp + c]
                                self.gen_rex(false, rc, 0, Reg::Rbp.code());
                                self.g(0x8b);
                            } else {
                                // movsxd r, [rbp + c]
                                self.gen_rex(true, rc, 0, Reg::Rbp.code());
                                self.g(0x63);
                            }
                        }
                        _ => {
                            // mov r64, [rbp + c]
                            self.gen_rex(true, rc, 0, Reg::Rbp.code());
                            self.g(0x8b);
                        }
                    }
                    self.gen_modrm_bp(rc, sv.c);
                } else {
                    // lea r, [rbp + c]
                    self.gen_rex(true, rc, 0, Reg::Rbp.code());
                    self.g(0x8d);
                    self.gen_modrm_bp(rc, sv.c);
                }
            }
            Storage::Reg(src) => {
                if src != r {
                    // mov r, src
                    self.gen_rex(true, src.code(), 0, rc);
                    self.g(0x89);
                    self.gen_modrm(3, src.code(), rc);
                }
            }
            // never produced by this generator
            Storage::CmpFlags | Storage::Branch { .. } => {}
        }
    }

    /// Store register `r` through an lvalue descriptor.
    pub fn store(&mut self, r: Reg, sv: &Value) {
        if !matches!(sv.st, Storage::Local | Storage::LocalAddr) {
            // globals carry raw section offsets; without relocations there
            // is nothing meaningful to emit for them
            return;
        }
        let rc = r.code();
        match sv.t.size() {
            1 => {
                // mov byte [rbp + c], r
                self.gen_rex(false, rc, 0, Reg::Rbp.code());
                self.g(0x88);
            }
            2 => {
                // mov word [rbp + c], r
                self.g(0x66);
                self.gen_rex(false, rc, 0, Reg::Rbp.code());
                self.g(0x89);
            }
            4 => {
                // mov dword [rbp + c], r
                self.gen_rex(false, rc, 0, Reg::Rbp.code());
                self.g(0x89);
            }
            _ => {
                // mov qword [rbp + c], r
                self.gen_rex(true, rc, 0, Reg::Rbp.code());
                self.g(0x89);
            }
        }
        self.gen_modrm_bp(rc, sv.c);
    }

    fn vreg(&self, depth: usize) -> u8 {
        let idx = self.vstack.len() - 1 - depth;
        match self.vstack[idx].st {
            Storage::Reg(r) => r.code(),
            _ => Reg::Rax.code(),
        }
    }

    /// Normalize `r` to 0/1: test r, r; setne; movzx.
    fn gen_bool(&mut self, r: Reg) {
        let rc = r.code();
        self.gen_rex(true, rc, 0, rc);
        self.g(0x85);
        self.gen_modrm(3, rc, rc);
        self.g(0x0f);
        self.g(0x95);
        self.gen_modrm(3, 0, rc);
        self.gen_rex(true, rc, 0, rc);
        self.g(0x0f);
        self.g(0xb6);
        self.gen_modrm(3, rc, rc);
    }

    /// Integer operators on the two top stack entries (one for unary).
    #[allow(clippy::match_same_arms)]
    pub fn gen_opi(&mut self, op: Op) {
        let binary = !matches!(op, Op::LogicalNot | Op::BitNot);
        if binary && self.vstack.len() < 2 {
            self.error("not enough operands for operator");
            return;
        }

        match op {
            Op::Add | Op::Sub | Op::And | Op::Or | Op::Xor => {
                self.gv2();
                let fr = self.vreg(0);
                let r = self.vreg(1);
                let opcode = match op {
                    Op::Add => 0x01,
                    Op::Sub => 0x29,
                    Op::And => 0x21,
                    Op::Or => 0x09,
                    _ => 0x31,
                };
                // op r, fr
                self.gen_rex(true, fr, 0, r);
                self.g(opcode);
                self.gen_modrm(3, fr, r);
                self.vpop();
            }
            Op::Mul => {
                self.gv2();
                let fr = self.vreg(0);
                // imul rax, fr
                self.gen_rex(true, Reg::Rax.code(), 0, fr);
                self.g(0x0f);
                self.g(0xaf);
                self.gen_modrm(3, Reg::Rax.code(), fr);
                self.vpop();
                self.set_top_reg(Reg::Rax);
            }
            Op::Div | Op::Mod => {
                self.gv2();
                let mut fr = self.vreg(0);
                if fr == Reg::Rdx.code() {
                    // mov rcx, rdx - keep the divisor clear of cqo
                    self.gen_rex(true, Reg::Rdx.code(), 0, Reg::Rcx.code());
                    self.g(0x89);
                    self.gen_modrm(3, Reg::Rdx.code(), Reg::Rcx.code());
                    fr = Reg::Rcx.code();
                }
                // cqo
                self.gen_rex(true, 0, 0, 0);
                self.g(0x99);
                // idiv fr
                self.gen_rex(true, 0, 0, fr);
                self.g(0xf7);
                self.gen_modrm(3, 7, fr);
                self.vpop();
                self.set_top_reg(if op == Op::Mod { Reg::Rdx } else { Reg::Rax });
            }
            Op::Shl | Op::Shr => {
                // shift count in CL
                self.gv2();
                let r = self.vreg(1);
                let unsigned = self.vstack[self.vstack.len() - 2].t.is_unsigned();
                self.gen_rex(true, 0, 0, r);
                self.g(0xd3);
                let ext = match op {
                    Op::Shl => 4,
                    _ if unsigned => 5, // shr
                    _ => 7,             // sar
                };
                self.gen_modrm(3, ext, r);
                self.vpop();
            }
            Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge => {
                self.gv2();
                let fr = self.vreg(0);
                let r = self.vreg(1);
                // cmp r, fr
                self.gen_rex(true, fr, 0, r);
                self.g(0x39);
                self.gen_modrm(3, fr, r);
                self.vpop();

                let unsigned = self.vstack[self.vstack.len() - 1].t.is_unsigned();
                let setcc = match op {
                    Op::Eq => 0x94,
                    Op::Ne => 0x95,
                    Op::Lt => {
                        if unsigned {
                            0x92
                        } else {
                            0x9c
                        }
                    }
                    Op::Gt => {
                        if unsigned {
                            0x97
                        } else {
                            0x9f
                        }
                    }
                    Op::Le => {
                        if unsigned {
                            0x96
                        } else {
                            0x9e
                        }
                    }
                    _ => {
                        if unsigned {
                            0x93
                        } else {
                            0x9d
                        }
                    }
                };
                // setcc al
                self.g(0x0f);
                self.g(setcc);
                self.gen_modrm(3, 0, Reg::Rax.code());
                // movzx rax, al
                self.gen_rex(true, Reg::Rax.code(), 0, Reg::Rax.code());
                self.g(0x0f);
                self.g(0xb6);
                self.gen_modrm(3, Reg::Rax.code(), Reg::Rax.code());

                self.set_top_reg(Reg::Rax);
                if let Some(top) = self.vstack.last_mut() {
                    top.t = CType::INT;
                }
            }
            Op::LogicalAnd | Op::LogicalOr => {
                // no short circuit: normalize both sides to 0/1 and combine
                self.gv2();
                self.gen_bool(Reg::Rax);
                self.gen_bool(Reg::Rcx);
                let opcode = if op == Op::LogicalAnd { 0x21 } else { 0x09 };
                self.gen_rex(true, Reg::Rcx.code(), 0, Reg::Rax.code());
                self.g(opcode);
                self.gen_modrm(3, Reg::Rcx.code(), Reg::Rax.code());
                self.vpop();
                self.set_top_reg(Reg::Rax);
                if let Some(top) = self.vstack.last_mut() {
                    top.t = CType::INT;
                }
            }
            Op::BitNot => {
                let r = self.gv(RegClass::Int).code();
                // not r
                self.gen_rex(true, 0, 0, r);
                self.g(0xf7);
                self.gen_modrm(3, 2, r);
            }
            Op::LogicalNot => {
                let r = self.gv(RegClass::Int).code();
                // test r, r
                self.gen_rex(true, r, 0, r);
                self.g(0x85);
                self.gen_modrm(3, r, r);
                // sete al
                self.g(0x0f);
                self.g(0x94);
                self.gen_modrm(3, 0, Reg::Rax.code());
                // movzx rax, al
                self.gen_rex(true, Reg::Rax.code(), 0, Reg::Rax.code());
                self.g(0x0f);
                self.g(0xb6);
                self.gen_modrm(3, Reg::Rax.code(), Reg::Rax.code());

                self.set_top_reg(Reg::Rax);
            }
            Op::Assign => unreachable!("assignment is handled by gen_op"),
        }
    }

    fn set_top_reg(&mut self, r: Reg) {
        if let Some(top) = self.vstack.last_mut() {
            top.st = Storage::Reg(r);
            top.lval = false;
            top.sym = None;
        }
    }

    /// Windows x64 function prologue; resets the frame cursor.
    pub fn gfunc_prolog(&mut self) {
        // push rbp
        self.g(0x55);
        // mov rbp, rsp
        self.gen_rex(true, Reg::Rsp.code(), 0, Reg::Rbp.code());
        self.g(0x89);
        self.gen_modrm(3, Reg::Rsp.code(), Reg::Rbp.code());
        // sub rsp, 0x60
        self.gen_rex(true, 0, 0, Reg::Rsp.code());
        self.g(0x83);
        self.gen_modrm(3, 5, Reg::Rsp.code());
        self.g(0x60);
        // spill the register parameters to their shadow slots
        for (i, r) in [Reg::Rcx, Reg::Rdx, Reg::R8, Reg::R9].into_iter().enumerate() {
            // mov [rbp + 16 + 8*i], r
            self.gen_rex(true, r.code(), 0, Reg::Rbp.code());
            self.g(0x89);
            self.gen_modrm_bp(r.code(), 16 + 8 * i as i64);
        }
        self.loc = 0;
    }

    pub fn gfunc_epilog(&mut self) {
        // mov rsp, rbp
        self.gen_rex(true, Reg::Rbp.code(), 0, Reg::Rsp.code());
        self.g(0x89);
        self.gen_modrm(3, Reg::Rbp.code(), Reg::Rsp.code());
        // pop rbp
        self.g(0x5d);
        // ret
        self.g(0xc3);
    }

    /// Call with `nb_args` arguments on the value stack above the callee.
    ///
    /// First four integer args go in RCX, RDX, R8, R9; the rest are pushed
    /// right to left. The caller owes 32 bytes of shadow space around the
    /// call.
    pub fn gfunc_call(&mut self, nb_args: usize) {
        let stack_args = nb_args.saturating_sub(4);

        // stack arguments, right to left
        for _ in 0..stack_args {
            let r = self.gv(RegClass::Int).code();
            if r > 7 {
                self.g(0x41);
            }
            self.g(0x50 + (r & 7));
            self.vpop();
        }

        // register arguments, last to first
        for i in (0..nb_args.min(4)).rev() {
            match i {
                0 => {
                    self.gv(RegClass::Rcx);
                }
                1 => {
                    self.gv(RegClass::Rdx);
                }
                n => {
                    let dst = if n == 2 { Reg::R8 } else { Reg::R9 };
                    let src = self.gv(RegClass::Int);
                    // mov r8/r9, src
                    self.gen_rex(true, src.code(), 0, dst.code());
                    self.g(0x89);
                    self.gen_modrm(3, src.code(), dst.code());
                }
            }
            self.vpop();
        }

        // sub rsp, 32 - shadow space
        self.gen_rex(true, 0, 0, Reg::Rsp.code());
        self.g(0x83);
        self.gen_modrm(3, 5, Reg::Rsp.code());
        self.g(0x20);

        // the callee designator is now on top
        let direct = self
            .vstack
            .last()
            .and_then(|v| match (v.st, v.sym) {
                (Storage::Const, Some(sym)) => Some(sym),
                _ => None,
            });
        if let Some(sym) = direct {
            // call rel32
            self.g(0xe8);
            let target = self.globals.get(sym).c;
            let rel = target - (self.ind as i64 + 4);
            self.gen_le32(rel as u32);
            self.vpop();
        } else {
            // call r/m64
            let r = self.gv(RegClass::Int).code();
            if r > 7 {
                self.g(0x41);
            }
            self.g(0xff);
            self.gen_modrm(3, 2, r);
            self.vpop();
        }

        // add rsp, shadow + pushed args
        let adjust = 32 + 8 * stack_args as i64;
        self.gen_rex(true, 0, 0, Reg::Rsp.code());
        if adjust < 128 {
            self.g(0x83);
            self.gen_modrm(3, 0, Reg::Rsp.code());
            self.g(adjust as u8);
        } else {
            self.g(0x81);
            self.gen_modrm(3, 0, Reg::Rsp.code());
            self.gen_le32(adjust as u32);
        }

        // result in RAX
        self.vset(CType::INT, Storage::Reg(Reg::Rax), 0);
    }

    /// Unconditional jump, threading a fix-up when `l` is still undefined.
    pub fn gjmp(&mut self, l: LabelId) {
        self.g(0xe9);
        self.emit_branch_slot(l);
    }

    /// Conditional jump on the truth of the top value: `je` when `inv`,
    /// `jne` otherwise.
    pub fn gtst(&mut self, inv: bool, l: LabelId) {
        let Some(top) = self.vstack.last() else {
            self.error("missing condition value");
            return;
        };
        let v = match top.st {
            Storage::Reg(r) => r.code(),
            _ => self.gv(RegClass::Int).code(),
        };
        self.vpop();

        // test v, v
        self.gen_rex(true, v, 0, v);
        self.g(0x85);
        self.gen_modrm(3, v, v);

        self.g(0x0f);
        self.g(if inv { 0x84 } else { 0x85 });
        self.emit_branch_slot(l);
    }

    fn emit_branch_slot(&mut self, l: LabelId) {
        let lab = &self.code_labels[l.0];
        if lab.defined {
            let rel = lab.c - (self.ind as i64 + 4);
            self.gen_le32(rel as u32);
        } else {
            // the slot holds the previous fix-up head
            let prev = lab.c;
            self.gen_le32(prev as u32);
            self.code_labels[l.0].c = self.ind as i64 - 4;
        }
    }

    /// Define `l` at the current position and resolve its fix-up chain.
    pub fn glabel(&mut self, l: LabelId) {
        let mut p = self.code_labels[l.0].c;
        while p != -1 {
            let off = p as usize;
            let next = self.sections[self.text_sec].read_u32_at(off);
            let rel = self.ind as i64 - (p + 4);
            self.sections[self.text_sec].write_u32_at(off, rel as u32);
            p = i64::from(next as i32);
        }
        self.code_labels[l.0].defined = true;
        self.code_labels[l.0].c = self.ind as i64;
    }
}
