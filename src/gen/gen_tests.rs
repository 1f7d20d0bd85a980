use super::*;
use crate::compiler::Compiler;
use crate::types::CType;

fn text(c: &Compiler) -> &[u8] {
    &c.sections[c.text_sec].data
}

#[test]
fn test_vstack_overflow_is_reported() {
    let mut c = Compiler::new();
    for _ in 0..VSTACK_SIZE {
        c.vset(CType::INT, Storage::Const, 1);
    }
    assert_eq!(c.nb_errors, 0);
    c.vset(CType::INT, Storage::Const, 1);
    assert_eq!(c.nb_errors, 1);
    assert_eq!(c.vstack.len(), VSTACK_SIZE);
}

#[test]
fn test_vstack_underflow_is_reported() {
    let mut c = Compiler::new();
    c.vpop();
    assert_eq!(c.nb_errors, 1);
    c.vswap();
    assert_eq!(c.nb_errors, 2);
}

#[test]
fn test_vswap_and_vpush() {
    let mut c = Compiler::new();
    c.vset(CType::INT, Storage::Const, 1);
    c.vset(CType::INT, Storage::Const, 2);
    c.vswap();
    assert_eq!(c.vstack[0].c, 2);
    assert_eq!(c.vstack[1].c, 1);
    c.vpush();
    assert_eq!(c.vstack.len(), 3);
    assert_eq!(c.vstack[2].c, 1);
}

#[test]
fn test_gind_starts_undefined() {
    let mut c = Compiler::new();
    let l = c.gind();
    assert!(!c.code_labels[l.0].defined);
    assert_eq!(c.code_labels[l.0].c, -1);
}

#[test]
fn test_fixup_chain_resolution() {
    let mut c = Compiler::new();
    let l = c.gind();
    c.gjmp(l); // slot at 1 holds the -1 terminator
    c.gjmp(l); // slot at 6 holds the previous head (1)
    assert_eq!(c.code_labels[l.0].c, 6);

    c.glabel(l);
    assert!(c.code_labels[l.0].defined);
    assert_eq!(c.code_labels[l.0].c, 10);
    // both slots now hold target - (site + 4)
    let expected: Vec<u8> = vec![
        0xe9, 0x05, 0x00, 0x00, 0x00, // jmp +5
        0xe9, 0x00, 0x00, 0x00, 0x00, // jmp +0
    ];
    assert_eq!(text(&c), expected.as_slice());
}

#[test]
fn test_backward_jump_is_emitted_final() {
    let mut c = Compiler::new();
    let l = c.gind();
    c.glabel(l);
    c.gjmp(l); // rel32 = 0 - (1 + 4)
    let expected: Vec<u8> = vec![0xe9, 0xfb, 0xff, 0xff, 0xff];
    assert_eq!(text(&c), expected.as_slice());
}

#[test]
fn test_gtst_pops_and_threads_fixup() {
    let mut c = Compiler::new();
    c.vset(CType::INT, Storage::Const, 1);
    let l = c.gind();
    c.gtst(true, l);
    assert!(c.vstack.is_empty());
    let expected: Vec<u8> = vec![
        0x48, 0xc7, 0xc0, 0x01, 0x00, 0x00, 0x00, // mov rax, 1
        0x48, 0x85, 0xc0, // test rax, rax
        0x0f, 0x84, 0xff, 0xff, 0xff, 0xff, // je <fixup>
    ];
    assert_eq!(text(&c), expected.as_slice());
    assert_eq!(c.code_labels[l.0].c, 12);
}

#[test]
fn test_gv_reuses_matching_register() {
    let mut c = Compiler::new();
    c.vset(CType::INT, Storage::Reg(Reg::Rcx), 0);
    let before = text(&c).len();
    let r = c.gv(RegClass::Int);
    assert_eq!(r, Reg::Rcx);
    // already satisfied, no code emitted
    assert_eq!(text(&c).len(), before);
}

#[test]
fn test_gv_spills_live_register() {
    let mut c = Compiler::new();
    c.vset(CType::INT, Storage::Const, 3);
    c.gv(RegClass::Int);
    c.vset(CType::INT, Storage::Const, 4);
    c.gv(RegClass::Rax);

    // the first value was spilled to a fresh frame slot
    assert_eq!(c.loc, -8);
    assert_eq!(c.vstack[0].st, Storage::Local);
    assert!(c.vstack[0].lval);
    assert_eq!(c.vstack[0].c, -8);
    // mov [rbp-8], eax appears between the two loads
    assert!(text(&c)
        .windows(3)
        .any(|w| w == [0x89, 0x45, 0xf8]));
}

#[test]
fn test_gv2_canonical_registers() {
    let mut c = Compiler::new();
    c.vset(CType::INT, Storage::Const, 10); // lhs
    c.vset(CType::INT, Storage::Const, 20); // rhs
    c.gv2();
    assert_eq!(c.vstack[0].st, Storage::Reg(Reg::Rax));
    assert_eq!(c.vstack[1].st, Storage::Reg(Reg::Rcx));
}

#[test]
fn test_gen_cast_retags_integers() {
    let mut c = Compiler::new();
    c.vset(CType::INT, Storage::Const, 1);
    c.gen_cast(CType(crate::types::VT_LLONG));
    assert_eq!(c.vstack[0].t.btype(), crate::types::VT_LLONG);
    assert_eq!(c.nb_errors, 0);
    assert_eq!(c.nb_warnings, 0);
}

#[test]
fn test_gen_cast_float_is_stubbed() {
    let mut c = Compiler::new();
    c.vset(CType::INT, Storage::Const, 1);
    c.gen_cast(CType(crate::types::VT_DOUBLE));
    assert_eq!(c.nb_warnings, 1);
}
