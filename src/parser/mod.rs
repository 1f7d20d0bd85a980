//! Recursive descent over the token stream, driving code generation.
//!
//! There is no syntax tree. Each production leaves its result as value-stack
//! operations and symbol-table mutations, so code bytes appear in the text
//! section as the source is read. Syntax errors skip the offending token and
//! resume, so one mistake does not hide the rest of the diagnostics.

mod parse_error;
#[cfg(test)]
mod parser_tests;

pub use parse_error::ParseError;

use crate::compiler::{Compiler, SymRef};
use crate::gen::{LoopLabels, Op, RegClass, Storage};
use crate::lexer::Token;
use crate::types::{
    CType, VT_ARRAY, VT_BTYPE, VT_BYTE, VT_CONSTANT, VT_DOUBLE, VT_EXTERN, VT_FLOAT, VT_FUNC,
    VT_INT, VT_LLONG, VT_SHORT, VT_STATIC, VT_UNSIGNED, VT_VOID,
};

impl TryFrom<&Token> for Op {
    type Error = ParseError;
    fn try_from(value: &Token) -> Result<Self, ParseError> {
        match value {
            Token::Plus => Ok(Op::Add),
            Token::Hyphen => Ok(Op::Sub),
            Token::Asterisk => Ok(Op::Mul),
            Token::FSlash => Ok(Op::Div),
            Token::Percent => Ok(Op::Mod),
            Token::BitwiseAnd => Ok(Op::And),
            Token::BitwiseOr => Ok(Op::Or),
            Token::BitwiseXor => Ok(Op::Xor),
            Token::ShiftLeft => Ok(Op::Shl),
            Token::ShiftRight => Ok(Op::Shr),
            Token::IsEqual => Ok(Op::Eq),
            Token::IsNotEqual => Ok(Op::Ne),
            Token::IsLessThan => Ok(Op::Lt),
            Token::IsGreaterThan => Ok(Op::Gt),
            Token::IsLessThanOrEqual => Ok(Op::Le),
            Token::IsGreaterThanOrEqual => Ok(Op::Ge),
            Token::LogicalAnd => Ok(Op::LogicalAnd),
            Token::LogicalOr => Ok(Op::LogicalOr),
            _ => Err(ParseError::UnexpectedToken(value.clone())),
        }
    }
}

/// Parse the whole translation unit.
pub fn parse_file(c: &mut Compiler) {
    while c.tok != Token::Eof {
        decl(c);
    }
}

/// Accumulate type, sign, and storage specifiers into a type word.
/// Returns `None` when no type keyword was seen at all.
fn parse_type(c: &mut Compiler) -> Option<CType> {
    let mut t: u32 = 0;
    let mut sign = 0; // 1 = signed, 2 = unsigned
    let mut size_mod = 0; // 1 = short, 2 = long, 3 = long long
    let mut seen = false;

    loop {
        match c.tok {
            Token::Void => {
                t = (t & !VT_BTYPE) | VT_VOID;
                seen = true;
            }
            Token::Char => {
                t = (t & !VT_BTYPE) | VT_BYTE;
                seen = true;
            }
            Token::Int => {
                t = (t & !VT_BTYPE) | VT_INT;
                seen = true;
            }
            Token::Float => {
                t = (t & !VT_BTYPE) | VT_FLOAT;
                seen = true;
            }
            Token::Double => {
                t = (t & !VT_BTYPE) | VT_DOUBLE;
                seen = true;
            }
            Token::Short => {
                size_mod = 1;
                seen = true;
            }
            Token::Long => {
                size_mod = if size_mod == 2 { 3 } else { 2 };
                seen = true;
            }
            Token::Signed => {
                sign = 1;
                seen = true;
            }
            Token::Unsigned => {
                sign = 2;
                seen = true;
            }
            Token::Const => t |= VT_CONSTANT,
            Token::Static => t |= VT_STATIC,
            Token::Extern => t |= VT_EXTERN,
            _ => break,
        }
        c.next();
    }

    if !seen {
        return None;
    }

    // size modifiers only matter when no base type was given ("short", "long
    // int", ..); note VT_INT is zero so a bare "int" takes this path too
    if t & VT_BTYPE == 0 {
        if size_mod == 1 {
            t |= VT_SHORT;
        } else if size_mod >= 2 {
            t |= VT_LLONG;
        } else {
            t |= VT_INT;
        }
    }
    if sign == 2 {
        t |= VT_UNSIGNED;
    }

    Some(CType(t))
}

fn parse_pointer(c: &mut Compiler, mut t: CType) -> CType {
    while c.tok == Token::Asterisk {
        c.next();
        t = t.mk_pointer();
        while c.tok == Token::Const {
            t = CType(t.0 | VT_CONSTANT);
            c.next();
        }
    }
    t
}

fn take_identifier(c: &mut Compiler) -> Option<String> {
    if let Token::Identifier(name) = &mut c.tok {
        let name = std::mem::take(name);
        c.next();
        Some(name)
    } else {
        c.error(ParseError::ExpectedIdentifierButGot(c.tok.clone()));
        None
    }
}

/*============================================================
 * Expressions
 *============================================================*/

pub fn expr(c: &mut Compiler) {
    expr_eq(c);
}

/// Assignment (right associative), including compound forms. A compound
/// assignment duplicates the lvalue so it is evaluated exactly once.
fn expr_eq(c: &mut Compiler) {
    expr_or(c);

    if c.tok == Token::Assign {
        c.next();
        expr_eq(c);
        c.gen_op(Op::Assign);
    } else if c.tok.is_compound_assign() {
        let single = c.tok.compound_to_single();
        c.next();
        c.vpush();
        expr_eq(c);
        if let Ok(op) = Op::try_from(&single) {
            c.gen_op(op);
        }
        c.gen_op(Op::Assign);
    }
}

fn expr_or(c: &mut Compiler) {
    expr_and(c);
    while c.tok == Token::LogicalOr {
        c.next();
        expr_and(c);
        c.gen_op(Op::LogicalOr);
    }
}

fn expr_and(c: &mut Compiler) {
    expr_bitor(c);
    while c.tok == Token::LogicalAnd {
        c.next();
        expr_bitor(c);
        c.gen_op(Op::LogicalAnd);
    }
}

fn expr_bitor(c: &mut Compiler) {
    expr_xor(c);
    while c.tok == Token::BitwiseOr {
        c.next();
        expr_xor(c);
        c.gen_op(Op::Or);
    }
}

fn expr_xor(c: &mut Compiler) {
    expr_bitand(c);
    while c.tok == Token::BitwiseXor {
        c.next();
        expr_bitand(c);
        c.gen_op(Op::Xor);
    }
}

fn expr_bitand(c: &mut Compiler) {
    expr_cmp(c);
    while c.tok == Token::BitwiseAnd {
        c.next();
        expr_cmp(c);
        c.gen_op(Op::And);
    }
}

fn expr_cmp(c: &mut Compiler) {
    expr_shift(c);
    loop {
        let op = match c.tok {
            Token::IsEqual => Op::Eq,
            Token::IsNotEqual => Op::Ne,
            Token::IsLessThan => Op::Lt,
            Token::IsGreaterThan => Op::Gt,
            Token::IsLessThanOrEqual => Op::Le,
            Token::IsGreaterThanOrEqual => Op::Ge,
            _ => break,
        };
        c.next();
        expr_shift(c);
        c.gen_op(op);
    }
}

fn expr_shift(c: &mut Compiler) {
    expr_add(c);
    loop {
        let op = match c.tok {
            Token::ShiftLeft => Op::Shl,
            Token::ShiftRight => Op::Shr,
            _ => break,
        };
        c.next();
        expr_add(c);
        c.gen_op(op);
    }
}

fn expr_add(c: &mut Compiler) {
    expr_mult(c);
    loop {
        let op = match c.tok {
            Token::Plus => Op::Add,
            Token::Hyphen => Op::Sub,
            _ => break,
        };
        c.next();
        expr_mult(c);
        c.gen_op(op);
    }
}

fn expr_mult(c: &mut Compiler) {
    expr_unary(c);
    loop {
        let op = match c.tok {
            Token::Asterisk => Op::Mul,
            Token::FSlash => Op::Div,
            Token::Percent => Op::Mod,
            _ => break,
        };
        c.next();
        expr_unary(c);
        c.gen_op(op);
    }
}

/// `x += 1` / `x -= 1` with a single evaluation of the lvalue.
fn incdec(c: &mut Compiler, op: Op) {
    c.vpush();
    c.vset(CType::INT, Storage::Const, 1);
    c.gen_op(op);
    c.gen_op(Op::Assign);
}

fn expr_unary(c: &mut Compiler) {
    match c.tok {
        Token::Hyphen => {
            c.next();
            expr_unary(c);
            // negate as 0 - x
            c.vset(CType::INT, Storage::Const, 0);
            c.vswap();
            c.gen_op(Op::Sub);
        }
        Token::Plus => {
            c.next();
            expr_unary(c);
        }
        Token::LogicalNot => {
            c.next();
            expr_unary(c);
            c.gen_op(Op::LogicalNot);
        }
        Token::Tilde => {
            c.next();
            expr_unary(c);
            c.gen_op(Op::BitNot);
        }
        Token::Asterisk => {
            // dereference: re-mark the value as a memory cell
            c.next();
            expr_unary(c);
            if let Some(top) = c.vstack.last_mut() {
                top.lval = true;
            }
        }
        Token::BitwiseAnd => {
            // address-of: the non-lvalue local load is an LEA
            c.next();
            expr_unary(c);
            if let Some(top) = c.vstack.last_mut() {
                top.lval = false;
                top.t = top.t.mk_pointer();
            }
        }
        Token::Increment | Token::Decrement => {
            let op = if c.tok == Token::Increment {
                Op::Add
            } else {
                Op::Sub
            };
            c.next();
            expr_unary(c);
            incdec(c, op);
        }
        Token::Sizeof => {
            c.next();
            expr_sizeof(c);
        }
        Token::OpenParanth => {
            c.next();
            if c.tok.is_specifier() {
                // cast
                let t = parse_type(c).unwrap_or(CType::INT);
                let t = parse_pointer(c, t);
                c.skip(&Token::CloseParanth);
                expr_unary(c);
                c.gen_cast(t);
            } else {
                expr(c);
                c.skip(&Token::CloseParanth);
            }
        }
        _ => expr_postfix(c),
    }
}

fn expr_sizeof(c: &mut Compiler) {
    if c.tok == Token::OpenParanth {
        c.next();
        if c.tok.is_specifier() {
            let t = parse_type(c).unwrap_or(CType::INT);
            let t = parse_pointer(c, t);
            c.skip(&Token::CloseParanth);
            c.vset(CType::INT, Storage::Const, t.size());
            return;
        }
        expr(c);
        c.skip(&Token::CloseParanth);
    } else {
        expr_unary(c);
    }
    // size of the expression result; the operand code stays emitted
    let size = c.vstack.last().map_or(4, |v| v.t.size());
    c.vpop();
    c.vset(CType::INT, Storage::Const, size);
}

fn expr_postfix(c: &mut Compiler) {
    expr_primary(c);
    loop {
        match c.tok {
            Token::OpenParanth => {
                let mut nb_args = 0;
                c.next();
                while c.tok != Token::CloseParanth && c.tok != Token::Eof {
                    expr_eq(c);
                    nb_args += 1;
                    if c.tok == Token::Comma {
                        c.next();
                    } else {
                        break;
                    }
                }
                c.skip(&Token::CloseParanth);
                c.gfunc_call(nb_args);
            }
            Token::OpenBracket => {
                c.next();
                expr(c);
                c.skip(&Token::CloseBracket);
                c.gen_op(Op::Add);
                if let Some(top) = c.vstack.last_mut() {
                    top.lval = true;
                }
            }
            Token::Dot | Token::Arrow => {
                c.next();
                if matches!(c.tok, Token::Identifier(_)) {
                    c.next();
                } else {
                    c.error(ParseError::NotImplemented("struct member access"));
                }
            }
            Token::Increment | Token::Decrement => {
                let op = if c.tok == Token::Increment {
                    Op::Add
                } else {
                    Op::Sub
                };
                c.next();
                incdec(c, op);
            }
            _ => break,
        }
    }
}

fn expr_primary(c: &mut Compiler) {
    match &c.tok {
        Token::Constant(v) => {
            let v = *v;
            c.vset(CType::INT, Storage::Const, v);
            c.next();
        }
        Token::FPDouble(_) => {
            c.warning("floating point constants are not supported; using 0");
            c.vset(CType::INT, Storage::Const, 0);
            c.next();
        }
        Token::StrLit(_) => {
            let Token::StrLit(s) = std::mem::replace(&mut c.tok, Token::Eof) else {
                unreachable!()
            };
            let sec = c.rdata();
            let off = {
                let rdata = &mut c.sections[sec];
                let off = rdata.add(s.as_bytes());
                rdata.add(&[0]);
                off
            };
            c.vset(CType::BYTE.mk_pointer(), Storage::Const, off as i64);
            c.next();
        }
        Token::Identifier(_) => {
            let Token::Identifier(name) = std::mem::replace(&mut c.tok, Token::Eof) else {
                unreachable!()
            };
            c.next();
            expr_ident(c, name);
        }
        _ => {
            c.error(ParseError::UnexpectedToken(c.tok.clone()));
            c.next();
        }
    }
}

fn expr_ident(c: &mut Compiler, name: String) {
    if let Some(r) = c.sym_find(&name) {
        let sym = c.sym(r);
        let (t, st, cv) = (sym.t, sym.st, sym.c);
        if t.is_func() {
            c.vsetc(t, Storage::Const, false, cv);
            if let (SymRef::Global(idx), Some(top)) = (r, c.vstack.last_mut()) {
                top.sym = Some(idx);
            }
        } else {
            c.vsetc(t, st, true, cv);
        }
    } else {
        // implicit K&R declaration: an unknown name is a function
        // returning int
        let idx = c
            .globals
            .push(name, CType(VT_FUNC), Storage::Const, 0);
        c.vsetc(CType(VT_FUNC), Storage::Const, false, 0);
        if let Some(top) = c.vstack.last_mut() {
            top.sym = Some(idx);
        }
    }
}

/*============================================================
 * Statements
 *============================================================*/

fn statement(c: &mut Compiler) {
    match c.tok {
        Token::OpenCurly => stmt_block(c),
        Token::If => stmt_if(c),
        Token::While => stmt_while(c),
        Token::For => stmt_for(c),
        Token::Do => stmt_dowhile(c),
        Token::Return => stmt_return(c),
        Token::Break => stmt_break(c),
        Token::Continue => stmt_continue(c),
        Token::Semicolon => c.next(),
        Token::Switch | Token::Case | Token::KwDefault => {
            c.error(ParseError::NotImplemented("switch statement"));
            c.next();
        }
        Token::Goto => {
            c.error(ParseError::NotImplemented("goto statement"));
            c.next();
        }
        _ => {
            expr(c);
            c.vpop();
            c.skip(&Token::Semicolon);
        }
    }
}

fn stmt_block(c: &mut Compiler) {
    c.skip(&Token::OpenCurly);
    c.local_scope += 1;
    let mark = c.locals.mark();

    while c.tok != Token::CloseCurly && c.tok != Token::Eof {
        if c.tok.is_specifier() {
            decl(c);
        } else {
            statement(c);
        }
    }

    c.locals.pop_to(mark);
    c.local_scope -= 1;
    c.skip(&Token::CloseCurly);
}

fn stmt_if(c: &mut Compiler) {
    c.next();
    c.skip(&Token::OpenParanth);
    expr(c);
    c.skip(&Token::CloseParanth);

    let l1 = c.gind();
    c.gtst(true, l1); // jump over the branch when false

    statement(c);

    if c.tok == Token::Else {
        let l2 = c.gind();
        c.gjmp(l2);
        c.glabel(l1);
        c.next();
        statement(c);
        c.glabel(l2);
    } else {
        c.glabel(l1);
    }
}

fn stmt_while(c: &mut Compiler) {
    let l_top = c.gind();
    let l_end = c.gind();
    c.glabel(l_top);

    c.next();
    c.skip(&Token::OpenParanth);
    expr(c);
    c.skip(&Token::CloseParanth);
    c.gtst(true, l_end);

    c.loops.push(LoopLabels {
        cont: l_top,
        brk: l_end,
    });
    statement(c);
    c.loops.pop();

    c.gjmp(l_top);
    c.glabel(l_end);
}

fn stmt_for(c: &mut Compiler) {
    let l_cond = c.gind();
    let l_end = c.gind();
    let l_update = c.gind();
    let l_body = c.gind();

    c.next();
    c.skip(&Token::OpenParanth);
    if c.tok != Token::Semicolon {
        expr(c);
        c.vpop();
    }
    c.skip(&Token::Semicolon);

    c.glabel(l_cond);
    if c.tok != Token::Semicolon {
        expr(c);
        c.gtst(true, l_end);
    }
    c.skip(&Token::Semicolon);
    c.gjmp(l_body);

    c.glabel(l_update);
    if c.tok != Token::CloseParanth {
        expr(c);
        c.vpop();
    }
    c.gjmp(l_cond);
    c.skip(&Token::CloseParanth);

    c.glabel(l_body);
    c.loops.push(LoopLabels {
        cont: l_update,
        brk: l_end,
    });
    statement(c);
    c.loops.pop();
    c.gjmp(l_update);

    c.glabel(l_end);
}

fn stmt_dowhile(c: &mut Compiler) {
    let l_top = c.gind();
    let l_cont = c.gind();
    let l_end = c.gind();
    c.glabel(l_top);

    c.next();
    c.loops.push(LoopLabels {
        cont: l_cont,
        brk: l_end,
    });
    statement(c);
    c.loops.pop();

    c.glabel(l_cont);
    c.skip(&Token::While);
    c.skip(&Token::OpenParanth);
    expr(c);
    c.skip(&Token::CloseParanth);
    c.skip(&Token::Semicolon);
    c.gtst(false, l_top); // loop back while the condition holds
    c.glabel(l_end);
}

fn stmt_return(c: &mut Compiler) {
    c.next();
    if c.tok != Token::Semicolon {
        expr(c);
        c.gv(RegClass::Rax);
        c.vpop();
    }
    c.skip(&Token::Semicolon);
    c.gfunc_epilog();
}

fn stmt_break(c: &mut Compiler) {
    c.next();
    c.skip(&Token::Semicolon);
    match c.loops.last().copied() {
        Some(l) => c.gjmp(l.brk),
        None => c.error(ParseError::BreakOutsideLoop),
    }
}

fn stmt_continue(c: &mut Compiler) {
    c.next();
    c.skip(&Token::Semicolon);
    match c.loops.last().copied() {
        Some(l) => c.gjmp(l.cont),
        None => c.error(ParseError::ContinueOutsideLoop),
    }
}

/*============================================================
 * Declarations
 *============================================================*/

/// One declaration: a type followed by a comma-separated declarator list,
/// or a function definition.
pub fn decl(c: &mut Compiler) {
    let Some(t) = parse_type(c) else {
        c.error(ParseError::ExpectedType(c.tok.clone()));
        // skip the unknown token to prevent an infinite loop
        c.next();
        return;
    };

    loop {
        let pt = parse_pointer(c, t);
        let Some(name) = take_identifier(c) else {
            return;
        };

        if c.tok == Token::OpenParanth {
            decl_func(c, name, pt);
            return;
        }

        if c.tok == Token::OpenBracket {
            // fixed-size array, 8 bytes per element
            c.next();
            let mut n: i64 = 0;
            if let Token::Constant(v) = c.tok {
                n = v;
                c.next();
            }
            c.skip(&Token::CloseBracket);
            c.loc -= n * 8;
            c.sym_push(name, CType(pt.0 | VT_ARRAY), Storage::Local, c.loc);
        } else {
            let r = if c.local_scope == 0 {
                let off = c.sections[c.data_sec].reserve(8) as i64;
                let r = c.sym_push(name, pt, Storage::Const, off);
                let data_sec = c.data_sec;
                if let SymRef::Global(idx) = r {
                    c.globals.get_mut(idx).sec = Some(data_sec);
                }
                r
            } else {
                let size = pt.size();
                c.loc -= (size + 7) & !7;
                c.sym_push(name, pt, Storage::Local, c.loc)
            };

            if c.tok == Token::Assign {
                c.next();
                expr(c);
                let sym = c.sym(r);
                let (st, sc) = (sym.st, sym.c);
                c.vsetc(pt, st, true, sc);
                c.vswap();
                c.gen_op(Op::Assign);
                c.vpop();
            }
        }

        if c.tok == Token::Comma {
            c.next();
        } else {
            break;
        }
    }

    if c.tok == Token::Semicolon {
        c.next();
    }
}

fn decl_func(c: &mut Compiler, name: String, t: CType) {
    c.next(); // '('

    let ft = CType((t.0 & !VT_BTYPE) | VT_FUNC);
    let fidx = c
        .globals
        .push(name, ft, Storage::Const, c.ind as i64);
    let text_sec = c.text_sec;
    c.globals.get_mut(fidx).sec = Some(text_sec);

    c.local_scope += 1;
    let mark = c.locals.mark();

    // parameters land past the saved return address and RBP; the prologue
    // spills the four register arguments to exactly these slots
    let mut param_offset: i64 = 16;
    while c.tok != Token::CloseParanth && c.tok != Token::Eof {
        if c.tok == Token::Ellipsis {
            c.next();
            break;
        }
        let Some(pt) = parse_type(c) else {
            c.error(ParseError::ExpectedType(c.tok.clone()));
            break;
        };
        let pt = parse_pointer(c, pt);
        if let Token::Identifier(pname) = &mut c.tok {
            let pname = std::mem::take(pname);
            c.next();
            c.locals.push(pname, pt, Storage::Local, param_offset);
            param_offset += 8;
        }
        if c.tok == Token::Comma {
            c.next();
        } else {
            break;
        }
    }
    c.skip(&Token::CloseParanth);

    if c.tok == Token::OpenCurly {
        // definition
        c.func_ret = t;
        c.gfunc_prolog();
        statement(c);
    } else {
        // just a declaration
        c.skip(&Token::Semicolon);
    }

    c.locals.pop_to(mark);
    c.local_scope -= 1;
}
