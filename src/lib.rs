/*!
A tiny single-pass C compiler that writes native Windows x64 executables in
PE32+ format directly, with no external assembler or linker. Inspired by
Fabrice Bellard's TCC.

There is no syntax tree and no intermediate representation. The
[parser](parser) consumes tokens produced by the [lexer](lexer) and drives
the [code generator](gen) as it goes: every expression production leaves one
entry on a typed value stack, and operators materialize their operands into
registers at the last possible moment through [gv](compiler::Compiler::gv).
The [x86](x86) module lowers value-stack operations into raw instruction
bytes appended to the text section; forward branches thread a fix-up chain
through the emitted code that is resolved when the target label is defined.
The [pe](pe) module finally lays the sections out into a fixed-format PE32+
image.

## Compilation stages
1. **Tokenization** - [Compiler::next](compiler::Compiler::next) reads one
   token at a time from a stack of buffered files. Lexical errors are
   reported with file and line and lexing resumes.
2. **Parsing and code generation** - [parse_file](parser::parse_file) walks
   declarations, statements, and the C expression precedence ladder, pushing
   [Value](gen::Value) descriptors and emitting machine code as each
   production completes.
3. **Image output** - [pe::output_file] serializes `.text`, `.data`, and
   `.rdata` behind a 0x200-byte header blob, computing the entry point from
   the offset of `main`.

## Supported language
A subset of C89: scalar integer types with signedness, pointers (shallow),
fixed-size arrays, functions with the Windows x64 calling convention,
`if`/`else`, the three loop forms, `break`/`continue`, `return`, the full
integer operator set including compound assignment, `sizeof`, string and
character literals. `struct`, `union`, `enum`, `typedef`, `goto`, `switch`,
floating point, and the preprocessor are lexed but not implemented.
*/

#![deny(unused_must_use)]
#![warn(clippy::pedantic)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_panics_doc)]

pub mod args;
pub mod compiler;
pub mod gen;
pub mod lexer;
pub mod parser;
pub mod pe;
pub mod section;
pub mod sym;
pub mod types;
pub mod x86;
