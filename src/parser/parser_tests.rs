use crate::compiler::Compiler;

fn compile(src: &str) -> Compiler {
    let mut c = Compiler::new();
    c.compile_source("<test>", src);
    c
}

fn text(c: &Compiler) -> &[u8] {
    &c.sections[c.text_sec].data
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn test_return_constant_exact_bytes() {
    let c = compile("int main(){ return 7; }");
    assert_eq!(c.nb_errors, 0);
    let expected: Vec<u8> = vec![
        // prologue
        0x55, // push rbp
        0x48, 0x89, 0xe5, // mov rbp, rsp
        0x48, 0x83, 0xec, 0x60, // sub rsp, 0x60
        0x48, 0x89, 0x4d, 0x10, // mov [rbp+16], rcx
        0x48, 0x89, 0x55, 0x18, // mov [rbp+24], rdx
        0x4c, 0x89, 0x45, 0x20, // mov [rbp+32], r8
        0x4c, 0x89, 0x4d, 0x28, // mov [rbp+40], r9
        // return 7
        0x48, 0xc7, 0xc0, 0x07, 0x00, 0x00, 0x00, // mov rax, 7
        0x48, 0x89, 0xec, // mov rsp, rbp
        0x5d, // pop rbp
        0xc3, // ret
    ];
    assert_eq!(text(&c), expected.as_slice());
}

#[test]
fn test_locals_and_arithmetic() {
    let c = compile("int main(){ int a=3, b=4; return a*b+2; }");
    assert_eq!(c.nb_errors, 0);
    let t = text(&c);
    // a and b live at [rbp-8] and [rbp-16]
    assert!(contains(t, &[0x89, 0x45, 0xf8])); // mov [rbp-8], eax
    assert!(contains(t, &[0x89, 0x45, 0xf0])); // mov [rbp-16], eax
    assert!(contains(t, &[0x48, 0x63, 0x4d, 0xf0])); // movsxd rcx, [rbp-16]
    assert!(contains(t, &[0x48, 0x63, 0x45, 0xf8])); // movsxd rax, [rbp-8]
    assert!(contains(t, &[0x48, 0x0f, 0xaf, 0xc1])); // imul rax, rcx
    assert!(contains(t, &[0x48, 0x01, 0xc8])); // add rax, rcx
}

#[test]
fn test_while_loop() {
    let c = compile("int main(){ int i=0, s=0; while(i<5){ s=s+i; i=i+1; } return s; }");
    assert_eq!(c.nb_errors, 0);
    assert!(c.vstack.is_empty());
    // every forward fix-up was resolved
    assert!(!contains(text(&c), &[0xff, 0xff, 0xff, 0xff]));
}

#[test]
fn test_if_else() {
    let c = compile("int main(){ int x=5; if (x>3) return 1; else return 0; }");
    assert_eq!(c.nb_errors, 0);
    assert!(c.vstack.is_empty());
    let t = text(&c);
    assert!(contains(t, &[0x0f, 0x9f, 0xc0])); // setg al
    assert!(contains(t, &[0x0f, 0x84])); // je over the then branch
    assert!(!contains(t, &[0xff, 0xff, 0xff, 0xff]));
}

#[test]
fn test_for_and_do_loops() {
    let c = compile(
        "int main(){ int s=0; int i; for (i=0; i<3; i=i+1) { s=s+i; } \
         do { s=s+1; } while (s < 10); return s; }",
    );
    assert_eq!(c.nb_errors, 0);
    assert!(c.vstack.is_empty());
    assert!(!contains(text(&c), &[0xff, 0xff, 0xff, 0xff]));
}

#[test]
fn test_break_continue_target_the_loop() {
    let c = compile("int main(){ int i=0; while(1){ i=i+1; if (i==3) break; } return i; }");
    assert_eq!(c.nb_errors, 0);
    assert!(c.vstack.is_empty());
    assert!(!contains(text(&c), &[0xff, 0xff, 0xff, 0xff]));
}

#[test]
fn test_break_outside_loop_is_diagnosed() {
    let c = compile("int main(){ break; }");
    assert_eq!(c.nb_errors, 1);
}

#[test]
fn test_call_with_register_args() {
    let c = compile("int g(int a, int b){ return b; } int main(){ return g(10, 20); }");
    assert_eq!(c.nb_errors, 0);
    let t = text(&c);
    assert!(contains(t, &[0x48, 0x83, 0xec, 0x20])); // sub rsp, 32
    assert!(contains(t, &[0x48, 0x83, 0xc4, 0x20])); // add rsp, 32
    assert!(contains(t, &[0x48, 0xc7, 0xc1, 0x0a, 0x00, 0x00, 0x00])); // mov rcx, 10
    assert!(contains(t, &[0x48, 0xc7, 0xc2, 0x14, 0x00, 0x00, 0x00])); // mov rdx, 20
    // no stack arguments, so no pushes
    assert!(!t.contains(&0x50));
    // second parameter is read back from its shadow slot
    assert!(contains(t, &[0x48, 0x63, 0x45, 0x18])); // movsxd rax, [rbp+24]
}

#[test]
fn test_call_with_stack_args_exact_sequence() {
    let c = compile(
        "int f(int a,int b,int c,int d,int e,int g){return a;} \
         int main(){return f(1,2,3,4,5,6);}",
    );
    assert_eq!(c.nb_errors, 0);
    let t = text(&c);

    // f: 24 bytes of prologue, 4 of parameter load, 5 of epilogue
    assert_eq!(&t[24..28], &[0x48, 0x63, 0x45, 0x10]); // movsxd rax, [rbp+16]
    let main_start = 33;
    let call_seq: Vec<u8> = vec![
        0x48, 0xc7, 0xc0, 0x06, 0x00, 0x00, 0x00, // mov rax, 6
        0x50, // push rax
        0x48, 0xc7, 0xc0, 0x05, 0x00, 0x00, 0x00, // mov rax, 5
        0x50, // push rax
        0x48, 0xc7, 0xc0, 0x04, 0x00, 0x00, 0x00, // mov rax, 4
        0x49, 0x89, 0xc1, // mov r9, rax
        0x48, 0xc7, 0xc0, 0x03, 0x00, 0x00, 0x00, // mov rax, 3
        0x49, 0x89, 0xc0, // mov r8, rax
        0x48, 0xc7, 0xc2, 0x02, 0x00, 0x00, 0x00, // mov rdx, 2
        0x48, 0xc7, 0xc1, 0x01, 0x00, 0x00, 0x00, // mov rcx, 1
        0x48, 0x83, 0xec, 0x20, // sub rsp, 32
        0xe8, 0x8c, 0xff, 0xff, 0xff, // call f (rel32 = 0 - 116)
        0x48, 0x83, 0xc4, 0x30, // add rsp, 48
        0x48, 0x89, 0xec, // mov rsp, rbp
        0x5d, 0xc3,
    ];
    assert_eq!(&t[main_start + 24..], call_seq.as_slice());
}

#[test]
fn test_compound_assignment() {
    let c = compile("int main(){ int a=5; a += 3; a <<= 1; return a; }");
    assert_eq!(c.nb_errors, 0);
    assert!(c.vstack.is_empty());
    let t = text(&c);
    assert!(contains(t, &[0x48, 0xd3, 0xe0])); // shl rax, cl
}

#[test]
fn test_prefix_increment() {
    let c = compile("int main(){ int a=1; ++a; a++; return a; }");
    assert_eq!(c.nb_errors, 0);
    assert!(c.vstack.is_empty());
}

#[test]
fn test_sizeof() {
    let c = compile("int main(){ return sizeof(int); }");
    assert_eq!(c.nb_errors, 0);
    assert!(contains(text(&c), &[0x48, 0xc7, 0xc0, 0x04, 0x00, 0x00, 0x00]));

    let c = compile("int main(){ return sizeof(char*); }");
    assert_eq!(c.nb_errors, 0);
    assert!(contains(text(&c), &[0x48, 0xc7, 0xc0, 0x08, 0x00, 0x00, 0x00]));
}

#[test]
fn test_scope_shadowing() {
    let c = compile("int main(){ int x=1; { int x=2; } return x; }");
    assert_eq!(c.nb_errors, 0);
    // all locals were popped with their scopes
    assert!(c.locals.is_empty());
}

#[test]
fn test_unary_operators() {
    let c = compile("int main(){ int a=2; return -a + !a + ~a; }");
    assert_eq!(c.nb_errors, 0);
    assert!(c.vstack.is_empty());
    let t = text(&c);
    assert!(contains(t, &[0x48, 0x29, 0xc8])); // sub rax, rcx (negation)
    assert!(contains(t, &[0x0f, 0x94, 0xc0])); // sete al (logical not)
    assert!(contains(t, &[0x48, 0xf7, 0xd0])); // not rax
}

#[test]
fn test_implicit_function_declaration() {
    // K&R fallback: an unknown identifier becomes int()
    let c = compile("int main(){ return missing(); }");
    assert_eq!(c.nb_errors, 0);
    assert!(c.globals.find("missing").is_some());
}

#[test]
fn test_declaration_error_recovery() {
    let c = compile("int 5; int main(){ return 0; }");
    assert!(c.nb_errors >= 1);
    // parsing resumed and still saw main
    assert!(c.globals.find("main").is_some());
}

#[test]
fn test_reserved_keywords_are_diagnosed() {
    let c = compile("int main(){ goto out; return 0; }");
    assert!(c.nb_errors >= 1);
}

#[test]
fn test_value_stack_empty_after_statements() {
    for src in [
        "int main(){ return 7; }",
        "int main(){ int a=3, b=4; return a*b+2; }",
        "int main(){ int i=0, s=0; while(i<5){ s=s+i; i=i+1; } return s; }",
        "int add2(int a,int b){return a+b;} int main(){return add2(10,20);}",
        "int main(){ int x=5; if (x>3) return 1; else return 0; }",
    ] {
        let c = compile(src);
        assert_eq!(c.nb_errors, 0, "{src}");
        assert!(c.vstack.is_empty(), "{src}");
    }
}
