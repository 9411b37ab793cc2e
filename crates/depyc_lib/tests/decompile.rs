//! End-to-end reconstruction tests: hand-assembled instruction streams in
//! the historical numbering, checked against the exact source text.

use std::rc::Rc;

use depyc_lib::printer::print_module;
use depyc_lib::{Code, Module, Object, Version};

// Shared opcode numbers (stable across the 2.x line).
const POP_TOP: u8 = 1;
const ROT_TWO: u8 = 2;
const DUP_TOP: u8 = 4;
const UNARY_NOT: u8 = 12;
const LIST_APPEND_25: u8 = 18;
const BINARY_ADD: u8 = 23;
const SLICE_3: u8 = 33;
const INPLACE_ADD: u8 = 55;
const STORE_SUBSCR: u8 = 60;
const GET_ITER: u8 = 68;
const PRINT_ITEM: u8 = 71;
const PRINT_NEWLINE: u8 = 72;
const BREAK_LOOP: u8 = 80;
const LOAD_LOCALS: u8 = 82;
const RETURN_VALUE: u8 = 83;
const EXEC_STMT: u8 = 85;
const POP_BLOCK: u8 = 87;
const END_FINALLY: u8 = 88;
const BUILD_CLASS: u8 = 89;
const STORE_NAME: u8 = 90;
const UNPACK_SEQUENCE: u8 = 92;
const FOR_ITER: u8 = 93;
const STORE_ATTR: u8 = 95;
const STORE_GLOBAL: u8 = 97;
const LOAD_CONST: u8 = 100;
const LOAD_NAME: u8 = 101;
const BUILD_TUPLE: u8 = 102;
const BUILD_LIST: u8 = 103;
const BUILD_MAP: u8 = 104;
const COMPARE_OP: u8 = 106;
const IMPORT_NAME: u8 = 107;
const IMPORT_FROM: u8 = 108;
const JUMP_FORWARD: u8 = 110;
const JUMP_IF_FALSE_25: u8 = 111;
const JUMP_ABSOLUTE: u8 = 113;
const POP_JUMP_IF_FALSE_27: u8 = 114;
const LOAD_GLOBAL: u8 = 116;
const SETUP_LOOP: u8 = 120;
const SETUP_EXCEPT: u8 = 121;
const SETUP_FINALLY: u8 = 122;
const LOAD_FAST: u8 = 124;
const STORE_FAST: u8 = 125;
const DELETE_FAST: u8 = 126;
const RAISE_VARARGS: u8 = 130;
const CALL_FUNCTION: u8 = 131;
const MAKE_FUNCTION: u8 = 132;

struct Asm {
    buf: Vec<u8>,
}

impl Asm {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn op(mut self, op: u8) -> Self {
        self.buf.push(op);
        self
    }

    fn op_a(mut self, op: u8, arg: u16) -> Self {
        self.buf.push(op);
        self.buf.extend_from_slice(&arg.to_le_bytes());
        self
    }

    fn done(self) -> Vec<u8> {
        self.buf
    }
}

fn str_obj(s: &str) -> Object {
    Object::Str(s.as_bytes().to_vec())
}

fn decompile(version: Version, code: Code) -> String {
    print_module(&Module { version, code: Rc::new(code) }).text
}

fn v25() -> Version {
    Version::new(2, 5)
}

fn v27() -> Version {
    Version::new(2, 7)
}

#[test]
fn adds_two_locals() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_FAST, 0)
            .op_a(LOAD_FAST, 1)
            .op(BINARY_ADD)
            .op(RETURN_VALUE)
            .done(),
        var_names: vec!["a".into(), "b".into()],
        ..Default::default()
    };
    assert_eq!(decompile(v27(), code), "return a + b\n");
}

#[test]
fn print_statement_strips_implicit_return() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op(PRINT_ITEM)
            .op(PRINT_NEWLINE)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        consts: vec![str_obj("hello"), Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "print 'hello'\n");
}

#[test]
fn reconstructs_for_loop() {
    // 0 SETUP_LOOP ->22 | 3 LOAD_FAST xs | 6 GET_ITER | 7 FOR_ITER ->21
    // 10 STORE_FAST x | 13 LOAD_FAST x | 16 PRINT_ITEM | 17 PRINT_NEWLINE
    // 18 JUMP_ABSOLUTE 7 | 21 POP_BLOCK | 22 LOAD_CONST None | 25 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(SETUP_LOOP, 19)
            .op_a(LOAD_FAST, 0)
            .op(GET_ITER)
            .op_a(FOR_ITER, 11)
            .op_a(STORE_FAST, 1)
            .op_a(LOAD_FAST, 1)
            .op(PRINT_ITEM)
            .op(PRINT_NEWLINE)
            .op_a(JUMP_ABSOLUTE, 7)
            .op(POP_BLOCK)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        var_names: vec!["xs".into(), "x".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v27(), code), "for x in xs:\n    print x\n");
}

#[test]
fn conditional_return_keeps_fallthrough() {
    // 0 LOAD_FAST a | 3 LOAD_CONST 0 | 6 COMPARE_OP > | 9 POP_JUMP_IF_FALSE 16
    // 12 LOAD_CONST 1 | 15 RETURN | 16 LOAD_CONST 2 | 19 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_FAST, 0)
            .op_a(LOAD_CONST, 0)
            .op_a(COMPARE_OP, 4)
            .op_a(POP_JUMP_IF_FALSE_27, 16)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .op_a(LOAD_CONST, 2)
            .op(RETURN_VALUE)
            .done(),
        var_names: vec!["a".into()],
        consts: vec![Object::Int(0), Object::Int(1), Object::Int(2)],
        ..Default::default()
    };
    assert_eq!(
        decompile(v27(), code),
        "if a > 0:\n    return 1\nreturn 2\n"
    );
}

#[test]
fn reconstructs_try_except() {
    // 0 SETUP_EXCEPT ->14 | 3 LOAD_GLOBAL f | 6 CALL 0 | 9 POP_TOP
    // 10 POP_BLOCK | 11 JUMP_FORWARD ->28 | 14..16 POP_TOP x3
    // 17 LOAD_GLOBAL g | 20 CALL 0 | 23 POP_TOP | 24 JUMP_FORWARD ->28
    // 27 END_FINALLY | 28 LOAD_CONST None | 31 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(SETUP_EXCEPT, 11)
            .op_a(LOAD_GLOBAL, 0)
            .op_a(CALL_FUNCTION, 0)
            .op(POP_TOP)
            .op(POP_BLOCK)
            .op_a(JUMP_FORWARD, 14)
            .op(POP_TOP)
            .op(POP_TOP)
            .op(POP_TOP)
            .op_a(LOAD_GLOBAL, 1)
            .op_a(CALL_FUNCTION, 0)
            .op(POP_TOP)
            .op_a(JUMP_FORWARD, 1)
            .op(END_FINALLY)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["f".into(), "g".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "\ntry:\n    f()\nexcept:\n    g()\n\n"
    );
}

#[test]
fn list_comprehension_suppresses_scaffolding() {
    // 0 BUILD_LIST 0 | 3 DUP_TOP | 4 STORE_FAST _[1] | 7 LOAD_FAST xs
    // 10 GET_ITER | 11 FOR_ITER ->27 | 14 STORE_FAST x | 17 LOAD_FAST _[1]
    // 20 LOAD_FAST x | 23 LIST_APPEND | 24 JUMP_ABSOLUTE 11
    // 27 DELETE_FAST _[1] | 30 STORE_FAST ys | 33 LOAD_CONST None | 36 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(BUILD_LIST, 0)
            .op(DUP_TOP)
            .op_a(STORE_FAST, 2)
            .op_a(LOAD_FAST, 0)
            .op(GET_ITER)
            .op_a(FOR_ITER, 13)
            .op_a(STORE_FAST, 1)
            .op_a(LOAD_FAST, 2)
            .op_a(LOAD_FAST, 1)
            .op(LIST_APPEND_25)
            .op_a(JUMP_ABSOLUTE, 11)
            .op_a(DELETE_FAST, 2)
            .op_a(STORE_FAST, 3)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        var_names: vec!["xs".into(), "x".into(), "_[1]".into(), "ys".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "ys = [ x for x in xs ]\n");
}

#[test]
fn while_loop_takes_its_condition() {
    // 0 SETUP_LOOP ->20 | 3 LOAD_NAME a | 6 JUMP_IF_FALSE ->18 | 9 POP_TOP
    // 10 LOAD_NAME a | 13 PRINT_ITEM | 14 PRINT_NEWLINE | 15 JUMP_ABSOLUTE 3
    // 18 POP_TOP | 19 POP_BLOCK | 20 LOAD_CONST None | 23 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(SETUP_LOOP, 17)
            .op_a(LOAD_NAME, 0)
            .op_a(JUMP_IF_FALSE_25, 9)
            .op(POP_TOP)
            .op_a(LOAD_NAME, 0)
            .op(PRINT_ITEM)
            .op(PRINT_NEWLINE)
            .op_a(JUMP_ABSOLUTE, 3)
            .op(POP_TOP)
            .op(POP_BLOCK)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["a".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "while a:\n    print a\n");
}

#[test]
fn break_statement_survives_loop_close() {
    // 0 SETUP_LOOP ->16 | 3 LOAD_NAME a | 6 JUMP_IF_FALSE ->14 | 9 POP_TOP
    // 10 BREAK_LOOP | 11 JUMP_ABSOLUTE 3 | 14 POP_TOP | 15 POP_BLOCK
    // 16 LOAD_CONST None | 19 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(SETUP_LOOP, 13)
            .op_a(LOAD_NAME, 0)
            .op_a(JUMP_IF_FALSE_25, 5)
            .op(POP_TOP)
            .op(BREAK_LOOP)
            .op_a(JUMP_ABSOLUTE, 3)
            .op(POP_TOP)
            .op(POP_BLOCK)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["a".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "while a:\n    break\n");
}

#[test]
fn if_else_arms_render_in_order() {
    // 0 LOAD_NAME a | 3 JUMP_IF_FALSE ->16 | 6 POP_TOP | 7 LOAD_CONST 1
    // 10 STORE_NAME x | 13 JUMP_FORWARD ->23 | 16 POP_TOP | 17 LOAD_CONST 2
    // 20 STORE_NAME x | 23 LOAD_CONST None | 26 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(JUMP_IF_FALSE_25, 10)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 0)
            .op_a(STORE_NAME, 1)
            .op_a(JUMP_FORWARD, 7)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 1)
            .op_a(STORE_NAME, 1)
            .op_a(LOAD_CONST, 2)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["a".into(), "x".into()],
        consts: vec![Object::Int(1), Object::Int(2), Object::None],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "if a:\n    x = 1\nelse:\n    x = 2\n"
    );
}

#[test]
fn empty_else_collapses_into_elif() {
    // if a: x = 1
    // elif b: x = 2
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(JUMP_IF_FALSE_25, 10)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 0)
            .op_a(STORE_NAME, 2)
            .op_a(JUMP_FORWARD, 18)
            .op(POP_TOP)
            .op_a(LOAD_NAME, 1)
            .op_a(JUMP_IF_FALSE_25, 10)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 1)
            .op_a(STORE_NAME, 2)
            .op_a(JUMP_FORWARD, 1)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 2)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["a".into(), "b".into(), "x".into()],
        consts: vec![Object::Int(1), Object::Int(2), Object::None],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "if a:\n    x = 1\nelif b:\n    x = 2\n"
    );
}

#[test]
fn for_loop_else_clause() {
    // 0 SETUP_LOOP ->34 | 3 LOAD_NAME xs | 6 GET_ITER | 7 FOR_ITER ->26
    // 10 STORE_NAME x | 13 LOAD_NAME f | 16 LOAD_NAME x | 19 CALL 1
    // 22 POP_TOP | 23 JUMP_ABSOLUTE 7 | 26 POP_BLOCK | 27 LOAD_NAME g
    // 30 CALL 0 | 33 POP_TOP | 34 LOAD_CONST None | 37 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(SETUP_LOOP, 31)
            .op_a(LOAD_NAME, 0)
            .op(GET_ITER)
            .op_a(FOR_ITER, 16)
            .op_a(STORE_NAME, 1)
            .op_a(LOAD_NAME, 2)
            .op_a(LOAD_NAME, 1)
            .op_a(CALL_FUNCTION, 1)
            .op(POP_TOP)
            .op_a(JUMP_ABSOLUTE, 7)
            .op(POP_BLOCK)
            .op_a(LOAD_NAME, 3)
            .op_a(CALL_FUNCTION, 0)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["xs".into(), "x".into(), "f".into(), "g".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "for x in xs:\n    f(x)\nelse:\n    g()\n"
    );
}

#[test]
fn try_finally_without_explicit_except() {
    // 0 SETUP_FINALLY ->14 | 3 LOAD_GLOBAL f | 6 CALL 0 | 9 POP_TOP
    // 10 POP_BLOCK | 11 LOAD_CONST None | 14 LOAD_GLOBAL g | 17 CALL 0
    // 20 POP_TOP | 21 END_FINALLY | 22 LOAD_CONST None | 25 RETURN
    let code = Code {
        code: Asm::new()
            .op_a(SETUP_FINALLY, 11)
            .op_a(LOAD_GLOBAL, 0)
            .op_a(CALL_FUNCTION, 0)
            .op(POP_TOP)
            .op(POP_BLOCK)
            .op_a(LOAD_CONST, 0)
            .op_a(LOAD_GLOBAL, 1)
            .op_a(CALL_FUNCTION, 0)
            .op(POP_TOP)
            .op(END_FINALLY)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["f".into(), "g".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "\ntry:\n    f()\nfinally:\n    g()\n\n"
    );
}

#[test]
fn tuple_unpack_assignment() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 2)
            .op_a(UNPACK_SEQUENCE, 2)
            .op_a(STORE_NAME, 0)
            .op_a(STORE_NAME, 1)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["a".into(), "b".into(), "c".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "(a, b) = c\n");
}

#[test]
fn augmented_assignment_prints_once() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(LOAD_CONST, 0)
            .op(INPLACE_ADD)
            .op_a(STORE_NAME, 0)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["x".into()],
        consts: vec![Object::Int(1), Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "x += 1\n");
}

#[test]
fn plain_import() {
    // 2.5 pushes a relative-import level before the from-list.
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op_a(LOAD_CONST, 1)
            .op_a(IMPORT_NAME, 0)
            .op_a(STORE_NAME, 0)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["os".into()],
        consts: vec![Object::Int(-1), Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "import os\n");
}

#[test]
fn from_import_with_rename() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op_a(LOAD_CONST, 1)
            .op_a(IMPORT_NAME, 0)
            .op_a(IMPORT_FROM, 1)
            .op_a(STORE_NAME, 2)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 2)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["os".into(), "path".into(), "p".into()],
        consts: vec![
            Object::Int(-1),
            Object::Tuple(vec![str_obj("path")]),
            Object::None,
        ],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "from os import path as p\n");
}

#[test]
fn exec_with_shared_globals() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(LOAD_NAME, 1)
            .op(DUP_TOP)
            .op(EXEC_STMT)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["s".into(), "g".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "exec s in g\n");
}

#[test]
fn raise_with_two_params() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(LOAD_NAME, 1)
            .op_a(RAISE_VARARGS, 2)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["ValueError".into(), "msg".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "raise ValueError, msg\n");
}

#[test]
fn slice_subscript_assignment() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(LOAD_CONST, 0)
            .op_a(LOAD_CONST, 1)
            .op(SLICE_3)
            .op_a(STORE_NAME, 1)
            .op_a(LOAD_CONST, 2)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["x".into(), "y".into()],
        consts: vec![Object::Int(1), Object::Int(2), Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "y = x[1:2]\n");
}

#[test]
fn attribute_store() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op_a(LOAD_NAME, 0)
            .op_a(STORE_ATTR, 1)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["x".into(), "y".into()],
        consts: vec![Object::Int(1), Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "x.y = 1\n");
}

#[test]
fn map_literal_collects_stored_entries() {
    let code = Code {
        code: Asm::new()
            .op_a(BUILD_MAP, 0)
            .op(DUP_TOP)
            .op_a(LOAD_CONST, 0)
            .op(ROT_TWO)
            .op_a(LOAD_CONST, 1)
            .op(STORE_SUBSCR)
            .op_a(STORE_NAME, 0)
            .op_a(LOAD_CONST, 2)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["d".into()],
        consts: vec![str_obj("a"), Object::Int(1), Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "d = {\n    1: 'a' }\n");
}

#[test]
fn keyword_call_arguments() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(LOAD_CONST, 0)
            .op_a(LOAD_CONST, 1)
            .op_a(LOAD_CONST, 2)
            .op_a(CALL_FUNCTION, 0x0101)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 3)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["f".into()],
        consts: vec![
            Object::Int(1),
            str_obj("x"),
            Object::Int(2),
            Object::None,
        ],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "f(1, x = 2)\n");
}

#[test]
fn not_of_comparison_parenthesizes() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(LOAD_NAME, 1)
            .op_a(COMPARE_OP, 0)
            .op(UNARY_NOT)
            .op_a(STORE_NAME, 2)
            .op_a(LOAD_CONST, 0)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["a".into(), "b".into(), "r".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "r = not (a < b)\n");
}

fn add_function_code() -> Code {
    Code {
        name: "add".into(),
        arg_count: 2,
        code: Asm::new()
            .op_a(LOAD_FAST, 0)
            .op_a(LOAD_FAST, 1)
            .op(BINARY_ADD)
            .op(RETURN_VALUE)
            .done(),
        var_names: vec!["a".into(), "b".into()],
        ..Default::default()
    }
}

#[test]
fn function_definition_with_body() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op_a(MAKE_FUNCTION, 0)
            .op_a(STORE_NAME, 0)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["add".into()],
        consts: vec![Object::Code(Rc::new(add_function_code())), Object::None],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "\ndef add(a, b):\n    return a + b\n\n"
    );
}

#[test]
fn function_definition_with_default_argument() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 2)
            .op_a(LOAD_CONST, 0)
            .op_a(MAKE_FUNCTION, 1)
            .op_a(STORE_NAME, 0)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["add".into()],
        consts: vec![
            Object::Code(Rc::new(add_function_code())),
            Object::None,
            Object::Int(1),
        ],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "\ndef add(a, b = 1):\n    return a + b\n\n"
    );
}

#[test]
fn variadic_signature_comes_from_code_flags() {
    let func = Code {
        name: "f".into(),
        arg_count: 1,
        flags: Code::CO_VARARGS | Code::CO_VARKEYWORDS,
        code: Asm::new().op_a(LOAD_CONST, 0).op(RETURN_VALUE).done(),
        var_names: vec!["a".into(), "args".into(), "kwargs".into()],
        consts: vec![Object::None],
        ..Default::default()
    };
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op_a(MAKE_FUNCTION, 0)
            .op_a(STORE_NAME, 0)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["f".into()],
        consts: vec![Object::Code(Rc::new(func)), Object::None],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "\ndef f(a, *args, **kwargs):\n    pass\n\n"
    );
}

#[test]
fn store_global_emits_declaration() {
    let func = Code {
        name: "bump".into(),
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op_a(STORE_GLOBAL, 0)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["n".into()],
        consts: vec![Object::Int(1), Object::None],
        ..Default::default()
    };
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op_a(MAKE_FUNCTION, 0)
            .op_a(STORE_NAME, 0)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["bump".into()],
        consts: vec![Object::Code(Rc::new(func)), Object::None],
        ..Default::default()
    };
    assert_eq!(
        decompile(v25(), code),
        "\ndef bump():\n    global n\n    n = 1\n\n"
    );
}

#[test]
fn lambda_argument_renders_inline() {
    let lambda = Code {
        name: "<lambda>".into(),
        arg_count: 1,
        code: Asm::new()
            .op_a(LOAD_FAST, 0)
            .op_a(LOAD_CONST, 0)
            .op(BINARY_ADD)
            .op(RETURN_VALUE)
            .done(),
        var_names: vec!["x".into()],
        consts: vec![Object::Int(1)],
        ..Default::default()
    };
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(LOAD_CONST, 0)
            .op_a(MAKE_FUNCTION, 0)
            .op_a(CALL_FUNCTION, 1)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["g".into()],
        consts: vec![Object::Code(Rc::new(lambda)), Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "g(lambda (x): x + 1)\n");
}

#[test]
fn class_definition_strips_module_scaffolding() {
    let class_body = Code {
        name: "A".into(),
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(STORE_NAME, 1)
            .op(LOAD_LOCALS)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["__name__".into(), "__module__".into()],
        ..Default::default()
    };
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op_a(LOAD_NAME, 0)
            .op_a(BUILD_TUPLE, 1)
            .op_a(LOAD_CONST, 1)
            .op_a(MAKE_FUNCTION, 0)
            .op_a(CALL_FUNCTION, 0)
            .op(BUILD_CLASS)
            .op_a(STORE_NAME, 1)
            .op_a(LOAD_CONST, 2)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["B".into(), "A".into()],
        consts: vec![
            str_obj("A"),
            Object::Code(Rc::new(class_body)),
            Object::None,
        ],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "\nclass A(B):\n    pass\n\n");
}

#[test]
fn empty_body_renders_pass() {
    let code = Code {
        code: Asm::new().op_a(LOAD_CONST, 0).op(RETURN_VALUE).done(),
        consts: vec![Object::None],
        ..Default::default()
    };
    assert_eq!(decompile(v25(), code), "pass\n");
}

#[test]
fn unsupported_opcode_degrades_with_marker() {
    // STOP_CODE has no handler; the partial tree still prints.
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_CONST, 0)
            .op(PRINT_ITEM)
            .op(PRINT_NEWLINE)
            .op(0)
            .op_a(LOAD_CONST, 1)
            .op(RETURN_VALUE)
            .done(),
        consts: vec![str_obj("hi"), Object::None],
        ..Default::default()
    };
    let out = print_module(&Module {
        version: v25(),
        code: Rc::new(code),
    });
    assert!(!out.clean);
    assert!(out.text.contains("print 'hi'"));
    assert!(out.text.ends_with("# WARNING: Decompyle incomplete\n"));
    assert!(out
        .warnings
        .iter()
        .any(|w| w.contains("Unsupported opcode: STOP_CODE")));
}

#[test]
fn two_passes_produce_identical_trees() {
    let code = Code {
        code: Asm::new()
            .op_a(LOAD_NAME, 0)
            .op_a(JUMP_IF_FALSE_25, 10)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 0)
            .op_a(STORE_NAME, 1)
            .op_a(JUMP_FORWARD, 7)
            .op(POP_TOP)
            .op_a(LOAD_CONST, 1)
            .op_a(STORE_NAME, 1)
            .op_a(LOAD_CONST, 2)
            .op(RETURN_VALUE)
            .done(),
        names: vec!["a".into(), "x".into()],
        consts: vec![Object::Int(1), Object::Int(2), Object::None],
        ..Default::default()
    };
    let first = depyc_lib::build_code(&code, v25());
    let second = depyc_lib::build_code(&code, v25());
    assert_eq!(first.tree, second.tree);
    assert_eq!(first.clean, second.clean);
}
