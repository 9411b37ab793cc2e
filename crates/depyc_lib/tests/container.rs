//! Whole-container tests: a hand-marshalled module file through the public
//! entry points.

use depyc_lib::{
    decompile, decompile_with_options, DecompileMode, DecompileOptions, DepycError, Version,
};

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.push(b's');
    put_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn put_name_tuple(buf: &mut Vec<u8>, names: &[&str]) {
    buf.push(b'(');
    put_u32(buf, names.len() as u32);
    for name in names {
        put_str(buf, name.as_bytes());
    }
}

/// Marshals a release-2.5 code object with the given stream and constant
/// pool payload (already marshalled).
fn put_code_25(buf: &mut Vec<u8>, bytecode: &[u8], consts_payload: &[u8], names: &[&str]) {
    buf.push(b'c');
    put_u32(buf, 0); // argcount
    put_u32(buf, 0); // nlocals
    put_u32(buf, 4); // stacksize
    put_u32(buf, 64); // flags
    put_str(buf, bytecode);
    buf.extend_from_slice(consts_payload);
    put_name_tuple(buf, names);
    put_name_tuple(buf, &[]); // varnames
    put_name_tuple(buf, &[]); // freevars
    put_name_tuple(buf, &[]); // cellvars
    put_str(buf, b"test.py");
    put_str(buf, b"<module>");
    put_u32(buf, 1); // firstlineno
    put_str(buf, b""); // lnotab
}

fn hello_module() -> Vec<u8> {
    // LOAD_CONST 'hello'; PRINT_ITEM; PRINT_NEWLINE; LOAD_CONST None; RETURN
    let bytecode = [100u8, 0, 0, 71, 72, 100, 1, 0, 83];

    let mut consts = Vec::new();
    consts.push(b'(');
    put_u32(&mut consts, 2);
    put_str(&mut consts, b"hello");
    consts.push(b'N');

    let mut buf = vec![0xB3, 0xF2, 0x0D, 0x0A]; // release 2.5 magic
    put_u32(&mut buf, 0); // timestamp
    put_code_25(&mut buf, &bytecode, &consts, &[]);
    buf
}

#[test]
fn decompiles_a_marshalled_module() {
    let out = decompile(&hello_module()).expect("container should load");
    assert_eq!(out.version, Version::new(2, 5));
    assert!(out.clean);
    assert_eq!(out.text, "print 'hello'\n");
}

#[test]
fn disassembly_lists_instructions() {
    let out = decompile_with_options(
        &hello_module(),
        DecompileOptions { mode: DecompileMode::Disasm },
    )
    .expect("container should load");

    assert!(out.text.starts_with("code <module>"));
    assert!(out.text.contains("LOAD_CONST"));
    assert!(out.text.contains("'hello'"));
    assert!(out.text.contains("PRINT_NEWLINE"));
    assert!(out.text.contains("RETURN_VALUE"));
}

#[test]
fn truncated_container_reports_eof() {
    let mut bytes = hello_module();
    bytes.truncate(bytes.len() - 10);
    assert!(matches!(decompile(&bytes), Err(DepycError::Eof)));
}

#[test]
fn future_release_magic_is_rejected() {
    // 3.2-era magic (3180) with an otherwise valid header shape.
    let mut buf = vec![0x6C, 0x0C, 0x0D, 0x0A];
    put_u32(&mut buf, 0);
    buf.push(b'N');
    assert!(matches!(
        decompile(&buf),
        Err(DepycError::UnsupportedVersion { major: 3, minor: 2 })
    ));
}
