//! Compiled-module container and the marshalled object pool.
//!
//! A `.pyc`-style container is a 4-byte magic, a 4-byte timestamp, then one
//! marshalled code object. The magic's low half-word identifies the compiler
//! release, which drives both the marshal field widths and the opcode table
//! selection.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::DepycError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    pub fn before(&self, major: u8, minor: u8) -> bool {
        !self.at_least(major, minor)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Maps a release magic (low half-word of the container header) to the
/// source-language version. Intermediate alpha/beta magics fall inside the
/// ranges for their release.
fn version_from_magic(magic: u16) -> Option<Version> {
    let v = match magic {
        11913 => Version::new(1, 3),
        5892 => Version::new(1, 4),
        20121 => Version::new(1, 5),
        50428 => Version::new(1, 6),
        50823 => Version::new(2, 0),
        60202 => Version::new(2, 1),
        60717 => Version::new(2, 2),
        62011..=62021 => Version::new(2, 3),
        62041..=62061 => Version::new(2, 4),
        62071..=62131 => Version::new(2, 5),
        62151..=62161 => Version::new(2, 6),
        62171..=62211 => Version::new(2, 7),
        3111..=3131 => Version::new(3, 0),
        3141..=3151 => Version::new(3, 1),
        _ => return None,
    };
    Some(v)
}

/// A literal from the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Marshal's null tag; only ever seen as a dict terminator.
    Null,
    None,
    StopIteration,
    Ellipsis,
    Bool(bool),
    Int(i32),
    Int64(i64),
    Long(BigInt),
    Float(f64),
    Complex(f64, f64),
    /// A byte string. Kept raw so embedded code buffers survive intact.
    Str(Vec<u8>),
    Unicode(String),
    Tuple(Vec<Object>),
    List(Vec<Object>),
    Dict(Vec<(Object, Object)>),
    Set(Vec<Object>),
    Code(Rc<Code>),
}

impl Object {
    /// Best-effort identifier view, for name tables and `__doc__` checks.
    pub fn as_ident(&self) -> Option<String> {
        match self {
            Object::Str(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Object::Unicode(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// One compiled code unit: instruction stream, constant pool, name tables
/// and argument metadata.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Code {
    pub name: String,
    pub filename: String,
    pub arg_count: u16,
    pub num_locals: u16,
    pub stack_size: u16,
    pub flags: u32,
    pub code: Vec<u8>,
    pub consts: Vec<Object>,
    pub names: Vec<String>,
    pub var_names: Vec<String>,
    pub free_vars: Vec<String>,
    pub cell_vars: Vec<String>,
    pub first_line: u32,
    /// Names stored via `STORE_GLOBAL` during a build pass; the printer
    /// turns these into a `global` declaration at function entry.
    pub globals: RefCell<BTreeSet<String>>,
}

impl Code {
    pub const CO_OPTIMIZED: u32 = 0x0001;
    pub const CO_NEWLOCALS: u32 = 0x0002;
    pub const CO_VARARGS: u32 = 0x0004;
    pub const CO_VARKEYWORDS: u32 = 0x0008;
    pub const CO_NESTED: u32 = 0x0010;
    pub const CO_GENERATOR: u32 = 0x0020;

    pub fn get_name(&self, idx: usize) -> &str {
        self.names.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn get_var_name(&self, idx: usize) -> &str {
        self.var_names.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn get_const(&self, idx: usize) -> Object {
        self.consts.get(idx).cloned().unwrap_or(Object::None)
    }

    pub fn mark_global(&self, name: &str) {
        self.globals.borrow_mut().insert(name.to_string());
    }

    pub fn global_names(&self) -> Vec<String> {
        self.globals.borrow().iter().cloned().collect()
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn get_u8(&mut self) -> Result<u8, DepycError> {
        if self.remaining() < 1 {
            return Err(DepycError::Eof);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn get_u16(&mut self) -> Result<u16, DepycError> {
        if self.remaining() < 2 {
            return Err(DepycError::Eof);
        }
        let v = LittleEndian::read_u16(&self.buf[self.pos..self.pos + 2]);
        self.pos += 2;
        Ok(v)
    }

    fn get_u32(&mut self) -> Result<u32, DepycError> {
        if self.remaining() < 4 {
            return Err(DepycError::Eof);
        }
        let v = LittleEndian::read_u32(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(v)
    }

    fn get_i32(&mut self) -> Result<i32, DepycError> {
        Ok(self.get_u32()? as i32)
    }

    fn get_i64(&mut self) -> Result<i64, DepycError> {
        if self.remaining() < 8 {
            return Err(DepycError::Eof);
        }
        let v = LittleEndian::read_i64(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    fn get_f64(&mut self) -> Result<f64, DepycError> {
        if self.remaining() < 8 {
            return Err(DepycError::Eof);
        }
        let v = LittleEndian::read_f64(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], DepycError> {
        if self.remaining() < n {
            return Err(DepycError::Eof);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }
}

struct MarshalReader<'a> {
    r: Reader<'a>,
    version: Version,
    interned: Vec<Vec<u8>>,
}

impl<'a> MarshalReader<'a> {
    fn new(r: Reader<'a>, version: Version) -> Self {
        Self { r, version, interned: Vec::new() }
    }

    /// Counts inside code objects were 16-bit before release 2.3.
    fn get_count(&mut self) -> Result<u32, DepycError> {
        if self.version.before(2, 3) {
            Ok(self.r.get_u16()? as u32)
        } else {
            Ok(self.r.get_u32()?)
        }
    }

    fn get_float_text(&mut self) -> Result<f64, DepycError> {
        let len = self.r.get_u8()? as usize;
        let text = self.r.get_bytes(len)?;
        Ok(String::from_utf8_lossy(text).parse().unwrap_or(0.0))
    }

    fn read_object(&mut self) -> Result<Object, DepycError> {
        let at = self.r.offset();
        let tag = self.r.get_u8()?;
        match tag {
            b'0' => Ok(Object::Null),
            b'N' => Ok(Object::None),
            b'S' => Ok(Object::StopIteration),
            b'.' => Ok(Object::Ellipsis),
            b'F' => Ok(Object::Bool(false)),
            b'T' => Ok(Object::Bool(true)),
            b'i' => Ok(Object::Int(self.r.get_i32()?)),
            b'I' => Ok(Object::Int64(self.r.get_i64()?)),
            b'f' => Ok(Object::Float(self.get_float_text()?)),
            b'g' => Ok(Object::Float(self.r.get_f64()?)),
            b'x' => {
                let real = self.get_float_text()?;
                let imag = self.get_float_text()?;
                Ok(Object::Complex(real, imag))
            }
            b'y' => {
                let real = self.r.get_f64()?;
                let imag = self.r.get_f64()?;
                Ok(Object::Complex(real, imag))
            }
            b'l' => {
                let n = self.r.get_i32()?;
                let count = n.unsigned_abs() as usize;
                let mut digits = Vec::with_capacity(count);
                for _ in 0..count {
                    digits.push(self.r.get_u16()?);
                }
                // 15-bit digits, least significant first
                let mut value = BigInt::from(0);
                for &d in digits.iter().rev() {
                    value = (value << 15) + BigInt::from(d);
                }
                if n < 0 {
                    value = -value;
                }
                Ok(Object::Long(value))
            }
            b's' => {
                let len = self.r.get_i32()? as usize;
                Ok(Object::Str(self.r.get_bytes(len)?.to_vec()))
            }
            b't' => {
                let len = self.r.get_i32()? as usize;
                let bytes = self.r.get_bytes(len)?.to_vec();
                self.interned.push(bytes.clone());
                Ok(Object::Str(bytes))
            }
            b'R' => {
                let idx = self.r.get_u32()?;
                match self.interned.get(idx as usize) {
                    Some(bytes) => Ok(Object::Str(bytes.clone())),
                    None => Err(DepycError::BadStringRef(idx)),
                }
            }
            b'u' => {
                let len = self.r.get_i32()? as usize;
                let bytes = self.r.get_bytes(len)?;
                Ok(Object::Unicode(String::from_utf8_lossy(bytes).into_owned()))
            }
            b'(' => {
                let n = self.r.get_i32()? as usize;
                let mut items = Vec::with_capacity(n.min(4096));
                for _ in 0..n {
                    items.push(self.read_object()?);
                }
                Ok(Object::Tuple(items))
            }
            b'[' => {
                let n = self.r.get_i32()? as usize;
                let mut items = Vec::with_capacity(n.min(4096));
                for _ in 0..n {
                    items.push(self.read_object()?);
                }
                Ok(Object::List(items))
            }
            b'<' | b'>' => {
                let n = self.r.get_i32()? as usize;
                let mut items = Vec::with_capacity(n.min(4096));
                for _ in 0..n {
                    items.push(self.read_object()?);
                }
                Ok(Object::Set(items))
            }
            b'{' => {
                let mut entries = Vec::new();
                loop {
                    let key = self.read_object()?;
                    if key == Object::Null {
                        break;
                    }
                    let value = self.read_object()?;
                    entries.push((key, value));
                }
                Ok(Object::Dict(entries))
            }
            b'c' => Ok(Object::Code(Rc::new(self.read_code()?))),
            other => Err(DepycError::BadMarshalTag(other, at)),
        }
    }

    fn read_str_field(&mut self) -> Result<Vec<u8>, DepycError> {
        match self.read_object()? {
            Object::Str(b) => Ok(b),
            Object::Unicode(s) => Ok(s.into_bytes()),
            _ => Ok(Vec::new()),
        }
    }

    fn read_name_tuple(&mut self) -> Result<Vec<String>, DepycError> {
        let obj = self.read_object()?;
        let items = match obj {
            Object::Tuple(v) | Object::List(v) => v,
            _ => return Ok(Vec::new()),
        };
        Ok(items
            .iter()
            .map(|o| o.as_ident().unwrap_or_default())
            .collect())
    }

    fn read_code(&mut self) -> Result<Code, DepycError> {
        let v = self.version;

        let arg_count = self.get_count()? as u16;
        if v.major >= 3 {
            let _kwonly_arg_count = self.get_count()?;
        }
        let num_locals = self.get_count()? as u16;
        let stack_size = if v.at_least(1, 5) { self.get_count()? as u16 } else { 0 };
        let flags = self.get_count()?;

        let code = self.read_str_field()?;

        let consts = match self.read_object()? {
            Object::Tuple(v) => v,
            other => vec![other],
        };
        let names = self.read_name_tuple()?;
        let var_names = self.read_name_tuple()?;
        let (free_vars, cell_vars) = if v.at_least(2, 1) || v.major >= 3 {
            (self.read_name_tuple()?, self.read_name_tuple()?)
        } else {
            (Vec::new(), Vec::new())
        };

        let filename = String::from_utf8_lossy(&self.read_str_field()?).into_owned();
        let name = String::from_utf8_lossy(&self.read_str_field()?).into_owned();

        let (first_line, _lnotab) = if v.at_least(1, 5) {
            let line = self.get_count()?;
            let tab = self.read_str_field()?;
            (line, tab)
        } else {
            (0, Vec::new())
        };

        Ok(Code {
            name,
            filename,
            arg_count,
            num_locals,
            stack_size,
            flags,
            code,
            consts,
            names,
            var_names,
            free_vars,
            cell_vars,
            first_line,
            globals: RefCell::new(BTreeSet::new()),
        })
    }
}

/// A loaded compiled module: the detected version plus the top-level code
/// object. Version lookups drive opcode resolution and the handful of
/// per-release differences inside the engine.
#[derive(Debug, Clone)]
pub struct Module {
    pub version: Version,
    pub code: Rc<Code>,
}

impl Module {
    pub fn load(bytes: &[u8]) -> Result<Self, DepycError> {
        let mut r = Reader::new(bytes);
        let magic = r.get_u32()?;
        if (magic >> 16) != 0x0A0D {
            return Err(DepycError::BadMagic(magic));
        }
        let release = (magic & 0xFFFF) as u16;
        let version = match version_from_magic(release) {
            Some(v) => v,
            None if (3160..=4000).contains(&release) => {
                return Err(DepycError::UnsupportedVersion { major: 3, minor: 2 });
            }
            None => return Err(DepycError::BadMagic(magic)),
        };
        let _mtime = r.get_u32()?;

        let mut mr = MarshalReader::new(r, version);
        match mr.read_object()? {
            Object::Code(code) => Ok(Module { version, code }),
            _ => Err(DepycError::NotCode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marshal(version: Version, payload: &[u8]) -> Object {
        let mut mr = MarshalReader::new(Reader::new(payload), version);
        mr.read_object().expect("marshal payload should parse")
    }

    #[test]
    fn reads_scalar_tags() {
        let v = Version::new(2, 7);
        assert_eq!(marshal(v, b"N"), Object::None);
        assert_eq!(marshal(v, b"T"), Object::Bool(true));
        assert_eq!(marshal(v, &[b'i', 0x2A, 0, 0, 0]), Object::Int(42));
        assert_eq!(
            marshal(v, &[b'i', 0xFF, 0xFF, 0xFF, 0xFF]),
            Object::Int(-1)
        );
    }

    #[test]
    fn reads_long_digits() {
        // 2 digits of 15 bits: 1 + (2 << 15) = 65537
        let v = Version::new(2, 7);
        let buf = [b'l', 2, 0, 0, 0, 1, 0, 2, 0];
        assert_eq!(marshal(v, &buf), Object::Long(BigInt::from(65537)));

        let neg = [b'l', 0xFF, 0xFF, 0xFF, 0xFF, 7, 0];
        assert_eq!(marshal(v, &neg), Object::Long(BigInt::from(-7)));
    }

    #[test]
    fn interned_strings_resolve_backrefs() {
        let v = Version::new(2, 7);
        let mut buf = vec![b'(', 2, 0, 0, 0];
        buf.extend_from_slice(&[b't', 2, 0, 0, 0, b'h', b'i']);
        buf.extend_from_slice(&[b'R', 0, 0, 0, 0]);
        let expect = Object::Str(b"hi".to_vec());
        assert_eq!(
            marshal(v, &buf),
            Object::Tuple(vec![expect.clone(), expect])
        );
    }

    #[test]
    fn dict_terminates_on_null_key() {
        let v = Version::new(2, 7);
        let mut buf = vec![b'{'];
        buf.extend_from_slice(&[b's', 1, 0, 0, 0, b'a']);
        buf.extend_from_slice(&[b'i', 1, 0, 0, 0]);
        buf.push(b'0');
        assert_eq!(
            marshal(v, &buf),
            Object::Dict(vec![(Object::Str(b"a".to_vec()), Object::Int(1))])
        );
    }

    #[test]
    fn rejects_unknown_tag() {
        let v = Version::new(2, 7);
        let mut mr = MarshalReader::new(Reader::new(b"@"), v);
        assert!(matches!(
            mr.read_object(),
            Err(DepycError::BadMarshalTag(b'@', 0))
        ));
    }

    #[test]
    fn load_rejects_bad_header() {
        assert!(matches!(
            Module::load(&[0x99, 0x4E, 0x00, 0x00, 0, 0, 0, 0, b'N']),
            Err(DepycError::BadMagic(_))
        ));
        assert!(matches!(
            Module::load(&[0x03, 0xF3, 0x0D, 0x0A, 0, 0, 0, 0, b'N']),
            Err(DepycError::NotCode)
        ));
    }
}
