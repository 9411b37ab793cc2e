//! Canonical opcode enumeration and the per-release byte tables.
//!
//! Opcode numbering shifted between releases; the tables below map a raw
//! byte to the canonical [`Opcode`] given the module version. Decoding is a
//! cursor over the raw stream: one opcode byte, then a 16-bit little-endian
//! operand when the byte is at or above the argument threshold, with
//! `EXTENDED_ARG` folded into the following operand.

use byteorder::{ByteOrder, LittleEndian};

use crate::object::Version;

/// Opcodes numbered at or above this take a two-byte operand.
pub const HAVE_ARGUMENT: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Invalid,
    StopCode,
    PopTop,
    RotTwo,
    RotThree,
    RotFour,
    DupTop,
    DupTopTwo,
    Nop,
    UnaryPositive,
    UnaryNegative,
    UnaryNot,
    UnaryConvert,
    UnaryCall,
    UnaryInvert,
    BinaryPower,
    BinaryMultiply,
    BinaryDivide,
    BinaryModulo,
    BinaryAdd,
    BinarySubtract,
    BinarySubscr,
    BinaryCall,
    BinaryFloorDivide,
    BinaryTrueDivide,
    InplaceFloorDivide,
    InplaceTrueDivide,
    Slice0,
    Slice1,
    Slice2,
    Slice3,
    StoreSlice0,
    StoreSlice1,
    StoreSlice2,
    StoreSlice3,
    DeleteSlice0,
    DeleteSlice1,
    DeleteSlice2,
    DeleteSlice3,
    StoreMap,
    InplaceAdd,
    InplaceSubtract,
    InplaceMultiply,
    InplaceDivide,
    InplaceModulo,
    StoreSubscr,
    DeleteSubscr,
    BinaryLshift,
    BinaryRshift,
    BinaryAnd,
    BinaryXor,
    BinaryOr,
    InplacePower,
    GetIter,
    PrintExpr,
    PrintItem,
    PrintNewline,
    PrintItemTo,
    PrintNewlineTo,
    InplaceLshift,
    InplaceRshift,
    InplaceAnd,
    InplaceXor,
    InplaceOr,
    BreakLoop,
    WithCleanup,
    LoadLocals,
    ReturnValue,
    ImportStar,
    ExecStmt,
    YieldValue,
    PopBlock,
    EndFinally,
    PopExcept,
    BuildClass,
    BuildFunction,
    LoadBuildClass,
    StoreName,
    DeleteName,
    UnpackSequence,
    UnpackTuple,
    UnpackList,
    ForIter,
    ForLoop,
    ListAppend,
    StoreAttr,
    DeleteAttr,
    StoreGlobal,
    DeleteGlobal,
    DupTopx,
    LoadConst,
    LoadName,
    BuildTuple,
    BuildList,
    BuildMap,
    LoadAttr,
    CompareOp,
    ImportName,
    ImportFrom,
    JumpForward,
    JumpIfFalse,
    JumpIfTrue,
    JumpIfFalseOrPop,
    JumpIfTrueOrPop,
    JumpAbsolute,
    PopJumpIfFalse,
    PopJumpIfTrue,
    LoadGlobal,
    ContinueLoop,
    SetupLoop,
    SetupExcept,
    SetupFinally,
    ReserveFast,
    LoadFast,
    StoreFast,
    DeleteFast,
    SetLineno,
    RaiseVarargs,
    CallFunction,
    MakeFunction,
    BuildSlice,
    MakeClosure,
    LoadClosure,
    LoadDeref,
    StoreDeref,
    CallFunctionVar,
    CallFunctionKw,
    CallFunctionVarKw,
    SetupWith,
    ExtendedArg,
    SetAdd,
    MapAdd,
}

impl Opcode {
    /// Conventional upper-case mnemonic, for diagnostics and disassembly.
    pub fn name(&self) -> &'static str {
        use Opcode::*;
        match self {
            Invalid => "INVALID",
            StopCode => "STOP_CODE",
            PopTop => "POP_TOP",
            RotTwo => "ROT_TWO",
            RotThree => "ROT_THREE",
            RotFour => "ROT_FOUR",
            DupTop => "DUP_TOP",
            DupTopTwo => "DUP_TOP_TWO",
            Nop => "NOP",
            UnaryPositive => "UNARY_POSITIVE",
            UnaryNegative => "UNARY_NEGATIVE",
            UnaryNot => "UNARY_NOT",
            UnaryConvert => "UNARY_CONVERT",
            UnaryCall => "UNARY_CALL",
            UnaryInvert => "UNARY_INVERT",
            BinaryPower => "BINARY_POWER",
            BinaryMultiply => "BINARY_MULTIPLY",
            BinaryDivide => "BINARY_DIVIDE",
            BinaryModulo => "BINARY_MODULO",
            BinaryAdd => "BINARY_ADD",
            BinarySubtract => "BINARY_SUBTRACT",
            BinarySubscr => "BINARY_SUBSCR",
            BinaryCall => "BINARY_CALL",
            BinaryFloorDivide => "BINARY_FLOOR_DIVIDE",
            BinaryTrueDivide => "BINARY_TRUE_DIVIDE",
            InplaceFloorDivide => "INPLACE_FLOOR_DIVIDE",
            InplaceTrueDivide => "INPLACE_TRUE_DIVIDE",
            Slice0 => "SLICE+0",
            Slice1 => "SLICE+1",
            Slice2 => "SLICE+2",
            Slice3 => "SLICE+3",
            StoreSlice0 => "STORE_SLICE+0",
            StoreSlice1 => "STORE_SLICE+1",
            StoreSlice2 => "STORE_SLICE+2",
            StoreSlice3 => "STORE_SLICE+3",
            DeleteSlice0 => "DELETE_SLICE+0",
            DeleteSlice1 => "DELETE_SLICE+1",
            DeleteSlice2 => "DELETE_SLICE+2",
            DeleteSlice3 => "DELETE_SLICE+3",
            StoreMap => "STORE_MAP",
            InplaceAdd => "INPLACE_ADD",
            InplaceSubtract => "INPLACE_SUBTRACT",
            InplaceMultiply => "INPLACE_MULTIPLY",
            InplaceDivide => "INPLACE_DIVIDE",
            InplaceModulo => "INPLACE_MODULO",
            StoreSubscr => "STORE_SUBSCR",
            DeleteSubscr => "DELETE_SUBSCR",
            BinaryLshift => "BINARY_LSHIFT",
            BinaryRshift => "BINARY_RSHIFT",
            BinaryAnd => "BINARY_AND",
            BinaryXor => "BINARY_XOR",
            BinaryOr => "BINARY_OR",
            InplacePower => "INPLACE_POWER",
            GetIter => "GET_ITER",
            PrintExpr => "PRINT_EXPR",
            PrintItem => "PRINT_ITEM",
            PrintNewline => "PRINT_NEWLINE",
            PrintItemTo => "PRINT_ITEM_TO",
            PrintNewlineTo => "PRINT_NEWLINE_TO",
            InplaceLshift => "INPLACE_LSHIFT",
            InplaceRshift => "INPLACE_RSHIFT",
            InplaceAnd => "INPLACE_AND",
            InplaceXor => "INPLACE_XOR",
            InplaceOr => "INPLACE_OR",
            BreakLoop => "BREAK_LOOP",
            WithCleanup => "WITH_CLEANUP",
            LoadLocals => "LOAD_LOCALS",
            ReturnValue => "RETURN_VALUE",
            ImportStar => "IMPORT_STAR",
            ExecStmt => "EXEC_STMT",
            YieldValue => "YIELD_VALUE",
            PopBlock => "POP_BLOCK",
            EndFinally => "END_FINALLY",
            PopExcept => "POP_EXCEPT",
            BuildClass => "BUILD_CLASS",
            BuildFunction => "BUILD_FUNCTION",
            LoadBuildClass => "LOAD_BUILD_CLASS",
            StoreName => "STORE_NAME",
            DeleteName => "DELETE_NAME",
            UnpackSequence => "UNPACK_SEQUENCE",
            UnpackTuple => "UNPACK_TUPLE",
            UnpackList => "UNPACK_LIST",
            ForIter => "FOR_ITER",
            ForLoop => "FOR_LOOP",
            ListAppend => "LIST_APPEND",
            StoreAttr => "STORE_ATTR",
            DeleteAttr => "DELETE_ATTR",
            StoreGlobal => "STORE_GLOBAL",
            DeleteGlobal => "DELETE_GLOBAL",
            DupTopx => "DUP_TOPX",
            LoadConst => "LOAD_CONST",
            LoadName => "LOAD_NAME",
            BuildTuple => "BUILD_TUPLE",
            BuildList => "BUILD_LIST",
            BuildMap => "BUILD_MAP",
            LoadAttr => "LOAD_ATTR",
            CompareOp => "COMPARE_OP",
            ImportName => "IMPORT_NAME",
            ImportFrom => "IMPORT_FROM",
            JumpForward => "JUMP_FORWARD",
            JumpIfFalse => "JUMP_IF_FALSE",
            JumpIfTrue => "JUMP_IF_TRUE",
            JumpIfFalseOrPop => "JUMP_IF_FALSE_OR_POP",
            JumpIfTrueOrPop => "JUMP_IF_TRUE_OR_POP",
            JumpAbsolute => "JUMP_ABSOLUTE",
            PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            LoadGlobal => "LOAD_GLOBAL",
            ContinueLoop => "CONTINUE_LOOP",
            SetupLoop => "SETUP_LOOP",
            SetupExcept => "SETUP_EXCEPT",
            SetupFinally => "SETUP_FINALLY",
            ReserveFast => "RESERVE_FAST",
            LoadFast => "LOAD_FAST",
            StoreFast => "STORE_FAST",
            DeleteFast => "DELETE_FAST",
            SetLineno => "SET_LINENO",
            RaiseVarargs => "RAISE_VARARGS",
            CallFunction => "CALL_FUNCTION",
            MakeFunction => "MAKE_FUNCTION",
            BuildSlice => "BUILD_SLICE",
            MakeClosure => "MAKE_CLOSURE",
            LoadClosure => "LOAD_CLOSURE",
            LoadDeref => "LOAD_DEREF",
            StoreDeref => "STORE_DEREF",
            CallFunctionVar => "CALL_FUNCTION_VAR",
            CallFunctionKw => "CALL_FUNCTION_KW",
            CallFunctionVarKw => "CALL_FUNCTION_VAR_KW",
            SetupWith => "SETUP_WITH",
            ExtendedArg => "EXTENDED_ARG",
            SetAdd => "SET_ADD",
            MapAdd => "MAP_ADD",
        }
    }

    pub fn from_byte(version: Version, byte: u8) -> Opcode {
        match version.major {
            1 => table_1x(byte),
            2 => table_2x(version.minor, byte),
            _ => table_3x(version.minor, byte),
        }
    }
}

/// Release 1.3 through 1.6 numbering.
fn table_1x(byte: u8) -> Opcode {
    use Opcode::*;
    match byte {
        0 => StopCode,
        1 => PopTop,
        2 => RotTwo,
        3 => RotThree,
        4 => DupTop,
        10 => UnaryPositive,
        11 => UnaryNegative,
        12 => UnaryNot,
        13 => UnaryConvert,
        14 => UnaryCall,
        15 => UnaryInvert,
        19 => BinaryPower,
        20 => BinaryMultiply,
        21 => BinaryDivide,
        22 => BinaryModulo,
        23 => BinaryAdd,
        24 => BinarySubtract,
        25 => BinarySubscr,
        26 => BinaryCall,
        30 => Slice0,
        31 => Slice1,
        32 => Slice2,
        33 => Slice3,
        40 => StoreSlice0,
        41 => StoreSlice1,
        42 => StoreSlice2,
        43 => StoreSlice3,
        50 => DeleteSlice0,
        51 => DeleteSlice1,
        52 => DeleteSlice2,
        53 => DeleteSlice3,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        62 => BinaryLshift,
        63 => BinaryRshift,
        64 => BinaryAnd,
        65 => BinaryXor,
        66 => BinaryOr,
        70 => PrintExpr,
        71 => PrintItem,
        72 => PrintNewline,
        80 => BreakLoop,
        82 => LoadLocals,
        83 => ReturnValue,
        85 => ExecStmt,
        86 => BuildFunction,
        87 => PopBlock,
        88 => EndFinally,
        89 => BuildClass,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackTuple,
        93 => UnpackList,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildMap,
        105 => LoadAttr,
        106 => CompareOp,
        107 => ImportName,
        108 => ImportFrom,
        110 => JumpForward,
        111 => JumpIfFalse,
        112 => JumpIfTrue,
        113 => JumpAbsolute,
        114 => ForLoop,
        116 => LoadGlobal,
        120 => SetupLoop,
        121 => SetupExcept,
        122 => SetupFinally,
        123 => ReserveFast,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        127 => SetLineno,
        130 => RaiseVarargs,
        131 => CallFunction,
        132 => MakeFunction,
        133 => BuildSlice,
        _ => Invalid,
    }
}

/// Release 2.0 through 2.7 numbering, with the minor-version shifts folded
/// in (`LIST_APPEND` and `EXTENDED_ARG` moved, the conditional-jump family
/// was reworked in 2.7, `FOR_LOOP` survived through 2.2).
fn table_2x(minor: u8, byte: u8) -> Opcode {
    use Opcode::*;
    match byte {
        0 => StopCode,
        1 => PopTop,
        2 => RotTwo,
        3 => RotThree,
        4 => DupTop,
        5 => RotFour,
        9 => Nop,
        10 => UnaryPositive,
        11 => UnaryNegative,
        12 => UnaryNot,
        13 => UnaryConvert,
        15 => UnaryInvert,
        18 if minor <= 6 => ListAppend,
        19 => BinaryPower,
        20 => BinaryMultiply,
        21 => BinaryDivide,
        22 => BinaryModulo,
        23 => BinaryAdd,
        24 => BinarySubtract,
        25 => BinarySubscr,
        26 if minor >= 2 => BinaryFloorDivide,
        27 if minor >= 2 => BinaryTrueDivide,
        28 if minor >= 2 => InplaceFloorDivide,
        29 if minor >= 2 => InplaceTrueDivide,
        30 => Slice0,
        31 => Slice1,
        32 => Slice2,
        33 => Slice3,
        40 => StoreSlice0,
        41 => StoreSlice1,
        42 => StoreSlice2,
        43 => StoreSlice3,
        50 => DeleteSlice0,
        51 => DeleteSlice1,
        52 => DeleteSlice2,
        53 => DeleteSlice3,
        54 if minor >= 6 => StoreMap,
        55 => InplaceAdd,
        56 => InplaceSubtract,
        57 => InplaceMultiply,
        58 => InplaceDivide,
        59 => InplaceModulo,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        62 => BinaryLshift,
        63 => BinaryRshift,
        64 => BinaryAnd,
        65 => BinaryXor,
        66 => BinaryOr,
        67 => InplacePower,
        68 if minor >= 2 => GetIter,
        70 => PrintExpr,
        71 => PrintItem,
        72 => PrintNewline,
        73 => PrintItemTo,
        74 => PrintNewlineTo,
        75 => InplaceLshift,
        76 => InplaceRshift,
        77 => InplaceAnd,
        78 => InplaceXor,
        79 => InplaceOr,
        80 => BreakLoop,
        81 if minor >= 5 => WithCleanup,
        82 => LoadLocals,
        83 => ReturnValue,
        84 => ImportStar,
        85 => ExecStmt,
        86 if minor >= 2 => YieldValue,
        87 => PopBlock,
        88 => EndFinally,
        89 => BuildClass,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackSequence,
        93 if minor >= 2 => ForIter,
        94 if minor >= 7 => ListAppend,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        99 => DupTopx,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildMap,
        105 => LoadAttr,
        106 => CompareOp,
        107 => ImportName,
        108 => ImportFrom,
        110 => JumpForward,
        111 => {
            if minor >= 7 {
                JumpIfFalseOrPop
            } else {
                JumpIfFalse
            }
        }
        112 => {
            if minor >= 7 {
                JumpIfTrueOrPop
            } else {
                JumpIfTrue
            }
        }
        113 => JumpAbsolute,
        114 if minor >= 7 => PopJumpIfFalse,
        114 if minor <= 2 => ForLoop,
        115 if minor >= 7 => PopJumpIfTrue,
        116 => LoadGlobal,
        119 => ContinueLoop,
        120 => SetupLoop,
        121 => SetupExcept,
        122 => SetupFinally,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        127 if minor <= 2 => SetLineno,
        130 => RaiseVarargs,
        131 => CallFunction,
        132 => MakeFunction,
        133 => BuildSlice,
        134 if minor >= 1 => MakeClosure,
        135 if minor >= 1 => LoadClosure,
        136 if minor >= 1 => LoadDeref,
        137 if minor >= 1 => StoreDeref,
        140 => CallFunctionVar,
        141 => CallFunctionKw,
        142 => CallFunctionVarKw,
        143 => {
            if minor >= 7 {
                SetupWith
            } else {
                ExtendedArg
            }
        }
        145 if minor >= 7 => ExtendedArg,
        146 if minor >= 7 => SetAdd,
        147 if minor >= 7 => MapAdd,
        _ => Invalid,
    }
}

/// Early 3.x numbering (3.0 and 3.1 only; later releases diverge too far).
fn table_3x(minor: u8, byte: u8) -> Opcode {
    use Opcode::*;
    match byte {
        1 => PopTop,
        2 => RotTwo,
        3 => RotThree,
        4 => DupTop,
        5 => RotFour,
        9 => Nop,
        10 => UnaryPositive,
        11 => UnaryNegative,
        12 => UnaryNot,
        15 => UnaryInvert,
        17 => SetAdd,
        18 => ListAppend,
        19 => BinaryPower,
        20 => BinaryMultiply,
        22 => BinaryModulo,
        23 => BinaryAdd,
        24 => BinarySubtract,
        25 => BinarySubscr,
        26 => BinaryFloorDivide,
        27 => BinaryTrueDivide,
        28 => InplaceFloorDivide,
        29 => InplaceTrueDivide,
        54 => StoreMap,
        55 => InplaceAdd,
        56 => InplaceSubtract,
        57 => InplaceMultiply,
        59 => InplaceModulo,
        60 => StoreSubscr,
        61 => DeleteSubscr,
        62 => BinaryLshift,
        63 => BinaryRshift,
        64 => BinaryAnd,
        65 => BinaryXor,
        66 => BinaryOr,
        67 => InplacePower,
        68 => GetIter,
        70 => PrintExpr,
        71 => LoadBuildClass,
        75 => InplaceLshift,
        76 => InplaceRshift,
        77 => InplaceAnd,
        78 => InplaceXor,
        79 => InplaceOr,
        80 => BreakLoop,
        81 => WithCleanup,
        83 => ReturnValue,
        84 => ImportStar,
        86 => YieldValue,
        87 => PopBlock,
        88 => EndFinally,
        89 if minor >= 1 => PopExcept,
        90 => StoreName,
        91 => DeleteName,
        92 => UnpackSequence,
        93 => ForIter,
        95 => StoreAttr,
        96 => DeleteAttr,
        97 => StoreGlobal,
        98 => DeleteGlobal,
        99 => DupTopx,
        100 => LoadConst,
        101 => LoadName,
        102 => BuildTuple,
        103 => BuildList,
        104 => BuildMap,
        105 => LoadAttr,
        106 => CompareOp,
        107 => ImportName,
        108 => ImportFrom,
        110 => JumpForward,
        111 => {
            if minor >= 1 {
                JumpIfFalseOrPop
            } else {
                JumpIfFalse
            }
        }
        112 => {
            if minor >= 1 {
                JumpIfTrueOrPop
            } else {
                JumpIfTrue
            }
        }
        113 => JumpAbsolute,
        114 if minor >= 1 => PopJumpIfFalse,
        115 if minor >= 1 => PopJumpIfTrue,
        116 => LoadGlobal,
        119 => ContinueLoop,
        120 => SetupLoop,
        121 => SetupExcept,
        122 => SetupFinally,
        124 => LoadFast,
        125 => StoreFast,
        126 => DeleteFast,
        130 => RaiseVarargs,
        131 => CallFunction,
        132 => MakeFunction,
        133 => BuildSlice,
        134 => MakeClosure,
        135 => LoadClosure,
        136 => LoadDeref,
        137 => StoreDeref,
        140 => CallFunctionVar,
        141 => CallFunctionKw,
        142 => CallFunctionVarKw,
        143 => ExtendedArg,
        145 if minor >= 1 => ListAppend,
        146 if minor >= 1 => SetAdd,
        147 if minor >= 1 => MapAdd,
        _ => Invalid,
    }
}

/// One decoded instruction. `start` is the offset of the opcode byte; jump
/// operands are relative to the offset *after* the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub opcode: Opcode,
    pub operand: u32,
    pub start: usize,
}

/// Forward cursor over an instruction stream.
#[derive(Debug, Clone, Copy)]
pub struct Bytecode<'a> {
    buf: &'a [u8],
    pos: usize,
    version: Version,
}

impl<'a> Bytecode<'a> {
    pub fn new(buf: &'a [u8], version: Version) -> Self {
        Self { buf, pos: 0, version }
    }

    /// Offset of the next undecoded byte.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Decodes the next instruction, folding `EXTENDED_ARG` prefixes into
    /// the following operand. Returns `None` at (or truncated-into) EOF.
    pub fn next(&mut self) -> Option<Instr> {
        let mut extend: u32 = 0;
        loop {
            let start = self.pos;
            let byte = *self.buf.get(self.pos)?;
            self.pos += 1;

            let mut operand = 0u32;
            if byte >= HAVE_ARGUMENT {
                if self.pos + 2 > self.buf.len() {
                    self.pos = self.buf.len();
                    return None;
                }
                operand = LittleEndian::read_u16(&self.buf[self.pos..self.pos + 2]) as u32;
                self.pos += 2;
            }

            let opcode = Opcode::from_byte(self.version, byte);
            if opcode == Opcode::ExtendedArg {
                extend = operand << 16;
                continue;
            }
            return Some(Instr { opcode, operand: operand | extend, start });
        }
    }

    /// Decodes the next instruction without advancing.
    pub fn peek(&self) -> Option<Instr> {
        let mut probe = *self;
        probe.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_jump_family_moved_in_27() {
        let v26 = Version::new(2, 6);
        let v27 = Version::new(2, 7);
        assert_eq!(Opcode::from_byte(v26, 111), Opcode::JumpIfFalse);
        assert_eq!(Opcode::from_byte(v27, 111), Opcode::JumpIfFalseOrPop);
        assert_eq!(Opcode::from_byte(v27, 114), Opcode::PopJumpIfFalse);
        assert_eq!(Opcode::from_byte(Version::new(2, 2), 114), Opcode::ForLoop);
        assert_eq!(Opcode::from_byte(v26, 114), Opcode::Invalid);
    }

    #[test]
    fn list_append_moved_in_27() {
        assert_eq!(
            Opcode::from_byte(Version::new(2, 4), 18),
            Opcode::ListAppend
        );
        assert_eq!(
            Opcode::from_byte(Version::new(2, 7), 94),
            Opcode::ListAppend
        );
        assert_eq!(Opcode::from_byte(Version::new(2, 7), 18), Opcode::Invalid);
    }

    #[test]
    fn cursor_decodes_operands_and_positions() {
        // LOAD_FAST 1; BINARY_ADD; RETURN_VALUE  (2.7 numbering)
        let buf = [124u8, 1, 0, 23, 83];
        let mut bc = Bytecode::new(&buf, Version::new(2, 7));

        let i = bc.next().expect("first instruction");
        assert_eq!((i.opcode, i.operand, i.start), (Opcode::LoadFast, 1, 0));
        assert_eq!(bc.offset(), 3);

        let i = bc.next().expect("second instruction");
        assert_eq!((i.opcode, i.start), (Opcode::BinaryAdd, 3));

        let i = bc.next().expect("third instruction");
        assert_eq!(i.opcode, Opcode::ReturnValue);
        assert!(bc.next().is_none());
    }

    #[test]
    fn extended_arg_folds_into_operand() {
        // EXTENDED_ARG 2; LOAD_CONST 5 => operand 2 << 16 | 5  (2.7: 145)
        let buf = [145u8, 2, 0, 100, 5, 0];
        let mut bc = Bytecode::new(&buf, Version::new(2, 7));
        let i = bc.next().expect("folded instruction");
        assert_eq!(i.opcode, Opcode::LoadConst);
        assert_eq!(i.operand, (2 << 16) | 5);
        assert_eq!(i.start, 0);
    }

    #[test]
    fn truncated_operand_reads_as_eof() {
        let buf = [100u8, 5];
        let mut bc = Bytecode::new(&buf, Version::new(2, 7));
        assert!(bc.next().is_none());
        assert!(bc.at_eof());
    }
}
