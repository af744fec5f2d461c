//! Bytecode opcodes of the source VM
//!
//! Every instruction is a kind byte followed by a list of signed variable-length
//! indices. Most kinds have a fixed parameter count; the call-with-arguments
//! kinds, enum construction and switch carry an explicit count.

use std::fmt;

use smallvec::SmallVec;

/// Opcode kind, numbered as in the binary format
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    // === Moves and constants (0-6) ===
    Mov = 0,
    Int = 1,
    Float = 2,
    Bool = 3,
    Bytes = 4,
    String = 5,
    Null = 6,

    // === Binary arithmetic (7-19) ===
    Add = 7,
    Sub = 8,
    Mul = 9,
    SDiv = 10,
    UDiv = 11,
    SMod = 12,
    UMod = 13,
    Shl = 14,
    SShr = 15,
    UShr = 16,
    And = 17,
    Or = 18,
    Xor = 19,

    // === Unary (20-23) ===
    Neg = 20,
    Not = 21,
    Incr = 22,
    Decr = 23,

    // === Calls (24-35) ===
    Call0 = 24,
    Call1 = 25,
    Call2 = 26,
    Call3 = 27,
    Call4 = 28,
    CallN = 29,
    CallMethod = 30,
    CallThis = 31,
    CallClosure = 32,
    StaticClosure = 33,
    InstanceClosure = 34,
    VirtualClosure = 35,

    // === Globals and fields (36-43) ===
    GetGlobal = 36,
    SetGlobal = 37,
    Field = 38,
    SetField = 39,
    GetThis = 40,
    SetThis = 41,
    DynGet = 42,
    DynSet = 43,

    // === Branches (44-58) ===
    JTrue = 44,
    JFalse = 45,
    JNull = 46,
    JNotNull = 47,
    JSLt = 48,
    JSGte = 49,
    JSGt = 50,
    JSLte = 51,
    JULt = 52,
    JUGte = 53,
    JNotLt = 54,
    JNotGte = 55,
    JEq = 56,
    JNotEq = 57,
    JAlways = 58,

    // === Conversions (59-65) ===
    ToDyn = 59,
    ToSFloat = 60,
    ToUFloat = 61,
    ToInt = 62,
    SafeCast = 63,
    UnsafeCast = 64,
    ToVirtual = 65,

    // === Structure and exceptions (66-73) ===
    Label = 66,
    Ret = 67,
    Throw = 68,
    Rethrow = 69,
    Switch = 70,
    NullCheck = 71,
    Trap = 72,
    EndTrap = 73,

    // === Memory and arrays (74-81) ===
    GetI8 = 74,
    GetI16 = 75,
    GetMem = 76,
    GetArray = 77,
    SetI8 = 78,
    SetI16 = 79,
    SetMem = 80,
    SetArray = 81,

    // === Allocation and type queries (82-86) ===
    New = 82,
    ArraySize = 83,
    Type = 84,
    GetType = 85,
    GetTID = 86,

    // === References (87-89) ===
    Ref = 87,
    Unref = 88,
    Setref = 89,

    // === Enums (90-94) ===
    MakeEnum = 90,
    EnumAlloc = 91,
    EnumIndex = 92,
    EnumField = 93,
    SetEnumField = 94,

    // === Misc (95-100) ===
    Assert = 95,
    RefData = 96,
    RefOffset = 97,
    Nop = 98,
    Prefetch = 99,
    Asm = 100,
}

/// Parameter shape of an opcode kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many indices follow the kind byte
    Fixed(usize),
    /// `p1`, `p2`, a count byte, then `count` indices
    CallLike,
    /// `reg`, a uindex count, `count` uindex offsets, then an end uindex
    Switch,
}

impl OpKind {
    /// Decode a kind byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        use OpKind::*;
        Some(match byte {
            0 => Mov,
            1 => Int,
            2 => Float,
            3 => Bool,
            4 => Bytes,
            5 => String,
            6 => Null,
            7 => Add,
            8 => Sub,
            9 => Mul,
            10 => SDiv,
            11 => UDiv,
            12 => SMod,
            13 => UMod,
            14 => Shl,
            15 => SShr,
            16 => UShr,
            17 => And,
            18 => Or,
            19 => Xor,
            20 => Neg,
            21 => Not,
            22 => Incr,
            23 => Decr,
            24 => Call0,
            25 => Call1,
            26 => Call2,
            27 => Call3,
            28 => Call4,
            29 => CallN,
            30 => CallMethod,
            31 => CallThis,
            32 => CallClosure,
            33 => StaticClosure,
            34 => InstanceClosure,
            35 => VirtualClosure,
            36 => GetGlobal,
            37 => SetGlobal,
            38 => Field,
            39 => SetField,
            40 => GetThis,
            41 => SetThis,
            42 => DynGet,
            43 => DynSet,
            44 => JTrue,
            45 => JFalse,
            46 => JNull,
            47 => JNotNull,
            48 => JSLt,
            49 => JSGte,
            50 => JSGt,
            51 => JSLte,
            52 => JULt,
            53 => JUGte,
            54 => JNotLt,
            55 => JNotGte,
            56 => JEq,
            57 => JNotEq,
            58 => JAlways,
            59 => ToDyn,
            60 => ToSFloat,
            61 => ToUFloat,
            62 => ToInt,
            63 => SafeCast,
            64 => UnsafeCast,
            65 => ToVirtual,
            66 => Label,
            67 => Ret,
            68 => Throw,
            69 => Rethrow,
            70 => Switch,
            71 => NullCheck,
            72 => Trap,
            73 => EndTrap,
            74 => GetI8,
            75 => GetI16,
            76 => GetMem,
            77 => GetArray,
            78 => SetI8,
            79 => SetI16,
            80 => SetMem,
            81 => SetArray,
            82 => New,
            83 => ArraySize,
            84 => Type,
            85 => GetType,
            86 => GetTID,
            87 => Ref,
            88 => Unref,
            89 => Setref,
            90 => MakeEnum,
            91 => EnumAlloc,
            92 => EnumIndex,
            93 => EnumField,
            94 => SetEnumField,
            95 => Assert,
            96 => RefData,
            97 => RefOffset,
            98 => Nop,
            99 => Prefetch,
            100 => Asm,
            _ => return None,
        })
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Parameter shape read by the decoder
    pub fn arity(self) -> Arity {
        use OpKind::*;
        match self {
            Label | Assert | Nop => Arity::Fixed(0),

            Null | Incr | Decr | JAlways | Ret | Throw | Rethrow | NullCheck | EndTrap | New => {
                Arity::Fixed(1)
            }

            Mov | Int | Float | Bool | Bytes | String | Neg | Not | Call0 | StaticClosure
            | GetGlobal | SetGlobal | GetThis | SetThis | JTrue | JFalse | JNull | JNotNull
            | ToDyn | ToSFloat | ToUFloat | ToInt | SafeCast | UnsafeCast | ToVirtual | Trap
            | ArraySize | Type | GetType | GetTID | Ref | Unref | Setref | EnumAlloc
            | EnumIndex | RefData => Arity::Fixed(2),

            Add | Sub | Mul | SDiv | UDiv | SMod | UMod | Shl | SShr | UShr | And | Or | Xor
            | Call1 | InstanceClosure | VirtualClosure | Field | SetField | DynGet | DynSet
            | JSLt | JSGte | JSGt | JSLte | JULt | JUGte | JNotLt | JNotGte | JEq | JNotEq
            | GetI8 | GetI16 | GetMem | GetArray | SetI8 | SetI16 | SetMem | SetArray
            | SetEnumField | RefOffset | Prefetch | Asm => Arity::Fixed(3),

            Call2 | EnumField => Arity::Fixed(4),
            Call3 => Arity::Fixed(5),
            Call4 => Arity::Fixed(6),

            CallN | CallMethod | CallThis | CallClosure | MakeEnum => Arity::CallLike,
            Switch => Arity::Switch,
        }
    }

    /// Mnemonic used by the disassembler
    pub fn name(self) -> &'static str {
        use OpKind::*;
        match self {
            Mov => "mov",
            Int => "int",
            Float => "float",
            Bool => "bool",
            Bytes => "bytes",
            String => "string",
            Null => "null",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            SDiv => "sdiv",
            UDiv => "udiv",
            SMod => "smod",
            UMod => "umod",
            Shl => "shl",
            SShr => "sshr",
            UShr => "ushr",
            And => "and",
            Or => "or",
            Xor => "xor",
            Neg => "neg",
            Not => "not",
            Incr => "incr",
            Decr => "decr",
            Call0 => "call0",
            Call1 => "call1",
            Call2 => "call2",
            Call3 => "call3",
            Call4 => "call4",
            CallN => "calln",
            CallMethod => "callmethod",
            CallThis => "callthis",
            CallClosure => "callclosure",
            StaticClosure => "staticclosure",
            InstanceClosure => "instanceclosure",
            VirtualClosure => "virtualclosure",
            GetGlobal => "getglobal",
            SetGlobal => "setglobal",
            Field => "field",
            SetField => "setfield",
            GetThis => "getthis",
            SetThis => "setthis",
            DynGet => "dynget",
            DynSet => "dynset",
            JTrue => "jtrue",
            JFalse => "jfalse",
            JNull => "jnull",
            JNotNull => "jnotnull",
            JSLt => "jslt",
            JSGte => "jsgte",
            JSGt => "jsgt",
            JSLte => "jslte",
            JULt => "jult",
            JUGte => "jugte",
            JNotLt => "jnotlt",
            JNotGte => "jnotgte",
            JEq => "jeq",
            JNotEq => "jnoteq",
            JAlways => "jalways",
            ToDyn => "todyn",
            ToSFloat => "tosfloat",
            ToUFloat => "toufloat",
            ToInt => "toint",
            SafeCast => "safecast",
            UnsafeCast => "unsafecast",
            ToVirtual => "tovirtual",
            Label => "label",
            Ret => "ret",
            Throw => "throw",
            Rethrow => "rethrow",
            Switch => "switch",
            NullCheck => "nullcheck",
            Trap => "trap",
            EndTrap => "endtrap",
            GetI8 => "geti8",
            GetI16 => "geti16",
            GetMem => "getmem",
            GetArray => "getarray",
            SetI8 => "seti8",
            SetI16 => "seti16",
            SetMem => "setmem",
            SetArray => "setarray",
            New => "new",
            ArraySize => "arraysize",
            Type => "type",
            GetType => "gettype",
            GetTID => "gettid",
            Ref => "ref",
            Unref => "unref",
            Setref => "setref",
            MakeEnum => "makeenum",
            EnumAlloc => "enumalloc",
            EnumIndex => "enumindex",
            EnumField => "enumfield",
            SetEnumField => "setenumfield",
            Assert => "assert",
            RefData => "refdata",
            RefOffset => "refoffset",
            Nop => "nop",
            Prefetch => "prefetch",
            Asm => "asm",
        }
    }

    /// Number of fixed arguments passed by `Call0`..`Call4`
    pub fn fixed_call_args(self) -> Option<usize> {
        match self {
            OpKind::Call0 => Some(0),
            OpKind::Call1 => Some(1),
            OpKind::Call2 => Some(2),
            OpKind::Call3 => Some(3),
            OpKind::Call4 => Some(4),
            _ => None,
        }
    }

    /// Check if this kind transfers control to a relative offset
    pub fn is_branch(self) -> bool {
        use OpKind::*;
        matches!(
            self,
            JTrue | JFalse | JNull | JNotNull | JSLt | JSGte | JSGt | JSLte | JULt | JUGte
                | JNotLt | JNotGte | JEq | JNotEq | JAlways | Switch | Trap
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded instruction
///
/// Parameters are kept in read order. For `CallLike` kinds the list is
/// `[p1, p2, args...]` (the count is implied by the length); for `Switch` it
/// is `[reg, offsets..., end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Opcode {
    pub kind: OpKind,
    pub params: SmallVec<[i32; 4]>,
}

impl Opcode {
    pub fn new(kind: OpKind, params: &[i32]) -> Self {
        Self {
            kind,
            params: SmallVec::from_slice(params),
        }
    }

    /// Parameter `i`, or 0 when absent
    #[inline]
    pub fn p(&self, i: usize) -> i32 {
        self.params.get(i).copied().unwrap_or(0)
    }

    /// Trailing argument registers of a call-shaped instruction
    pub fn call_args(&self) -> &[i32] {
        if self.params.len() > 2 {
            &self.params[2..]
        } else {
            &[]
        }
    }

    /// Jump offsets of a `Switch`
    pub fn switch_offsets(&self) -> &[i32] {
        if self.kind == OpKind::Switch && self.params.len() >= 2 {
            &self.params[1..self.params.len() - 1]
        } else {
            &[]
        }
    }

    /// Relative offsets this instruction may jump to
    pub fn branch_offsets(&self) -> SmallVec<[i32; 4]> {
        use OpKind::*;
        match self.kind {
            JAlways => SmallVec::from_slice(&[self.p(0)]),
            JTrue | JFalse | JNull | JNotNull | Trap => SmallVec::from_slice(&[self.p(1)]),
            JSLt | JSGte | JSGt | JSLte | JULt | JUGte | JNotLt | JNotGte | JEq | JNotEq => {
                SmallVec::from_slice(&[self.p(2)])
            }
            Switch => SmallVec::from_slice(self.switch_offsets()),
            _ => SmallVec::new(),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.name())?;
        for (i, p) in self.params.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", p)?;
            } else {
                write!(f, ", {}", p)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_roundtrip() {
        for b in 0..=100u8 {
            let kind = OpKind::from_byte(b).expect("every byte up to 100 is an opcode");
            assert_eq!(kind.to_byte(), b);
        }
        assert_eq!(OpKind::from_byte(101), None);
        assert_eq!(OpKind::from_byte(0xFF), None);
    }

    #[test]
    fn test_call_arities() {
        assert_eq!(OpKind::Call0.arity(), Arity::Fixed(2));
        assert_eq!(OpKind::Call2.arity(), Arity::Fixed(4));
        assert_eq!(OpKind::Call4.arity(), Arity::Fixed(6));
        assert_eq!(OpKind::CallN.arity(), Arity::CallLike);
        assert_eq!(OpKind::Switch.arity(), Arity::Switch);
    }

    #[test]
    fn test_branch_offsets() {
        let jump = Opcode::new(OpKind::JAlways, &[-3]);
        assert_eq!(jump.branch_offsets().as_slice(), &[-3]);

        let cmp = Opcode::new(OpKind::JSLt, &[0, 1, 4]);
        assert_eq!(cmp.branch_offsets().as_slice(), &[4]);

        let switch = Opcode::new(OpKind::Switch, &[2, 0, 3, 7, 9]);
        assert_eq!(switch.switch_offsets(), &[0, 3, 7]);
        assert_eq!(switch.branch_offsets().len(), 3);
    }

    #[test]
    fn test_display() {
        let op = Opcode::new(OpKind::Add, &[2, 0, 1]);
        assert_eq!(op.to_string(), "add 2, 0, 1");
        assert_eq!(Opcode::new(OpKind::Nop, &[]).to_string(), "nop");
    }
}
