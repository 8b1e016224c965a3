use arrayvec::ArrayVec;
use std::collections::HashMap;
use std::fmt;

pub mod opcode;
pub mod parse;

/// Where a load operand takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Const(u32),
    Mem(u32),
    // offset from RAMSTART
    Ram(u32),
    Stack,
    Local(u32),
}

/// Where a store operand puts its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Discard,
    Mem(u32),
    Ram(u32),
    Stack,
    Local(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Load(Source),
    Store(Target),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Load,
    Store,
}

#[derive(Debug, Clone)]
pub struct OperandList {
    // byte width of memory and local accesses
    pub width: u8,
    pub kinds: ArrayVec<[OperandKind; 8]>,
}

impl OperandList {
    fn new(kinds: &str, width: u8) -> Self {
        OperandList {
            width,
            kinds: kinds
                .chars()
                .map(|c| match c {
                    'S' => OperandKind::Store,
                    _ => OperandKind::Load,
                })
                .collect(),
        }
    }
}

lazy_static! {
    static ref OPERAND_LISTS: HashMap<u32, OperandList> = {
        use opcode::{arith::*, branch::*, call::*, mem::*, misc::*, search::*, stack::*, stream::*};
        let table: &[(u32, &str, u8)] = &[
            (NOP, "", 4),
            (ADD, "LLS", 4),
            (SUB, "LLS", 4),
            (MUL, "LLS", 4),
            (DIV, "LLS", 4),
            (MOD, "LLS", 4),
            (NEG, "LS", 4),
            (BITAND, "LLS", 4),
            (BITOR, "LLS", 4),
            (BITXOR, "LLS", 4),
            (BITNOT, "LS", 4),
            (SHIFTL, "LLS", 4),
            (SSHIFTR, "LLS", 4),
            (USHIFTR, "LLS", 4),
            (JUMP, "L", 4),
            (JZ, "LL", 4),
            (JNZ, "LL", 4),
            (JEQ, "LLL", 4),
            (JNE, "LLL", 4),
            (JLT, "LLL", 4),
            (JGE, "LLL", 4),
            (JGT, "LLL", 4),
            (JLE, "LLL", 4),
            (JLTU, "LLL", 4),
            (JGEU, "LLL", 4),
            (JGTU, "LLL", 4),
            (JLEU, "LLL", 4),
            (CALL, "LLS", 4),
            (RETURN, "L", 4),
            (CATCH, "SL", 4),
            (THROW, "LL", 4),
            (TAILCALL, "LL", 4),
            (COPY, "LS", 4),
            (COPYS, "LS", 2),
            (COPYB, "LS", 1),
            (SEXS, "LS", 4),
            (SEXB, "LS", 4),
            (ALOAD, "LLS", 4),
            (ALOADS, "LLS", 4),
            (ALOADB, "LLS", 4),
            (ALOADBIT, "LLS", 4),
            (ASTORE, "LLL", 4),
            (ASTORES, "LLL", 4),
            (ASTOREB, "LLL", 4),
            (ASTOREBIT, "LLL", 4),
            (STKCOUNT, "S", 4),
            (STKPEEK, "LS", 4),
            (STKSWAP, "", 4),
            (STKROLL, "LL", 4),
            (STKCOPY, "L", 4),
            (STREAMCHAR, "L", 4),
            (STREAMNUM, "L", 4),
            (STREAMSTR, "L", 4),
            (STREAMUNICHAR, "L", 4),
            (GESTALT, "LLS", 4),
            (DEBUGTRAP, "L", 4),
            (GETMEMSIZE, "S", 4),
            (SETMEMSIZE, "LS", 4),
            (JUMPABS, "L", 4),
            (RANDOM, "LS", 4),
            (SETRANDOM, "L", 4),
            (QUIT, "", 4),
            (VERIFY, "S", 4),
            (RESTART, "", 4),
            (SAVE, "LS", 4),
            (RESTORE, "LS", 4),
            (SAVEUNDO, "S", 4),
            (RESTOREUNDO, "S", 4),
            (PROTECT, "LL", 4),
            (GLK, "LLS", 4),
            (GETSTRINGTBL, "S", 4),
            (SETSTRINGTBL, "L", 4),
            (GETIOSYS, "SS", 4),
            (SETIOSYS, "LL", 4),
            (LINEARSEARCH, "LLLLLLLS", 4),
            (BINARYSEARCH, "LLLLLLLS", 4),
            (LINKEDSEARCH, "LLLLLLS", 4),
            (CALLF, "LS", 4),
            (CALLFI, "LLS", 4),
            (CALLFII, "LLLS", 4),
            (CALLFIII, "LLLLS", 4),
            (MZERO, "LL", 4),
            (MCOPY, "LLL", 4),
            (MALLOC, "LS", 4),
            (MFREE, "L", 4),
            (ACCELFUNC, "LL", 4),
            (ACCELPARAM, "LL", 4),
        ];
        table
            .iter()
            .map(|&(op, kinds, width)| (op, OperandList::new(kinds, width)))
            .collect()
    };
}

pub fn operand_list(opcode: u32) -> Option<&'static OperandList> {
    OPERAND_LISTS.get(&opcode)
}

#[derive(Debug, Clone)]
pub struct Instr {
    pub opcode: u32,
    pub width: u8,
    pub operands: ArrayVec<[Operand; 8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    BadOpcode(u32),
    BadOperandMode(u8),
    Truncated,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::BadOpcode(op) => write!(f, "unknown opcode {:#x}", op),
            DecodeError::BadOperandMode(mode) => write!(f, "invalid operand mode {}", mode),
            DecodeError::Truncated => write!(f, "instruction runs past the end of memory"),
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;
