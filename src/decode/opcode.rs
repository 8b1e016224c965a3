pub mod arith {
    pub const NOP: u32 = 0x00;
    pub const ADD: u32 = 0x10;
    pub const SUB: u32 = 0x11;
    pub const MUL: u32 = 0x12;
    pub const DIV: u32 = 0x13;
    pub const MOD: u32 = 0x14;
    pub const NEG: u32 = 0x15;
    pub const BITAND: u32 = 0x18;
    pub const BITOR: u32 = 0x19;
    pub const BITXOR: u32 = 0x1A;
    pub const BITNOT: u32 = 0x1B;
    pub const SHIFTL: u32 = 0x1C;
    pub const SSHIFTR: u32 = 0x1D;
    pub const USHIFTR: u32 = 0x1E;
}

pub mod branch {
    pub const JUMP: u32 = 0x20;
    pub const JZ: u32 = 0x22;
    pub const JNZ: u32 = 0x23;
    pub const JEQ: u32 = 0x24;
    pub const JNE: u32 = 0x25;
    pub const JLT: u32 = 0x26;
    pub const JGE: u32 = 0x27;
    pub const JGT: u32 = 0x28;
    pub const JLE: u32 = 0x29;
    pub const JLTU: u32 = 0x2A;
    pub const JGEU: u32 = 0x2B;
    pub const JGTU: u32 = 0x2C;
    pub const JLEU: u32 = 0x2D;
    pub const JUMPABS: u32 = 0x104;
}

pub mod call {
    pub const CALL: u32 = 0x30;
    pub const RETURN: u32 = 0x31;
    pub const CATCH: u32 = 0x32;
    pub const THROW: u32 = 0x33;
    pub const TAILCALL: u32 = 0x34;
    pub const CALLF: u32 = 0x160;
    pub const CALLFI: u32 = 0x161;
    pub const CALLFII: u32 = 0x162;
    pub const CALLFIII: u32 = 0x163;
}

pub mod mem {
    pub const COPY: u32 = 0x40;
    pub const COPYS: u32 = 0x41;
    pub const COPYB: u32 = 0x42;
    pub const SEXS: u32 = 0x44;
    pub const SEXB: u32 = 0x45;
    pub const ALOAD: u32 = 0x48;
    pub const ALOADS: u32 = 0x49;
    pub const ALOADB: u32 = 0x4A;
    pub const ALOADBIT: u32 = 0x4B;
    pub const ASTORE: u32 = 0x4C;
    pub const ASTORES: u32 = 0x4D;
    pub const ASTOREB: u32 = 0x4E;
    pub const ASTOREBIT: u32 = 0x4F;
    pub const GETMEMSIZE: u32 = 0x102;
    pub const SETMEMSIZE: u32 = 0x103;
    pub const PROTECT: u32 = 0x127;
    pub const MZERO: u32 = 0x170;
    pub const MCOPY: u32 = 0x171;
    pub const MALLOC: u32 = 0x178;
    pub const MFREE: u32 = 0x179;
}

pub mod stack {
    pub const STKCOUNT: u32 = 0x50;
    pub const STKPEEK: u32 = 0x51;
    pub const STKSWAP: u32 = 0x52;
    pub const STKROLL: u32 = 0x53;
    pub const STKCOPY: u32 = 0x54;
}

pub mod stream {
    pub const STREAMCHAR: u32 = 0x70;
    pub const STREAMNUM: u32 = 0x71;
    pub const STREAMSTR: u32 = 0x72;
    pub const STREAMUNICHAR: u32 = 0x73;
    pub const GETSTRINGTBL: u32 = 0x140;
    pub const SETSTRINGTBL: u32 = 0x141;
    pub const GETIOSYS: u32 = 0x148;
    pub const SETIOSYS: u32 = 0x149;
}

pub mod misc {
    pub const GESTALT: u32 = 0x100;
    pub const DEBUGTRAP: u32 = 0x101;
    pub const RANDOM: u32 = 0x110;
    pub const SETRANDOM: u32 = 0x111;
    pub const QUIT: u32 = 0x120;
    pub const VERIFY: u32 = 0x121;
    pub const RESTART: u32 = 0x122;
    pub const SAVE: u32 = 0x123;
    pub const RESTORE: u32 = 0x124;
    pub const SAVEUNDO: u32 = 0x125;
    pub const RESTOREUNDO: u32 = 0x126;
    pub const GLK: u32 = 0x130;
    pub const ACCELFUNC: u32 = 0x180;
    pub const ACCELPARAM: u32 = 0x181;
}

pub mod search {
    pub const LINEARSEARCH: u32 = 0x150;
    pub const BINARYSEARCH: u32 = 0x151;
    pub const LINKEDSEARCH: u32 = 0x152;
}
