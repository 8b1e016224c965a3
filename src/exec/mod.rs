use crate::blorb;
use crate::decode::parse::decode_instr;
use crate::decode::{DecodeError, Instr, Operand, Source, Target};
use crate::dispatch::{DispatchContext, Registry};
use crate::gestalt;
use crate::interface::GlkHost;
use crate::memory::{self, Header, Heap, MemError, Memory, MemoryAccess};
use crate::options::Options;
use crate::save::SaveError;
use crate::util::mask;
use arrayvec::ArrayVec;
use log::{debug, error, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom};

mod call;
mod search;
mod stack;
mod stream;

pub use call::Dest;
pub(crate) use call::StubKind;
pub use stack::Stack;
pub use stream::{IoMode, IoSys};

const DEFAULT_STACK_SIZE: u32 = 0x40000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    BadMagic,
    BadChecksum,
    MemoryOutOfRange { addr: u32, len: u32 },
    WriteToROM(u32),
    BadSetMemsize(u32),
    StackUnderflow,
    StackOverflow,
    DivideByZero,
    BadOpcode(u32),
    BadOperandMode(u8),
    BadFunctionPrologue(u8),
    BadCallStub(u32),
    WrongGlkArgCount { selector: u32, expected: u32, got: u32 },
    BadObjectRef { class: u32, id: u32 },
    BadSaveFile(SaveError),
    HeapCorrupt(u32),
    BadHeader(&'static str),
    UnsupportedVersion(u32),
    BadLocalsFormat(u8),
    BadLocal(u32),
    BadStringType(u8),
    BadStringNode(u8),
    BadIndirectRef(u8),
    NoStringTable,
    BadSearchOptions(u32),
    BadCatchToken(u32),
    TruncatedInstruction,
    UnknownGlkSelector(u32),
    BadPrototype(String),
    NullGlkArgument(u32),
    BadArrayRef,
    BadGlkResult(u32),
    BadBlorb(&'static str),
    Io(String),
    Exit,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorKind::*;
        match self {
            BadMagic => write!(f, "not a Glulx image"),
            BadChecksum => write!(f, "image checksum does not match the header"),
            MemoryOutOfRange { addr, len } => {
                write!(f, "memory access of {} bytes at {:#x} is out of range", len, addr)
            }
            WriteToROM(addr) => write!(f, "write to ROM at {:#x}", addr),
            BadSetMemsize(size) => write!(f, "invalid memory size {:#x}", size),
            StackUnderflow => write!(f, "stack underflow"),
            StackOverflow => write!(f, "stack overflow"),
            DivideByZero => write!(f, "division by zero"),
            BadOpcode(op) => write!(f, "unknown opcode {:#x}", op),
            BadOperandMode(mode) => write!(f, "invalid operand mode {}", mode),
            BadFunctionPrologue(ty) => write!(f, "invalid function type {:#04x}", ty),
            BadCallStub(ty) => write!(f, "invalid call stub type {:#x}", ty),
            WrongGlkArgCount {
                selector,
                expected,
                got,
            } => write!(
                f,
                "glk selector {:#x} takes {} arguments, got {}",
                selector, expected, got
            ),
            BadObjectRef { class, id } => {
                write!(f, "no object with id {} in class {}", id, class)
            }
            BadSaveFile(err) => write!(f, "bad save file: {}", err),
            HeapCorrupt(addr) => write!(f, "heap corrupted at {:#x}", addr),
            BadHeader(reason) => write!(f, "bad header: {}", reason),
            UnsupportedVersion(v) => write!(f, "unsupported Glulx version {:#x}", v),
            BadLocalsFormat(ty) => write!(f, "invalid local type {}", ty),
            BadLocal(offset) => write!(f, "no local at offset {:#x}", offset),
            BadStringType(ty) => write!(f, "invalid string type {:#04x}", ty),
            BadStringNode(ty) => write!(f, "invalid string table node {:#04x}", ty),
            BadIndirectRef(ty) => write!(f, "indirect reference to object type {:#04x}", ty),
            NoStringTable => write!(f, "compressed string printed without a string table"),
            BadSearchOptions(opts) => write!(f, "invalid search options {:#x}", opts),
            BadCatchToken(token) => write!(f, "invalid catch token {:#x}", token),
            TruncatedInstruction => write!(f, "instruction runs past the end of memory"),
            UnknownGlkSelector(sel) => write!(f, "unknown glk selector {:#x}", sel),
            BadPrototype(text) => write!(f, "malformed glk prototype {:?}", text),
            NullGlkArgument(sel) => write!(f, "null argument to glk selector {:#x}", sel),
            BadArrayRef => write!(f, "unknown array reference"),
            BadGlkResult(sel) => write!(f, "glk selector {:#x} returned mistyped values", sel),
            BadBlorb(reason) => write!(f, "bad blorb file: {}", reason),
            Io(msg) => write!(f, "i/o error: {}", msg),
            Exit => write!(f, "exit requested"),
        }
    }
}

impl std::error::Error for ErrorKind {}

impl From<MemError> for ErrorKind {
    fn from(me: MemError) -> Self {
        match me {
            MemError::OutOfRange { addr, len } => Self::MemoryOutOfRange { addr, len },
            MemError::WriteToRom(addr) => Self::WriteToROM(addr),
            MemError::BadSetMemsize(size) => Self::BadSetMemsize(size),
        }
    }
}

impl From<DecodeError> for ErrorKind {
    fn from(de: DecodeError) -> Self {
        match de {
            DecodeError::BadOpcode(op) => Self::BadOpcode(op),
            DecodeError::BadOperandMode(mode) => Self::BadOperandMode(mode),
            DecodeError::Truncated => Self::TruncatedInstruction,
        }
    }
}

impl From<SaveError> for ErrorKind {
    fn from(se: SaveError) -> Self {
        Self::BadSaveFile(se)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

pub type ExecResult<T> = Result<T, ErrorKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    // the outermost function returned
    Returned,
    InstructionLimit,
}

#[derive(Debug, Clone)]
pub enum CtrlFlow {
    Proceed,
    Branch { offset: u32 },
    JumpAbs { addr: u32 },
    Call { addr: u32, args: Vec<u32>, dest: Dest },
    TailCall { addr: u32, args: Vec<u32> },
    Return { ret_val: u32 },
    Quit,
}

impl CtrlFlow {
    fn branch(cond: bool, offset: u32) -> Self {
        if cond {
            Self::Branch { offset }
        } else {
            Self::Proceed
        }
    }
}

// resolved operands of one instruction
struct Operands {
    vals: ArrayVec<[u32; 8]>,
    dests: ArrayVec<[Dest; 2]>,
    width: u8,
}

pub struct Glulx<'a> {
    pub(crate) memory: Memory,
    pub(crate) stack: Stack,
    pub(crate) pc: u32,
    pub(crate) header: Header,
    pub(crate) heap: Heap,
    pub(crate) string_table: u32,
    pub(crate) iosys: IoSys,
    pub(crate) undo: VecDeque<Vec<u8>>,
    pub(crate) registry: Registry,
    pub(crate) rng: StdRng,
    pub(crate) options: Options,
    pub(crate) host: &'a mut dyn GlkHost,
    finished: Option<ExitReason>,
    executed: u64,
}

impl<'a> Glulx<'a> {
    /// Reads `len` bytes of story image from `stream` at `offset` and starts it.
    pub fn load_and_init<R: Read + Seek>(
        mut stream: R,
        offset: u64,
        len: u64,
        host: &'a mut dyn GlkHost,
        options: Options,
    ) -> ExecResult<Self> {
        stream.seek(SeekFrom::Start(offset))?;
        let mut image = Vec::new();
        stream.by_ref().take(len).read_to_end(&mut image)?;
        Self::from_image(image, host, options)
    }

    /// Starts a story file, looking inside a Blorb container if there is one.
    pub fn from_story(
        story: Vec<u8>,
        host: &'a mut dyn GlkHost,
        options: Options,
    ) -> ExecResult<Self> {
        let (offset, len) = blorb::locate_exec(&story)?.unwrap_or((0, story.len()));
        Self::load_and_init(Cursor::new(story), offset as u64, len as u64, host, options)
    }

    fn from_image(
        mut image: Vec<u8>,
        host: &'a mut dyn GlkHost,
        options: Options,
    ) -> ExecResult<Self> {
        let header = Header::parse(&image)?;
        if image.len() < header.extstart as usize {
            return Err(ErrorKind::BadHeader("image shorter than EXTSTART"));
        }
        image.truncate(header.extstart as usize);
        if options.verify_checksum && memory::checksum(&image) != header.checksum {
            return Err(ErrorKind::BadChecksum);
        }

        let stack_size = options
            .stack_size
            .filter(|&size| size != 0)
            .or(Some(header.stack_size).filter(|&size| size != 0))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let mut rng = match options.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let registry = Registry::new(host.class_count(), &mut rng);
        let (major, minor, patch) = header.version_triple();
        info!(
            "glulx {}.{}.{}: RAMSTART {:#x}, EXTSTART {:#x}, ENDMEM {:#x}, stack {:#x}",
            major, minor, patch, header.ramstart, header.extstart, header.endmem, stack_size
        );

        let mut vm = Glulx {
            memory: Memory::new(image, &header),
            stack: Stack::new(stack_size),
            pc: 0,
            header,
            heap: Heap::default(),
            string_table: header.string_table,
            iosys: IoSys::default(),
            undo: VecDeque::new(),
            registry,
            rng,
            options,
            host,
            finished: None,
            executed: 0,
        };
        vm.restart()?;
        Ok(vm)
    }

    /// Puts the machine back in its initial state and enters the start function.
    /// The protected memory range is left alone.
    pub fn restart(&mut self) -> ExecResult<()> {
        debug!("restart");
        self.heap.clear();
        self.memory.set_memsize(self.header.endmem)?;
        self.memory.reset();
        self.undo.clear();
        self.stack.clear();
        self.iosys = IoSys::default();
        self.string_table = self.header.string_table;
        self.finished = None;
        self.enter_function(self.header.start_func, &[])
    }

    pub fn quit(&mut self) {
        self.finished = Some(ExitReason::Quit);
    }

    pub fn verify(&self) -> bool {
        self.memory.verify()
    }

    #[inline]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[inline]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    #[inline]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    #[inline]
    pub fn iosys(&self) -> IoSys {
        self.iosys
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Number of instructions executed since load.
    #[inline]
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Object and array tables, for hosts that create objects outside a glk call.
    pub fn dispatch_context(&mut self) -> DispatchContext {
        DispatchContext::new(&mut self.memory, &mut self.registry)
    }

    pub fn run(&mut self) -> ExecResult<ExitReason> {
        loop {
            if let Some(limit) = self.options.instruction_limit {
                if self.executed >= limit {
                    info!("stopped after {} instructions", self.executed);
                    return Ok(ExitReason::InstructionLimit);
                }
            }
            match self.step() {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    info!("exit: {:?}", reason);
                    return Ok(reason);
                }
                Err(ErrorKind::Exit) => {
                    self.quit();
                    info!("exit requested by host");
                    return Ok(ExitReason::Quit);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Executes one instruction. Returns the exit reason once the machine stops.
    pub fn step(&mut self) -> ExecResult<Option<ExitReason>> {
        if let Some(reason) = self.finished {
            return Ok(Some(reason));
        }
        let pc = self.pc;
        let instr = match self.fetch(pc) {
            Ok(instr) => instr,
            Err(e) => {
                error!("(pc = {:#x}) {}", pc, e);
                return Err(e);
            }
        };
        trace!("(pc = {:#x}) {:?}", pc, instr);
        let opcode = instr.opcode;
        self.executed += 1;
        match self.step_instr(&instr) {
            Err(ErrorKind::Exit) => Err(ErrorKind::Exit),
            Err(e) => {
                error!("(pc = {:#x}, opcode = {:#x}) {}", pc, opcode, e);
                Err(e)
            }
            ok => ok,
        }
    }

    // decodes the instruction at pc and moves pc past it
    fn fetch(&mut self, pc: u32) -> ExecResult<Instr> {
        let (instr, len) = decode_instr(self.memory.slice_from(pc)?)?;
        self.pc = pc + len as u32;
        Ok(instr)
    }

    fn step_instr(&mut self, instr: &Instr) -> ExecResult<Option<ExitReason>> {
        let ops = self.resolve_operands(instr)?;
        let ctrl_flow = self.execute_instr(instr.opcode, &ops)?;
        match ctrl_flow {
            CtrlFlow::Proceed => {}
            CtrlFlow::Branch { offset } => return self.branch(offset),
            CtrlFlow::JumpAbs { addr } => self.pc = addr,
            CtrlFlow::Call { addr, args, dest } => {
                self.push_callstub(StubKind::Value(dest))?;
                self.enter_function(addr, &args)?;
            }
            CtrlFlow::TailCall { addr, args } => {
                self.leave_function();
                self.enter_function(addr, &args)?;
            }
            CtrlFlow::Return { ret_val } => return self.return_value(ret_val),
            CtrlFlow::Quit => {
                self.quit();
                return Ok(Some(ExitReason::Quit));
            }
        }
        Ok(None)
    }

    // offsets 0 and 1 return that value from the current function
    fn branch(&mut self, offset: u32) -> ExecResult<Option<ExitReason>> {
        match offset {
            0 | 1 => self.return_value(offset),
            _ => {
                self.pc = self.pc.wrapping_add(offset).wrapping_sub(2);
                Ok(None)
            }
        }
    }

    fn return_value(&mut self, val: u32) -> ExecResult<Option<ExitReason>> {
        self.leave_function();
        if self.stack.sp == 0 {
            self.finished = Some(ExitReason::Returned);
            return Ok(Some(ExitReason::Returned));
        }
        self.pop_callstub(val)?;
        Ok(None)
    }

    fn resolve_operands(&mut self, instr: &Instr) -> ExecResult<Operands> {
        let mut ops = Operands {
            vals: ArrayVec::new(),
            dests: ArrayVec::new(),
            width: instr.width,
        };
        for op in &instr.operands {
            match *op {
                Operand::Load(src) => ops.vals.push(self.load(src, instr.width)?),
                Operand::Store(target) => ops.dests.push(self.dest_of(target)),
            }
        }
        Ok(ops)
    }

    fn load(&mut self, src: Source, width: u8) -> ExecResult<u32> {
        Ok(match src {
            Source::Const(val) => val,
            Source::Mem(addr) => self.memory.read_sized(addr, width)?,
            Source::Ram(offset) => self
                .memory
                .read_sized(self.memory.ramstart().wrapping_add(offset), width)?,
            Source::Stack => self.stack.pop32()?,
            Source::Local(offset) => self.read_local(offset, width)?,
        })
    }

    fn dest_of(&self, target: Target) -> Dest {
        match target {
            Target::Discard => Dest::Discard,
            Target::Mem(addr) => Dest::Mem(addr),
            Target::Ram(offset) => Dest::Mem(self.memory.ramstart().wrapping_add(offset)),
            Target::Stack => Dest::Stack,
            Target::Local(offset) => Dest::Local(offset),
        }
    }

    pub(crate) fn store(&mut self, dest: Dest, val: u32, width: u8) -> ExecResult<()> {
        match dest {
            Dest::Discard => Ok(()),
            Dest::Mem(addr) => Ok(self.memory.write_sized(addr, val, width)?),
            Dest::Local(offset) => self.write_local(offset, val, width),
            Dest::Stack => self.stack.push32(mask(val, width)),
        }
    }

    // stores into the instruction's `ix`th store operand
    fn put(&mut self, ops: &Operands, ix: usize, val: u32) -> ExecResult<()> {
        self.store(ops.dests[ix], val, ops.width)
    }

    fn arithmetic_op(
        &mut self,
        ops: &Operands,
        f: impl Fn(u32, u32) -> ExecResult<u32>,
    ) -> ExecResult<CtrlFlow> {
        let val = f(ops.vals[0], ops.vals[1])?;
        self.put(ops, 0, val)?;
        Ok(CtrlFlow::Proceed)
    }

    fn unary_op(&mut self, ops: &Operands, f: impl Fn(u32) -> u32) -> ExecResult<CtrlFlow> {
        let val = f(ops.vals[0]);
        self.put(ops, 0, val)?;
        Ok(CtrlFlow::Proceed)
    }

    fn random(&mut self, range: u32) -> u32 {
        let range = range as i32;
        if range == 0 {
            self.rng.gen::<u32>()
        } else if range > 0 {
            self.rng.gen_range(0..range as u32)
        } else {
            let magnitude = range.wrapping_neg() as u32;
            (self.rng.gen_range(0..magnitude) as i32).wrapping_neg() as u32
        }
    }

    fn execute_instr(&mut self, opcode: u32, ops: &Operands) -> ExecResult<CtrlFlow> {
        use crate::decode::opcode::{
            arith::*, branch::*, call::*, mem::*, misc::*, search::*, stack::*, stream::*,
        };
        let v = &ops.vals;
        match opcode {
            NOP => Ok(CtrlFlow::Proceed),
            ADD => self.arithmetic_op(ops, |a, b| Ok(a.wrapping_add(b))),
            SUB => self.arithmetic_op(ops, |a, b| Ok(a.wrapping_sub(b))),
            MUL => self.arithmetic_op(ops, |a, b| Ok(a.wrapping_mul(b))),
            DIV => self.arithmetic_op(ops, |a, b| match b {
                0 => Err(ErrorKind::DivideByZero),
                _ => Ok((a as i32).wrapping_div(b as i32) as u32),
            }),
            MOD => self.arithmetic_op(ops, |a, b| match b {
                0 => Err(ErrorKind::DivideByZero),
                _ => Ok((a as i32).wrapping_rem(b as i32) as u32),
            }),
            NEG => self.unary_op(ops, |a| (a as i32).wrapping_neg() as u32),
            BITAND => self.arithmetic_op(ops, |a, b| Ok(a & b)),
            BITOR => self.arithmetic_op(ops, |a, b| Ok(a | b)),
            BITXOR => self.arithmetic_op(ops, |a, b| Ok(a ^ b)),
            BITNOT => self.unary_op(ops, |a| !a),
            SHIFTL => self.arithmetic_op(ops, |a, b| Ok(if b >= 32 { 0 } else { a << b })),
            SSHIFTR => self.arithmetic_op(ops, |a, b| {
                Ok(((a as i32) >> b.min(31)) as u32)
            }),
            USHIFTR => self.arithmetic_op(ops, |a, b| Ok(if b >= 32 { 0 } else { a >> b })),

            JUMP => Ok(CtrlFlow::Branch { offset: v[0] }),
            JZ => Ok(CtrlFlow::branch(v[0] == 0, v[1])),
            JNZ => Ok(CtrlFlow::branch(v[0] != 0, v[1])),
            JEQ => Ok(CtrlFlow::branch(v[0] == v[1], v[2])),
            JNE => Ok(CtrlFlow::branch(v[0] != v[1], v[2])),
            JLT => Ok(CtrlFlow::branch((v[0] as i32) < (v[1] as i32), v[2])),
            JGE => Ok(CtrlFlow::branch((v[0] as i32) >= (v[1] as i32), v[2])),
            JGT => Ok(CtrlFlow::branch((v[0] as i32) > (v[1] as i32), v[2])),
            JLE => Ok(CtrlFlow::branch((v[0] as i32) <= (v[1] as i32), v[2])),
            JLTU => Ok(CtrlFlow::branch(v[0] < v[1], v[2])),
            JGEU => Ok(CtrlFlow::branch(v[0] >= v[1], v[2])),
            JGTU => Ok(CtrlFlow::branch(v[0] > v[1], v[2])),
            JLEU => Ok(CtrlFlow::branch(v[0] <= v[1], v[2])),
            JUMPABS => Ok(CtrlFlow::JumpAbs { addr: v[0] }),

            CALL => Ok(CtrlFlow::Call {
                addr: v[0],
                args: self.pop_arguments(v[1])?,
                dest: ops.dests[0],
            }),
            CALLF => Ok(CtrlFlow::Call {
                addr: v[0],
                args: Vec::new(),
                dest: ops.dests[0],
            }),
            CALLFI | CALLFII | CALLFIII => Ok(CtrlFlow::Call {
                addr: v[0],
                args: v[1..].to_vec(),
                dest: ops.dests[0],
            }),
            TAILCALL => Ok(CtrlFlow::TailCall {
                addr: v[0],
                args: self.pop_arguments(v[1])?,
            }),
            RETURN => Ok(CtrlFlow::Return { ret_val: v[0] }),
            CATCH => {
                let dest = ops.dests[0];
                self.push_callstub(StubKind::Value(dest))?;
                let token = self.stack.sp;
                self.store(dest, token, 4)?;
                Ok(CtrlFlow::Branch { offset: v[0] })
            }
            THROW => {
                let token = v[1];
                if token < 16 || token % 4 != 0 || token > self.stack.sp {
                    return Err(ErrorKind::BadCatchToken(token));
                }
                self.stack.sp = token;
                self.pop_callstub(v[0])?;
                Ok(CtrlFlow::Proceed)
            }

            COPY | COPYS | COPYB => self.unary_op(ops, |a| a),
            SEXS => self.unary_op(ops, |a| a as u16 as i16 as u32),
            SEXB => self.unary_op(ops, |a| a as u8 as i8 as u32),
            ALOAD => {
                let val = self.memory.read_u32(v[0].wrapping_add(v[1].wrapping_mul(4)))?;
                self.put(ops, 0, val)?;
                Ok(CtrlFlow::Proceed)
            }
            ALOADS => {
                let val = self.memory.read_u16(v[0].wrapping_add(v[1].wrapping_mul(2)))?;
                self.put(ops, 0, u32::from(val))?;
                Ok(CtrlFlow::Proceed)
            }
            ALOADB => {
                let val = self.memory.read_u8(v[0].wrapping_add(v[1]))?;
                self.put(ops, 0, u32::from(val))?;
                Ok(CtrlFlow::Proceed)
            }
            ALOADBIT => {
                let (addr, bit) = bit_address(v[0], v[1]);
                let val = (self.memory.read_u8(addr)? >> bit) & 1;
                self.put(ops, 0, u32::from(val))?;
                Ok(CtrlFlow::Proceed)
            }
            ASTORE => {
                self.memory
                    .write_u32(v[0].wrapping_add(v[1].wrapping_mul(4)), v[2])?;
                Ok(CtrlFlow::Proceed)
            }
            ASTORES => {
                self.memory
                    .write_u16(v[0].wrapping_add(v[1].wrapping_mul(2)), v[2] as u16)?;
                Ok(CtrlFlow::Proceed)
            }
            ASTOREB => {
                self.memory.write_u8(v[0].wrapping_add(v[1]), v[2] as u8)?;
                Ok(CtrlFlow::Proceed)
            }
            ASTOREBIT => {
                let (addr, bit) = bit_address(v[0], v[1]);
                let byte = self.memory.read_u8(addr)?;
                let byte = if v[2] != 0 {
                    byte | (1 << bit)
                } else {
                    byte & !(1 << bit)
                };
                self.memory.write_u8(addr, byte)?;
                Ok(CtrlFlow::Proceed)
            }

            STKCOUNT => {
                let count = self.stack.count();
                self.put(ops, 0, count)?;
                Ok(CtrlFlow::Proceed)
            }
            STKPEEK => {
                let val = self.stack.peek32(v[0])?;
                self.put(ops, 0, val)?;
                Ok(CtrlFlow::Proceed)
            }
            STKSWAP => {
                self.stack.swap()?;
                Ok(CtrlFlow::Proceed)
            }
            STKROLL => {
                self.stack.roll(v[0] as i32, v[1] as i32)?;
                Ok(CtrlFlow::Proceed)
            }
            STKCOPY => {
                self.stack.copy(v[0] as i32)?;
                Ok(CtrlFlow::Proceed)
            }

            STREAMCHAR => {
                self.stream_char(v[0] as u8)?;
                Ok(CtrlFlow::Proceed)
            }
            STREAMUNICHAR => {
                self.stream_unichar(v[0])?;
                Ok(CtrlFlow::Proceed)
            }
            STREAMNUM => {
                self.stream_num(v[0] as i32, false, 0)?;
                Ok(CtrlFlow::Proceed)
            }
            STREAMSTR => {
                self.stream_string(v[0], None, 0)?;
                Ok(CtrlFlow::Proceed)
            }
            GETSTRINGTBL => {
                let table = self.string_table;
                self.put(ops, 0, table)?;
                Ok(CtrlFlow::Proceed)
            }
            SETSTRINGTBL => {
                self.string_table = v[0];
                Ok(CtrlFlow::Proceed)
            }
            GETIOSYS => {
                let (mode, rock) = self.iosys.to_raw();
                self.put(ops, 0, mode)?;
                self.put(ops, 1, rock)?;
                Ok(CtrlFlow::Proceed)
            }
            SETIOSYS => {
                self.iosys = IoSys::new(v[0], v[1]);
                Ok(CtrlFlow::Proceed)
            }

            GESTALT => {
                let val = gestalt::query(v[0], v[1], self.heap.start());
                self.put(ops, 0, val)?;
                Ok(CtrlFlow::Proceed)
            }
            DEBUGTRAP => {
                debug!("debugtrap {:#x}", v[0]);
                Ok(CtrlFlow::Proceed)
            }
            GETMEMSIZE => {
                let endmem = self.memory.endmem();
                self.put(ops, 0, endmem)?;
                Ok(CtrlFlow::Proceed)
            }
            SETMEMSIZE => {
                let refused = if self.heap.is_active() {
                    1
                } else {
                    self.memory.set_memsize(v[0])?;
                    0
                };
                self.put(ops, 0, refused)?;
                Ok(CtrlFlow::Proceed)
            }
            RANDOM => {
                let val = self.random(v[0]);
                self.put(ops, 0, val)?;
                Ok(CtrlFlow::Proceed)
            }
            SETRANDOM => {
                self.rng = match v[0] {
                    0 => StdRng::from_entropy(),
                    seed => StdRng::seed_from_u64(u64::from(seed)),
                };
                Ok(CtrlFlow::Proceed)
            }
            QUIT => Ok(CtrlFlow::Quit),
            VERIFY => {
                let failed = if self.memory.verify() { 0 } else { 1 };
                self.put(ops, 0, failed)?;
                Ok(CtrlFlow::Proceed)
            }
            RESTART => {
                self.restart()?;
                Ok(CtrlFlow::Proceed)
            }
            SAVE => {
                self.op_save(v[0], ops.dests[0])?;
                Ok(CtrlFlow::Proceed)
            }
            RESTORE => {
                self.op_restore(v[0], ops.dests[0])?;
                Ok(CtrlFlow::Proceed)
            }
            SAVEUNDO => {
                self.op_saveundo(ops.dests[0])?;
                Ok(CtrlFlow::Proceed)
            }
            RESTOREUNDO => {
                self.op_restoreundo(ops.dests[0])?;
                Ok(CtrlFlow::Proceed)
            }
            PROTECT => {
                self.memory.set_protect(v[0], v[1]);
                Ok(CtrlFlow::Proceed)
            }
            GLK => {
                self.host.tick();
                let args = self.pop_arguments(v[1])?;
                let result = self.perform_glk(v[0], &args)?;
                self.put(ops, 0, result)?;
                Ok(CtrlFlow::Proceed)
            }
            ACCELFUNC | ACCELPARAM => {
                trace!("ignoring acceleration request {:#x} {:#x}", v[0], v[1]);
                Ok(CtrlFlow::Proceed)
            }

            LINEARSEARCH => {
                let key = search::Key::new(&self.memory, v[0], v[1], v[6])?;
                let found = search::linear(&self.memory, &key, v[2], v[3], v[4], v[5])?;
                self.put(ops, 0, found)?;
                Ok(CtrlFlow::Proceed)
            }
            BINARYSEARCH => {
                let key = search::Key::new(&self.memory, v[0], v[1], v[6])?;
                let found = search::binary(&self.memory, &key, v[2], v[3], v[4], v[5])?;
                self.put(ops, 0, found)?;
                Ok(CtrlFlow::Proceed)
            }
            LINKEDSEARCH => {
                let key = search::Key::new(&self.memory, v[0], v[1], v[5])?;
                let found = search::linked(&self.memory, &key, v[2], v[3], v[4])?;
                self.put(ops, 0, found)?;
                Ok(CtrlFlow::Proceed)
            }

            MZERO => {
                self.memory.fill_zero(v[1], v[0])?;
                Ok(CtrlFlow::Proceed)
            }
            MCOPY => {
                self.memory.copy_within(v[1], v[2], v[0])?;
                Ok(CtrlFlow::Proceed)
            }
            MALLOC => {
                let addr = self.heap.alloc(&mut self.memory, v[0]);
                self.put(ops, 0, addr)?;
                Ok(CtrlFlow::Proceed)
            }
            MFREE => {
                self.heap.free(&mut self.memory, v[0])?;
                Ok(CtrlFlow::Proceed)
            }
            _ => Err(ErrorKind::BadOpcode(opcode)),
        }
    }
}

// byte address and bit number of a signed bit offset from `base`
fn bit_address(base: u32, bitnum: u32) -> (u32, u32) {
    let bitnum = bitnum as i32;
    (base.wrapping_add((bitnum >> 3) as u32), (bitnum & 7) as u32)
}
