use super::{ErrorKind, ExecResult, Glulx};
use crate::memory::MemoryAccess;
use crate::text::StrKind;
use crate::util::align_up;
use log::debug;

/// Destination of a value produced by an instruction or a function return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    Discard,
    Mem(u32),
    Local(u32),
    Stack,
}

/// Where string printing picks up again when a stub is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    // bottom of a string: return to the instruction after @streamstr/@streamnum
    Function,
    Compressed { bit: u32 },
    Number { digit: u32 },
    CString,
    Unicode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubKind {
    Value(Dest),
    Resume(Resume),
}

impl StubKind {
    /// The (DestType, DestAddr) words stored on the stack.
    pub fn encode(self) -> (u32, u32) {
        match self {
            StubKind::Value(Dest::Discard) => (0, 0),
            StubKind::Value(Dest::Mem(addr)) => (1, addr),
            StubKind::Value(Dest::Local(offset)) => (2, offset),
            StubKind::Value(Dest::Stack) => (3, 0),
            StubKind::Resume(Resume::Compressed { bit }) => (0x10, bit),
            StubKind::Resume(Resume::Function) => (0x11, 0),
            StubKind::Resume(Resume::Number { digit }) => (0x12, digit),
            StubKind::Resume(Resume::CString) => (0x13, 0),
            StubKind::Resume(Resume::Unicode) => (0x14, 0),
        }
    }

    pub fn decode(desttype: u32, destaddr: u32) -> ExecResult<Self> {
        Ok(match desttype {
            0 => StubKind::Value(Dest::Discard),
            1 => StubKind::Value(Dest::Mem(destaddr)),
            2 => StubKind::Value(Dest::Local(destaddr)),
            3 => StubKind::Value(Dest::Stack),
            0x10 => StubKind::Resume(Resume::Compressed { bit: destaddr }),
            0x11 => StubKind::Resume(Resume::Function),
            0x12 => StubKind::Resume(Resume::Number { digit: destaddr }),
            0x13 => StubKind::Resume(Resume::CString),
            0x14 => StubKind::Resume(Resume::Unicode),
            _ => return Err(ErrorKind::BadCallStub(desttype)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CallStub {
    kind: StubKind,
    pc: u32,
    fp: u32,
}

const STUB_LEN: u32 = 16;

impl<'a> Glulx<'a> {
    pub(crate) fn push_callstub(&mut self, kind: StubKind) -> ExecResult<()> {
        self.stack.ensure(STUB_LEN)?;
        let (desttype, destaddr) = kind.encode();
        self.stack.push32(desttype)?;
        self.stack.push32(destaddr)?;
        self.stack.push32(self.pc)?;
        self.stack.push32(self.stack.fp)
    }

    fn pop_stub(&mut self) -> ExecResult<CallStub> {
        if self.stack.sp < STUB_LEN {
            return Err(ErrorKind::StackUnderflow);
        }
        let base = self.stack.sp - STUB_LEN;
        let kind = StubKind::decode(self.stack.read_u32(base)?, self.stack.read_u32(base + 4)?)?;
        let pc = self.stack.read_u32(base + 8)?;
        let fp = self.stack.read_u32(base + 12)?;
        self.stack.sp = base;
        Ok(CallStub { kind, pc, fp })
    }

    /// Pops a stub, restores pc and the frame, and delivers `value` or resumes printing.
    pub(crate) fn pop_callstub(&mut self, value: u32) -> ExecResult<()> {
        let stub = self.pop_stub()?;
        self.pc = stub.pc;
        self.stack.set_frame(stub.fp)?;
        match stub.kind {
            StubKind::Value(dest) => self.store(dest, value, 4),
            StubKind::Resume(Resume::Function) => Err(ErrorKind::BadCallStub(0x11)),
            StubKind::Resume(Resume::Compressed { bit }) => {
                self.stream_string(stub.pc, Some(StrKind::Compressed), bit)
            }
            StubKind::Resume(Resume::Number { digit }) => {
                self.stream_num(stub.pc as i32, true, digit)
            }
            StubKind::Resume(Resume::CString) => {
                self.stream_string(stub.pc, Some(StrKind::Latin1), 0)
            }
            StubKind::Resume(Resume::Unicode) => {
                self.stream_string(stub.pc, Some(StrKind::Unicode), 0)
            }
        }
    }

    /// Pops the stub under a nested string. `Some((addr, bit))` continues a
    /// compressed string; `None` means printing is over and pc is restored.
    pub(crate) fn pop_string_stub(&mut self) -> ExecResult<Option<(u32, u32)>> {
        let stub = self.pop_stub()?;
        self.pc = stub.pc;
        match stub.kind {
            StubKind::Resume(Resume::Function) => Ok(None),
            StubKind::Resume(Resume::Compressed { bit }) => Ok(Some((stub.pc, bit))),
            other => Err(ErrorKind::BadCallStub(other.encode().0)),
        }
    }

    /// Builds a frame for the function at `addr` and moves pc to its first instruction.
    pub(crate) fn enter_function(&mut self, addr: u32, args: &[u32]) -> ExecResult<()> {
        let kind = self.memory.read_u8(addr)?;
        let stack_args = match kind {
            0xC0 => true,
            0xC1 => false,
            _ => return Err(ErrorKind::BadFunctionPrologue(kind)),
        };

        let mut format = Vec::new();
        let mut pos = addr + 1;
        loop {
            let ty = self.memory.read_u8(pos)?;
            let count = self.memory.read_u8(pos + 1)?;
            pos += 2;
            if ty == 0 {
                break;
            }
            if !matches!(ty, 1 | 2 | 4) {
                return Err(ErrorKind::BadLocalsFormat(ty));
            }
            format.push((ty, count));
        }

        // (offset, size) of each local, in declaration order
        let mut locals = Vec::new();
        let mut offset = 0;
        for &(ty, count) in &format {
            let size = u32::from(ty);
            offset = align_up(offset, size);
            for _ in 0..count {
                locals.push((offset, ty));
                offset += size;
            }
        }
        let locals_pos = 8 + align_up(2 * (format.len() as u32 + 1), 4);
        let frame_len = locals_pos + align_up(offset, 4);

        let mut frame = vec![0u8; frame_len as usize];
        frame[0..4].copy_from_slice(&frame_len.to_be_bytes());
        frame[4..8].copy_from_slice(&locals_pos.to_be_bytes());
        for (ix, &(ty, count)) in format.iter().enumerate() {
            frame[8 + 2 * ix] = ty;
            frame[9 + 2 * ix] = count;
        }

        let fp = self.stack.sp;
        self.stack.ensure(frame_len)?;
        self.stack.write_bytes(fp, &frame)?;
        self.stack.sp = fp + frame_len;
        self.stack.set_frame(fp)?;
        self.pc = pos;
        debug!(
            "enter {:#x} ({} args, {} locals)",
            addr,
            args.len(),
            locals.len()
        );

        if stack_args {
            for &arg in args.iter().rev() {
                self.stack.push32(arg)?;
            }
            self.stack.push32(args.len() as u32)?;
        } else {
            let base = self.stack.localsbase;
            for (&arg, &(offset, size)) in args.iter().zip(&locals) {
                self.stack.write_sized(base + offset, arg, size)?;
            }
        }
        Ok(())
    }

    pub(crate) fn leave_function(&mut self) {
        self.stack.sp = self.stack.fp;
    }

    // first popped is the first argument
    pub(crate) fn pop_arguments(&mut self, count: u32) -> ExecResult<Vec<u32>> {
        if count > self.stack.count() {
            return Err(ErrorKind::StackUnderflow);
        }
        (0..count).map(|_| self.stack.pop32()).collect()
    }

    // declared size of the local at `offset`, if one starts there
    fn local_size(&self, offset: u32) -> ExecResult<Option<u8>> {
        let mut pos = self.stack.fp + 8;
        let mut start = 0;
        loop {
            let ty = self.stack.read_u8(pos)?;
            let count = u32::from(self.stack.read_u8(pos + 1)?);
            pos += 2;
            if ty == 0 {
                return Ok(None);
            }
            let size = u32::from(ty);
            start = align_up(start, size);
            let end = start + size * count;
            if offset >= start && offset < end {
                return Ok(if (offset - start) % size == 0 {
                    Some(ty)
                } else {
                    None
                });
            }
            start = end;
        }
    }

    fn local_access(&self, offset: u32, width: u8) -> ExecResult<(u32, u8)> {
        let width = self.local_size(offset)?.map_or(width, |size| size.min(width));
        let addr = self
            .stack
            .localsbase
            .checked_add(offset)
            .ok_or(ErrorKind::BadLocal(offset))?;
        match addr.checked_add(u32::from(width)) {
            Some(end) if end <= self.stack.valstackbase => Ok((addr, width)),
            _ => Err(ErrorKind::BadLocal(offset)),
        }
    }

    pub(crate) fn read_local(&self, offset: u32, width: u8) -> ExecResult<u32> {
        let (addr, width) = self.local_access(offset, width)?;
        self.stack.read_sized(addr, width)
    }

    pub(crate) fn write_local(&mut self, offset: u32, val: u32, width: u8) -> ExecResult<()> {
        let (addr, width) = self.local_access(offset, width)?;
        self.stack.write_sized(addr, val, width)
    }
}
