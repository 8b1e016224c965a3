use super::call::{Dest, Resume, StubKind};
use super::{ExecResult, Glulx};
use crate::memory::MemoryAccess;
use crate::text::{self, BitCursor, Node, StrKind};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Null,
    Filter,
    Glk,
}

/// The current I/O system: how @streamchar and friends route their output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoSys {
    pub mode: IoMode,
    // filter function address in Filter mode
    pub rock: u32,
}

impl Default for IoSys {
    fn default() -> Self {
        IoSys {
            mode: IoMode::Null,
            rock: 0,
        }
    }
}

impl IoSys {
    // unknown modes select Null
    pub fn new(mode: u32, rock: u32) -> Self {
        let mode = match mode {
            1 => IoMode::Filter,
            2 => IoMode::Glk,
            _ => IoMode::Null,
        };
        IoSys { mode, rock }
    }

    pub fn to_raw(self) -> (u32, u32) {
        let mode = match self.mode {
            IoMode::Null => 0,
            IoMode::Filter => 1,
            IoMode::Glk => 2,
        };
        (mode, self.rock)
    }
}

enum Streamed {
    Done,
    // VM code is running; printing continues when its stub is popped
    Suspended,
    // print the string object at this address, then pop back out
    Nested(u32),
}

impl<'a> Glulx<'a> {
    pub(crate) fn stream_char(&mut self, ch: u8) -> ExecResult<()> {
        match self.iosys.mode {
            IoMode::Null => Ok(()),
            IoMode::Glk => {
                self.host.put_char(ch);
                Ok(())
            }
            IoMode::Filter => self.call_filter(u32::from(ch)),
        }
    }

    pub(crate) fn stream_unichar(&mut self, ch: u32) -> ExecResult<()> {
        match self.iosys.mode {
            IoMode::Null => Ok(()),
            IoMode::Glk => {
                self.host.put_char_uni(ch);
                Ok(())
            }
            IoMode::Filter => self.call_filter(ch),
        }
    }

    fn call_filter(&mut self, ch: u32) -> ExecResult<()> {
        self.push_callstub(StubKind::Value(Dest::Discard))?;
        self.enter_function(self.iosys.rock, &[ch])
    }

    /// Prints `val` in decimal. In Filter mode each digit is a separate call
    /// and `charnum` is the digit to continue from.
    pub(crate) fn stream_num(&mut self, val: i32, inmiddle: bool, charnum: u32) -> ExecResult<()> {
        let digits = val.to_string().into_bytes();
        let rest = digits.get(charnum as usize..).unwrap_or(&[]);
        match self.iosys.mode {
            IoMode::Null => {}
            IoMode::Glk => {
                for &d in rest {
                    self.host.put_char(d);
                }
            }
            IoMode::Filter => {
                if !inmiddle {
                    self.push_callstub(StubKind::Resume(Resume::Function))?;
                }
                if let Some(&d) = rest.first() {
                    self.pc = val as u32;
                    self.push_callstub(StubKind::Resume(Resume::Number {
                        digit: charnum + 1,
                    }))?;
                    return self.enter_function(self.iosys.rock, &[u32::from(d)]);
                }
                self.pop_string_stub()?;
                return Ok(());
            }
        }
        if inmiddle {
            self.pop_string_stub()?;
        }
        Ok(())
    }

    /// Prints the string object at `addr`. With `resume` set, `addr` points
    /// into a string of that kind whose printing was interrupted, and `bit`
    /// is the bit position for a compressed one.
    pub(crate) fn stream_string(
        &mut self,
        addr: u32,
        resume: Option<StrKind>,
        bit: u32,
    ) -> ExecResult<()> {
        trace!("stream string {:#x} ({:?})", addr, resume);
        let mut substring = resume.is_some();
        let mut resume = resume;
        let mut addr = addr;
        let mut bit = bit;
        loop {
            let kind = match resume.take() {
                Some(kind) => kind,
                None => {
                    let kind = StrKind::from_type(self.memory.read_u8(addr)?)?;
                    addr += kind.data_offset();
                    bit = 0;
                    kind
                }
            };
            let outcome = match kind {
                StrKind::Compressed => self.stream_compressed(addr, bit, &mut substring)?,
                StrKind::Latin1 => self.stream_plain(addr, false, &mut substring)?,
                StrKind::Unicode => self.stream_plain(addr, true, &mut substring)?,
            };
            match outcome {
                Streamed::Suspended => return Ok(()),
                Streamed::Nested(next) => addr = next,
                Streamed::Done if !substring => return Ok(()),
                Streamed::Done => match self.pop_string_stub()? {
                    Some((next, next_bit)) => {
                        addr = next;
                        bit = next_bit;
                        resume = Some(StrKind::Compressed);
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    // a top-level string gets a terminator stub the first time it is interrupted
    fn enter_substring(&mut self, substring: &mut bool) -> ExecResult<()> {
        if !*substring {
            self.push_callstub(StubKind::Resume(Resume::Function))?;
            *substring = true;
        }
        Ok(())
    }

    fn suspend_compressed(&mut self, cursor: BitCursor, substring: &mut bool) -> ExecResult<()> {
        self.enter_substring(substring)?;
        self.pc = cursor.addr;
        self.push_callstub(StubKind::Resume(Resume::Compressed { bit: cursor.bit }))
    }

    fn stream_compressed(
        &mut self,
        addr: u32,
        bit: u32,
        substring: &mut bool,
    ) -> ExecResult<Streamed> {
        let root = text::table_root(&self.memory, self.string_table)?;
        let filter = self.iosys.mode == IoMode::Filter;
        let mut cursor = BitCursor::new(addr, bit);
        loop {
            match cursor.decode(&self.memory, root)? {
                // decode only stops at leaves
                Node::End | Node::Branch { .. } => return Ok(Streamed::Done),
                Node::Char(ch) if filter => {
                    self.suspend_compressed(cursor, substring)?;
                    self.enter_function(self.iosys.rock, &[u32::from(ch)])?;
                    return Ok(Streamed::Suspended);
                }
                Node::UniChar(ch) if filter => {
                    self.suspend_compressed(cursor, substring)?;
                    self.enter_function(self.iosys.rock, &[ch])?;
                    return Ok(Streamed::Suspended);
                }
                Node::Char(ch) => self.stream_char(ch)?,
                Node::UniChar(ch) => self.stream_unichar(ch)?,
                Node::CString(at) if filter => {
                    self.suspend_compressed(cursor, substring)?;
                    return self.stream_plain(at, false, substring);
                }
                Node::UniString(at) if filter => {
                    self.suspend_compressed(cursor, substring)?;
                    return self.stream_plain(at, true, substring);
                }
                Node::CString(at) => {
                    for ch in self.memory.read_cstring(at)? {
                        self.stream_char(ch)?;
                    }
                }
                Node::UniString(at) => {
                    for ch in self.memory.read_unistring(at)? {
                        self.stream_unichar(ch)?;
                    }
                }
                Node::Indirect {
                    target,
                    double,
                    args,
                } => {
                    let target = text::resolve_indirect(&self.memory, target, double)?;
                    let ty = self.memory.read_u8(target)?;
                    match ty {
                        0xE0..=0xFF => {
                            self.suspend_compressed(cursor, substring)?;
                            return Ok(Streamed::Nested(target));
                        }
                        0xC0..=0xDF => {
                            let args = match args {
                                Some((count, at)) => (0..count)
                                    .map(|i| self.memory.read_u32(at + 4 * i))
                                    .collect::<Result<Vec<u32>, _>>()?,
                                None => Vec::new(),
                            };
                            self.suspend_compressed(cursor, substring)?;
                            self.enter_function(target, &args)?;
                            return Ok(Streamed::Suspended);
                        }
                        _ => return Err(super::ErrorKind::BadIndirectRef(ty)),
                    }
                }
            }
        }
    }

    // NUL-terminated Latin-1 or code-point string starting at `addr`
    fn stream_plain(
        &mut self,
        addr: u32,
        unicode: bool,
        substring: &mut bool,
    ) -> ExecResult<Streamed> {
        let mut addr = addr;
        loop {
            let ch = if unicode {
                self.memory.read_u32(addr)?
            } else {
                u32::from(self.memory.read_u8(addr)?)
            };
            if ch == 0 {
                return Ok(Streamed::Done);
            }
            addr += if unicode { 4 } else { 1 };
            match self.iosys.mode {
                IoMode::Null => {}
                IoMode::Glk if unicode => self.host.put_char_uni(ch),
                IoMode::Glk => self.host.put_char(ch as u8),
                IoMode::Filter => {
                    self.enter_substring(substring)?;
                    self.pc = addr;
                    let resume = if unicode {
                        Resume::Unicode
                    } else {
                        Resume::CString
                    };
                    self.push_callstub(StubKind::Resume(resume))?;
                    self.enter_function(self.iosys.rock, &[ch])?;
                    return Ok(Streamed::Suspended);
                }
            }
        }
    }
}
