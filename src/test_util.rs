use crate::dispatch::{ArrayRef, DispatchContext, GlkArg, STREAM_CLASS};
use crate::exec::{ErrorKind, ExecResult};
use crate::interface::{GlkHost, HostObject};
use crate::memory::{checksum, CHECKSUM_OFFSET};
use crate::util::words_to_bytes;
use std::collections::HashMap;

pub const RAMSTART: u32 = 0x1000;
pub const EXTSTART: u32 = 0x1400;
pub const ENDMEM: u32 = 0x3000;
const CODE_START: u32 = 0x40;

/// An operand for the test assembler. The encoder picks the smallest mode.
#[derive(Debug, Clone, Copy)]
pub enum Op {
    Imm(i32),
    Mem(u32),
    Ram(u32),
    Local(u32),
    Stack,
    Discard,
    // branch offset to a label
    To(&'static str),
    // absolute address of a label
    Addr(&'static str),
}

#[derive(Debug)]
struct Fixup {
    pos: usize,
    label: &'static str,
    // address after the branch instruction
    branch_from: Option<u32>,
}

fn sized_mode(base: u8, n: u32) -> (u8, Vec<u8>) {
    if n <= 0xFF {
        (base, vec![n as u8])
    } else if n <= 0xFFFF {
        (base + 1, (n as u16).to_be_bytes().to_vec())
    } else {
        (base + 2, n.to_be_bytes().to_vec())
    }
}

fn encode(op: Op) -> (u8, Vec<u8>) {
    match op {
        Op::Imm(0) | Op::Discard => (0, vec![]),
        Op::Imm(n) if n >= -0x80 && n < 0x80 => (1, vec![n as u8]),
        Op::Imm(n) if n >= -0x8000 && n < 0x8000 => (2, (n as i16).to_be_bytes().to_vec()),
        Op::Imm(n) => (3, n.to_be_bytes().to_vec()),
        Op::Mem(addr) => sized_mode(5, addr),
        Op::Stack => (8, vec![]),
        Op::Local(offset) => sized_mode(9, offset),
        Op::Ram(offset) => sized_mode(13, offset),
        Op::To(_) | Op::Addr(_) => (3, vec![0; 4]),
    }
}

/// A tiny assembler for code placed in ROM at 0x40.
#[derive(Debug, Default)]
pub struct Asm {
    code: Vec<u8>,
    labels: HashMap<&'static str, u32>,
    fixups: Vec<Fixup>,
}

impl Asm {
    pub fn here(&self) -> u32 {
        CODE_START + self.code.len() as u32
    }

    pub fn label(&mut self, name: &'static str) -> &mut Self {
        let here = self.here();
        assert!(self.labels.insert(name, here).is_none(), "duplicate label {}", name);
        self
    }

    pub fn addr(&self, name: &str) -> u32 {
        self.labels[name]
    }

    /// A function header: 0xC0 (stack args) or 0xC1 (local args) and its locals format.
    pub fn func(&mut self, name: &'static str, kind: u8, locals: &[(u8, u8)]) -> &mut Self {
        self.label(name);
        self.code.push(kind);
        for &(size, count) in locals {
            self.code.push(size);
            self.code.push(count);
        }
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    pub fn op(&mut self, opcode: u32, operands: &[Op]) -> &mut Self {
        match opcode {
            0..=0x7F => self.code.push(opcode as u8),
            0x80..=0x3FFF => self
                .code
                .extend_from_slice(&(opcode as u16 | 0x8000).to_be_bytes()),
            _ => self
                .code
                .extend_from_slice(&(opcode | 0xC000_0000).to_be_bytes()),
        }
        let encoded: Vec<(u8, Vec<u8>)> = operands.iter().map(|&op| encode(op)).collect();
        for pair in encoded.chunks(2) {
            let high = pair.get(1).map_or(0, |(mode, _)| *mode);
            self.code.push(pair[0].0 | high << 4);
        }
        let first_fixup = self.fixups.len();
        for (&op, (_, bytes)) in operands.iter().zip(&encoded) {
            match op {
                Op::To(label) => self.fixups.push(Fixup {
                    pos: self.code.len(),
                    label,
                    branch_from: Some(0),
                }),
                Op::Addr(label) => self.fixups.push(Fixup {
                    pos: self.code.len(),
                    label,
                    branch_from: None,
                }),
                _ => {}
            }
            self.code.extend_from_slice(bytes);
        }
        let end = self.here();
        for fixup in &mut self.fixups[first_fixup..] {
            if fixup.branch_from.is_some() {
                fixup.branch_from = Some(end);
            }
        }
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.code.extend_from_slice(data);
        self
    }

    pub fn word(&mut self, word: u32) -> &mut Self {
        self.bytes(&word.to_be_bytes())
    }

    pub fn word_addr(&mut self, label: &'static str) -> &mut Self {
        self.fixups.push(Fixup {
            pos: self.code.len(),
            label,
            branch_from: None,
        });
        self.word(0)
    }

    pub fn align(&mut self, n: usize) -> &mut Self {
        while self.code.len() % n != 0 {
            self.code.push(0);
        }
        self
    }

    fn finish(mut self) -> Vec<u8> {
        for fixup in &self.fixups {
            let target = self.labels[fixup.label];
            let val = match fixup.branch_from {
                Some(from) => target.wrapping_sub(from).wrapping_add(2),
                None => target,
            };
            self.code[fixup.pos..fixup.pos + 4].copy_from_slice(&val.to_be_bytes());
        }
        self.code
    }
}

/// Builds a story image: code in ROM, `ram` at RAMSTART, and the start
/// function at the label "start".
pub struct Story {
    pub asm: Asm,
    pub ram: Vec<u8>,
    pub string_table: Option<&'static str>,
    pub endmem: u32,
    pub stack_size: u32,
}

impl Story {
    pub fn new() -> Self {
        Story {
            asm: Asm::default(),
            ram: Vec::new(),
            string_table: None,
            endmem: ENDMEM,
            stack_size: 0x1000,
        }
    }

    pub fn build(self) -> Vec<u8> {
        let start = self.asm.addr("start");
        let table = self.string_table.map_or(0, |label| self.asm.addr(label));
        let code = self.asm.finish();
        assert!(CODE_START as usize + code.len() <= RAMSTART as usize);
        assert!(self.ram.len() <= (EXTSTART - RAMSTART) as usize);

        let mut image = vec![0u8; EXTSTART as usize];
        image[..4].copy_from_slice(b"Glul");
        let header = words_to_bytes(&[
            0x0003_0101,
            RAMSTART,
            EXTSTART,
            self.endmem,
            self.stack_size,
            start,
            table,
        ]);
        image[4..CHECKSUM_OFFSET].copy_from_slice(&header);
        let code_start = CODE_START as usize;
        image[code_start..code_start + code.len()].copy_from_slice(&code);
        let ramstart = RAMSTART as usize;
        image[ramstart..ramstart + self.ram.len()].copy_from_slice(&self.ram);
        let sum = checksum(&image);
        image[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_be_bytes());
        image
    }
}

pub mod sel {
    pub const GESTALT: u32 = 0x0004;
    pub const PUT_CHAR: u32 = 0x0080;
    pub const PUT_BUFFER: u32 = 0x0084;
    pub const OPEN_STREAM: u32 = 0x7000;
    pub const MARSHAL: u32 = 0x7002;
    pub const DOUBLE: u32 = 0x7003;
    pub const FILL: u32 = 0x7004;
    pub const RETAIN: u32 = 0x7005;
    pub const RELEASE: u32 = 0x7006;
}

/// A GlkHost that records what the VM sends it.
#[derive(Debug, Default)]
pub struct TestHost {
    pub output: Vec<u32>,
    pub calls: Vec<(u32, Vec<GlkArg>)>,
    pub files: HashMap<HostObject, Vec<u8>>,
    // contents given to newly opened streams
    pub preload: Option<Vec<u8>>,
    // arrays kept by RETAIN until RELEASE
    pub retained: Vec<ArrayRef>,
    pub(crate) next_object: u64,
}

impl TestHost {
    pub fn text(&self) -> String {
        self.output
            .iter()
            .map(|&c| std::char::from_u32(c).unwrap_or('?'))
            .collect()
    }
}

impl GlkHost for TestHost {
    fn prototype(&self, selector: u32) -> Option<&'static str> {
        match selector {
            sel::GESTALT => Some("3IuIu:Iu"),
            sel::PUT_CHAR => Some("1Cu:"),
            sel::PUT_BUFFER => Some("1>+#Cn:"),
            sel::OPEN_STREAM => Some("1:Qb"),
            sel::MARSHAL => Some("3Iu<[2Iu Iu]Iu:Iu"),
            sel::DOUBLE => Some("1&+#Iu:"),
            sel::FILL => Some("1<+#Iu:"),
            sel::RETAIN => Some("1&+#!Iu:"),
            sel::RELEASE => Some("0:"),
            _ => None,
        }
    }

    fn call(
        &mut self,
        selector: u32,
        args: &mut [GlkArg],
        ctx: &mut DispatchContext<'_>,
    ) -> ExecResult<()> {
        self.calls.push((selector, args.to_vec()));
        let ret = match selector {
            sel::GESTALT => {
                let sum = args[0].as_u32().unwrap_or(0) + args[1].as_u32().unwrap_or(0);
                Some(GlkArg::Uint(sum))
            }
            sel::PUT_CHAR => {
                self.output.extend(args[0].as_u32());
                None
            }
            sel::PUT_BUFFER => {
                let array = args[1].as_array().ok_or(ErrorKind::BadArrayRef)?;
                self.output.extend(ctx.bytes(array)?.iter().map(|&b| u32::from(b)));
                None
            }
            sel::OPEN_STREAM => {
                let obj = HostObject(self.next_object);
                self.next_object += 1;
                ctx.register_object(STREAM_CLASS, obj)?;
                self.files
                    .insert(obj, self.preload.clone().unwrap_or_default());
                Some(GlkArg::Opaque(Some(obj)))
            }
            sel::MARSHAL => {
                args[2] = GlkArg::Uint(7);
                args[3] = GlkArg::Uint(9);
                Some(GlkArg::Uint(17))
            }
            sel::DOUBLE => {
                let array = args[1].as_array().ok_or(ErrorKind::BadArrayRef)?;
                for v in ctx.ints_mut(array)? {
                    *v *= 2;
                }
                None
            }
            sel::FILL => {
                let array = args[1].as_array().ok_or(ErrorKind::BadArrayRef)?;
                for (ix, v) in ctx.ints_mut(array)?.iter_mut().enumerate() {
                    *v = ix as u32 + 1;
                }
                None
            }
            sel::RETAIN => {
                let array = args[1].as_array().ok_or(ErrorKind::BadArrayRef)?;
                ctx.retain_array(array)?;
                for v in ctx.ints_mut(array)? {
                    *v *= 10;
                }
                self.retained.push(array);
                None
            }
            sel::RELEASE => {
                for array in self.retained.drain(..) {
                    for v in ctx.ints_mut(array)? {
                        *v += 1;
                    }
                    ctx.unregister_array(array)?;
                }
                None
            }
            _ => return Err(ErrorKind::UnknownGlkSelector(selector)),
        };
        if let (Some(ret), Some(slot)) = (ret, args.last_mut()) {
            *slot = ret;
        }
        Ok(())
    }

    fn put_char(&mut self, ch: u8) {
        self.output.push(u32::from(ch));
    }

    fn put_char_uni(&mut self, ch: u32) {
        self.output.push(ch);
    }

    fn write_stream(&mut self, stream: HostObject, data: &[u8]) -> ExecResult<()> {
        let file = self
            .files
            .get_mut(&stream)
            .ok_or_else(|| ErrorKind::Io("unknown stream".to_string()))?;
        file.extend_from_slice(data);
        Ok(())
    }

    fn read_stream(&mut self, stream: HostObject) -> ExecResult<Vec<u8>> {
        self.files
            .get(&stream)
            .cloned()
            .ok_or_else(|| ErrorKind::Io("unknown stream".to_string()))
    }
}
