use super::{ErrorKind, ExecResult};
use num::Integer;
use std::ops::Range;

/// The VM stack: call frames, call stubs and value slots in one byte array.
#[derive(Debug, Clone)]
pub struct Stack {
    bytes: Vec<u8>,
    pub sp: u32,
    pub fp: u32,
    pub localsbase: u32,
    pub valstackbase: u32,
}

impl Stack {
    pub fn new(size: u32) -> Self {
        Stack {
            bytes: vec![0; size as usize],
            sp: 0,
            fp: 0,
            localsbase: 0,
            valstackbase: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn clear(&mut self) {
        self.sp = 0;
        self.fp = 0;
        self.localsbase = 0;
        self.valstackbase = 0;
    }

    fn range(&self, addr: u32, len: u32) -> ExecResult<Range<usize>> {
        let start = addr as usize;
        let end = start + len as usize;
        if end > self.bytes.len() {
            Err(ErrorKind::StackOverflow)
        } else {
            Ok(start..end)
        }
    }

    // fails unless `len` more bytes fit above sp
    pub fn ensure(&self, len: u32) -> ExecResult<()> {
        self.range(self.sp, len).map(|_| ())
    }

    pub fn read_u8(&self, addr: u32) -> ExecResult<u8> {
        Ok(self.bytes[self.range(addr, 1)?.start])
    }

    pub fn read_u32(&self, addr: u32) -> ExecResult<u32> {
        let b = &self.bytes[self.range(addr, 4)?];
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_sized(&self, addr: u32, width: u8) -> ExecResult<u32> {
        let b = &self.bytes[self.range(addr, u32::from(width))?];
        Ok(match width {
            1 => u32::from(b[0]),
            2 => u32::from(u16::from_be_bytes([b[0], b[1]])),
            _ => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    pub fn write_u32(&mut self, addr: u32, val: u32) -> ExecResult<()> {
        let range = self.range(addr, 4)?;
        self.bytes[range].copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    pub fn write_sized(&mut self, addr: u32, val: u32, width: u8) -> ExecResult<()> {
        let range = self.range(addr, u32::from(width))?;
        match width {
            1 => self.bytes[range][0] = val as u8,
            2 => self.bytes[range].copy_from_slice(&(val as u16).to_be_bytes()),
            _ => self.bytes[range].copy_from_slice(&val.to_be_bytes()),
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> ExecResult<()> {
        let range = self.range(addr, data.len() as u32)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn push32(&mut self, val: u32) -> ExecResult<()> {
        self.write_u32(self.sp, val)?;
        self.sp += 4;
        Ok(())
    }

    pub fn pop32(&mut self) -> ExecResult<u32> {
        if self.sp < self.valstackbase + 4 {
            return Err(ErrorKind::StackUnderflow);
        }
        self.sp -= 4;
        self.read_u32(self.sp)
    }

    // narrow values still occupy a full slot
    pub fn push16(&mut self, val: u16) -> ExecResult<()> {
        self.push32(u32::from(val))
    }

    pub fn pop16(&mut self) -> ExecResult<u16> {
        Ok(self.pop32()? as u16)
    }

    pub fn push8(&mut self, val: u8) -> ExecResult<()> {
        self.push32(u32::from(val))
    }

    pub fn pop8(&mut self) -> ExecResult<u8> {
        Ok(self.pop32()? as u8)
    }

    /// Number of values on the current frame's value stack.
    #[inline]
    pub fn count(&self) -> u32 {
        (self.sp - self.valstackbase) / 4
    }

    pub fn peek32(&self, depth: u32) -> ExecResult<u32> {
        if depth >= self.count() {
            return Err(ErrorKind::StackUnderflow);
        }
        self.read_u32(self.sp - 4 * (depth + 1))
    }

    pub fn swap(&mut self) -> ExecResult<()> {
        let a = self.pop32()?;
        let b = self.pop32()?;
        self.push32(a)?;
        self.push32(b)
    }

    fn top_words(&self, count: i32) -> ExecResult<Range<usize>> {
        if count < 0 || count as u32 > self.count() {
            return Err(ErrorKind::StackUnderflow);
        }
        Ok((self.sp - 4 * count as u32) as usize..self.sp as usize)
    }

    pub fn copy(&mut self, count: i32) -> ExecResult<()> {
        let words = self.top_words(count)?;
        let len = (words.end - words.start) as u32;
        self.ensure(len)?;
        self.bytes.copy_within(words, self.sp as usize);
        self.sp += len;
        Ok(())
    }

    /// Rotates the top `count` values so that each moves `distance` places toward the top.
    pub fn roll(&mut self, count: i32, distance: i32) -> ExecResult<()> {
        if count == 0 {
            return Ok(());
        }
        let words = self.top_words(count)?;
        let shift = distance.mod_floor(&count) as usize;
        self.bytes[words].rotate_right(4 * shift);
        Ok(())
    }

    /// Recomputes the frame registers from the frame header at `fp`.
    pub fn set_frame(&mut self, fp: u32) -> ExecResult<()> {
        let frame_len = self.read_u32(fp)?;
        let locals_pos = self.read_u32(fp.checked_add(4).ok_or(ErrorKind::StackOverflow)?)?;
        let valstackbase = fp
            .checked_add(frame_len)
            .filter(|&end| end <= self.size() && locals_pos <= frame_len)
            .ok_or(ErrorKind::StackOverflow)?;
        self.fp = fp;
        self.localsbase = fp + locals_pos;
        self.valstackbase = valstackbase;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.sp as usize]
    }

    // frame registers are left for the caller to set
    pub fn load(&mut self, data: &[u8]) -> ExecResult<()> {
        if data.len() % 4 != 0 {
            return Err(ErrorKind::StackUnderflow);
        }
        self.clear();
        self.write_bytes(0, data)?;
        self.sp = data.len() as u32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_with(words: &[u32]) -> Stack {
        let mut stack = Stack::new(64);
        for &w in words {
            stack.push32(w).unwrap();
        }
        stack
    }

    fn contents(stack: &Stack) -> Vec<u32> {
        (0..stack.count()).rev().map(|d| stack.peek32(d).unwrap()).collect()
    }

    #[test]
    fn test_push_pop() {
        let mut stack = stack_with(&[1, 2]);
        assert_eq!(stack.pop32(), Ok(2));
        stack.push16(0xABCD).unwrap();
        assert_eq!(stack.sp, 8);
        assert_eq!(stack.pop16(), Ok(0xABCD));
        stack.push8(0xEE).unwrap();
        assert_eq!(stack.pop8(), Ok(0xEE));
        assert_eq!(stack.pop32(), Ok(1));
        assert_eq!(stack.pop32(), Err(ErrorKind::StackUnderflow));
    }

    #[test]
    fn test_underflow_at_frame_base() {
        let mut stack = stack_with(&[1, 2, 3]);
        stack.valstackbase = 8;
        assert_eq!(stack.count(), 1);
        assert_eq!(stack.peek32(0), Ok(3));
        assert_eq!(stack.peek32(1), Err(ErrorKind::StackUnderflow));
        assert_eq!(stack.pop32(), Ok(3));
        assert_eq!(stack.pop32(), Err(ErrorKind::StackUnderflow));
    }

    #[test]
    fn test_overflow() {
        let mut stack = Stack::new(8);
        stack.push32(1).unwrap();
        stack.push32(2).unwrap();
        assert_eq!(stack.push32(3), Err(ErrorKind::StackOverflow));
        assert_eq!(stack.sp, 8);
    }

    #[test]
    fn test_roll() {
        let mut stack = stack_with(&[1, 2, 3, 4, 5]);
        stack.roll(5, 1).unwrap();
        assert_eq!(contents(&stack), vec![5, 1, 2, 3, 4]);
        stack.roll(5, -1).unwrap();
        assert_eq!(contents(&stack), vec![1, 2, 3, 4, 5]);
        stack.roll(3, 7).unwrap();
        assert_eq!(contents(&stack), vec![1, 2, 5, 3, 4]);
        stack.roll(0, 3).unwrap();
        assert_eq!(stack.roll(6, 1), Err(ErrorKind::StackUnderflow));
        assert_eq!(stack.roll(-1, 1), Err(ErrorKind::StackUnderflow));
    }

    #[test]
    fn test_copy_and_swap() {
        let mut stack = stack_with(&[1, 2, 3]);
        stack.copy(2).unwrap();
        assert_eq!(contents(&stack), vec![1, 2, 3, 2, 3]);
        stack.swap().unwrap();
        assert_eq!(contents(&stack), vec![1, 2, 3, 3, 2]);
        assert_eq!(stack.copy(6), Err(ErrorKind::StackUnderflow));
    }

    #[test]
    fn test_frame_registers() {
        let mut stack = Stack::new(64);
        stack.write_u32(16, 12).unwrap();
        stack.write_u32(20, 8).unwrap();
        stack.set_frame(16).unwrap();
        assert_eq!((stack.fp, stack.localsbase, stack.valstackbase), (16, 24, 28));
    }

    #[test]
    fn test_frame_header_out_of_range() {
        let mut stack = Stack::new(64);
        stack.write_u32(16, 0xFFFF_FFF8).unwrap();
        stack.write_u32(20, 8).unwrap();
        assert_eq!(stack.set_frame(16), Err(ErrorKind::StackOverflow));
        stack.write_u32(16, 8).unwrap();
        stack.write_u32(20, 12).unwrap();
        assert_eq!(stack.set_frame(16), Err(ErrorKind::StackOverflow));
        assert_eq!(stack.set_frame(0xFFFF_FFFE), Err(ErrorKind::StackOverflow));
        assert_eq!((stack.fp, stack.localsbase, stack.valstackbase), (0, 0, 0));
    }
}
