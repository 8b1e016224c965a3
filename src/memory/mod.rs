use std::fmt;
use take_until::TakeUntilExt;

mod header;
mod heap;

pub use header::{Header, CHECKSUM_OFFSET, HEADER_LEN};
pub use heap::Heap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    OutOfRange { addr: u32, len: u32 },
    WriteToRom(u32),
    BadSetMemsize(u32),
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemError::OutOfRange { addr, len } => {
                write!(f, "access of {} bytes at {:#x} is out of range", len, addr)
            }
            MemError::WriteToRom(addr) => write!(f, "write to ROM at {:#x}", addr),
            MemError::BadSetMemsize(size) => write!(f, "invalid memory size {:#x}", size),
        }
    }
}

pub type MemResult<T> = Result<T, MemError>;

pub trait MemoryAccess {
    fn contents(&self) -> &[u8];

    fn slice(&self, addr: u32, len: u32) -> MemResult<&[u8]> {
        let start = addr as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|&end| end <= self.contents().len())
            .ok_or(MemError::OutOfRange { addr, len })?;
        Ok(&self.contents()[start..end])
    }

    fn slice_from(&self, addr: u32) -> MemResult<&[u8]> {
        self.contents()
            .get(addr as usize..)
            .ok_or(MemError::OutOfRange { addr, len: 0 })
    }

    fn read_u8(&self, addr: u32) -> MemResult<u8> {
        Ok(self.slice(addr, 1)?[0])
    }

    fn read_u16(&self, addr: u32) -> MemResult<u16> {
        let b = self.slice(addr, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, addr: u32) -> MemResult<u32> {
        let b = self.slice(addr, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    // zero-extended read of a 1, 2 or 4 byte operand
    fn read_sized(&self, addr: u32, width: u8) -> MemResult<u32> {
        match width {
            1 => self.read_u8(addr).map(u32::from),
            2 => self.read_u16(addr).map(u32::from),
            _ => self.read_u32(addr),
        }
    }

    // bytes up to (not including) the NUL terminator
    fn read_cstring(&self, addr: u32) -> MemResult<Vec<u8>> {
        let mut bytes: Vec<u8> = self
            .slice_from(addr)?
            .iter()
            .copied()
            .take_until(|&b| b == 0)
            .collect();
        match bytes.pop() {
            Some(0) => Ok(bytes),
            _ => Err(MemError::OutOfRange {
                addr,
                len: bytes.len() as u32 + 1,
            }),
        }
    }

    // 32-bit code points up to (not including) the zero terminator
    fn read_unistring(&self, addr: u32) -> MemResult<Vec<u32>> {
        let mut chars: Vec<u32> = self
            .slice_from(addr)?
            .chunks_exact(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .take_until(|&c| c == 0)
            .collect();
        match chars.pop() {
            Some(0) => Ok(chars),
            _ => Err(MemError::OutOfRange {
                addr,
                len: 4 * (chars.len() as u32 + 1),
            }),
        }
    }
}

impl MemoryAccess for [u8] {
    #[inline]
    fn contents(&self) -> &[u8] {
        self
    }
}

// sum of the image as big-endian words, with the checksum field itself counted as zero
pub fn checksum(image: &[u8]) -> u32 {
    image
        .chunks(4)
        .enumerate()
        .filter(|&(ix, _)| ix != CHECKSUM_OFFSET / 4)
        .fold(0u32, |sum, (_, word)| {
            let mut buf = [0u8; 4];
            buf[..word.len()].copy_from_slice(word);
            sum.wrapping_add(u32::from_be_bytes(buf))
        })
}

/// The VM's main memory: ROM, RAM and any extension up to ENDMEM.
///
/// A pristine copy of the story image is kept so that restart and the
/// save-file compressor can see the original contents of RAM.
#[derive(Debug, Clone)]
pub struct Memory {
    memmap: Vec<u8>,
    image: Vec<u8>,
    ramstart: u32,
    extstart: u32,
    endmem: u32,
    protect: Option<(u32, u32)>,
}

impl MemoryAccess for Memory {
    #[inline]
    fn contents(&self) -> &[u8] {
        &self.memmap
    }
}

impl Memory {
    // image must already be truncated to EXTSTART
    pub fn new(image: Vec<u8>, header: &Header) -> Self {
        let mut memmap = image.clone();
        memmap.resize(header.endmem as usize, 0);
        Memory {
            memmap,
            image,
            ramstart: header.ramstart,
            extstart: header.extstart,
            endmem: header.endmem,
            protect: None,
        }
    }

    #[inline]
    pub fn ramstart(&self) -> u32 {
        self.ramstart
    }

    #[inline]
    pub fn extstart(&self) -> u32 {
        self.extstart
    }

    #[inline]
    pub fn endmem(&self) -> u32 {
        self.endmem
    }

    // leading bytes of the story image, as stored in save files
    pub fn image_prefix(&self, len: usize) -> &[u8] {
        &self.image[..len.min(self.image.len())]
    }

    fn writable(&mut self, addr: u32, len: u32) -> MemResult<&mut [u8]> {
        if addr < self.ramstart {
            return Err(MemError::WriteToRom(addr));
        }
        let start = addr as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|&end| end <= self.memmap.len())
            .ok_or(MemError::OutOfRange { addr, len })?;
        Ok(&mut self.memmap[start..end])
    }

    pub fn slice_mut(&mut self, addr: u32, len: u32) -> MemResult<&mut [u8]> {
        self.writable(addr, len)
    }

    pub fn write_u8(&mut self, addr: u32, val: u8) -> MemResult<()> {
        self.writable(addr, 1)?[0] = val;
        Ok(())
    }

    pub fn write_u16(&mut self, addr: u32, val: u16) -> MemResult<()> {
        self.writable(addr, 2)?.copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, addr: u32, val: u32) -> MemResult<()> {
        self.writable(addr, 4)?.copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    // stores the low `width` bytes of val
    pub fn write_sized(&mut self, addr: u32, val: u32, width: u8) -> MemResult<()> {
        match width {
            1 => self.write_u8(addr, val as u8),
            2 => self.write_u16(addr, val as u16),
            _ => self.write_u32(addr, val),
        }
    }

    pub fn fill_zero(&mut self, addr: u32, len: u32) -> MemResult<()> {
        for b in self.writable(addr, len)? {
            *b = 0;
        }
        Ok(())
    }

    // overlapping ranges behave like memmove
    pub fn copy_within(&mut self, src: u32, dst: u32, len: u32) -> MemResult<()> {
        self.slice(src, len)?;
        self.writable(dst, len)?;
        let src = src as usize;
        self.memmap
            .copy_within(src..src + len as usize, dst as usize);
        Ok(())
    }

    pub fn set_memsize(&mut self, newend: u32) -> MemResult<()> {
        if newend < self.extstart || newend % 256 != 0 {
            return Err(MemError::BadSetMemsize(newend));
        }
        self.memmap.resize(newend as usize, 0);
        self.endmem = newend;
        Ok(())
    }

    pub fn set_protect(&mut self, start: u32, len: u32) {
        self.protect = if len == 0 {
            None
        } else {
            Some((start, start.saturating_add(len)))
        };
    }

    fn protected_bytes(&self) -> Option<(u32, Vec<u8>)> {
        let (start, end) = self.protect?;
        let start = start.max(self.ramstart);
        let end = end.min(self.endmem);
        if start >= end {
            return None;
        }
        Some((start, self.memmap[start as usize..end as usize].to_vec()))
    }

    fn put_protected(&mut self, saved: Option<(u32, Vec<u8>)>) {
        if let Some((start, bytes)) = saved {
            let start = start as usize;
            let end = (start + bytes.len()).min(self.memmap.len());
            if start < end {
                self.memmap[start..end].copy_from_slice(&bytes[..end - start]);
            }
        }
    }

    /// Restores RAM to the story image and zeroes everything past EXTSTART.
    /// ENDMEM and the protected range are left alone.
    pub fn reset(&mut self) {
        let saved = self.protected_bytes();
        let extstart = self.extstart as usize;
        self.memmap[..extstart].copy_from_slice(&self.image);
        for b in &mut self.memmap[extstart..] {
            *b = 0;
        }
        self.put_protected(saved);
    }

    pub fn verify(&self) -> bool {
        let stored = self.image[..].read_u32(CHECKSUM_OFFSET as u32).unwrap_or(0);
        checksum(&self.image) == stored
    }

    /// Current contents of [RAMSTART, ENDMEM).
    pub fn ram(&self) -> &[u8] {
        &self.memmap[self.ramstart as usize..]
    }

    /// What [RAMSTART, end) looked like at load time, zero past EXTSTART.
    pub fn original_ram(&self, end: u32) -> Vec<u8> {
        let mut ram = self
            .image
            .get(self.ramstart as usize..)
            .unwrap_or(&[])
            .to_vec();
        ram.resize(end.saturating_sub(self.ramstart) as usize, 0);
        ram
    }

    /// Resizes memory to `endmem` and replaces RAM wholesale, keeping the protected range.
    pub fn load_ram(&mut self, endmem: u32, ram: &[u8]) -> MemResult<()> {
        if ram.len() as u64 + self.ramstart as u64 != endmem as u64 {
            return Err(MemError::OutOfRange {
                addr: self.ramstart,
                len: ram.len() as u32,
            });
        }
        let saved = self.protected_bytes();
        self.set_memsize(endmem)?;
        let ramstart = self.ramstart as usize;
        self.memmap[ramstart..].copy_from_slice(ram);
        self.put_protected(saved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            version: 0x0003_0101,
            ramstart: 0x100,
            extstart: 0x200,
            endmem: 0x300,
            stack_size: 0x100,
            start_func: 0x40,
            string_table: 0,
            checksum: 0,
        }
    }

    fn memory() -> Memory {
        let mut image = vec![0u8; 0x200];
        image[..4].copy_from_slice(b"Glul");
        image[0x100] = 0xAB;
        let sum = checksum(&image);
        image[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_be_bytes());
        Memory::new(image, &header())
    }

    #[test]
    fn test_read_write() {
        let mut mem = memory();
        assert_eq!(mem.read_u8(0x100), Ok(0xAB));
        mem.write_u32(0x104, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read_u32(0x104), Ok(0xDEAD_BEEF));
        assert_eq!(mem.read_u16(0x106), Ok(0xBEEF));
        assert_eq!(mem.read_sized(0x107, 1), Ok(0xEF));
        mem.write_sized(0x108, 0x1234_5678, 2).unwrap();
        assert_eq!(mem.read_u16(0x108), Ok(0x5678));
        assert_eq!(mem.write_u8(0xFF, 1), Err(MemError::WriteToRom(0xFF)));
    }

    #[test]
    fn test_bounds() {
        let mut mem = memory();
        assert!(mem.read_u32(0x2FC).is_ok());
        assert_eq!(
            mem.write_u32(0x2FD, 0x1234_5678),
            Err(MemError::OutOfRange { addr: 0x2FD, len: 4 })
        );
        assert!(mem.read_u8(0x300).is_err());
        assert_eq!(mem.slice_from(0x300).map(|s| s.len()), Ok(0));
    }

    #[test]
    fn test_set_memsize() {
        let mut mem = memory();
        assert_eq!(mem.set_memsize(0x1FF), Err(MemError::BadSetMemsize(0x1FF)));
        assert_eq!(mem.set_memsize(0x100), Err(MemError::BadSetMemsize(0x100)));
        mem.write_u8(0x2FF, 9).unwrap();
        mem.set_memsize(0x200).unwrap();
        assert!(mem.read_u8(0x200).is_err());
        mem.set_memsize(0x400).unwrap();
        assert_eq!(mem.endmem(), 0x400);
        // regrown memory is zeroed
        assert_eq!(mem.read_u8(0x2FF), Ok(0));
    }

    #[test]
    fn test_reset_keeps_protected_range() {
        let mut mem = memory();
        mem.write_u8(0x100, 1).unwrap();
        mem.write_u8(0x110, 2).unwrap();
        mem.write_u8(0x250, 3).unwrap();
        mem.set_protect(0x110, 4);
        mem.set_memsize(0x400).unwrap();
        mem.reset();
        assert_eq!(mem.endmem(), 0x400);
        assert_eq!(mem.read_u8(0x100), Ok(0xAB));
        assert_eq!(mem.read_u8(0x110), Ok(2));
        assert_eq!(mem.read_u8(0x250), Ok(0));
    }

    #[test]
    fn test_verify() {
        let mut mem = memory();
        assert!(mem.verify());
        mem.image[0x150] ^= 1;
        assert!(!mem.verify());
    }

    #[test]
    fn test_strings() {
        let mut mem = memory();
        mem.slice_mut(0x120, 4).unwrap().copy_from_slice(b"hi\0x");
        assert_eq!(mem.read_cstring(0x120), Ok(b"hi".to_vec()));
        mem.write_u32(0x130, 0x263A).unwrap();
        mem.write_u32(0x134, 0).unwrap();
        assert_eq!(mem.read_unistring(0x130), Ok(vec![0x263A]));
        mem.slice_mut(0x2FE, 2).unwrap().copy_from_slice(b"ab");
        assert!(mem.read_cstring(0x2FE).is_err());
    }

    #[test]
    fn test_copy_and_zero() {
        let mut mem = memory();
        mem.slice_mut(0x140, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        mem.copy_within(0x140, 0x142, 4).unwrap();
        assert_eq!(mem.slice(0x140, 6).unwrap(), &[1, 2, 1, 2, 3, 4]);
        mem.fill_zero(0x141, 2).unwrap();
        assert_eq!(mem.slice(0x140, 4).unwrap(), &[1, 0, 0, 2]);
        // ROM may be read but not written
        assert!(mem.copy_within(0x0, 0x150, 4).is_ok());
        assert!(mem.copy_within(0x150, 0x0, 4).is_err());
    }

    #[test]
    fn test_load_ram() {
        let mut mem = memory();
        mem.set_protect(0x100, 1);
        let ram = vec![7u8; 0x300];
        mem.load_ram(0x400, &ram).unwrap();
        assert_eq!(mem.endmem(), 0x400);
        assert_eq!(mem.read_u8(0x100), Ok(0xAB));
        assert_eq!(mem.read_u8(0x3FF), Ok(7));
        assert!(mem.load_ram(0x400, &ram[1..]).is_err());
        let original = mem.original_ram(0x300);
        assert_eq!(original.len(), 0x200);
        assert_eq!(original[0], 0xAB);
    }
}
