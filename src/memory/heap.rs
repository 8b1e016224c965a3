use super::Memory;
use crate::exec::{ErrorKind, ExecResult};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    addr: u32,
    len: u32,
    free: bool,
}

/// Allocator for @malloc/@mfree. Blocks live in memory past the old
/// ENDMEM; the bookkeeping is kept here rather than in VM memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heap {
    start: u32,
    // sorted by address, contiguous from `start` to ENDMEM
    blocks: Vec<Block>,
}

impl Heap {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.start != 0
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.blocks.clear();
    }

    // returns 0 on failure
    pub fn alloc(&mut self, mem: &mut Memory, len: u32) -> u32 {
        if len == 0 {
            return 0;
        }
        let len = match len.checked_add(3) {
            Some(n) => n & !3,
            None => return 0,
        };
        loop {
            if let Some(ix) = self.blocks.iter().position(|b| b.free && b.len >= len) {
                let block = self.blocks[ix];
                if block.len > len {
                    self.blocks.insert(
                        ix + 1,
                        Block {
                            addr: block.addr + len,
                            len: block.len - len,
                            free: true,
                        },
                    );
                }
                self.blocks[ix] = Block {
                    addr: block.addr,
                    len,
                    free: false,
                };
                debug!("malloc {:#x} bytes at {:#x}", len, block.addr);
                return block.addr;
            }
            if !self.grow(mem, len) {
                return 0;
            }
        }
    }

    fn grow(&mut self, mem: &mut Memory, len: u32) -> bool {
        let old_end = mem.endmem();
        let heap_size = if self.is_active() {
            old_end - self.start
        } else {
            0
        };
        let extension = match len.max(heap_size).max(256).checked_add(0xFF) {
            Some(n) => n & !0xFF,
            None => return false,
        };
        let new_end = match old_end.checked_add(extension) {
            Some(n) => n,
            None => return false,
        };
        if mem.set_memsize(new_end).is_err() {
            return false;
        }
        if !self.is_active() {
            self.start = old_end;
            debug!("heap activated at {:#x}", old_end);
        }
        match self.blocks.last_mut() {
            Some(last) if last.free => last.len += extension,
            _ => self.blocks.push(Block {
                addr: old_end,
                len: extension,
                free: true,
            }),
        }
        true
    }

    pub fn free(&mut self, mem: &mut Memory, addr: u32) -> ExecResult<()> {
        let ix = self
            .blocks
            .iter()
            .position(|b| !b.free && b.addr == addr)
            .ok_or(ErrorKind::HeapCorrupt(addr))?;
        self.blocks[ix].free = true;
        if ix + 1 < self.blocks.len() && self.blocks[ix + 1].free {
            self.blocks[ix].len += self.blocks[ix + 1].len;
            self.blocks.remove(ix + 1);
        }
        if ix > 0 && self.blocks[ix - 1].free {
            self.blocks[ix - 1].len += self.blocks[ix].len;
            self.blocks.remove(ix);
        }
        debug!("mfree {:#x}", addr);
        if self.blocks.iter().all(|b| b.free) {
            let start = self.start;
            self.clear();
            mem.set_memsize(start)?;
            debug!("heap released, memory back to {:#x}", start);
        }
        Ok(())
    }

    /// Heap start, block count, then (addr, len) per allocated block.
    pub fn summary(&self) -> Option<Vec<u32>> {
        if !self.is_active() {
            return None;
        }
        let used: Vec<&Block> = self.blocks.iter().filter(|b| !b.free).collect();
        let mut summary = vec![self.start, used.len() as u32];
        for block in used {
            summary.push(block.addr);
            summary.push(block.len);
        }
        Some(summary)
    }

    /// Rebuilds a heap from a summary, filling gaps with free blocks up to `endmem`.
    pub fn from_summary(summary: &[u32], endmem: u32) -> Option<Heap> {
        let (&start, rest) = summary.split_first()?;
        let (&count, pairs) = rest.split_first()?;
        if pairs.len() != 2 * count as usize || start == 0 || start > endmem {
            return None;
        }
        let mut used: Vec<(u32, u32)> = pairs.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        used.sort_unstable();
        let mut blocks = Vec::with_capacity(2 * used.len() + 1);
        let mut pos = start;
        for (addr, len) in used {
            if addr < pos || len == 0 || addr.checked_add(len)? > endmem {
                return None;
            }
            if addr > pos {
                blocks.push(Block {
                    addr: pos,
                    len: addr - pos,
                    free: true,
                });
            }
            blocks.push(Block {
                addr,
                len,
                free: false,
            });
            pos = addr + len;
        }
        if pos < endmem {
            blocks.push(Block {
                addr: pos,
                len: endmem - pos,
                free: true,
            });
        }
        if blocks.iter().all(|b| b.free) {
            return Some(Heap::default());
        }
        Some(Heap { start, blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Header, MemoryAccess};

    fn memory() -> Memory {
        let header = Header {
            version: 0x0003_0101,
            ramstart: 0x100,
            extstart: 0x200,
            endmem: 0x400,
            stack_size: 0x100,
            start_func: 0x40,
            string_table: 0,
            checksum: 0,
        };
        Memory::new(vec![0; 0x200], &header)
    }

    #[test]
    fn test_alloc_grows_memory() {
        let mut mem = memory();
        let mut heap = Heap::default();
        let a = heap.alloc(&mut mem, 10);
        assert_eq!(a, 0x400);
        assert_eq!(heap.start(), 0x400);
        assert_eq!(mem.endmem(), 0x500);
        let b = heap.alloc(&mut mem, 20);
        assert_eq!(b, 0x40C);
        assert!(mem.write_u32(b + 16, 1).is_ok());
        assert_eq!(heap.alloc(&mut mem, 0), 0);
    }

    #[test]
    fn test_free_reuses_and_releases() {
        let mut mem = memory();
        let mut heap = Heap::default();
        let a = heap.alloc(&mut mem, 16);
        let b = heap.alloc(&mut mem, 16);
        heap.free(&mut mem, a).unwrap();
        assert_eq!(heap.alloc(&mut mem, 8), a);
        assert_eq!(
            heap.free(&mut mem, a + 4),
            Err(ErrorKind::HeapCorrupt(a + 4))
        );
        heap.free(&mut mem, a).unwrap();
        heap.free(&mut mem, b).unwrap();
        assert!(!heap.is_active());
        assert_eq!(mem.endmem(), 0x400);
        assert!(mem.read_u8(0x400).is_err());
    }

    #[test]
    fn test_large_alloc() {
        let mut mem = memory();
        let mut heap = Heap::default();
        let a = heap.alloc(&mut mem, 0x1234);
        assert_eq!(a, 0x400);
        assert_eq!(mem.endmem(), 0x400 + 0x1300);
    }

    #[test]
    fn test_summary() {
        let mut mem = memory();
        let mut heap = Heap::default();
        assert_eq!(heap.summary(), None);
        let a = heap.alloc(&mut mem, 8);
        let b = heap.alloc(&mut mem, 8);
        heap.free(&mut mem, a).unwrap();
        let summary = heap.summary().unwrap();
        assert_eq!(summary, vec![0x400, 1, b, 8]);
        let rebuilt = Heap::from_summary(&summary, mem.endmem()).unwrap();
        assert_eq!(rebuilt, heap);
        assert_eq!(Heap::from_summary(&[0x400, 2, b, 8], 0x500), None);
        assert_eq!(Heap::from_summary(&[0x400, 1, 0x4FC, 8], 0x500), None);
    }
}
