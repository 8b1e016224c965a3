use super::{ErrorKind, ExecResult};
use crate::memory::{Memory, MemoryAccess};

pub const KEY_INDIRECT: u32 = 0x01;
pub const ZERO_KEY_TERMINATES: u32 = 0x02;
pub const RETURN_INDEX: u32 = 0x04;

/// The search key as bytes, compared big-endian against each candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    bytes: Vec<u8>,
    options: u32,
}

impl Key {
    pub fn new(mem: &Memory, key: u32, keysize: u32, options: u32) -> ExecResult<Key> {
        let bytes = if options & KEY_INDIRECT != 0 {
            mem.slice(key, keysize)?.to_vec()
        } else {
            match keysize {
                1 => vec![key as u8],
                2 => (key as u16).to_be_bytes().to_vec(),
                4 => key.to_be_bytes().to_vec(),
                _ => return Err(ErrorKind::BadSearchOptions(options)),
            }
        };
        Ok(Key { bytes, options })
    }

    #[inline]
    fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    #[inline]
    fn has(&self, flag: u32) -> bool {
        self.options & flag != 0
    }

    fn not_found(&self) -> u32 {
        if self.has(RETURN_INDEX) {
            0xFFFF_FFFF
        } else {
            0
        }
    }

    fn found(&self, addr: u32, index: u32) -> u32 {
        if self.has(RETURN_INDEX) {
            index
        } else {
            addr
        }
    }
}

fn is_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

// a negative numstructs searches until the zero key or the end of memory
pub fn linear(
    mem: &Memory,
    key: &Key,
    start: u32,
    structsize: u32,
    numstructs: u32,
    keyoffset: u32,
) -> ExecResult<u32> {
    let unbounded = (numstructs as i32) < 0;
    let mut index = 0u32;
    while unbounded || index < numstructs {
        let addr = start.wrapping_add(index.wrapping_mul(structsize));
        let candidate = mem.slice(addr.wrapping_add(keyoffset), key.size())?;
        if candidate == &key.bytes[..] {
            return Ok(key.found(addr, index));
        }
        if key.has(ZERO_KEY_TERMINATES) && is_zero(candidate) {
            break;
        }
        index += 1;
    }
    Ok(key.not_found())
}

pub fn binary(
    mem: &Memory,
    key: &Key,
    start: u32,
    structsize: u32,
    numstructs: u32,
    keyoffset: u32,
) -> ExecResult<u32> {
    if key.has(ZERO_KEY_TERMINATES) {
        return Err(ErrorKind::BadSearchOptions(key.options));
    }
    let (mut lo, mut hi) = (0u32, numstructs);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let addr = start.wrapping_add(mid.wrapping_mul(structsize));
        let candidate = mem.slice(addr.wrapping_add(keyoffset), key.size())?;
        match candidate.cmp(&key.bytes[..]) {
            std::cmp::Ordering::Equal => return Ok(key.found(addr, mid)),
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
        }
    }
    Ok(key.not_found())
}

pub fn linked(
    mem: &Memory,
    key: &Key,
    start: u32,
    keyoffset: u32,
    nextoffset: u32,
) -> ExecResult<u32> {
    if key.has(RETURN_INDEX) {
        return Err(ErrorKind::BadSearchOptions(key.options));
    }
    let mut addr = start;
    while addr != 0 {
        let candidate = mem.slice(addr.wrapping_add(keyoffset), key.size())?;
        if candidate == &key.bytes[..] {
            return Ok(addr);
        }
        if key.has(ZERO_KEY_TERMINATES) && is_zero(candidate) {
            break;
        }
        addr = mem.read_u32(addr.wrapping_add(nextoffset))?;
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Header;

    const TABLE: u32 = 0x200;

    // 16 structs of 8 bytes, keys 0, 10, .. 150 in the first word, index in the second
    fn memory() -> Memory {
        let header = Header {
            version: 0x0003_0100,
            ramstart: 0x100,
            extstart: 0x400,
            endmem: 0x400,
            stack_size: 0x100,
            start_func: 0,
            string_table: 0,
            checksum: 0,
        };
        let mut mem = Memory::new(vec![0; 0x400], &header);
        for ix in 0..16 {
            let addr = TABLE + 8 * ix;
            mem.write_u32(addr, 10 * ix).unwrap();
            mem.write_u32(addr + 4, ix).unwrap();
        }
        mem
    }

    #[test]
    fn test_binary() {
        let mem = memory();
        let key = Key::new(&mem, 70, 4, 0).unwrap();
        assert_eq!(binary(&mem, &key, TABLE, 8, 16, 0), Ok(TABLE + 56));
        let key = Key::new(&mem, 71, 4, RETURN_INDEX).unwrap();
        assert_eq!(binary(&mem, &key, TABLE, 8, 16, 0), Ok(0xFFFF_FFFF));
        let key = Key::new(&mem, 150, 4, RETURN_INDEX).unwrap();
        assert_eq!(binary(&mem, &key, TABLE, 8, 16, 0), Ok(15));
        let key = Key::new(&mem, 0, 4, ZERO_KEY_TERMINATES).unwrap();
        assert_eq!(
            binary(&mem, &key, TABLE, 8, 16, 0),
            Err(ErrorKind::BadSearchOptions(ZERO_KEY_TERMINATES))
        );
    }

    #[test]
    fn test_linear() {
        let mem = memory();
        let key = Key::new(&mem, 30, 4, 0).unwrap();
        assert_eq!(linear(&mem, &key, TABLE, 8, 16, 0), Ok(TABLE + 24));
        let key = Key::new(&mem, 3, 4, RETURN_INDEX).unwrap();
        assert_eq!(linear(&mem, &key, TABLE, 8, 16, 4), Ok(3));
        let key = Key::new(&mem, 35, 4, 0).unwrap();
        assert_eq!(linear(&mem, &key, TABLE, 8, 16, 0), Ok(0));
        // the first struct has a zero key
        let key = Key::new(&mem, 30, 4, ZERO_KEY_TERMINATES).unwrap();
        assert_eq!(linear(&mem, &key, TABLE, 8, 16, 0), Ok(0));
        // unbounded, stopped by the zero key past the table
        let key = Key::new(&mem, 99, 4, ZERO_KEY_TERMINATES | RETURN_INDEX).unwrap();
        assert_eq!(linear(&mem, &key, TABLE + 8, 8, 0xFFFF_FFFF, 4), Ok(0xFFFF_FFFF));
    }

    #[test]
    fn test_short_and_indirect_keys() {
        let mut mem = memory();
        // low byte of the key 120 at offset 3
        let key = Key::new(&mem, 120, 1, RETURN_INDEX).unwrap();
        assert_eq!(linear(&mem, &key, TABLE, 8, 16, 3), Ok(12));
        mem.write_u32(0x300, 90).unwrap();
        let key = Key::new(&mem, 0x300, 4, KEY_INDIRECT).unwrap();
        assert_eq!(binary(&mem, &key, TABLE, 8, 16, 0), Ok(TABLE + 72));
        assert_eq!(
            Key::new(&mem, 1, 3, 0),
            Err(ErrorKind::BadSearchOptions(0))
        );
    }

    #[test]
    fn test_linked() {
        let mut mem = memory();
        // chain 0x300 -> 0x310 -> 0x320 -> end, key at offset 4
        for (ix, addr) in [0x300u32, 0x310, 0x320].iter().enumerate() {
            let next = if ix < 2 { addr + 0x10 } else { 0 };
            mem.write_u32(*addr, next).unwrap();
            mem.write_u32(addr + 4, 100 + ix as u32).unwrap();
        }
        let key = Key::new(&mem, 102, 4, 0).unwrap();
        assert_eq!(linked(&mem, &key, 0x300, 4, 0), Ok(0x320));
        let key = Key::new(&mem, 103, 4, 0).unwrap();
        assert_eq!(linked(&mem, &key, 0x300, 4, 0), Ok(0));
        let key = Key::new(&mem, 102, 4, RETURN_INDEX).unwrap();
        assert_eq!(
            linked(&mem, &key, 0x300, 4, 0),
            Err(ErrorKind::BadSearchOptions(RETURN_INDEX))
        );
    }
}
