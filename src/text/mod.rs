use crate::exec::{ErrorKind, ExecResult};
use crate::memory::{MemError, MemoryAccess};

pub mod parse;

/// Encoding of a string object, from its leading type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrKind {
    Latin1,
    Compressed,
    Unicode,
}

impl StrKind {
    pub fn from_type(ty: u8) -> ExecResult<Self> {
        match ty {
            0xE0 => Ok(StrKind::Latin1),
            0xE1 => Ok(StrKind::Compressed),
            0xE2 => Ok(StrKind::Unicode),
            _ => Err(ErrorKind::BadStringType(ty)),
        }
    }

    // distance from the type byte to the first character
    pub fn data_offset(self) -> u32 {
        match self {
            StrKind::Latin1 | StrKind::Compressed => 1,
            StrKind::Unicode => 4,
        }
    }
}

/// A node of the compressed-string decoding tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Branch {
        left: u32,
        right: u32,
    },
    End,
    Char(u8),
    // inline strings hold the address of their first character
    CString(u32),
    UniChar(u32),
    UniString(u32),
    Indirect {
        target: u32,
        double: bool,
        // argument count and the address of the first argument
        args: Option<(u32, u32)>,
    },
}

pub fn read_node<M: MemoryAccess + ?Sized>(mem: &M, addr: u32) -> ExecResult<Node> {
    let ty = mem.read_u8(addr)?;
    match parse::node(addr)(mem.slice_from(addr)?) {
        Ok((_, node)) => Ok(node),
        Err(nom::Err::Failure(_)) => Err(ErrorKind::BadStringNode(ty)),
        Err(_) => Err(MemError::OutOfRange { addr, len: 9 }.into()),
    }
}

pub fn table_root<M: MemoryAccess + ?Sized>(mem: &M, table: u32) -> ExecResult<u32> {
    if table == 0 {
        return Err(ErrorKind::NoStringTable);
    }
    let (_, (_, _, root)) = parse::table_header(mem.slice_from(table)?)
        .map_err(|_| MemError::OutOfRange { addr: table, len: 12 })?;
    Ok(root)
}

// follows a double-indirect reference to the object it names
pub fn resolve_indirect<M: MemoryAccess + ?Sized>(
    mem: &M,
    target: u32,
    double: bool,
) -> ExecResult<u32> {
    if double {
        Ok(mem.read_u32(target)?)
    } else {
        Ok(target)
    }
}

/// Position within a compressed string, bits read least significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitCursor {
    pub addr: u32,
    pub bit: u32,
}

impl BitCursor {
    pub fn new(addr: u32, bit: u32) -> Self {
        BitCursor { addr, bit }
    }

    pub fn next_bit<M: MemoryAccess + ?Sized>(&mut self, mem: &M) -> ExecResult<bool> {
        let byte = mem.read_u8(self.addr)?;
        let set = (byte >> self.bit) & 1 == 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.addr += 1;
        }
        Ok(set)
    }

    /// Walks the tree from `root` to the next leaf.
    pub fn decode<M: MemoryAccess + ?Sized>(&mut self, mem: &M, root: u32) -> ExecResult<Node> {
        let mut node = read_node(mem, root)?;
        while let Node::Branch { left, right } = node {
            node = read_node(mem, if self.next_bit(mem)? { right } else { left })?;
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes() {
        let mem: &[u8] = &[
            0x00, 0, 0, 0, 0x10, 0, 0, 0, 0x20, // branch
            0x02, b'x', // char
            0x03, b'h', b'i', 0, // cstring
            0x0A, 0, 0, 0x12, 0x34, 0, 0, 0, 2, 0, 0, 0, 7, 0, 0, 0, 8, // indirect with args
            0x07,
        ];
        assert_eq!(
            read_node(mem, 0),
            Ok(Node::Branch {
                left: 0x10,
                right: 0x20
            })
        );
        assert_eq!(read_node(mem, 9), Ok(Node::Char(b'x')));
        assert_eq!(read_node(mem, 11), Ok(Node::CString(12)));
        assert_eq!(
            read_node(mem, 15),
            Ok(Node::Indirect {
                target: 0x1234,
                double: false,
                args: Some((2, 24)),
            })
        );
        assert_eq!(mem.read_u32(24), Ok(7));
        assert_eq!(read_node(mem, 32), Err(ErrorKind::BadStringNode(7)));
        assert!(matches!(read_node(mem, 31), Err(ErrorKind::MemoryOutOfRange { .. })));
    }

    #[test]
    fn test_decode_bits() {
        // root(0) -> left: 'a' at 9, right: branch(11) -> 'b' at 20 / end at 22
        let mem: &[u8] = &[
            0x00, 0, 0, 0, 9, 0, 0, 0, 11, // root
            0x02, b'a', //
            0x00, 0, 0, 0, 20, 0, 0, 0, 22, //
            0x02, b'b', //
            0x01, //
            0b0001_1010, // a, b, end: bits 0, 1 0, 1 1
        ];
        let mut cursor = BitCursor::new(23, 0);
        assert_eq!(cursor.decode(mem, 0), Ok(Node::Char(b'a')));
        assert_eq!(cursor.decode(mem, 0), Ok(Node::Char(b'b')));
        assert_eq!(cursor.decode(mem, 0), Ok(Node::End));
        assert_eq!(cursor, BitCursor::new(23, 5));
    }

    #[test]
    fn test_table_root() {
        let mem: &[u8] = &[0, 0, 0, 20, 0, 0, 0, 3, 0, 0, 0, 12];
        assert_eq!(table_root(mem, 0), Err(ErrorKind::NoStringTable));
        assert!(table_root(mem, 4).is_err());
        assert_eq!(StrKind::from_type(0xE3), Err(ErrorKind::BadStringType(0xE3)));
    }
}
