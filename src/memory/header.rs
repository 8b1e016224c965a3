use crate::exec::{ErrorKind, ExecResult};
use nom::bytes::complete::tag;
use nom::combinator::map;
use nom::number::complete::be_u32;
use nom::sequence::{preceded, tuple};
use nom::IResult;

pub const MAGIC: &[u8; 4] = b"Glul";
pub const HEADER_LEN: usize = 36;
pub const CHECKSUM_OFFSET: usize = 32;

const MIN_VERSION: u32 = 0x0002_0000;
const MAX_VERSION: u32 = 0x0003_01FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub ramstart: u32,
    pub extstart: u32,
    pub endmem: u32,
    pub stack_size: u32,
    pub start_func: u32,
    pub string_table: u32,
    pub checksum: u32,
}

fn header(input: &[u8]) -> IResult<&[u8], Header> {
    map(
        preceded(
            tag(&MAGIC[..]),
            tuple((
                be_u32, be_u32, be_u32, be_u32, be_u32, be_u32, be_u32, be_u32,
            )),
        ),
        |(version, ramstart, extstart, endmem, stack_size, start_func, string_table, checksum)| {
            Header {
                version,
                ramstart,
                extstart,
                endmem,
                stack_size,
                start_func,
                string_table,
                checksum,
            }
        },
    )(input)
}

impl Header {
    pub fn parse(image: &[u8]) -> ExecResult<Header> {
        if !image.starts_with(MAGIC) {
            return Err(ErrorKind::BadMagic);
        }
        let (_, header) =
            header(image).map_err(|_| ErrorKind::BadHeader("image shorter than its header"))?;
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> ExecResult<()> {
        if self.version < MIN_VERSION || self.version > MAX_VERSION {
            return Err(ErrorKind::UnsupportedVersion(self.version));
        }
        if self.ramstart < 0x100 {
            return Err(ErrorKind::BadHeader("RAMSTART below 0x100"));
        }
        if [self.ramstart, self.extstart, self.endmem, self.stack_size]
            .iter()
            .any(|n| n % 256 != 0)
        {
            return Err(ErrorKind::BadHeader(
                "memory boundaries must be multiples of 256",
            ));
        }
        if self.ramstart > self.extstart || self.extstart > self.endmem {
            return Err(ErrorKind::BadHeader("memory boundaries out of order"));
        }
        Ok(())
    }

    pub fn version_triple(&self) -> (u16, u8, u8) {
        (
            (self.version >> 16) as u16,
            (self.version >> 8) as u8,
            self.version as u8,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::words_to_bytes;

    fn raw(words: &[u32]) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.extend(words_to_bytes(words));
        bytes
    }

    #[test]
    fn test_parse() {
        let image = raw(&[0x0003_0101, 0x100, 0x200, 0x300, 0x400, 0x48, 0, 0xCAFE]);
        let header = Header::parse(&image).unwrap();
        assert_eq!(header.ramstart, 0x100);
        assert_eq!(header.start_func, 0x48);
        assert_eq!(header.checksum, 0xCAFE);
        assert_eq!(header.version_triple(), (3, 1, 1));
    }

    #[test]
    fn test_rejects() {
        let mut image = raw(&[0x0003_0101, 0x100, 0x200, 0x300, 0x400, 0x48, 0, 0]);
        image[0] = b'Z';
        assert_eq!(Header::parse(&image), Err(ErrorKind::BadMagic));

        let image = raw(&[0x0003_0101, 0x100, 0x200]);
        assert!(matches!(Header::parse(&image), Err(ErrorKind::BadHeader(_))));

        let image = raw(&[0x0004_0000, 0x100, 0x200, 0x300, 0x400, 0x48, 0, 0]);
        assert_eq!(
            Header::parse(&image),
            Err(ErrorKind::UnsupportedVersion(0x0004_0000))
        );

        let image = raw(&[0x0003_0101, 0x100, 0x280, 0x300, 0x400, 0x48, 0, 0]);
        assert!(matches!(Header::parse(&image), Err(ErrorKind::BadHeader(_))));

        let image = raw(&[0x0003_0101, 0x200, 0x100, 0x300, 0x400, 0x48, 0, 0]);
        assert!(matches!(Header::parse(&image), Err(ErrorKind::BadHeader(_))));
    }
}
