use super::*;

use nom::{
    combinator::map,
    error::{Error, ErrorKind as NomErrorKind},
    number::complete::{be_u32, be_u8},
    sequence::pair,
    IResult,
};

// `addr` is where the node starts, needed for the inline string nodes
pub fn node<'a>(addr: u32) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Node> {
    move |input: &'a [u8]| {
        let (rest, ty) = be_u8(input)?;
        match ty {
            0x00 => map(pair(be_u32, be_u32), |(left, right)| Node::Branch { left, right })(rest),
            0x01 => Ok((rest, Node::End)),
            0x02 => map(be_u8, Node::Char)(rest),
            0x03 => Ok((rest, Node::CString(addr + 1))),
            0x04 => map(be_u32, Node::UniChar)(rest),
            0x05 => Ok((rest, Node::UniString(addr + 1))),
            0x08 | 0x09 => map(be_u32, |target| Node::Indirect {
                target,
                double: ty == 0x09,
                args: None,
            })(rest),
            0x0A | 0x0B => map(pair(be_u32, be_u32), |(target, count)| Node::Indirect {
                target,
                double: ty == 0x0B,
                args: Some((count, addr + 9)),
            })(rest),
            _ => Err(nom::Err::Failure(Error::new(input, NomErrorKind::Switch))),
        }
    }
}

// [length, node count, root]
pub fn table_header(input: &[u8]) -> IResult<&[u8], (u32, u32, u32)> {
    nom::sequence::tuple((be_u32, be_u32, be_u32))(input)
}
