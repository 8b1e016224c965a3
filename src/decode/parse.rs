use super::*;

use nom::{
    combinator::{map, peek},
    error::{Error, ErrorKind},
    multi::count,
    number::complete::{be_i16, be_i8, be_u16, be_u32, be_u8},
    IResult,
};

/// Decodes the instruction at the start of `input`, returning it with its length in bytes.
pub fn decode_instr(input: &[u8]) -> DecodeResult<(Instr, usize)> {
    let (rest, opcode) = opcode(input).map_err(|_| DecodeError::Truncated)?;
    let list = operand_list(opcode).ok_or(DecodeError::BadOpcode(opcode))?;
    let (mut rest, modes) =
        modes(list.kinds.len())(rest).map_err(|_| DecodeError::Truncated)?;
    let mut operands = ArrayVec::new();
    for (&kind, &mode) in list.kinds.iter().zip(modes.iter()) {
        check_mode(kind, mode)?;
        let (next, op) = operand(kind, mode)(rest).map_err(|_| DecodeError::Truncated)?;
        operands.push(op);
        rest = next;
    }
    let instr = Instr {
        opcode,
        width: list.width,
        operands,
    };
    Ok((instr, input.len() - rest.len()))
}

fn opcode(input: &[u8]) -> IResult<&[u8], u32> {
    let (_, first) = peek(be_u8)(input)?;
    match first >> 6 {
        0b11 => map(be_u32, |n| n & 0x3FFF_FFFF)(input),
        0b10 => map(be_u16, |n| u32::from(n & 0x7FFF))(input),
        _ => map(be_u8, u32::from)(input),
    }
}

// one nibble per operand, low nibble first
fn modes<'a>(n: usize) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], ArrayVec<[u8; 8]>> {
    map(count(be_u8, (n + 1) / 2), move |bytes: Vec<u8>| {
        bytes
            .iter()
            .flat_map(|&b| ArrayVec::from([b & 0x0F, b >> 4]))
            .take(n)
            .collect()
    })
}

fn check_mode(kind: OperandKind, mode: u8) -> DecodeResult<()> {
    match (kind, mode) {
        (_, 4) | (_, 12) | (OperandKind::Store, 1..=3) => Err(DecodeError::BadOperandMode(mode)),
        _ => Ok(()),
    }
}

// modes 5, 9 and 13 take a 1-byte address; 6, 10, 14 take 2; 7, 11, 15 take 4
fn address<'a>(mode: u8) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], u32> {
    move |input: &'a [u8]| match mode & 3 {
        1 => map(be_u8, u32::from)(input),
        2 => map(be_u16, u32::from)(input),
        _ => be_u32(input),
    }
}

fn operand<'a>(kind: OperandKind, mode: u8) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Operand> {
    use OperandKind::{Load, Store};
    move |input: &'a [u8]| match (kind, mode) {
        (Load, 0) => Ok((input, Operand::Load(Source::Const(0)))),
        (Load, 1) => map(be_i8, |n| Operand::Load(Source::Const(n as i32 as u32)))(input),
        (Load, 2) => map(be_i16, |n| Operand::Load(Source::Const(n as i32 as u32)))(input),
        (Load, 3) => map(be_u32, |n| Operand::Load(Source::Const(n)))(input),
        (Store, 0) => Ok((input, Operand::Store(Target::Discard))),
        (Load, 8) => Ok((input, Operand::Load(Source::Stack))),
        (Store, 8) => Ok((input, Operand::Store(Target::Stack))),
        (Load, 5..=7) => map(address(mode), |a| Operand::Load(Source::Mem(a)))(input),
        (Store, 5..=7) => map(address(mode), |a| Operand::Store(Target::Mem(a)))(input),
        (Load, 9..=11) => map(address(mode), |a| Operand::Load(Source::Local(a)))(input),
        (Store, 9..=11) => map(address(mode), |a| Operand::Store(Target::Local(a)))(input),
        (Load, 13..=15) => map(address(mode), |a| Operand::Load(Source::Ram(a)))(input),
        (Store, 13..=15) => map(address(mode), |a| Operand::Store(Target::Ram(a)))(input),
        _ => Err(nom::Err::Failure(Error::new(input, ErrorKind::Verify))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_instr() {
        // add 7, 8 -> sp
        let (instr, len) = decode_instr(&[0x10, 0x11, 0x08, 0x07, 0x08, 0xFF]).unwrap();
        assert_eq!(len, 5);
        assert_eq!(instr.opcode, opcode::arith::ADD);
        assert_eq!(
            instr.operands.as_slice(),
            &[
                Operand::Load(Source::Const(7)),
                Operand::Load(Source::Const(8)),
                Operand::Store(Target::Stack),
            ]
        );
    }

    #[test]
    fn test_long_opcodes() {
        // glk 0, 0 -> discard, as 2 and 4 byte opcodes
        let (instr, len) = decode_instr(&[0x81, 0x30, 0x00, 0x00]).unwrap();
        assert_eq!((instr.opcode, len), (opcode::misc::GLK, 4));
        let (instr, len) = decode_instr(&[0xC0, 0x00, 0x01, 0x30, 0x00, 0x00]).unwrap();
        assert_eq!((instr.opcode, len), (opcode::misc::GLK, 6));
    }

    #[test]
    fn test_operand_sizes() {
        // copy -2 (i16) -> ram+0x10
        let (instr, len) = decode_instr(&[0x40, 0xD2, 0xFF, 0xFE, 0x10]).unwrap();
        assert_eq!(len, 5);
        assert_eq!(
            instr.operands.as_slice(),
            &[
                Operand::Load(Source::Const(0xFFFF_FFFE)),
                Operand::Store(Target::Ram(0x10)),
            ]
        );
        // copys local[0x104] -> mem[0x12345678]
        let (instr, len) =
            decode_instr(&[0x41, 0x7A, 0x01, 0x04, 0x12, 0x34, 0x56, 0x78]).unwrap();
        assert_eq!(len, 8);
        assert_eq!(instr.width, 2);
        assert_eq!(
            instr.operands.as_slice(),
            &[
                Operand::Load(Source::Local(0x104)),
                Operand::Store(Target::Mem(0x1234_5678)),
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(decode_instr(&[0x01, 0x00]).unwrap_err(), DecodeError::BadOpcode(1));
        // store operand in an immediate mode
        assert_eq!(
            decode_instr(&[0x40, 0x10, 0x05, 0x00]).unwrap_err(),
            DecodeError::BadOperandMode(1)
        );
        assert_eq!(
            decode_instr(&[0x31, 0x04]).unwrap_err(),
            DecodeError::BadOperandMode(4)
        );
        assert_eq!(decode_instr(&[0x10, 0x33, 0x00]).unwrap_err(), DecodeError::Truncated);
        assert_eq!(decode_instr(&[0x81]).unwrap_err(), DecodeError::Truncated);
        assert_eq!(decode_instr(&[]).unwrap_err(), DecodeError::Truncated);
    }
}
