use crate::exec::{ErrorKind, ExecResult};
use crate::iff::{self, chunk_id};
use log::debug;
use nom::multi::length_count;
use nom::number::complete::be_u32;
use nom::sequence::tuple;
use nom::IResult;

// (usage, number, offset of the resource chunk)
fn resource_index(input: &[u8]) -> IResult<&[u8], Vec<([u8; 4], u32, u32)>> {
    length_count(be_u32, tuple((chunk_id, be_u32, be_u32)))(input)
}

/// Finds the Glulx executable in a Blorb file, as (offset, length) of the
/// image. Returns None when `story` is not a Blorb file at all.
pub fn locate_exec(story: &[u8]) -> ExecResult<Option<(usize, usize)>> {
    if story.len() < 12 || &story[..4] != b"FORM" || &story[8..12] != b"IFRS" {
        return Ok(None);
    }
    let ridx = iff::chunk_at(story, 12)
        .filter(|chunk| &chunk.id == b"RIdx")
        .ok_or(ErrorKind::BadBlorb("missing resource index"))?;
    let (_, index) =
        resource_index(ridx.data).map_err(|_| ErrorKind::BadBlorb("malformed resource index"))?;
    let (_, _, offset) = index
        .into_iter()
        .find(|&(usage, number, _)| &usage == b"Exec" && number == 0)
        .ok_or(ErrorKind::BadBlorb("no executable resource"))?;
    let offset = offset as usize;
    let exec = iff::chunk_at(story, offset).ok_or(ErrorKind::BadBlorb("truncated resource"))?;
    if &exec.id != b"GLUL" {
        return Err(ErrorKind::BadBlorb("executable is not Glulx"));
    }
    debug!("blorb: Glulx image of {:#x} bytes at {:#x}", exec.data.len(), offset + 8);
    Ok(Some((offset + 8, exec.data.len())))
}
