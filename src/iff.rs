use nom::bytes::complete::{tag, take};
use nom::combinator::{all_consuming, cond, map, opt};
use nom::multi::{length_data, many0};
use nom::number::complete::be_u32;
use nom::sequence::preceded;
use nom::IResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub id: [u8; 4],
    pub data: &'a [u8],
}

pub fn chunk_id(input: &[u8]) -> IResult<&[u8], [u8; 4]> {
    map(take(4usize), |id: &[u8]| [id[0], id[1], id[2], id[3]])(input)
}

// data is padded to an even length; a missing final pad byte is tolerated
pub fn chunk(input: &[u8]) -> IResult<&[u8], Chunk> {
    let (input, id) = chunk_id(input)?;
    let (input, data) = length_data(be_u32)(input)?;
    let (input, _) = cond(data.len() % 2 == 1, opt(take(1usize)))(input)?;
    Ok((input, Chunk { id, data }))
}

fn form<'a>(input: &'a [u8], form_type: &[u8; 4]) -> IResult<&'a [u8], Vec<Chunk<'a>>> {
    let (rest, body) = preceded(tag("FORM"), length_data(be_u32))(input)?;
    let (_, chunks) = all_consuming(preceded(tag(&form_type[..]), many0(chunk)))(body)?;
    Ok((rest, chunks))
}

/// Splits a `FORM` of the given type into its chunks.
pub fn parse_form<'a>(data: &'a [u8], form_type: &[u8; 4]) -> Option<Vec<Chunk<'a>>> {
    form(data, form_type).ok().map(|(_, chunks)| chunks)
}

/// The chunk whose header starts at `offset`.
pub fn chunk_at(data: &[u8], offset: usize) -> Option<Chunk> {
    chunk(data.get(offset..)?).ok().map(|(_, chunk)| chunk)
}

pub fn find<'a, 'c>(chunks: &'c [Chunk<'a>], id: &[u8; 4]) -> Option<&'c Chunk<'a>> {
    chunks.iter().find(|chunk| &chunk.id == id)
}

pub struct FormWriter {
    form_type: [u8; 4],
    body: Vec<u8>,
}

impl FormWriter {
    pub fn new(form_type: &[u8; 4]) -> Self {
        FormWriter {
            form_type: *form_type,
            body: Vec::new(),
        }
    }

    pub fn chunk(&mut self, id: &[u8; 4], data: &[u8]) -> &mut Self {
        self.body.extend_from_slice(id);
        self.body.extend_from_slice(&(data.len() as u32).to_be_bytes());
        self.body.extend_from_slice(data);
        if data.len() % 2 == 1 {
            self.body.push(0);
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 12);
        out.extend_from_slice(b"FORM");
        out.extend_from_slice(&(self.body.len() as u32 + 4).to_be_bytes());
        out.extend_from_slice(&self.form_type);
        out.extend(self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        let mut form = FormWriter::new(b"TEST");
        form.chunk(b"Odd ", &[1, 2, 3]).chunk(b"Even", &[4, 5]);
        let data = form.finish();
        // 12 + (8 + 3 + 1) + (8 + 2)
        assert_eq!(data.len(), 34);
        assert_eq!(&data[4..8], &26u32.to_be_bytes());

        let chunks = parse_form(&data, b"TEST").unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data, &[1, 2, 3]);
        assert_eq!(find(&chunks, b"Even").map(|c| c.data), Some(&[4u8, 5][..]));
        assert_eq!(find(&chunks, b"None"), None);
        assert_eq!(chunk_at(&data, 24).map(|c| c.id), Some(*b"Even"));
    }

    #[test]
    fn test_rejects() {
        let mut form = FormWriter::new(b"TEST");
        form.chunk(b"Data", &[0; 6]);
        let data = form.finish();
        assert!(parse_form(&data, b"IFZS").is_none());
        assert!(parse_form(&data[..data.len() - 1], b"TEST").is_none());
        assert!(parse_form(b"LIST\0\0\0\x04TEST", b"TEST").is_none());
    }
}
