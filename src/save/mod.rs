use crate::dispatch::STREAM_CLASS;
use crate::exec::{Dest, ErrorKind, ExecResult, Glulx, IoSys, StubKind};
use crate::iff::{self, FormWriter};
use crate::interface::HostObject;
use crate::memory::{Heap, MemoryAccess};
use crate::util::{align_up, bytes_to_words, words_to_bytes};
use itertools::Itertools;
use log::{debug, warn};
use std::fmt;

const IFHD_LEN: usize = 128;

// delivered to the saving instruction's store operand after a restore
const RESTORED: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    NotIff,
    MissingChunk(&'static str),
    HeaderMismatch,
    BadChunk(&'static str),
    NoStream(u32),
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SaveError::NotIff => write!(f, "not an IFZS file"),
            SaveError::MissingChunk(id) => write!(f, "missing {} chunk", id),
            SaveError::HeaderMismatch => write!(f, "saved from a different story"),
            SaveError::BadChunk(id) => write!(f, "malformed {} chunk", id),
            SaveError::NoStream(id) => write!(f, "no stream with id {}", id),
        }
    }
}

/// A save file checked against the running story but not yet applied.
#[derive(Debug)]
struct SavedState {
    endmem: u32,
    ram: Vec<u8>,
    stack: Vec<u8>,
    heap: Heap,
    io: Option<(IoSys, u32)>,
}

// xor against the original RAM; a zero byte and a count stand for a run of unchanged bytes
fn compress(original: &[u8], current: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut used = 0;
    let deltas = original.iter().zip(current).map(|(a, b)| a ^ b);
    for (unchanged, run) in &deltas.group_by(|&d| d == 0) {
        if unchanged {
            let mut len = run.count();
            while len > 0 {
                let n = len.min(256);
                out.push(0);
                out.push((n - 1) as u8);
                len -= n;
            }
        } else {
            out.extend(run);
            used = out.len();
        }
    }
    // the trailing run is implied
    out.truncate(used);
    out
}

fn decompress(mut ram: Vec<u8>, rle: &[u8]) -> Result<Vec<u8>, SaveError> {
    let mut pos = 0;
    let mut bytes = rle.iter();
    while let Some(&b) = bytes.next() {
        if b == 0 {
            let len = bytes.next().ok_or(SaveError::BadChunk("CMem"))?;
            pos += *len as usize + 1;
        } else {
            *ram.get_mut(pos).ok_or(SaveError::BadChunk("CMem"))? ^= b;
            pos += 1;
        }
    }
    if pos > ram.len() {
        return Err(SaveError::BadChunk("CMem"));
    }
    Ok(ram)
}

fn split_endmem<'a>(data: &'a [u8], id: &'static str) -> Result<(u32, &'a [u8]), SaveError> {
    if data.len() < 4 {
        return Err(SaveError::BadChunk(id));
    }
    let (head, rest) = data.split_at(4);
    Ok((u32::from_be_bytes([head[0], head[1], head[2], head[3]]), rest))
}

fn word_at(data: &[u8], pos: u32) -> Option<u32> {
    let start = pos as usize;
    let b = data.get(start..start.checked_add(4)?)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

// (start, size, count) of each run of locals; the format must end inside the header
fn local_runs(format: &[u8], span: u32) -> Option<Vec<(u32, u32, u32)>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for pair in format.chunks_exact(2) {
        let (size, count) = (u32::from(pair[0]), u32::from(pair[1]));
        match size {
            0 => return Some(runs),
            1 | 2 | 4 => {}
            _ => return None,
        }
        start = align_up(start, size);
        let end = start.checked_add(size * count)?;
        if end > span {
            return None;
        }
        runs.push((start, size, count));
        start = end;
    }
    None
}

// The stub a restore pops must be a value stub over a well-formed frame,
// storing somewhere the store can land.
fn check_top_stub(stks: &[u8], ramstart: u32, endmem: u32) -> Option<()> {
    if stks.len() % 4 != 0 || stks.len() < 16 {
        return None;
    }
    let stub = stks.len() as u32 - 16;
    let kind = StubKind::decode(word_at(stks, stub)?, word_at(stks, stub + 4)?).ok()?;
    let dest = match kind {
        StubKind::Value(dest) => dest,
        StubKind::Resume(_) => return None,
    };
    let pc = word_at(stks, stub + 8)?;
    let fp = word_at(stks, stub + 12)?;
    if pc >= endmem || fp.checked_add(8)? > stub {
        return None;
    }

    let frame_len = word_at(stks, fp)?;
    let locals_pos = word_at(stks, fp + 4)?;
    let locals = fp.checked_add(locals_pos)?;
    if locals_pos < 8 || locals_pos > frame_len || fp.checked_add(frame_len)? > stub {
        return None;
    }
    let span = frame_len - locals_pos;
    let runs = local_runs(&stks[fp as usize + 8..locals as usize], span)?;

    match dest {
        Dest::Mem(addr) if addr < ramstart || addr.checked_add(4)? > endmem => None,
        Dest::Local(offset) => {
            // a store is narrowed to the declared size of the local it hits
            let width = runs
                .iter()
                .find(|&&(start, size, count)| offset >= start && offset < start + size * count)
                .filter(|&&(start, size, _)| (offset - start) % size == 0)
                .map_or(4, |&(_, size, _)| size);
            if offset.checked_add(width)? > span {
                None
            } else {
                Some(())
            }
        }
        _ => Some(()),
    }
}

impl<'a> Glulx<'a> {
    /// Serialises the machine as an IFZS form. The caller pushes the stub
    /// that a later restore pops.
    pub(crate) fn write_state(&self) -> Vec<u8> {
        let mut form = FormWriter::new(b"IFZS");
        form.chunk(b"IFhd", self.memory.image_prefix(IFHD_LEN));

        let endmem = self.memory.endmem();
        let ram = self.memory.ram();
        let rle = compress(&self.memory.original_ram(endmem), ram);
        let (id, body) = if rle.len() < ram.len() {
            (b"CMem", rle)
        } else {
            (b"UMem", ram.to_vec())
        };
        let mut data = endmem.to_be_bytes().to_vec();
        data.extend(body);
        form.chunk(id, &data);

        form.chunk(b"Stks", self.stack.as_bytes());
        if let Some(summary) = self.heap.summary() {
            form.chunk(b"MAll", &words_to_bytes(&summary));
        }
        let (mode, rock) = self.iosys.to_raw();
        form.chunk(b"IOsy", &words_to_bytes(&[mode, rock, self.string_table]));
        form.finish()
    }

    fn read_state(&self, data: &[u8]) -> Result<SavedState, SaveError> {
        let chunks = iff::parse_form(data, b"IFZS").ok_or(SaveError::NotIff)?;

        let ifhd = iff::find(&chunks, b"IFhd").ok_or(SaveError::MissingChunk("IFhd"))?;
        if ifhd.data != self.memory.image_prefix(IFHD_LEN) {
            return Err(SaveError::HeaderMismatch);
        }

        let ramstart = self.memory.ramstart();
        let (endmem, ram) = if let Some(cmem) = iff::find(&chunks, b"CMem") {
            let (endmem, rle) = split_endmem(cmem.data, "CMem")?;
            self.check_endmem(endmem, "CMem")?;
            (endmem, decompress(self.memory.original_ram(endmem), rle)?)
        } else if let Some(umem) = iff::find(&chunks, b"UMem") {
            let (endmem, raw) = split_endmem(umem.data, "UMem")?;
            self.check_endmem(endmem, "UMem")?;
            if raw.len() as u64 != u64::from(endmem - ramstart) {
                return Err(SaveError::BadChunk("UMem"));
            }
            (endmem, raw.to_vec())
        } else {
            return Err(SaveError::MissingChunk("CMem"));
        };

        let stks = iff::find(&chunks, b"Stks").ok_or(SaveError::MissingChunk("Stks"))?;
        if stks.data.len() as u64 > u64::from(self.stack.size())
            || check_top_stub(stks.data, ramstart, endmem).is_none()
        {
            return Err(SaveError::BadChunk("Stks"));
        }

        let heap = match iff::find(&chunks, b"MAll") {
            Some(mall) => bytes_to_words(mall.data)
                .and_then(|summary| Heap::from_summary(&summary, endmem))
                .ok_or(SaveError::BadChunk("MAll"))?,
            None => Heap::default(),
        };

        let io = match iff::find(&chunks, b"IOsy") {
            Some(iosy) => match bytes_to_words(iosy.data).as_deref() {
                Some(&[mode, rock, table]) => Some((IoSys::new(mode, rock), table)),
                _ => return Err(SaveError::BadChunk("IOsy")),
            },
            None => None,
        };

        Ok(SavedState {
            endmem,
            ram,
            stack: stks.data.to_vec(),
            heap,
            io,
        })
    }

    fn check_endmem(&self, endmem: u32, id: &'static str) -> Result<(), SaveError> {
        if endmem < self.memory.extstart() || endmem % 256 != 0 {
            Err(SaveError::BadChunk(id))
        } else {
            Ok(())
        }
    }

    // the state was validated by read_state, so failures here are faults
    fn apply_state(&mut self, state: SavedState) -> ExecResult<()> {
        self.memory.load_ram(state.endmem, &state.ram)?;
        self.stack.load(&state.stack)?;
        self.heap = state.heap;
        if let Some((iosys, table)) = state.io {
            self.iosys = iosys;
            self.string_table = table;
        }
        Ok(())
    }

    // restores a state and resumes the instruction that saved it
    fn resume_saved(&mut self, data: &[u8], dest: Dest) -> ExecResult<()> {
        match self.read_state(data) {
            Ok(state) => {
                self.apply_state(state)?;
                self.pop_callstub(RESTORED)
            }
            Err(e) => {
                warn!("{}", ErrorKind::BadSaveFile(e));
                self.store(dest, 1, 4)
            }
        }
    }

    fn stream_object(&self, id: u32) -> Result<HostObject, SaveError> {
        self.registry
            .objects
            .lookup(STREAM_CLASS, id)
            .ok_or(SaveError::NoStream(id))
    }

    pub(crate) fn op_save(&mut self, stream: u32, dest: Dest) -> ExecResult<()> {
        let obj = match self.stream_object(stream) {
            Ok(obj) => obj,
            Err(e) => {
                warn!("save failed: {}", e);
                return self.store(dest, 1, 4);
            }
        };
        self.push_callstub(StubKind::Value(dest))?;
        let data = self.write_state();
        let result = match self.host.write_stream(obj, &data) {
            Ok(()) => {
                debug!("saved {} bytes to stream {}", data.len(), stream);
                0
            }
            Err(e) => {
                warn!("save failed: {}", e);
                1
            }
        };
        self.pop_callstub(result)
    }

    pub(crate) fn op_restore(&mut self, stream: u32, dest: Dest) -> ExecResult<()> {
        let data = self
            .stream_object(stream)
            .map_err(ErrorKind::BadSaveFile)
            .and_then(|obj| self.host.read_stream(obj));
        match data {
            Ok(data) => {
                debug!("restoring {} bytes from stream {}", data.len(), stream);
                self.resume_saved(&data, dest)
            }
            Err(e) => {
                warn!("restore failed: {}", e);
                self.store(dest, 1, 4)
            }
        }
    }

    pub(crate) fn op_saveundo(&mut self, dest: Dest) -> ExecResult<()> {
        let depth = self.options.undo_depth;
        if depth == 0 {
            return self.store(dest, 1, 4);
        }
        self.push_callstub(StubKind::Value(dest))?;
        let snapshot = self.write_state();
        while self.undo.len() >= depth {
            self.undo.pop_front();
        }
        self.undo.push_back(snapshot);
        debug!("saveundo: {} snapshots", self.undo.len());
        self.pop_callstub(0)
    }

    pub(crate) fn op_restoreundo(&mut self, dest: Dest) -> ExecResult<()> {
        match self.undo.pop_back() {
            Some(snapshot) => {
                debug!("restoreundo: {} snapshots left", self.undo.len());
                self.resume_saved(&snapshot, dest)
            }
            None => self.store(dest, 1, 4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress() {
        let original = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut current = original.clone();
        current[1] = 0x12;
        current[2] = 3;
        current[6] = 0;
        let rle = compress(&original, &current);
        // one unchanged, one xor, four unchanged, one xor, trailing run dropped
        assert_eq!(rle, vec![0, 0, 0x10, 0, 3, 7]);
        assert_eq!(decompress(original.clone(), &rle), Ok(current));
        assert_eq!(compress(&original, &original), Vec::<u8>::new());
    }

    #[test]
    fn test_compress_long_run() {
        let original = vec![0u8; 600];
        let mut current = original.clone();
        current[599] = 9;
        let rle = compress(&original, &current);
        assert_eq!(rle, vec![0, 255, 0, 255, 0, 86, 9]);
        assert_eq!(decompress(original, &rle).map(|ram| ram[599]), Ok(9));
    }

    #[test]
    fn test_decompress_overrun() {
        let original = vec![0u8; 4];
        assert_eq!(
            decompress(original.clone(), &[0, 3, 5]),
            Err(SaveError::BadChunk("CMem"))
        );
        assert_eq!(
            decompress(original, &[0, 9]),
            Err(SaveError::BadChunk("CMem"))
        );
        assert_eq!(decompress(vec![0u8; 4], &[0]), Err(SaveError::BadChunk("CMem")));
    }

    // a frame at 0 with one 4-byte local, then the stub
    fn stks(stub: [u32; 4]) -> Vec<u8> {
        let mut words = vec![16, 12, 0x0401_0000, 0];
        words.extend_from_slice(&stub);
        words_to_bytes(&words)
    }

    #[test]
    fn test_top_stub_checks() {
        let (ram, end) = (0x100, 0x400);
        assert_eq!(check_top_stub(&stks([2, 0, 0x50, 0]), ram, end), Some(()));
        assert_eq!(check_top_stub(&stks([1, 0x3FC, 0x50, 0]), ram, end), Some(()));
        assert_eq!(check_top_stub(&stks([3, 0, 0x50, 0]), ram, end), Some(()));

        assert_eq!(check_top_stub(&[], ram, end), None);
        assert_eq!(check_top_stub(&[0; 12], ram, end), None);
        assert_eq!(check_top_stub(&stks([7, 0, 0x50, 0]), ram, end), None);
        assert_eq!(check_top_stub(&stks([0x11, 0, 0x50, 0]), ram, end), None);
        assert_eq!(check_top_stub(&stks([0, 0, 0x400, 0]), ram, end), None);
        assert_eq!(check_top_stub(&stks([0, 0, 0x50, 0xFFFF_FFFC]), ram, end), None);
        assert_eq!(check_top_stub(&stks([0, 0, 0x50, 12]), ram, end), None);
        // stores into ROM, past ENDMEM, or past the frame's locals
        assert_eq!(check_top_stub(&stks([1, 0xFC, 0x50, 0]), ram, end), None);
        assert_eq!(check_top_stub(&stks([1, 0x3FD, 0x50, 0]), ram, end), None);
        assert_eq!(check_top_stub(&stks([2, 4, 0x50, 0]), ram, end), None);

        let mut long_frame = stks([0, 0, 0x50, 0]);
        long_frame[..4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert_eq!(check_top_stub(&long_frame, ram, end), None);
        let mut unterminated = stks([0, 0, 0x50, 0]);
        unterminated[10..12].copy_from_slice(&[1, 0]);
        assert_eq!(check_top_stub(&unterminated, ram, end), None);
    }

    #[test]
    fn test_narrow_locals() {
        // three 1-byte locals: a store to the last one is one byte wide
        let mut data = stks([2, 2, 0x50, 0]);
        data[8..12].copy_from_slice(&[1, 3, 0, 0]);
        assert_eq!(check_top_stub(&data, 0x100, 0x400), Some(()));
        data[8..12].copy_from_slice(&[2, 1, 0, 0]);
        assert_eq!(check_top_stub(&data, 0x100, 0x400), None);
    }
}
