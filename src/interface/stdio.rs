use super::{GlkHost, HostObject};
use crate::dispatch::{ArrayRef, DispatchContext, GlkArg, STREAM_CLASS};
use crate::exec::{ErrorKind, ExecResult};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;

const WINDOW_CLASS: u32 = 0;
const FILEREF_CLASS: u32 = 2;

const EVTYPE_CHAR_INPUT: u32 = 2;
const EVTYPE_LINE_INPUT: u32 = 3;
const KEYCODE_RETURN: u32 = 0xFFFF_FFFA;

mod sel {
    pub const EXIT: u32 = 0x0001;
    pub const TICK: u32 = 0x0003;
    pub const GESTALT: u32 = 0x0004;
    pub const GESTALT_EXT: u32 = 0x0005;
    pub const WINDOW_ITERATE: u32 = 0x0020;
    pub const WINDOW_GET_ROCK: u32 = 0x0021;
    pub const WINDOW_GET_ROOT: u32 = 0x0022;
    pub const WINDOW_OPEN: u32 = 0x0023;
    pub const WINDOW_CLOSE: u32 = 0x0024;
    pub const WINDOW_GET_SIZE: u32 = 0x0025;
    pub const WINDOW_CLEAR: u32 = 0x002A;
    pub const WINDOW_GET_STREAM: u32 = 0x002C;
    pub const SET_WINDOW: u32 = 0x002F;
    pub const STREAM_GET_ROCK: u32 = 0x0041;
    pub const STREAM_OPEN_FILE: u32 = 0x0042;
    pub const STREAM_CLOSE: u32 = 0x0044;
    pub const STREAM_SET_CURRENT: u32 = 0x0047;
    pub const STREAM_GET_CURRENT: u32 = 0x0048;
    pub const FILEREF_CREATE_BY_NAME: u32 = 0x0061;
    pub const FILEREF_CREATE_BY_PROMPT: u32 = 0x0062;
    pub const FILEREF_DESTROY: u32 = 0x0063;
    pub const PUT_CHAR: u32 = 0x0080;
    pub const PUT_CHAR_STREAM: u32 = 0x0081;
    pub const PUT_STRING: u32 = 0x0082;
    pub const PUT_STRING_STREAM: u32 = 0x0083;
    pub const PUT_BUFFER: u32 = 0x0084;
    pub const PUT_BUFFER_STREAM: u32 = 0x0085;
    pub const SET_STYLE: u32 = 0x0086;
    pub const SET_STYLE_STREAM: u32 = 0x0087;
    pub const CHAR_TO_LOWER: u32 = 0x00A0;
    pub const CHAR_TO_UPPER: u32 = 0x00A1;
    pub const SELECT: u32 = 0x00C0;
    pub const REQUEST_LINE_EVENT: u32 = 0x00D0;
    pub const CANCEL_LINE_EVENT: u32 = 0x00D1;
    pub const REQUEST_CHAR_EVENT: u32 = 0x00D2;
    pub const CANCEL_CHAR_EVENT: u32 = 0x00D3;
    pub const PUT_CHAR_UNI: u32 = 0x0128;
    pub const PUT_STRING_UNI: u32 = 0x0129;
    pub const PUT_BUFFER_UNI: u32 = 0x012A;
    pub const PUT_CHAR_STREAM_UNI: u32 = 0x012B;
    pub const REQUEST_CHAR_EVENT_UNI: u32 = 0x0140;
    pub const REQUEST_LINE_EVENT_UNI: u32 = 0x0141;
}

lazy_static! {
    static ref PROTOTYPES: HashMap<u32, &'static str> = {
        use sel::*;
        let table: &[(u32, &'static str)] = &[
            (EXIT, "0:"),
            (TICK, "0:"),
            (GESTALT, "3IuIu:Iu"),
            (GESTALT_EXT, "4IuIu&#Iu:Iu"),
            (WINDOW_ITERATE, "3Qa<Iu:Qa"),
            (WINDOW_GET_ROCK, "2Qa:Iu"),
            (WINDOW_GET_ROOT, "1:Qa"),
            (WINDOW_OPEN, "6QaIuIuIuIu:Qa"),
            (WINDOW_CLOSE, "2Qa<[2IuIu]:"),
            (WINDOW_GET_SIZE, "3Qa<Iu<Iu:"),
            (WINDOW_CLEAR, "1Qa:"),
            (WINDOW_GET_STREAM, "2Qa:Qb"),
            (SET_WINDOW, "1Qa:"),
            (STREAM_GET_ROCK, "2Qb:Iu"),
            (STREAM_OPEN_FILE, "4QcIuIu:Qb"),
            (STREAM_CLOSE, "2Qb<[2IuIu]:"),
            (STREAM_SET_CURRENT, "1Qb:"),
            (STREAM_GET_CURRENT, "1:Qb"),
            (FILEREF_CREATE_BY_NAME, "4IuSIu:Qc"),
            (FILEREF_CREATE_BY_PROMPT, "4IuIuIu:Qc"),
            (FILEREF_DESTROY, "1Qc:"),
            (PUT_CHAR, "1Cu:"),
            (PUT_CHAR_STREAM, "2QbCu:"),
            (PUT_STRING, "1S:"),
            (PUT_STRING_STREAM, "2QbS:"),
            (PUT_BUFFER, "1>+#Cn:"),
            (PUT_BUFFER_STREAM, "2Qb>+#Cn:"),
            (SET_STYLE, "1Iu:"),
            (SET_STYLE_STREAM, "2QbIu:"),
            (CHAR_TO_LOWER, "2Cu:Cu"),
            (CHAR_TO_UPPER, "2Cu:Cu"),
            (SELECT, "1<+[4IuQaIuIu]:"),
            (REQUEST_LINE_EVENT, "3Qa&+#!CnIu:"),
            (CANCEL_LINE_EVENT, "2Qa<[4IuQaIuIu]:"),
            (REQUEST_CHAR_EVENT, "1Qa:"),
            (CANCEL_CHAR_EVENT, "1Qa:"),
            (PUT_CHAR_UNI, "1Iu:"),
            (PUT_STRING_UNI, "1U:"),
            (PUT_BUFFER_UNI, "1>+#Iu:"),
            (PUT_CHAR_STREAM_UNI, "2QbIu:"),
            (REQUEST_CHAR_EVENT_UNI, "1Qa:"),
            (REQUEST_LINE_EVENT_UNI, "3Qa&+#!IuIu:"),
        ];
        table.iter().copied().collect()
    };
}

#[derive(Debug)]
struct Window {
    rock: u32,
    stream: HostObject,
}

#[derive(Debug)]
enum StreamKind {
    Window,
    File {
        path: PathBuf,
        data: Vec<u8>,
        pos: usize,
        write: bool,
    },
}

#[derive(Debug)]
struct Stream {
    rock: u32,
    kind: StreamKind,
    read: u32,
    written: u32,
}

#[derive(Debug)]
struct Fileref {
    path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
enum Request {
    Line { win: HostObject, buf: ArrayRef },
    Char { win: HostObject, unicode: bool },
}

fn uint(args: &[GlkArg], ix: usize) -> u32 {
    args.get(ix).and_then(GlkArg::as_u32).unwrap_or(0)
}

fn object(args: &[GlkArg], ix: usize) -> Option<HostObject> {
    args.get(ix).and_then(GlkArg::as_object)
}

fn array(args: &[GlkArg]) -> ExecResult<ArrayRef> {
    args.iter()
        .find_map(GlkArg::as_array)
        .ok_or(ErrorKind::BadArrayRef)
}

fn set_return(args: &mut [GlkArg], val: GlkArg) {
    if let Some(slot) = args.last_mut() {
        *slot = val;
    }
}

// fills the `n`th reference argument if the VM passed a non-null pointer
fn set_ref(args: &mut [GlkArg], n: usize, vals: &[GlkArg]) {
    let flag = args
        .iter()
        .enumerate()
        .filter(|(_, slot)| matches!(slot, GlkArg::PtrFlag(_)))
        .nth(n)
        .map(|(ix, slot)| (ix, *slot == GlkArg::PtrFlag(true)));
    if let Some((ix, true)) = flag {
        for (slot, val) in args[ix + 1..].iter_mut().zip(vals) {
            *slot = val.clone();
        }
    }
}

fn latin1(ch: char) -> u8 {
    if (ch as u32) < 0x100 {
        ch as u8
    } else {
        b'?'
    }
}

fn to_lower(ch: u8) -> u8 {
    match ch {
        b'A'..=b'Z' | 0xC0..=0xDE if ch != 0xD7 => ch + 0x20,
        _ => ch,
    }
}

fn to_upper(ch: u8) -> u8 {
    match ch {
        b'a'..=b'z' | 0xE0..=0xFE if ch != 0xF7 => ch - 0x20,
        _ => ch,
    }
}

/// A single-window Glk over line-buffered standard input and output.
pub struct StdioGlk<R, W> {
    input: R,
    output: W,
    next_object: u64,
    root: Option<HostObject>,
    windows: HashMap<HostObject, Window>,
    streams: HashMap<HostObject, Stream>,
    filerefs: HashMap<HostObject, Fileref>,
    current: Option<HostObject>,
    request: Option<Request>,
}

impl<R: BufRead, W: Write> StdioGlk<R, W> {
    pub fn new(input: R, output: W) -> Self {
        StdioGlk {
            input,
            output,
            next_object: 1,
            root: None,
            windows: HashMap::new(),
            streams: HashMap::new(),
            filerefs: HashMap::new(),
            current: None,
            request: None,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub fn flush(&mut self) {
        if let Err(e) = self.output.flush() {
            warn!("flushing output failed: {}", e);
        }
    }

    fn new_object(&mut self) -> HostObject {
        let obj = HostObject(self.next_object);
        self.next_object += 1;
        obj
    }

    fn write_window(&mut self, text: &str) {
        if let Err(e) = self.output.write_all(text.as_bytes()) {
            warn!("writing output failed: {}", e);
        }
    }

    // code points to a stream; file streams store Latin-1
    fn emit(&mut self, stream: Option<HostObject>, chars: &[u32]) {
        let entry = match stream.and_then(|s| self.streams.get_mut(&s)) {
            Some(entry) => entry,
            None => return,
        };
        entry.written += chars.len() as u32;
        let window = match &mut entry.kind {
            StreamKind::Window => true,
            StreamKind::File {
                data, write: true, ..
            } => {
                data.extend(chars.iter().map(|&c| if c < 0x100 { c as u8 } else { b'?' }));
                false
            }
            StreamKind::File { .. } => {
                warn!("write to a read-only file stream");
                false
            }
        };
        if window {
            let text: String = chars
                .iter()
                .map(|&c| std::char::from_u32(c).unwrap_or('?'))
                .collect();
            self.write_window(&text);
        }
    }

    fn emit_bytes(&mut self, stream: Option<HostObject>, bytes: &[u8]) {
        let chars: Vec<u32> = bytes.iter().map(|&b| u32::from(b)).collect();
        self.emit(stream, &chars);
    }

    fn read_line(&mut self) -> ExecResult<String> {
        self.flush();
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            debug!("end of input");
            return Err(ErrorKind::Exit);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn open_window(&mut self, rock: u32, ctx: &mut DispatchContext<'_>) -> ExecResult<HostObject> {
        let win = self.new_object();
        let stream = self.new_object();
        self.streams.insert(
            stream,
            Stream {
                rock: 0,
                kind: StreamKind::Window,
                read: 0,
                written: 0,
            },
        );
        self.windows.insert(win, Window { rock, stream });
        ctx.register_object(WINDOW_CLASS, win)?;
        ctx.register_object(STREAM_CLASS, stream)?;
        self.root = Some(win);
        Ok(win)
    }

    // (read, written) counts of the closed stream
    fn close_stream(&mut self, stream: HostObject, ctx: &mut DispatchContext<'_>) -> (u32, u32) {
        ctx.unregister_object(STREAM_CLASS, stream);
        if self.current == Some(stream) {
            self.current = None;
        }
        let entry = match self.streams.remove(&stream) {
            Some(entry) => entry,
            None => return (0, 0),
        };
        if let StreamKind::File {
            path,
            data,
            write: true,
            ..
        } = &entry.kind
        {
            if let Err(e) = fs::write(path, data) {
                warn!("writing {} failed: {}", path.display(), e);
            }
        }
        (entry.read, entry.written)
    }

    fn open_file(&mut self, fref: HostObject, fmode: u32, rock: u32) -> Option<HostObject> {
        let path = self.filerefs.get(&fref)?.path.clone();
        // write, read, read/write, append
        let (write, keep) = match fmode {
            1 => (true, false),
            2 => (false, true),
            3 | 5 => (true, true),
            _ => return None,
        };
        let data = if keep {
            match fs::read(&path) {
                Ok(data) => data,
                Err(_) if write => Vec::new(),
                Err(e) => {
                    warn!("opening {} failed: {}", path.display(), e);
                    return None;
                }
            }
        } else {
            Vec::new()
        };
        let stream = self.new_object();
        self.streams.insert(
            stream,
            Stream {
                rock,
                kind: StreamKind::File {
                    path,
                    data,
                    pos: 0,
                    write,
                },
                read: 0,
                written: 0,
            },
        );
        Some(stream)
    }

    fn create_fileref(&mut self, name: &str, ctx: &mut DispatchContext<'_>) -> ExecResult<GlkArg> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(GlkArg::Opaque(None));
        }
        let fref = self.new_object();
        self.filerefs.insert(
            fref,
            Fileref {
                path: PathBuf::from(name),
            },
        );
        ctx.register_object(FILEREF_CLASS, fref)?;
        Ok(GlkArg::Opaque(Some(fref)))
    }

    // blocks for the pending input request and returns the event
    fn select(&mut self, ctx: &mut DispatchContext<'_>) -> ExecResult<[GlkArg; 4]> {
        let request = self.request.take().ok_or(ErrorKind::Exit)?;
        match request {
            Request::Line { win, buf } => {
                let line = self.read_line()?;
                let count = match buf {
                    ArrayRef::Bytes { .. } => {
                        let bytes = ctx.bytes_mut(buf)?;
                        let mut count = 0;
                        for (slot, ch) in bytes.iter_mut().zip(line.chars()) {
                            *slot = latin1(ch);
                            count += 1;
                        }
                        count
                    }
                    ArrayRef::Ints { .. } => {
                        let ints = ctx.ints_mut(buf)?;
                        let mut count = 0;
                        for (slot, ch) in ints.iter_mut().zip(line.chars()) {
                            *slot = ch as u32;
                            count += 1;
                        }
                        count
                    }
                };
                ctx.unregister_array(buf)?;
                Ok([
                    GlkArg::Uint(EVTYPE_LINE_INPUT),
                    GlkArg::Opaque(Some(win)),
                    GlkArg::Uint(count),
                    GlkArg::Uint(0),
                ])
            }
            Request::Char { win, unicode } => {
                let line = self.read_line()?;
                let ch = match line.chars().next() {
                    None => KEYCODE_RETURN,
                    Some(ch) if unicode => ch as u32,
                    Some(ch) => u32::from(latin1(ch)),
                };
                Ok([
                    GlkArg::Uint(EVTYPE_CHAR_INPUT),
                    GlkArg::Opaque(Some(win)),
                    GlkArg::Uint(ch),
                    GlkArg::Uint(0),
                ])
            }
        }
    }
}

impl<R: BufRead, W: Write> GlkHost for StdioGlk<R, W> {
    fn prototype(&self, selector: u32) -> Option<&'static str> {
        PROTOTYPES.get(&selector).copied()
    }

    fn call(
        &mut self,
        selector: u32,
        args: &mut [GlkArg],
        ctx: &mut DispatchContext<'_>,
    ) -> ExecResult<()> {
        use sel::*;
        match selector {
            EXIT => {
                self.flush();
                return Err(ErrorKind::Exit);
            }
            TICK | SET_STYLE | SET_STYLE_STREAM | WINDOW_CLEAR => {}
            GESTALT | GESTALT_EXT => {
                let val = match uint(args, 0) {
                    // version, char input, line input, unicode
                    0 => 0x0007_0600,
                    1 | 2 | 15 => 1,
                    _ => 0,
                };
                set_return(args, GlkArg::Uint(val));
            }
            WINDOW_ITERATE => {
                let next = match object(args, 0) {
                    None => self.root,
                    Some(_) => None,
                };
                let rock = next
                    .and_then(|win| self.windows.get(&win))
                    .map_or(0, |w| w.rock);
                set_ref(args, 0, &[GlkArg::Uint(rock)]);
                set_return(args, GlkArg::Opaque(next));
            }
            WINDOW_GET_ROCK => {
                let rock = object(args, 0)
                    .and_then(|win| self.windows.get(&win))
                    .map_or(0, |w| w.rock);
                set_return(args, GlkArg::Uint(rock));
            }
            WINDOW_GET_ROOT => set_return(args, GlkArg::Opaque(self.root)),
            WINDOW_OPEN => {
                // only a single root window
                let win = if self.root.is_none() && object(args, 0).is_none() {
                    Some(self.open_window(uint(args, 4), ctx)?)
                } else {
                    None
                };
                set_return(args, GlkArg::Opaque(win));
            }
            WINDOW_CLOSE => {
                let win = object(args, 0).ok_or(ErrorKind::NullGlkArgument(selector))?;
                let (read, written) = match self.windows.remove(&win) {
                    Some(window) => self.close_stream(window.stream, ctx),
                    None => (0, 0),
                };
                ctx.unregister_object(WINDOW_CLASS, win);
                if self.root == Some(win) {
                    self.root = None;
                }
                set_ref(args, 0, &[GlkArg::Uint(read), GlkArg::Uint(written)]);
            }
            WINDOW_GET_SIZE => {
                set_ref(args, 0, &[GlkArg::Uint(80)]);
                set_ref(args, 1, &[GlkArg::Uint(24)]);
            }
            WINDOW_GET_STREAM => {
                let stream = object(args, 0)
                    .and_then(|win| self.windows.get(&win))
                    .map(|w| w.stream);
                set_return(args, GlkArg::Opaque(stream));
            }
            SET_WINDOW => {
                self.current = object(args, 0)
                    .and_then(|win| self.windows.get(&win))
                    .map(|w| w.stream);
            }
            STREAM_GET_ROCK => {
                let rock = object(args, 0)
                    .and_then(|s| self.streams.get(&s))
                    .map_or(0, |s| s.rock);
                set_return(args, GlkArg::Uint(rock));
            }
            STREAM_OPEN_FILE => {
                let fref = object(args, 0).ok_or(ErrorKind::NullGlkArgument(selector))?;
                let stream = self.open_file(fref, uint(args, 1), uint(args, 2));
                if let Some(stream) = stream {
                    ctx.register_object(STREAM_CLASS, stream)?;
                }
                set_return(args, GlkArg::Opaque(stream));
            }
            STREAM_CLOSE => {
                let stream = object(args, 0).ok_or(ErrorKind::NullGlkArgument(selector))?;
                let (read, written) = self.close_stream(stream, ctx);
                set_ref(args, 0, &[GlkArg::Uint(read), GlkArg::Uint(written)]);
            }
            STREAM_SET_CURRENT => self.current = object(args, 0),
            STREAM_GET_CURRENT => set_return(args, GlkArg::Opaque(self.current)),
            FILEREF_CREATE_BY_NAME => {
                let name: String = match args.get(1) {
                    Some(GlkArg::CharStr(name)) => name.iter().map(|&b| char::from(b)).collect(),
                    _ => String::new(),
                };
                let fref = self.create_fileref(&name, ctx)?;
                set_return(args, fref);
            }
            FILEREF_CREATE_BY_PROMPT => {
                self.write_window("\nFile name: ");
                let name = self.read_line()?;
                let fref = self.create_fileref(&name, ctx)?;
                set_return(args, fref);
            }
            FILEREF_DESTROY => {
                if let Some(fref) = object(args, 0) {
                    self.filerefs.remove(&fref);
                    ctx.unregister_object(FILEREF_CLASS, fref);
                }
            }
            PUT_CHAR => self.emit(self.current, &[uint(args, 0)]),
            PUT_CHAR_UNI => self.emit(self.current, &[uint(args, 0)]),
            PUT_CHAR_STREAM | PUT_CHAR_STREAM_UNI => self.emit(object(args, 0), &[uint(args, 1)]),
            PUT_STRING | PUT_STRING_STREAM => {
                let stream = if selector == PUT_STRING {
                    self.current
                } else {
                    object(args, 0)
                };
                if let Some(GlkArg::CharStr(text)) = args.last() {
                    let text = text.clone();
                    self.emit_bytes(stream, &text);
                }
            }
            PUT_STRING_UNI => {
                if let Some(GlkArg::UniCharStr(text)) = args.last() {
                    let text = text.clone();
                    self.emit(self.current, &text);
                }
            }
            PUT_BUFFER | PUT_BUFFER_STREAM => {
                let stream = if selector == PUT_BUFFER {
                    self.current
                } else {
                    object(args, 0)
                };
                let bytes = ctx.bytes(array(args)?)?.to_vec();
                self.emit_bytes(stream, &bytes);
            }
            PUT_BUFFER_UNI => {
                let chars = ctx.ints(array(args)?)?.to_vec();
                self.emit(self.current, &chars);
            }
            CHAR_TO_LOWER => set_return(args, GlkArg::Uch(to_lower(uint(args, 0) as u8))),
            CHAR_TO_UPPER => set_return(args, GlkArg::Uch(to_upper(uint(args, 0) as u8))),
            SELECT => {
                let event = self.select(ctx)?;
                set_ref(args, 0, &event);
            }
            REQUEST_LINE_EVENT | REQUEST_LINE_EVENT_UNI => {
                let win = object(args, 0).ok_or(ErrorKind::NullGlkArgument(selector))?;
                let buf = array(args)?;
                self.request = Some(Request::Line { win, buf });
            }
            REQUEST_CHAR_EVENT | REQUEST_CHAR_EVENT_UNI => {
                let win = object(args, 0).ok_or(ErrorKind::NullGlkArgument(selector))?;
                self.request = Some(Request::Char {
                    win,
                    unicode: selector == REQUEST_CHAR_EVENT_UNI,
                });
            }
            CANCEL_LINE_EVENT => {
                if let Some(Request::Line { buf, .. }) = self.request {
                    ctx.unregister_array(buf)?;
                    self.request = None;
                }
                set_ref(
                    args,
                    0,
                    &[
                        GlkArg::Uint(0),
                        GlkArg::Opaque(None),
                        GlkArg::Uint(0),
                        GlkArg::Uint(0),
                    ],
                );
            }
            CANCEL_CHAR_EVENT => {
                if let Some(Request::Char { .. }) = self.request {
                    self.request = None;
                }
            }
            _ => return Err(ErrorKind::UnknownGlkSelector(selector)),
        }
        Ok(())
    }

    fn put_char(&mut self, ch: u8) {
        self.emit(self.current, &[u32::from(ch)]);
    }

    fn put_char_uni(&mut self, ch: u32) {
        self.emit(self.current, &[ch]);
    }

    fn write_stream(&mut self, stream: HostObject, data: &[u8]) -> ExecResult<()> {
        match self.streams.get_mut(&stream) {
            Some(Stream {
                kind: StreamKind::File {
                    data: buf,
                    write: true,
                    ..
                },
                written,
                ..
            }) => {
                buf.extend_from_slice(data);
                *written += data.len() as u32;
                Ok(())
            }
            _ => Err(ErrorKind::Io("not a writable file stream".to_string())),
        }
    }

    fn read_stream(&mut self, stream: HostObject) -> ExecResult<Vec<u8>> {
        match self.streams.get_mut(&stream) {
            Some(Stream {
                kind: StreamKind::File { data, pos, .. },
                read,
                ..
            }) => {
                let rest = data.get(*pos..).unwrap_or(&[]).to_vec();
                *pos = data.len();
                *read += rest.len() as u32;
                Ok(rest)
            }
            _ => Err(ErrorKind::Io("not a file stream".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::parse_prototype;
    use std::io::Cursor;

    #[test]
    fn test_prototypes_parse() {
        for (sel, text) in PROTOTYPES.iter() {
            assert!(parse_prototype(text).is_some(), "{:#x} {}", sel, text);
        }
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(to_lower(b'Q'), b'q');
        assert_eq!(to_lower(0xC9), 0xE9);
        assert_eq!(to_lower(0xD7), 0xD7);
        assert_eq!(to_upper(b'q'), b'Q');
        assert_eq!(to_upper(0xF7), 0xF7);
        assert_eq!(to_upper(b'1'), b'1');
    }

    #[test]
    fn test_set_ref_skips_null() {
        let mut args = vec![
            GlkArg::Opaque(None),
            GlkArg::PtrFlag(false),
            GlkArg::PtrFlag(true),
            GlkArg::Uint(0),
        ];
        set_ref(&mut args, 0, &[GlkArg::Uint(80)]);
        set_ref(&mut args, 1, &[GlkArg::Uint(24)]);
        assert_eq!(args[3], GlkArg::Uint(24));
        assert_eq!(args[2], GlkArg::PtrFlag(true));
    }

    #[test]
    fn test_read_line_eof() {
        let mut glk = StdioGlk::new(Cursor::new(b"look\r\n".to_vec()), Vec::new());
        assert_eq!(glk.read_line(), Ok("look".to_string()));
        assert_eq!(glk.read_line(), Err(ErrorKind::Exit));
    }
}
