use crate::dispatch::{DispatchContext, GlkArg};
use crate::exec::{ErrorKind, ExecResult};

mod stdio;

pub use stdio::StdioGlk;

/// A host-owned object (window, stream, file reference, sound channel).
/// The VM only ever sees the ID it was registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostObject(pub u64);

/// The I/O library the VM reaches through @glk and the Glk I/O system.
pub trait GlkHost {
    /// Argument prototype of a selector, or None if it is not implemented.
    fn prototype(&self, selector: u32) -> Option<&'static str>;

    fn class_count(&self) -> u32 {
        4
    }

    /// Services a call. Output slots and the return slot (the last one) are
    /// written in place.
    fn call(
        &mut self,
        selector: u32,
        args: &mut [GlkArg],
        ctx: &mut DispatchContext<'_>,
    ) -> ExecResult<()>;

    fn put_char(&mut self, ch: u8);

    fn put_char_uni(&mut self, ch: u32);

    fn write_stream(&mut self, _stream: HostObject, _data: &[u8]) -> ExecResult<()> {
        Err(ErrorKind::Io("stream output not supported".to_string()))
    }

    fn read_stream(&mut self, _stream: HostObject) -> ExecResult<Vec<u8>> {
        Err(ErrorKind::Io("stream input not supported".to_string()))
    }

    fn tick(&mut self) {}
}
