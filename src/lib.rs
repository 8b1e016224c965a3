#[macro_use]
extern crate lazy_static;

pub mod blorb;
pub mod decode;
pub mod dispatch;
pub mod exec;
pub mod gestalt;
pub mod interface;
pub mod memory;
pub mod options;
pub mod save;
pub mod text;

mod iff;
mod util;

#[cfg(test)]
mod test_util;

pub use exec::{ErrorKind, ExecResult, ExitReason, Glulx};
pub use interface::{GlkHost, HostObject, StdioGlk};
pub use options::Options;
