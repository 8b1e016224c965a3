/// The Glulx version this interpreter implements.
pub const VERSION: u32 = 0x0003_0101;

pub mod selector {
    pub const GLULX_VERSION: u32 = 0;
    pub const TERP_VERSION: u32 = 1;
    pub const RESIZE_MEM: u32 = 2;
    pub const UNDO: u32 = 3;
    pub const IO_SYSTEM: u32 = 4;
    pub const UNICODE: u32 = 5;
    pub const MEM_COPY: u32 = 6;
    pub const MALLOC: u32 = 7;
    pub const MALLOC_HEAP: u32 = 8;
    pub const ACCELERATION: u32 = 9;
    pub const ACCEL_FUNC: u32 = 10;
    pub const FLOAT: u32 = 11;
}

// crate version packed as 0x00MMmmpp
fn terp_version() -> u32 {
    let part = |s: &str| s.parse::<u32>().unwrap_or(0) & 0xFF;
    part(env!("CARGO_PKG_VERSION_MAJOR")) << 16
        | part(env!("CARGO_PKG_VERSION_MINOR")) << 8
        | part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Answers @gestalt. Unknown selectors return 0.
pub fn query(sel: u32, arg: u32, heap_start: u32) -> u32 {
    use selector::*;
    match sel {
        GLULX_VERSION => VERSION,
        TERP_VERSION => terp_version(),
        RESIZE_MEM | UNDO | UNICODE | MEM_COPY | MALLOC => 1,
        IO_SYSTEM => match arg {
            1 | 2 => 1,
            _ => 0,
        },
        MALLOC_HEAP => heap_start,
        ACCELERATION | ACCEL_FUNC | FLOAT => 0,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query() {
        assert_eq!(query(selector::GLULX_VERSION, 0, 0), 0x0003_0101);
        assert_eq!(query(selector::TERP_VERSION, 0, 0), 0x0000_0100);
        assert_eq!(query(selector::IO_SYSTEM, 0, 0), 0);
        assert_eq!(query(selector::IO_SYSTEM, 1, 0), 1);
        assert_eq!(query(selector::IO_SYSTEM, 2, 0), 1);
        assert_eq!(query(selector::IO_SYSTEM, 20, 0), 0);
        assert_eq!(query(selector::MALLOC_HEAP, 0, 0x1200), 0x1200);
        assert_eq!(query(selector::FLOAT, 0, 0), 0);
        assert_eq!(query(0x1234, 0, 0), 0);
    }
}
