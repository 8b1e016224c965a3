/// Settings an embedder can choose when loading a story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Overrides the header's stack size.
    pub stack_size: Option<u32>,
    /// Snapshots kept for @restoreundo; 0 disables undo.
    pub undo_depth: usize,
    /// Fixed seed for the random number generator.
    pub rng_seed: Option<u64>,
    pub verify_checksum: bool,
    /// Stop `run` after this many instructions.
    pub instruction_limit: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            stack_size: None,
            undo_depth: 8,
            rng_seed: None,
            verify_checksum: true,
            instruction_limit: None,
        }
    }
}
