/// Machine word, used for memory cells, the instruction pointer and the
/// relative base. Several well-known programs overflow 32-bit ranges, so
/// cells are 64-bit signed.
pub type Word = i64;

/// Maximum number of parameters an instruction can carry
pub(crate) const MAX_PARAMS: usize = 3;
