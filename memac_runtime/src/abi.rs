//! Constants and symbol names shared by the instrumentation pass, the runtime and
//! the fuzzing harness. Changing any of them breaks already instrumented binaries.

/// Number of counters in each half of the access-count map.
/// Has to be a power of 2.
pub const MEM_MAP_SIZE: usize = 65536;

const _: () = assert!(MEM_MAP_SIZE.is_power_of_two());

/// Total length of the access-count map: the read half followed by the write half.
pub const ACCESS_MAP_LEN: usize = 2 * MEM_MAP_SIZE;

/// Hook called before every instrumented load.
pub const READ_HOOK_SYMBOL: &str = "__libafl_hook_read";

/// Hook called before every instrumented store.
pub const WRITE_HOOK_SYMBOL: &str = "__libafl_hook_write";

/// The exported access-count map.
pub const ACCESS_MAP_SYMBOL: &str = "__mem_ac_ptr_local";

/// First byte of the current fuzz input.
pub const INPUT_START_SYMBOL: &str = "__input_start";

/// Last byte of the current fuzz input (inclusive).
pub const INPUT_END_SYMBOL: &str = "__input_end";

/// Wasm import module the hooks are imported from.
pub const HOOK_IMPORT_MODULE: &str = "env";

/// The kind of memory access a hook call reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    /// The hook symbol instrumented code calls for this kind of access.
    pub const fn hook_symbol(self) -> &'static str {
        match self {
            AccessKind::Read => READ_HOOK_SYMBOL,
            AccessKind::Write => WRITE_HOOK_SYMBOL,
        }
    }

    /// Offset of this kind's half in a map whose halves hold `half_len` counters.
    pub const fn map_offset(self, half_len: usize) -> usize {
        match self {
            AccessKind::Read => 0,
            AccessKind::Write => half_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_half_follows_read_half() {
        assert_eq!(AccessKind::Read.map_offset(MEM_MAP_SIZE), 0);
        assert_eq!(AccessKind::Write.map_offset(MEM_MAP_SIZE), MEM_MAP_SIZE);
        assert_eq!(AccessKind::Write.map_offset(16), 16);
    }

    #[test]
    fn hook_symbols_are_distinct() {
        assert_ne!(
            AccessKind::Read.hook_symbol(),
            AccessKind::Write.hook_symbol()
        );
    }
}
