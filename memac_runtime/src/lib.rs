//! Run-time half of the memory-access ("memac") instrumentation.
//!
//! Code rewritten by the `memac` pass calls [`map::__libafl_hook_read`] before every
//! load and [`map::__libafl_hook_write`] before every store, passing the accessed
//! address. The hooks bump a byte counter in a fixed-size, process-wide
//! access-count map that a fuzzer reads back after each execution as feedback.
//!
//! Addresses inside the current fuzz input are not counted. The harness publishes
//! the input bounds before each run, either by hand through [`map::InputRange`] or,
//! with the `libafl` feature, through [`executor_hook::MemacHook`].
//!
//! ```
//! use memac_runtime::{AccessKind, AccessMapStorage};
//!
//! let storage = AccessMapStorage::new(16);
//! let map = storage.map();
//! map.record(AccessKind::Read, 20);
//! map.record(AccessKind::Write, 36);
//! assert_eq!(map.read_count(4), 1);
//! assert_eq!(map.write_count(4), 1);
//! ```
pub mod abi;
pub mod map;

#[cfg(feature = "libafl")]
pub mod executor_hook;

pub use abi::{ACCESS_MAP_LEN, AccessKind, MEM_MAP_SIZE};
pub use map::{AccessMap, AccessMapStorage, InputRange};

// re-export libAFL and libAFL_bolts
#[cfg(feature = "libafl")]
pub use libafl;
#[cfg(feature = "libafl")]
pub use libafl_bolts;
