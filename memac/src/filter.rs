//! Which functions the pass leaves alone.

use memac_runtime::abi::{READ_HOOK_SYMBOL, WRITE_HOOK_SYMBOL};

/// Classifies functions that must not be instrumented, typically runtime
/// internals whose memory traffic is not the target's.
pub trait FunctionFilter: Send + Sync {
    fn is_ignored(&self, name: &str) -> bool;
}

impl<F> FunctionFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_ignored(&self, name: &str) -> bool {
        self(name)
    }
}

/// Name prefixes of compiler intrinsics, sanitizer runtimes, fuzzer runtimes and
/// libFuzzer driver internals.
const IGNORED_PREFIXES: &[&str] = &[
    "llvm.",
    "asan.",
    "msan.",
    "sancov.",
    "ign.",
    "__asan",
    "__msan",
    "__tsan",
    "__ubsan",
    "__lsan",
    "__san",
    "__sancov",
    "__afl",
    "__libafl",
    "__cmplog",
    "__libc_",
    "__cxx_",
    "__decide_deferred",
    "_GLOBAL",
    "_fini",
    "_ZZN6__asan",
    "_ZZN6__lsan",
    "LLVMFuzzerM",
    "LLVMFuzzerC",
    "LLVMFuzzerI",
];

/// Exact names of libFuzzer driver helpers.
const IGNORED_NAMES: &[&str] = &[
    "maybe_duplicate_stderr",
    "discard_output",
    "close_stdout",
    "dup_and_close_stderr",
    "maybe_close_fd_mask",
    "ExecuteFilesOnyByOne",
];

/// Skips intrinsics, runtime internals and the access hooks themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFunctionFilter;

impl FunctionFilter for DefaultFunctionFilter {
    fn is_ignored(&self, name: &str) -> bool {
        name == READ_HOOK_SYMBOL
            || name == WRITE_HOOK_SYMBOL
            || IGNORED_NAMES.contains(&name)
            || IGNORED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
    }
}

/// Instruments every function with a body.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFilter;

impl FunctionFilter for NoFilter {
    fn is_ignored(&self, _name: &str) -> bool {
        false
    }
}
