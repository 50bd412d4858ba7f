use std::fmt;

use memac_runtime::AccessKind;
use memac_runtime::abi::READ_HOOK_SYMBOL;
use slog::{Discard, Logger, o};

use crate::filter::{DefaultFunctionFilter, FunctionFilter};

/// Settings shared by the IR pass and the Wasm front end.
pub struct InstrumentationConfig {
    logger: Logger,
    filter: Box<dyn FunctionFilter>,
    legacy_shared_hook: bool,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentationConfig {
    /// Logs nothing, skips runtime internals, and wires writes to the write hook.
    pub fn new() -> Self {
        Self {
            logger: Logger::root(Discard, o!()),
            filter: Box::new(DefaultFunctionFilter),
            legacy_shared_hook: false,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_filter<F: FunctionFilter + 'static>(mut self, filter: F) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Makes store sites call the read hook, as binaries built by the first
    /// LLVM version of this pass do. Their write half of the map stays empty
    /// and writes are counted as reads.
    pub fn legacy_shared_hook(mut self, enabled: bool) -> Self {
        self.legacy_shared_hook = enabled;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn filter(&self) -> &dyn FunctionFilter {
        self.filter.as_ref()
    }

    pub fn is_legacy_shared_hook(&self) -> bool {
        self.legacy_shared_hook
    }

    /// The hook symbol emitted for accesses of `kind`.
    pub fn hook_symbol(&self, kind: AccessKind) -> &'static str {
        match kind {
            AccessKind::Write if self.legacy_shared_hook => READ_HOOK_SYMBOL,
            kind => kind.hook_symbol(),
        }
    }
}

impl fmt::Debug for InstrumentationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationConfig")
            .field("legacy_shared_hook", &self.legacy_shared_hook)
            .finish_non_exhaustive()
    }
}
