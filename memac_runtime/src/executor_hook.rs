//! Glue between the access-count map and `libafl` executors.
//!
//! [`MemacHook`] publishes the bytes of the input under test as the excluded input
//! range right before the target runs and clears it right after, so no execution
//! ever sees the bounds of a previous one. [`access_map_observer`] exposes the
//! exported map to `libafl` feedbacks.

use std::borrow::Cow;

use libafl::executors::hooks::ExecutorHook;
use libafl::inputs::HasTargetBytes;
use libafl::observers::map::StdMapObserver;
use libafl_bolts::ownedref::OwnedMutSlice;

use crate::abi::ACCESS_MAP_LEN;
use crate::map::{InputRange, __mem_ac_ptr_local};

/// The hook to log the bounds of the input buffer.
///
/// The range points at the input's target bytes. A harness that copies the input
/// before handing it to the target will not see its reads excluded.
#[derive(Debug, Clone, Copy)]
pub struct MemacHook<'a> {
    range: InputRange<'a>,
}

impl Default for MemacHook<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl MemacHook<'static> {
    /// A hook writing the exported `__input_start` / `__input_end` symbols.
    #[must_use]
    pub fn new() -> Self {
        Self::with_range(InputRange::global())
    }
}

impl<'a> MemacHook<'a> {
    #[must_use]
    pub fn with_range(range: InputRange<'a>) -> Self {
        Self { range }
    }
}

impl<I, S> ExecutorHook<I, S> for MemacHook<'_>
where
    I: HasTargetBytes,
{
    fn init(&mut self, _state: &mut S) {
        self.range.clear();
    }

    fn pre_exec(&mut self, _state: &mut S, input: &I) {
        let bytes = input.target_bytes();
        self.range.set_from_slice(&bytes);
    }

    fn post_exec(&mut self, _state: &mut S, _input: &I) {
        self.range.clear();
    }
}

/// Raw pointer to the exported access-count map.
#[must_use]
pub fn access_map_mut_ptr() -> *mut u8 {
    __mem_ac_ptr_local.as_ptr().cast::<u8>().cast_mut()
}

/// Gets a new [`StdMapObserver`] over the exported access-count map, both halves.
///
/// # Safety
///
/// The observer writes the map through a raw pointer when it resets it. No
/// instrumented code may run concurrently with the reset.
pub unsafe fn access_map_observer<N>(name: N) -> StdMapObserver<'static, u8, false>
where
    N: Into<Cow<'static, str>>,
{
    unsafe {
        StdMapObserver::from_mut_slice(
            name,
            OwnedMutSlice::from_raw_parts_mut(access_map_mut_ptr(), ACCESS_MAP_LEN),
        )
    }
}
