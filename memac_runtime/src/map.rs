//! The access-count map and the hooks that update it.
//!
//! The map is a flat byte array split in two halves of equal size: read counters
//! first, write counters second. A hook reduces the accessed address modulo the
//! half size to pick a slot and bumps that one byte, unless the address lies in
//! the current fuzz input.
//!
//! Counters are `AtomicU8` cells, but an update is a relaxed load followed by a
//! relaxed store rather than a read-modify-write. Concurrent hits on the same slot
//! may lose increments. The map is a heuristic signal and the hot path stays a
//! plain byte load and store.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use crate::abi::{ACCESS_MAP_LEN, AccessKind, MEM_MAP_SIZE};

/// The process-wide access-count map, `[read half][write half]`.
///
/// `AtomicU8` has the same in-memory representation as `u8`, so an external
/// consumer can treat this symbol as a plain `uint8_t[2 * MEM_MAP_SIZE]`.
#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
pub static __mem_ac_ptr_local: [AtomicU8; ACCESS_MAP_LEN] =
    [const { AtomicU8::new(0) }; ACCESS_MAP_LEN];

/// First byte of the current fuzz input. Null while no input is published.
#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
pub static __input_start: AtomicPtr<u8> = AtomicPtr::new(ptr::null_mut());

/// Last byte of the current fuzz input, inclusive.
#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
pub static __input_end: AtomicPtr<u8> = AtomicPtr::new(ptr::null_mut());

/// Called by instrumented code before every load.
#[unsafe(no_mangle)]
pub extern "C" fn __libafl_hook_read(addr: u64) {
    AccessMap::global().record(AccessKind::Read, addr);
}

/// Called by instrumented code before every store.
#[unsafe(no_mangle)]
pub extern "C" fn __libafl_hook_write(addr: u64) {
    AccessMap::global().record(AccessKind::Write, addr);
}

/// Inclusive address window of the current fuzz input.
///
/// A null start is the "unset" sentinel: nothing is excluded until the harness
/// publishes a range.
#[derive(Debug, Clone, Copy)]
pub struct InputRange<'a> {
    start: &'a AtomicPtr<u8>,
    end: &'a AtomicPtr<u8>,
}

impl<'a> InputRange<'a> {
    pub fn new(start: &'a AtomicPtr<u8>, end: &'a AtomicPtr<u8>) -> Self {
        Self { start, end }
    }

    /// The range backed by the exported `__input_start` / `__input_end` symbols.
    pub fn global() -> InputRange<'static> {
        InputRange::new(&__input_start, &__input_end)
    }

    /// Publishes `[start, end]`. A `start` of 0 is indistinguishable from the
    /// unset sentinel and clears the range.
    pub fn set(&self, start: u64, end: u64) {
        // end goes first so a visible start always comes with its end
        self.end
            .store(ptr::without_provenance_mut(end as usize), Ordering::Relaxed);
        self.start.store(
            ptr::without_provenance_mut(start as usize),
            Ordering::Release,
        );
    }

    /// Publishes the bytes of `input`. An empty input clears the range.
    pub fn set_from_slice(&self, input: &[u8]) {
        if input.is_empty() {
            self.clear();
            return;
        }
        let first = input.as_ptr();
        let last = first.wrapping_add(input.len() - 1);
        self.end.store(last.cast_mut(), Ordering::Relaxed);
        self.start.store(first.cast_mut(), Ordering::Release);
    }

    /// Resets the range to the unset sentinel.
    pub fn clear(&self) {
        self.start.store(ptr::null_mut(), Ordering::Release);
        self.end.store(ptr::null_mut(), Ordering::Relaxed);
    }

    /// The published bounds, or `None` while unset.
    pub fn bounds(&self) -> Option<(u64, u64)> {
        let start = self.start.load(Ordering::Acquire);
        if start.is_null() {
            return None;
        }
        let end = self.end.load(Ordering::Relaxed);
        Some((start.addr() as u64, end.addr() as u64))
    }

    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        match self.bounds() {
            Some((start, end)) => start <= addr && addr <= end,
            None => false,
        }
    }
}

/// A view over an access-count map and the input range it honours.
#[derive(Debug, Clone, Copy)]
pub struct AccessMap<'a> {
    counters: &'a [AtomicU8],
    half_len: usize,
    input: InputRange<'a>,
}

impl<'a> AccessMap<'a> {
    /// Wraps `counters`, whose first half counts reads and second half writes.
    ///
    /// # Panics
    ///
    /// Panics if `counters` is empty or has an odd length.
    pub fn new(counters: &'a [AtomicU8], input: InputRange<'a>) -> Self {
        assert!(
            !counters.is_empty() && counters.len() % 2 == 0,
            "Access map needs a non-empty, even number of counters, got {}",
            counters.len()
        );
        Self {
            counters,
            half_len: counters.len() / 2,
            input,
        }
    }

    /// The map behind the exported symbols, as updated by the hooks.
    pub fn global() -> AccessMap<'static> {
        AccessMap {
            counters: &__mem_ac_ptr_local,
            half_len: MEM_MAP_SIZE,
            input: InputRange::global(),
        }
    }

    pub fn half_len(&self) -> usize {
        self.half_len
    }

    pub fn input(&self) -> InputRange<'a> {
        self.input
    }

    #[inline]
    pub fn slot(&self, addr: u64) -> usize {
        (addr % self.half_len as u64) as usize
    }

    /// Counts one access of `kind` at `addr`. The counter wraps from 255 to 0.
    #[inline]
    pub fn record(&self, kind: AccessKind, addr: u64) {
        if self.input.contains(addr) {
            return;
        }
        let counter = &self.counters[kind.map_offset(self.half_len) + self.slot(addr)];
        counter.store(
            counter.load(Ordering::Relaxed).wrapping_add(1),
            Ordering::Relaxed,
        );
    }

    #[inline]
    pub fn read(&self, addr: u64) {
        self.record(AccessKind::Read, addr);
    }

    #[inline]
    pub fn write(&self, addr: u64) {
        self.record(AccessKind::Write, addr);
    }

    pub fn read_count(&self, slot: usize) -> u8 {
        self.counters[slot].load(Ordering::Relaxed)
    }

    pub fn write_count(&self, slot: usize) -> u8 {
        self.counters[self.half_len + slot].load(Ordering::Relaxed)
    }

    /// Copies the whole map out, read half first.
    pub fn as_bytes_snapshot(&self) -> Vec<u8> {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// Zeroes every counter. The input range is left alone.
    pub fn reset(&self) {
        for counter in self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// An owned access-count map with its own input range, for embedders that do not
/// want the process-wide symbols.
#[derive(Debug)]
pub struct AccessMapStorage {
    counters: Box<[AtomicU8]>,
    input_start: AtomicPtr<u8>,
    input_end: AtomicPtr<u8>,
}

impl AccessMapStorage {
    /// Allocates a zeroed map with `half_len` counters per half.
    ///
    /// # Panics
    ///
    /// Panics if `half_len` is 0.
    pub fn new(half_len: usize) -> Self {
        assert!(half_len > 0, "Access map half size must be non-zero");
        Self {
            counters: (0..half_len * 2).map(|_| AtomicU8::new(0)).collect(),
            input_start: AtomicPtr::new(ptr::null_mut()),
            input_end: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn map(&self) -> AccessMap<'_> {
        AccessMap::new(
            &self.counters,
            InputRange::new(&self.input_start, &self.input_end),
        )
    }
}

impl Default for AccessMapStorage {
    fn default() -> Self {
        Self::new(MEM_MAP_SIZE)
    }
}
