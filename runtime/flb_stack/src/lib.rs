//! Stack safety utilities for the evaluation runtime.
//!
//! Two separate concerns live here:
//!
//! - [`ensure_sufficient_stack`] grows the native stack on demand for the
//!   few places that recurse over user-controlled depth (deadlock graph
//!   expansion, nested frame construction).
//! - [`InlineGuard`] counts how many continuations the current thread is
//!   running nested inside one another. The scheduler runs a continuation
//!   inline only while the count is below its configured bound and hands it
//!   to the worker pool otherwise, which keeps long continuation chains from
//!   growing the stack without limit (a trampoline).
//!
//! # Platform Support
//!
//! - **Native targets**: Uses the `stacker` crate to grow the stack on demand.
//! - **WASM targets**: No-op passthrough (WASM has its own stack management).
//!
//! # Configuration
//!
//! - **Red zone**: 100KB - If less than this remains, we grow the stack
//! - **Growth size**: 1MB - Each growth allocates this much additional space

use std::cell::Cell;
use std::marker::PhantomData;

/// Minimum stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Ensure sufficient stack space is available before executing `f`.
///
/// If the remaining stack is below the red zone threshold, this will
/// allocate additional stack space before calling `f`.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM version - just call directly (WASM has its own stack management).
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

thread_local! {
    static INLINE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Number of continuations currently nested on this thread.
pub fn inline_depth() -> usize {
    INLINE_DEPTH.with(Cell::get)
}

/// Marks one level of inline continuation nesting on the current thread.
///
/// Dropping the guard releases the level. The guard is deliberately
/// `!Send`: it must be released on the thread that took it.
#[must_use = "the nesting level is released as soon as the guard is dropped"]
pub struct InlineGuard {
    _thread_bound: PhantomData<*const ()>,
}

impl InlineGuard {
    /// Take one nesting level if the thread is below `limit`.
    ///
    /// Returns `None` when the caller should defer its work to a fresh
    /// stack instead of running it inline.
    pub fn try_enter(limit: usize) -> Option<InlineGuard> {
        INLINE_DEPTH.with(|depth| {
            let current = depth.get();
            if current < limit {
                depth.set(current + 1);
                Some(InlineGuard {
                    _thread_bound: PhantomData,
                })
            } else {
                None
            }
        })
    }
}

impl Drop for InlineGuard {
    fn drop(&mut self) {
        INLINE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_recursion() {
        fn deep_recurse(n: u64) -> u64 {
            ensure_sufficient_stack(|| if n == 0 { 0 } else { deep_recurse(n - 1) + 1 })
        }

        assert_eq!(deep_recurse(100_000), 100_000);
    }

    #[test]
    fn test_guard_counts_nesting() {
        assert_eq!(inline_depth(), 0);
        let outer = InlineGuard::try_enter(2);
        assert!(outer.is_some());
        assert_eq!(inline_depth(), 1);
        {
            let inner = InlineGuard::try_enter(2);
            assert!(inner.is_some());
            assert_eq!(inline_depth(), 2);
            assert!(InlineGuard::try_enter(2).is_none());
        }
        assert_eq!(inline_depth(), 1);
        drop(outer);
        assert_eq!(inline_depth(), 0);
    }

    #[test]
    fn test_zero_limit_never_inlines() {
        assert!(InlineGuard::try_enter(0).is_none());
        assert_eq!(inline_depth(), 0);
    }

    #[test]
    fn test_depth_is_per_thread() {
        let _guard = InlineGuard::try_enter(1);
        let other = std::thread::spawn(|| {
            let entered = InlineGuard::try_enter(1).is_some();
            (entered, inline_depth())
        })
        .join();
        assert_eq!(other.ok(), Some((true, 0)));
    }
}
