//! Unix fiber backend built on POSIX `ucontext.h`.
//!
//! `getcontext`/`makecontext`/`swapcontext` are the portable, already-available primitive for
//! saving and restoring a full register + stack pointer state, so this backend is built directly
//! on them via `libc` rather than hand-written per-architecture assembly.
//!
//! Each fiber owns a heap-allocated [`FiberState`]: its `ucontext_t` (which doubles as both the
//! initial target of `makecontext` and the save-slot used whenever this fiber is later suspended)
//! and its stack, which is `mmap`-allocated with a guarded low page so a stack overflow faults
//! instead of silently corrupting an adjacent allocation.

use std::mem::MaybeUninit;
use std::ptr;

use crate::{CURRENT, Fiber, PREV};

pub type PlatformId = *mut FiberState;

/// Number of guard pages placed below the usable stack region.
const GUARD_PAGES: usize = 1;

pub struct FiberState {
    ctx: libc::ucontext_t,
    /// `None` for the context representing a thread's own (non-fiber-allocated) stack.
    stack: Option<Stack>,
    func: Option<fn(Fiber) -> !>,
}

struct Stack {
    /// Base of the full mapping, including the guard page(s).
    map_base: *mut libc::c_void,
    map_len: usize,
    /// Address usable stack memory starts at (after the guard page).
    usable_base: *mut libc::c_void,
    usable_len: usize,
}

fn page_size() -> usize {
    // Safety: `sysconf` with this argument never fails in practice and has no preconditions.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) / multiple * multiple
}

impl Stack {
    fn allocate(requested_size: usize) -> Stack {
        let page = page_size();
        let usable_len = round_up(requested_size.max(page), page);
        let guard_len = GUARD_PAGES * page;
        let map_len = usable_len + guard_len;

        // Safety: a fixed-size anonymous, non-file-backed mapping with valid arguments.
        let map_base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(
            map_base,
            libc::MAP_FAILED,
            "fiber: failed to mmap a {map_len}-byte stack"
        );

        // Safety: `usable_base` falls within the mapping just created above.
        let usable_base = unsafe { map_base.add(guard_len) };
        // Safety: `usable_base`/`usable_len` describe memory inside `map_base`/`map_len`.
        let rc = unsafe {
            libc::mprotect(
                usable_base,
                usable_len,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        assert_eq!(rc, 0, "fiber: failed to mprotect fiber stack as read/write");

        Stack {
            map_base,
            map_len,
            usable_base,
            usable_len,
        }
    }

}

impl Drop for Stack {
    fn drop(&mut self) {
        // Safety: `map_base`/`map_len` describe exactly the mapping `mmap` returned.
        unsafe {
            libc::munmap(self.map_base, self.map_len);
        }
    }
}

extern "C" fn trampoline() {
    // Safety: `trampoline` is only ever entered via `makecontext`/`swapcontext` immediately
    // after `Fiber::resume` has set `CURRENT` to this fiber's platform id.
    let state_ptr = CURRENT.with(|c| c.get()).expect("fiber: no current fiber in trampoline");
    let prev_platform = PREV
        .with(|p| p.get())
        .expect("fiber: PREV was None in trampoline");

    let func = unsafe { (*state_ptr).func.take() }.expect("fiber: trampoline entered twice");

    func(Fiber(prev_platform));
}

pub fn init() -> PlatformId {
    let mut ctx = MaybeUninit::<libc::ucontext_t>::uninit();
    // Safety: `ctx` is large enough and `getcontext` only requires a valid pointer.
    unsafe {
        libc::getcontext(ctx.as_mut_ptr());
    }

    // The thread's own execution context has no backing `Stack` we own -- we never switch into
    // it via `makecontext`, only ever save into it and restore from it.
    let state = Box::new(FiberState {
        // Safety: fully initialized by `getcontext` above.
        ctx: unsafe { ctx.assume_init() },
        stack: None,
        func: None,
    });

    Box::into_raw(state)
}

pub fn create_fiber(stack_size: usize, func: fn(Fiber) -> !) -> PlatformId {
    let stack = Stack::allocate(stack_size);

    let mut ctx = MaybeUninit::<libc::ucontext_t>::uninit();
    // Safety: `ctx` is large enough and `getcontext` only requires a valid pointer.
    unsafe {
        libc::getcontext(ctx.as_mut_ptr());
    }
    let mut ctx = unsafe { ctx.assume_init() };

    ctx.uc_stack.ss_sp = stack.usable_base;
    ctx.uc_stack.ss_size = stack.usable_len;
    ctx.uc_link = ptr::null_mut();

    // Safety: `ctx` was just initialized by `getcontext` and `uc_stack` points at valid,
    // writable memory of the given size; `trampoline` takes no arguments, matching the `0`
    // passed here.
    unsafe {
        libc::makecontext(&mut ctx, trampoline, 0);
    }

    let state = Box::new(FiberState {
        ctx,
        stack: Some(stack),
        func: Some(func),
    });

    Box::into_raw(state)
}

/// # Safety
///
/// `target` must be a live `PlatformId` produced by `init`/`create_fiber` that isn't already
/// running on another thread, and `CURRENT` must already have been updated to `target` by the
/// caller (see `Fiber::resume`).
pub unsafe fn resume(target: PlatformId) {
    // `Fiber::resume` has already pointed `CURRENT` at `target` and `PREV` at the fiber that
    // was running just before this call -- that's the context we need to save into.
    let from = PREV
        .with(|p| p.get())
        .expect("fiber: PREV was None before resuming");

    // Safety: both `from` and `target` are valid, non-aliased `FiberState` pointers; `target`
    // is not concurrently running anywhere else because `Fiber::resume` consumes its `Fiber`.
    unsafe {
        libc::swapcontext(&mut (*from).ctx, &(*target).ctx);
    }
}

/// # Safety
///
/// `fiber` must not be running on any thread and must never be resumed again.
pub unsafe fn destroy(fiber: PlatformId) {
    // Safety: `fiber` was produced by `Box::into_raw` in `init`/`create_fiber` and the caller
    // guarantees it is no longer referenced by any `Fiber`/`FiberId`.
    unsafe {
        drop(Box::from_raw(fiber));
    }
}
