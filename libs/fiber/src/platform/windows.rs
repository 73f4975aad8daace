//! Windows fiber backend built on the native Win32 fiber API.
//!
//! Windows already exposes exactly the primitive this crate needs --
//! `ConvertThreadToFiber`/`CreateFiber`/`SwitchToFiber` -- so this backend is a thin wrapper
//! around it rather than hand-rolled assembly.

use windows_sys::Win32::System::Threading::{
    ConvertThreadToFiber, CreateFiber, DeleteFiber, SwitchToFiber,
};

use crate::{Fiber, PREV};

pub type PlatformId = *mut core::ffi::c_void;

pub fn init() -> PlatformId {
    // Safety: always safe to call; `ConvertThreadToFiber` only touches thread-local OS state.
    let fiber = unsafe { ConvertThreadToFiber(std::ptr::null_mut()) };

    assert!(!fiber.is_null(), "fiber: failed to convert thread to a fiber");

    fiber
}

pub fn create_fiber(stack_size: usize, func: fn(Fiber) -> !) -> PlatformId {
    // Safety: `fiber_proc` matches the `LPFIBER_START_ROUTINE` signature and `func` is a plain
    // function pointer, valid for the lifetime of the process.
    let fiber = unsafe {
        CreateFiber(
            stack_size,
            Some(fiber_proc),
            func as usize as *mut core::ffi::c_void,
        )
    };

    assert!(!fiber.is_null(), "fiber: failed to create fiber");

    fiber
}

/// # Safety
///
/// See `Fiber::resume`: `fiber` must be a live platform id not already running elsewhere, and
/// `CURRENT`/`PREV` must already reflect the switch the caller is about to make.
pub unsafe fn resume(fiber: PlatformId) {
    // Safety: `fiber` was produced by `init`/`create_fiber` and isn't running on another thread.
    unsafe {
        SwitchToFiber(fiber);
    }
}

/// # Safety
///
/// `fiber` must not be running on any thread and must never be resumed again.
pub unsafe fn destroy(fiber: PlatformId) {
    // Safety: delegated to the caller; `DeleteFiber` releases the fiber's stack.
    unsafe {
        DeleteFiber(fiber);
    }
}

unsafe extern "system" fn fiber_proc(data: *mut core::ffi::c_void) {
    // Safety: `data` was produced by `create_fiber` from a real `fn(Fiber) -> !`.
    let func: fn(Fiber) -> ! = unsafe { std::mem::transmute(data) };
    let prev_fiber = PREV.with(|prev| prev.get().expect("PREV was None in fiber_proc()"));

    func(Fiber(prev_fiber));
}
