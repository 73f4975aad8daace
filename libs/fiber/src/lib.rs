//! A libray for creating and managing fibers in a cross-platform manner.
//!
//! Fibers are threads that must be manually scheduled by the client application, as opposed to
//! threads which are automatically managed and scheduled by the OS. Each fiber has its own stack
//! space and can be yield its time on the system thread to another fiber at any point during
//! execution. This allows for different forms of concurrency that can't be supported with
//! normal system threads.
//!
//! This library is meant to be the base for a fiber-pool system, in which a fixed number of worker
//! fibers are created and used to asynchronously complete units of work.
//!
//! # Fibers and Threads
//!
//! Fibers are run on top of system threads, with one fiber running on a thread at a time. Once
//! a fiber has been suspended it can be resumed on any thread (i.e the same thread it was
//! previously on or any other thread). You don't have to have multiple threads to use fibers,
//! but if only using a single thread fibers won't run in parallel. As such, it's generally best
//! to use fibers in combination with a pool of worker threads.
//!
//! Being able to move a fiber between threads also has implications for the thread-safety of
//! your code. There are a number of system primitives that don't take well to moving between
//! threads, and so you must be careful when you resume fibers. Notably, a lock held across a
//! suspension point may be released and re-acquired on two different OS threads.
//!
//! # Unsafety
//!
//! Unlike any other function in Rust, fiber procs can be suspended on one thread and resumed
//! on another, pulling any stack-owned data along with it. That means that it's possible to
//! create a `!Send` type, suspend the fiber, and resume the fiber on another thread,
//! violating the `!Send` nature of the type. As such, it's unsafe to ever call `Fiber::resume()`
//! while a `!Send` type is alive and in scope.
//!
//! # Examples
//!
//! Basic usage:
//!
//! ```
//! use fiber::Fiber;
//!
//! // Function to be run by the fiber. The return type must be `!`: a fiber proc never returns,
//! // it only ever suspends itself by resuming another fiber.
//! fn fiber_proc(suspended: Fiber) -> ! {
//!     println!("Suspended fiber: {:?}", suspended);
//!     unsafe { suspended.resume(); }
//!
//!     panic!("Uh-oh, shouldn't have resumed this fiber again");
//! }
//!
//! let fiber = Fiber::new(64 * 1024, fiber_proc);
//! let fiber_id = fiber.id();
//!
//! let prev = unsafe { fiber.resume() };
//! assert_eq!(fiber_id, prev.id());
//! ```

use crate::platform::PlatformId;
use std::cell::Cell;

#[cfg(unix)]
#[path = "platform/unix.rs"]
mod platform;

#[cfg(windows)]
#[path = "platform/windows.rs"]
mod platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(PlatformId);

// `FiberId` contains a raw pointer (at least on some platforms) so it's not `Send`/`Sync` by
// default, but it can't actually be used for anything unsafe so we manually confirm that it can
// be shared and sent between threads.
unsafe impl Send for FiberId {}
unsafe impl Sync for FiberId {}

/// Represents a fiber with its own stack and thread state.
///
/// The fiber's lifetime is associated with any data it borrows when created. A suspended `Fiber`
/// that is never resumed again should be released with [`Fiber::destroy`] to free its stack;
/// simply dropping it leaks the stack, since dropping a user-space stack safely generally
/// requires unwinding it first.
#[derive(Debug)]
pub struct Fiber(PlatformId);

/// A global cache mapping threads to their currently running fiber.
///
/// This is used by `Fiber::current()` on some platforms to keep track of which fiber is active
/// on which thread.
thread_local! {
    static PREV: Cell<Option<PlatformId>> = Cell::new(None);
    static CURRENT: Cell<Option<PlatformId>> = Cell::new(None);
}

/// Initializes the current thread, making it safe to begin using threads.
///
/// On some platforms initialization is required before using threads (e.g. on Windows versions
/// older than 7 the main thread must be converted to a fiber on startup). This function performs
/// any necessary initialization and returns the active fiber. This function must be called for all
/// spawned threads to ensure that it is safe to use fibers from those threads.
// TODO: How do we handle double-initialization? Panic or just ignore it?
pub fn init() -> FiberId {
    let platform_fiber = platform::init();

    // Initialize our thread-local cache of the current fiber.
    CURRENT.with(|current| current.set(Some(platform_fiber)));

    FiberId(platform_fiber)
}

impl Fiber {
    /// Creates a new fiber with the specified stack size and has it begin executing the specified
    /// function.
    ///
    /// The fiber isn't started -- `fiber_proc` doesn't run until this `Fiber` is first resumed.
    /// Panics if the stack (and any platform guard page) can't be allocated; callers that need
    /// to handle allocation failure gracefully should size their pools conservatively rather
    /// than relying on recovering from a panic here.
    pub fn new(stack_size: usize, fiber_proc: fn(Fiber) -> !) -> Fiber
    {
        Fiber(platform::create_fiber(stack_size, fiber_proc))
    }

    /// Makes the fiber active, consuming in the process.
    ///
    /// This suspends the current fiber so that the resumed fiber can run in its place. At a later
    /// point another fiber may resume the current one, at which point `resume()` will return,
    /// yielding the fiber that was suspended.
    ///
    /// # Safety
    ///
    /// See the crate-level `Unsafety` section: no `!Send` value may be alive across this call.
    pub unsafe fn resume(self) -> Fiber {
        // Initialize the current thread for fiber usage if we haven't done so already.
        if CURRENT.with(|current| current.get()).is_none() {
            init();
        }

        {
            let prev_handle = CURRENT.with(|current| {
                let prev = current.get();
                current.set(Some(self.0));
                prev
            });
            PREV.with(|prev| prev.set(prev_handle));
        }

        // Switch to `self`. Safety: delegated to the caller of this function.
        unsafe {
            platform::resume(self.0);
        }

        // This is explicitly a different scope than before to avoid cross-contamination. We can't
        // make any assumptions about what was true before and after resuming another fiber, so we
        // enforce that we don't accidentally reuse any local variables. Only `PREV` and `CURRENT`
        // are safe to use.
        {
            let prev_fiber = PREV.with(|prev| prev.get().expect("PREV as None after resuming"));
            Fiber(prev_fiber)
        }
    }

    /// Retuns the fiber's unique ID.
    pub fn id(&self) -> FiberId {
        FiberId(self.0)
    }

    /// Destroys a suspended fiber, releasing its stack.
    ///
    /// # Safety
    ///
    /// `self` must not be the fiber currently running on any thread, and must never be resumed
    /// again after this call.
    pub unsafe fn destroy(self) {
        // Safety: delegated to the caller.
        unsafe {
            platform::destroy(self.0);
        }
    }
}

// `Fiber` has pointers internally (at least on some platforms) so we need to manually implement
// `Send` and `Sync`. Sending should always be safe since fibers are designed to move between
// threads. The only thing potentially unsafe about sharing would be trying to resume a fiber
// on two different threads, but the signature of `Fiber::resume()` statically prevents that.
unsafe impl Send for Fiber {}
unsafe impl Sync for Fiber {}

/// Returns the fiber that is currently executing on this thread.
///
/// Returns `None` if `init()` has not yet been called on this thread.
pub fn current() -> Option<FiberId> {
    CURRENT.with(|current| current.get()).map(|platform_fiber| FiberId(platform_fiber))
}
