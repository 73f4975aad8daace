use fiber::Fiber;

#[test]
fn basic_usage() {
    fn fiber_proc(suspended: Fiber) -> ! {
        println!("Suspended fiber: {:?}", suspended);
        unsafe {
            suspended.resume();
        }

        panic!("Uh-oh, shouldn't have resumed this fiber again");
    }

    let fiber = Fiber::new(64 * 1024, fiber_proc);
    let fiber_id = fiber.id();

    let prev = unsafe { fiber.resume() };
    assert_eq!(fiber_id, prev.id());
}

#[test]
fn fiber_can_suspend_multiple_times() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNT: AtomicUsize = AtomicUsize::new(0);

    fn fiber_proc(mut suspended: Fiber) -> ! {
        loop {
            COUNT.fetch_add(1, Ordering::SeqCst);
            suspended = unsafe { suspended.resume() };
        }
    }

    let fiber = Fiber::new(64 * 1024, fiber_proc);
    let mut current = fiber;

    for expected in 1..=5 {
        current = unsafe { current.resume() };
        assert_eq!(COUNT.load(Ordering::SeqCst), expected);
    }
}

#[test]
fn fiber_writes_are_visible_after_resuming() {
    use std::cell::Cell;

    thread_local! {
        static SEEN: Cell<i32> = Cell::new(0);
    }

    fn fiber_proc(suspended: Fiber) -> ! {
        SEEN.with(|seen| seen.set(42));
        unsafe {
            suspended.resume();
        }
        unreachable!("fiber should never be resumed a second time in this test");
    }

    let fiber = Fiber::new(64 * 1024, fiber_proc);
    let _prev = unsafe { fiber.resume() };

    SEEN.with(|seen| assert_eq!(seen.get(), 42));
}
