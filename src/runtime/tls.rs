//! Thread local storage for the runtime.
//! Encapsulates the single `RefCell` so borrows never outlive a helper call.

use std::cell::RefCell;

/// Cache padded to avoid potential performance hit due to false sharing.
#[repr(align(128))]
struct Runtime(RefCell<Option<super::RuntimeState>>);

thread_local! {
    /// Each thread gets its own independent runtime.
    static RUNTIME: Runtime = Runtime(RefCell::new(None));
}

/// Installs `state` as this thread's runtime for the duration of `f`.
///
/// # Panics
/// If a runtime is already installed on this thread.
pub(super) fn exclusive_runtime<T>(state: super::RuntimeState, f: impl FnOnce() -> T) -> T {
    RUNTIME.with(|thread_local| {
        let mut cell = thread_local.0.borrow_mut();
        assert!(
            cell.is_none(),
            "nested runtime::start is forbidden, start a driver instead"
        );
        *cell = Some(state);
    });

    // uninstalls even if `f` unwinds, so the thread can host another runtime
    let _guard = Uninstall;

    f()
}

struct Uninstall;

impl Drop for Uninstall {
    fn drop(&mut self) {
        // Destructors of drivers and channels must not see the runtime as borrowed.
        // Take the state out first, drop it after the borrow ends.
        let state = RUNTIME.with(|thread_local| thread_local.0.borrow_mut().take());
        drop(state);
    }
}

/// Borrow the runtime of the current thread.
///
/// # Panics
/// If called outside of [`super::start`].
pub(super) fn runtime<T>(f: impl FnOnce(&mut super::RuntimeState) -> T) -> T {
    RUNTIME.with(|thread_local| {
        let mut cell = thread_local.0.borrow_mut();
        let runtime = cell
            .as_mut()
            .expect("no runtime on this thread, call aryn::runtime::start first");
        f(runtime)
    })
}

/// Borrow the runtime of the current thread, if there is one.
pub(super) fn try_runtime<T>(f: impl FnOnce(&mut super::RuntimeState) -> T) -> Option<T> {
    RUNTIME.with(|thread_local| {
        let mut cell = thread_local.0.borrow_mut();
        cell.as_mut().map(f)
    })
}
