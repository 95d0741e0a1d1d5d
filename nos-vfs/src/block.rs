//! Blocking bridge to the scheduler
//!
//! Backends that must wait on a data-dependent condition (pipe and socket
//! buffers, tty input, pending connections) call [`block`] with a predicate.
//! The installed [`Scheduler`] suspends the caller until the predicate is
//! observed true. Wakeups are not exclusive, so callers re-check their
//! condition under the data lock after `block` returns and loop if it raced.
//!
//! No lock may be held across a call to [`block`].

use core::hint::spin_loop;

use spin::Once;

use crate::error::VfsResult;

/// Suspend/resume contract offered by the process subsystem
pub trait Scheduler: Send + Sync {
    /// Suspend the caller until `should_unblock` returns true.
    ///
    /// Returns `Err(VfsError::Interrupted)` if the wait was cut short by a
    /// signal; no data has been transferred in that case.
    fn block(&self, should_unblock: &mut dyn FnMut() -> bool) -> VfsResult<()>;

    /// Hint that some predicate may have become true.
    fn wake_all(&self) {}
}

/// Scheduler used before one is installed: busy-polls the predicate.
pub struct PollingScheduler;

impl Scheduler for PollingScheduler {
    fn block(&self, should_unblock: &mut dyn FnMut() -> bool) -> VfsResult<()> {
        while !should_unblock() {
            spin_loop();
        }
        Ok(())
    }
}

static SCHEDULER: Once<&'static dyn Scheduler> = Once::new();
static POLLING: PollingScheduler = PollingScheduler;

/// Install the process scheduler. Only the first call takes effect.
pub fn install(scheduler: &'static dyn Scheduler) -> bool {
    let mut installed = false;
    SCHEDULER.call_once(|| {
        installed = true;
        scheduler
    });
    installed
}

fn scheduler() -> &'static dyn Scheduler {
    match SCHEDULER.get() {
        Some(scheduler) => *scheduler,
        None => &POLLING,
    }
}

/// Block until `should_unblock` holds.
///
/// The predicate is evaluated once before suspending so the common
/// no-wait case never enters the scheduler.
pub fn block(mut should_unblock: impl FnMut() -> bool) -> VfsResult<()> {
    if should_unblock() {
        return Ok(());
    }
    scheduler().block(&mut should_unblock)
}

/// Notify the scheduler that waiters should re-evaluate their predicates.
pub fn wake() {
    scheduler().wake_all();
}
