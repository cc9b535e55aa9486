//! The continuation primitive: the saved execution state of a
//! suspended process.
//!
//! On a bare-metal target this would be a stack-pointer/register
//! snapshot restored with an `iret`. Hosted, every process owns a
//! dedicated OS thread and the continuation degenerates to a resume
//! token the thread parks on; the suspend/resume points are exactly the
//! ones the register-level switch would have. A switch is performed by
//! resuming the target while the kernel lock is still held and parking
//! the caller after releasing it; a resume that arrives before the park
//! is not lost.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    resumed: Mutex<bool>,
    cond: Condvar,
}

impl Context {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                resumed: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    fn token(&self) -> MutexGuard<'_, bool> {
        // The token mutex only ever guards a bool store; a poisoned
        // token is still usable.
        self.inner
            .resumed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Marks the continuation runnable. Never blocks.
    pub(crate) fn resume(&self) {
        let mut resumed = self.token();
        *resumed = true;
        self.inner.cond.notify_one();
    }

    /// Parks the calling thread until `resume` is called, consuming the
    /// resume token.
    pub(crate) fn wait(&self) {
        let mut resumed = self.token();
        while !*resumed {
            resumed = self
                .inner
                .cond
                .wait(resumed)
                .unwrap_or_else(|e| e.into_inner());
        }
        *resumed = false;
    }
}
