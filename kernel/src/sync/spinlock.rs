/*
 * Interrupt-Disabling Spin Lock
 *
 * A mutual-exclusion lock that turns interrupts off on the acquiring CPU for
 * as long as it is held. Interrupt state is tracked per CPU with a nesting
 * counter (push_off / pop_off), so nested locks only re-enable interrupts
 * when the outermost one is released, and only if they were enabled before
 * the first acquisition.
 *
 * The lock remembers which CPU owns it. `holding` is what the scheduler uses
 * to assert that a process enters `sched` with exactly its own PCB lock.
 *
 * A guard may be released by a different kernel thread than the one that
 * created it: the scheduler acquires a PCB lock, switches into the process,
 * and the process releases it (and vice versa). `force_unlock` exists for the
 * one place where no guard object is available, the first return of a newly
 * created process.
 */

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Per-CPU interrupt bookkeeping used by spin locks.
///
/// Implemented by the kernel on top of the platform's interrupt controls.
pub trait IrqControl: Sync {
    /// Disable interrupts and bump this CPU's nesting depth.
    ///
    /// The first call on a CPU records whether interrupts were enabled.
    fn push_off(&self);

    /// Undo one `push_off`; interrupts come back on when the depth reaches
    /// zero and they were enabled at the first `push_off`.
    fn pop_off(&self);

    /// Index of the CPU executing the caller.
    fn cpu_id(&self) -> usize;
}

const NO_OWNER: usize = usize::MAX;

/// Interrupt-disabling spin lock
pub struct SpinLock<T> {
    name: &'static str,
    locked: AtomicBool,
    owner: AtomicUsize,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create a new unlocked spin lock
    ///
    /// # Arguments
    /// - `name`: Shown in diagnostics when a lock invariant is violated
    /// - `data`: The protected value
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(NO_OWNER),
            data: UnsafeCell::new(data),
        }
    }

    /// Lock name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock, spinning until it is free.
    ///
    /// Interrupts stay disabled on this CPU until the guard is dropped.
    /// Acquiring a lock this CPU already holds is a fatal error.
    pub fn lock<'a>(&'a self, irq: &'a dyn IrqControl) -> SpinGuard<'a, T> {
        irq.push_off();
        if self.holding(irq) {
            panic!("acquire: {} already held by cpu {}", self.name, irq.cpu_id());
        }

        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        self.owner.store(irq.cpu_id(), Ordering::Relaxed);

        SpinGuard { lock: self, irq }
    }

    /// Whether the calling CPU holds this lock.
    ///
    /// Must be called with interrupts disabled for the answer to stay valid.
    pub fn holding(&self, irq: &dyn IrqControl) -> bool {
        self.locked.load(Ordering::Relaxed) && self.owner.load(Ordering::Relaxed) == irq.cpu_id()
    }

    /// Release a lock acquired through a guard that was never dropped.
    ///
    /// # Safety
    /// The calling CPU must hold the lock, and the guard that acquired it
    /// must never be used or dropped afterwards.
    pub unsafe fn force_unlock(&self, irq: &dyn IrqControl) {
        self.release(irq);
    }

    fn release(&self, irq: &dyn IrqControl) {
        if !self.holding(irq) {
            panic!("release: {} not held by cpu {}", self.name, irq.cpu_id());
        }
        self.owner.store(NO_OWNER, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        irq.pop_off();
    }
}

/// Guard returned by `SpinLock::lock`.
///
/// Releases the lock and restores the interrupt nesting depth on drop.
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
    irq: &'a dyn IrqControl,
}

impl<'a, T> SpinGuard<'a, T> {
    /// The lock this guard was obtained from
    pub fn source(this: &Self) -> &'a SpinLock<T> {
        this.lock
    }

    /// Whether the current CPU is the lock's owner
    pub fn holding(this: &Self) -> bool {
        this.lock.holding(this.irq)
    }
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release(self.irq);
    }
}
