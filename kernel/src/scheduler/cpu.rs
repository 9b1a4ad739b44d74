/*
 * Per-CPU State
 *
 * Each CPU records the process it is running, the context of its scheduler
 * loop, and the interrupt nesting state used by spin locks. A CPU only ever
 * touches its own entry, and only with interrupts disabled, so the atomics
 * here need no ordering stronger than Relaxed.
 */

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::platform::{Context, Platform};
use crate::sync::IrqControl;

use super::Kernel;
use super::types::CpuId;

const IDLE: usize = usize::MAX;

/// Per-CPU scheduling state
pub struct Cpu {
    id: CpuId,
    /// Slot of the process running here, or IDLE
    proc: AtomicUsize,
    /// Scheduler loop context; switched to by `sched`
    context: UnsafeCell<Context>,
    /// Depth of push_off nesting
    noff: AtomicU32,
    /// Were interrupts enabled before the outermost push_off?
    intena: AtomicBool,
}

// SAFETY: a Cpu is only mutated by the CPU it describes, with interrupts off
unsafe impl Sync for Cpu {}

impl Cpu {
    pub fn new(id: CpuId) -> Self {
        Self {
            id,
            proc: AtomicUsize::new(IDLE),
            context: UnsafeCell::new(Context::default()),
            noff: AtomicU32::new(0),
            intena: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> CpuId {
        self.id
    }

    /// Slot of the process running on this CPU
    pub fn proc(&self) -> Option<usize> {
        match self.proc.load(Ordering::Relaxed) {
            IDLE => None,
            slot => Some(slot),
        }
    }

    pub(crate) fn set_proc(&self, slot: Option<usize>) {
        self.proc.store(slot.unwrap_or(IDLE), Ordering::Relaxed);
    }

    /// Where the scheduler loop's registers are saved
    pub(crate) fn context_ptr(&self) -> *mut Context {
        self.context.get()
    }

    pub fn noff(&self) -> u32 {
        self.noff.load(Ordering::Relaxed)
    }

    pub fn intena(&self) -> bool {
        self.intena.load(Ordering::Relaxed)
    }

    pub(crate) fn set_intena(&self, on: bool) {
        self.intena.store(on, Ordering::Relaxed);
    }

    /// Enter one level of interrupt-off nesting
    ///
    /// # Arguments
    /// - `was_enabled`: interrupt state sampled before disabling
    pub(crate) fn push(&self, was_enabled: bool) {
        if self.noff() == 0 {
            self.set_intena(was_enabled);
        }
        self.noff.fetch_add(1, Ordering::Relaxed);
    }

    /// Leave one level of nesting
    ///
    /// # Returns
    /// True when the outermost level was left and interrupts should be
    /// re-enabled
    pub(crate) fn pop(&self) -> bool {
        let noff = self.noff();
        if noff == 0 {
            panic!("pop_off: cpu {} not pushed", self.id.0);
        }
        self.noff.store(noff - 1, Ordering::Relaxed);
        noff == 1 && self.intena()
    }
}

impl<P: Platform> IrqControl for Kernel<P> {
    fn push_off(&self) {
        let old = self.platform.intr_get();
        self.platform.intr_off();
        self.mycpu().push(old);
    }

    fn pop_off(&self) {
        if self.platform.intr_get() {
            panic!("pop_off: interruptible");
        }
        if self.mycpu().pop() {
            self.platform.intr_on();
        }
    }

    fn cpu_id(&self) -> usize {
        self.platform.cpu_id()
    }
}
