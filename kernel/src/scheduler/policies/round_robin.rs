/*
 * Round-Robin Scheduling Policy
 *
 * Walks the process table in slot order and dispatches the first runnable
 * process after the one this CPU dispatched last, wrapping around at the
 * end. With N runnable processes each one runs once every N dispatches.
 *
 * Preemptive: the running process is rotated out on every timer tick.
 *
 * This is the default policy.
 */

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::PolicyKind;

use super::super::{
    context::{Pick, SchedCtx},
    process::Pcb,
    traits::SchedPolicy,
};

/// Round-Robin scheduling policy
pub struct RoundRobinPolicy {
    /// Per CPU: slot to start the next scan at
    cursors: Vec<AtomicUsize>,
}

impl RoundRobinPolicy {
    /// Create a new Round-Robin policy for `ncpu` CPUs
    pub fn new(ncpu: usize) -> Self {
        Self {
            cursors: (0..ncpu.max(1)).map(|_| AtomicUsize::new(0)).collect(),
        }
    }
}

impl SchedPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "Round-Robin"
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::RoundRobin
    }

    fn pick_next<'a>(&self, ctx: &SchedCtx<'a>) -> Option<Pick<'a>> {
        let n = ctx.capacity();
        let cursor = &self.cursors[ctx.cpu.as_usize() % self.cursors.len()];
        let start = cursor.load(Ordering::Relaxed) % n;

        for offset in 0..n {
            let slot = (start + offset) % n;
            if let Some(pick) = ctx.runnable(slot) {
                cursor.store((slot + 1) % n, Ordering::Relaxed);
                return Some(pick);
            }
        }
        None
    }

    fn should_preempt(&self, _ctx: &SchedCtx<'_>, _slot: usize, _pcb: &Pcb) -> bool {
        true
    }
}
