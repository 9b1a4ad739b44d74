/*
 * Scheduling Context
 *
 * `SchedCtx` is the view of the kernel a policy works with: the PCB locks
 * of the process table, the CPU asking for work, and the current tick. It
 * carries the interrupt bookkeeping needed to take PCB locks, and helpers
 * for the scans most policies need.
 *
 * Scans lock one PCB at a time in ascending slot order. A scan that keeps
 * its best candidate locked while it looks further only ever acquires
 * higher-numbered locks, which keeps concurrent scans on different CPUs
 * deadlock free.
 */

use crate::sync::{IrqControl, SpinGuard, SpinLock};

use super::process::Pcb;
use super::types::{CpuId, ProcState};

/// A process chosen for dispatch, still locked
pub struct Pick<'a> {
    pub slot: usize,
    pub pcb: SpinGuard<'a, Pcb>,
}

/// Kernel state visible to a scheduling policy
pub struct SchedCtx<'a> {
    procs: &'a [SpinLock<Pcb>],
    irq: &'a dyn IrqControl,
    /// CPU the decision is made for
    pub cpu: CpuId,
    /// Current tick
    pub now: u64,
}

impl<'a> SchedCtx<'a> {
    /// Create a scheduling context
    ///
    /// # Arguments
    /// - `procs`: PCB locks of the whole table
    /// - `irq`: interrupt bookkeeping used to take those locks
    /// - `cpu`: CPU asking for work
    /// - `now`: current tick
    pub fn new(procs: &'a [SpinLock<Pcb>], irq: &'a dyn IrqControl, cpu: CpuId, now: u64) -> Self {
        Self {
            procs,
            irq,
            cpu,
            now,
        }
    }

    /// Number of table slots
    pub fn capacity(&self) -> usize {
        self.procs.len()
    }

    /// Lock the PCB in `slot`
    pub fn lock(&self, slot: usize) -> SpinGuard<'a, Pcb> {
        self.procs[slot].lock(self.irq)
    }

    /// Interrupt bookkeeping, for policy-internal locks
    pub fn irq(&self) -> &'a dyn IrqControl {
        self.irq
    }

    /// Lock `slot` and keep it if it is runnable
    pub fn runnable(&self, slot: usize) -> Option<Pick<'a>> {
        let pcb = self.lock(slot);
        (pcb.state == ProcState::Runnable).then_some(Pick { slot, pcb })
    }

    /// The runnable process with the smallest key.
    ///
    /// `key` may update the PCB (e.g. to cache a recomputed priority). Ties
    /// go to the lowest slot.
    pub fn min_runnable_by_key<K, F>(&self, mut key: F) -> Option<Pick<'a>>
    where
        K: Ord,
        F: FnMut(&mut Pcb) -> K,
    {
        let mut best: Option<(K, Pick<'a>)> = None;
        for slot in 0..self.capacity() {
            let Some(mut candidate) = self.runnable(slot) else {
                continue;
            };
            let candidate_key = key(&mut candidate.pcb);
            let better = match &best {
                Some((best_key, _)) => candidate_key < *best_key,
                None => true,
            };
            if better {
                // Replacing the previous best releases its lock
                best = Some((candidate_key, candidate));
            }
        }
        best.map(|(_, pick)| pick)
    }

    /// Sum `f` over every runnable process
    pub fn sum_runnable(&self, mut f: impl FnMut(&Pcb) -> u64) -> u64 {
        (0..self.capacity())
            .filter_map(|slot| self.runnable(slot).map(|pick| f(&pick.pcb)))
            .sum()
    }
}
