/*
 * Process Table
 *
 * Fixed-capacity array of process slots. A slot's index is the process's
 * identity inside the kernel; reusing slots is the only way processes are
 * created. Each slot has:
 *
 * - a `SpinLock<Pcb>` holding state and scheduling fields
 * - a `spin::Mutex<ProcPrivate>` holding trap frames, address space, files;
 *   taken from process context and user traps only, never from a timer
 *   interrupt that arrived in the kernel
 * - an entry in the parent-link array, guarded by the wait lock
 *
 * The wait lock is taken before any PCB lock. It serializes every change of
 * a parent link, so a parent scanning for zombie children never misses a
 * child being reparented under it.
 */

use alloc::vec::Vec;

use crate::error::ProcError;
use crate::platform::Platform;
use crate::sync::{SpinGuard, SpinLock};

use super::Kernel;
use super::process::{Pcb, ProcPrivate};
use super::types::{Pid, ProcState};

/// Parent links, indexed by child slot
pub struct ParentLinks {
    parents: Vec<Option<usize>>,
}

impl ParentLinks {
    fn new(capacity: usize) -> Self {
        Self {
            parents: alloc::vec![None; capacity],
        }
    }

    /// Slot of the parent of `child`
    pub fn parent_of(&self, child: usize) -> Option<usize> {
        self.parents[child]
    }

    pub fn set_parent(&mut self, child: usize, parent: Option<usize>) {
        self.parents[child] = parent;
    }
}

/// The process table
pub struct ProcTable<P: Platform> {
    procs: Vec<SpinLock<Pcb>>,
    private: Vec<spin::Mutex<ProcPrivate<P>>>,
    pub(crate) wait_lock: SpinLock<ParentLinks>,
}

impl<P: Platform> ProcTable<P> {
    /// Create a table with `capacity` unused slots
    pub fn new(capacity: usize) -> Self {
        Self {
            procs: (0..capacity).map(|_| SpinLock::new("proc", Pcb::new())).collect(),
            private: (0..capacity).map(|_| spin::Mutex::new(ProcPrivate::empty())).collect(),
            wait_lock: SpinLock::new("wait_lock", ParentLinks::new(capacity)),
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.procs.len()
    }

    /// All PCB locks, in slot order
    pub fn procs(&self) -> &[SpinLock<Pcb>] {
        &self.procs
    }

    /// PCB lock of `slot`
    pub fn proc(&self, slot: usize) -> &SpinLock<Pcb> {
        &self.procs[slot]
    }

    /// Private resources of `slot`
    pub fn private(&self, slot: usize) -> &spin::Mutex<ProcPrivate<P>> {
        &self.private[slot]
    }
}

impl<P: Platform> Kernel<P> {
    /// Hand out the next pid
    fn alloc_pid(&self) -> Pid {
        let mut next = self.pid_lock.lock(self);
        let pid = Pid(*next);
        *next += 1;
        pid
    }

    /// Hand out a fresh lottery ticket number
    pub(crate) fn alloc_ticket(&self) -> u32 {
        self.next_ticket.fetch_add(1, core::sync::atomic::Ordering::Relaxed)
    }

    /// Find an unused slot and set it up to run in the kernel.
    ///
    /// On success the slot is returned locked in state `Used`, with a fresh
    /// pid, one lottery ticket, MLFQ level 0, trap frames, an empty address
    /// space and a context that enters `forkret`. If any allocation fails
    /// the slot goes back to `Unused` with nothing held.
    ///
    /// # Returns
    /// The slot index and its locked PCB, or `ResourceExhausted`
    pub fn allocate(&self) -> Result<(usize, SpinGuard<'_, Pcb>), ProcError> {
        for slot in 0..self.table.capacity() {
            let mut p = self.table.proc(slot).lock(self);
            if p.state != ProcState::Unused {
                continue;
            }

            p.reset_for_allocation(self.alloc_pid(), self.uptime());
            let ticket = self.alloc_ticket();
            // Capacity is well above one
            let _ = p.tickets.push(ticket);

            if let Err(err) = self.alloc_private(slot) {
                log::warn!("allocate: slot {} setup failed: {}", slot, err);
                self.free_slot(slot, &mut p);
                return Err(err);
            }

            self.platform.init_context(&mut p.context, slot);
            return Ok((slot, p));
        }

        log::warn!("allocate: process table full");
        Err(ProcError::ResourceExhausted)
    }

    fn alloc_private(&self, slot: usize) -> Result<(), ProcError> {
        let mut private = self.table.private(slot).lock();
        private.trapframe = Some(self.platform.alloc_trapframe()?);
        private.alarm_frame = Some(self.platform.alloc_trapframe()?);
        if let Some(trapframe) = private.trapframe.as_deref() {
            let space = self.platform.create_address_space(trapframe)?;
            private.space = Some(space);
        }
        Ok(())
    }

    /// Release everything a slot holds and mark it `Unused`.
    ///
    /// The caller holds the slot's PCB lock. Open files must already be
    /// closed (exit does that); anything still open is closed here. The
    /// parent link is cleared by the caller, which holds the wait lock.
    pub(crate) fn free_slot(&self, slot: usize, p: &mut Pcb) {
        {
            let mut private = self.table.private(slot).lock();
            private.trapframe = None;
            private.alarm_frame = None;
            if let Some(space) = private.space.take() {
                self.platform.free_address_space(space);
            }
            if let Some(files) = private.files.take() {
                self.platform.close_files(files);
            }
        }
        *p = Pcb::new();
    }
}
