/*
 * Scheduler Core - Mechanism Layer
 *
 * Drives dispatch on every CPU. The active policy (a `SchedPolicy`) picks
 * which runnable process goes next; this layer does everything else:
 *
 * 1. Marks the picked process Running and records it on the CPU
 * 2. Switches from the CPU's scheduler context into the process
 * 3. Gets control back when the process calls `sched` (yield, sleep, exit)
 * 4. Reports the return to the policy and releases the PCB lock
 *
 * The PCB lock taken by the policy's pick is held across the switch and is
 * released by the process on the other side (or, for a brand-new process,
 * by `forkret`). Symmetrically, a process enters `sched` holding its own
 * PCB lock, and the scheduler releases it.
 */

use crate::platform::Platform;

use super::Kernel;
use super::context::Pick;
use super::process::Pcb;
use super::types::ProcState;
use crate::sync::SpinGuard;

impl<P: Platform> Kernel<P> {
    // ========================================================================
    // SCHEDULER LOOP
    // ========================================================================

    /// Per-CPU scheduler loop; each CPU calls this after setting itself up.
    pub fn scheduler(&self) -> ! {
        self.mycpu().set_proc(None);
        loop {
            self.schedule_once();
        }
    }

    /// One pass of the scheduler loop: pick a process, run it until it
    /// gives the CPU back.
    ///
    /// # Returns
    /// Whether a process was dispatched
    pub fn schedule_once(&self) -> bool {
        // Let devices interrupt, so a CPU with nothing to run can still
        // observe wakeups.
        self.platform.intr_on();

        let ctx = self.sched_ctx();
        let Some(Pick { slot, mut pcb }) = self.policy.pick_next(&ctx) else {
            return false;
        };
        if pcb.state != ProcState::Runnable {
            panic!("scheduler: pid {} picked while {:?}", pcb.pid, pcb.state);
        }

        pcb.state = ProcState::Running;
        pcb.run_count += 1;
        self.policy.on_dispatch(&ctx, slot, &mut pcb);
        log::trace!("cpu {}: dispatch pid {} (slot {})", ctx.cpu.0, pcb.pid, slot);

        let cpu = self.mycpu();
        cpu.set_proc(Some(slot));
        let next: *const crate::platform::Context = &pcb.context;
        // SAFETY: the CPU context and the PCB (locked) outlive the switch
        unsafe { self.platform.switch(cpu.context_ptr(), next) };

        // The process is done running for now; it changed its own state
        // before coming back.
        self.mycpu().set_proc(None);
        let ctx = self.sched_ctx();
        self.policy.on_return(&ctx, slot, &mut pcb);
        true
    }

    // ========================================================================
    // PROCESS SIDE
    // ========================================================================

    /// Switch to this CPU's scheduler.
    ///
    /// The caller must hold its own PCB lock and nothing else, must have
    /// moved its state away from Running, and must have interrupts off.
    /// Anything else means the scheduler's invariants are broken and is
    /// fatal.
    pub(crate) fn sched(&self, p: &mut SpinGuard<'_, Pcb>) {
        let cpu = self.mycpu();
        if !SpinGuard::holding(p) {
            panic!("sched: pid {} does not hold its lock", p.pid);
        }
        if cpu.noff() != 1 {
            panic!("sched: {} locks held", cpu.noff());
        }
        if p.state == ProcState::Running {
            panic!("sched: pid {} still running", p.pid);
        }
        if self.platform.intr_get() {
            panic!("sched: interruptible");
        }

        // Interrupt-enable belongs to this kernel thread, not to the CPU
        let intena = cpu.intena();
        let old: *mut crate::platform::Context = &mut p.context;
        // SAFETY: the PCB stays locked until the scheduler switches back
        unsafe { self.platform.switch(old, cpu.context_ptr()) };
        self.mycpu().set_intena(intena);
    }

    /// Give up the CPU for one scheduling round
    pub fn yield_now(&self) {
        let slot = self.require_current("yield");
        let mut p = self.table.proc(slot).lock(self);
        p.state = ProcState::Runnable;
        self.sched(&mut p);
    }

    /// First code a new process runs in the kernel.
    ///
    /// The scheduler switched here holding the process's PCB lock and its
    /// guard stays on the scheduler's stack, so the lock is released
    /// directly. The platform then returns to user space.
    pub fn forkret(&self) {
        let slot = self.require_current("forkret");
        // SAFETY: this CPU acquired the lock in schedule_once and that
        // guard is only dropped after the process switches back
        unsafe { self.table.proc(slot).force_unlock(self) };
    }

    /// Move a process into the runnable set.
    ///
    /// The caller holds `pcb`'s lock and `pcb` is Used or Sleeping.
    pub(crate) fn make_runnable(&self, slot: usize, pcb: &mut Pcb) {
        pcb.state = ProcState::Runnable;
        pcb.channel = None;
        self.policy.on_runnable(&self.sched_ctx(), slot, pcb);
    }
}
