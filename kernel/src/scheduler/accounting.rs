/*
 * Time, Priority and Ticket Accounting
 *
 * Everything driven by the timer or adjusted through priority-related
 * system calls:
 *
 * - clock_tick / update_time: global tick counter and per-process times
 * - user_timer_interrupt / kernel_timer_interrupt: the per-CPU timer paths;
 *   only a trap from user mode services alarms
 * - sleep_ticks: timed sleep on the tick counter
 * - dynamic_priority / set_priority: PBS priorities
 * - settickets: LBS ticket requests
 * - trace, sigalarm, sigreturn: per-process debugging and alarm state
 */

use crate::config::{MAX_PRIORITY, MAX_TICKETS};
use crate::error::ProcError;
use crate::platform::Platform;
use crate::syscall::TraceMask;

use super::Kernel;
use super::types::{Channel, Pid, ProcState};

/// Niceness used when a process has neither run nor slept yet
const NEUTRAL_NICENESS: i64 = 5;

/// PBS dynamic priority.
///
/// Niceness is the share of recent time spent sleeping, scaled to 0..=10
/// (5 when there is no history). Sleepy processes get a numerically lower,
/// i.e. better, priority.
///
/// # Arguments
/// - `static_priority`: base priority, 0 (best) to 100
/// - `run_ticks`: ticks run since the last dispatch
/// - `sleep_ticks`: ticks slept since the last dispatch
///
/// # Returns
/// `static_priority - niceness + 5`, clamped to [0, 100]
pub fn dynamic_priority(static_priority: u8, run_ticks: u64, sleep_ticks: u64) -> u8 {
    let niceness = match run_ticks + sleep_ticks {
        0 => NEUTRAL_NICENESS,
        total => (sleep_ticks * 10 / total) as i64,
    };
    (static_priority as i64 - niceness + 5).clamp(0, MAX_PRIORITY as i64) as u8
}

impl<P: Platform> Kernel<P> {
    // ========================================================================
    // TIMER
    // ========================================================================

    /// Advance the global clock by one tick.
    ///
    /// Runs on one CPU only. Per-process times are updated before anything
    /// is scheduled against the new tick, then timed sleepers are woken.
    pub fn clock_tick(&self) {
        let mut ticks = self.ticks.lock(self);
        *ticks += 1;
        self.now.store(*ticks, core::sync::atomic::Ordering::Relaxed);
        self.update_time();
        self.wakeup(Channel::Ticks);
    }

    /// Charge one tick to every live process according to its state
    pub fn update_time(&self) {
        for slot in 0..self.table.capacity() {
            let mut p = self.table.proc(slot).lock(self);
            if p.state == ProcState::Unused {
                continue;
            }
            let level = p.queue_level;
            p.ticks_per_level[level] += 1;
            match p.state {
                ProcState::Running => {
                    p.run_time += 1;
                    p.pbs_run_ticks += 1;
                    p.ticks_in_queue += 1;
                }
                ProcState::Sleeping => p.pbs_sleep_ticks += 1,
                _ => {}
            }
        }
    }

    /// Timer interrupt taken from user mode in the current process.
    ///
    /// CPU 0 advances the clock. The interrupted process's alarm is
    /// serviced and it yields when the policy asks for preemption.
    pub fn user_timer_interrupt(&self) {
        self.timer_common();
        if let Some(slot) = self.current_slot() {
            self.alarm_tick(slot);
            self.preempt_if_asked(slot);
        }
    }

    /// Timer interrupt taken while this CPU was in the kernel.
    ///
    /// Alarms are left alone: the interrupted code may hold the process's
    /// private lock, and the trap frame belongs to the syscall in progress.
    /// A running process may still be preempted.
    pub fn kernel_timer_interrupt(&self) {
        self.timer_common();
        if let Some(slot) = self.current_slot() {
            self.preempt_if_asked(slot);
        }
    }

    fn timer_common(&self) {
        if self.platform.cpu_id() == 0 {
            self.clock_tick();
        }
    }

    fn preempt_if_asked(&self, slot: usize) {
        let preempt = {
            let p = self.table.proc(slot).lock(self);
            p.state == ProcState::Running && self.policy.should_preempt(&self.sched_ctx(), slot, &p)
        };
        if preempt {
            self.yield_now();
        }
    }

    /// Sleep for `n` ticks.
    ///
    /// # Returns
    /// `Killed` if the process is killed while sleeping
    pub fn sleep_ticks(&self, n: i64) -> Result<(), ProcError> {
        let n = u64::try_from(n).map_err(|_| ProcError::InvalidArgument)?;
        let mut ticks = self.ticks.lock(self);
        let start = *ticks;
        while *ticks - start < n {
            if self.killed() {
                return Err(ProcError::Killed);
            }
            ticks = self.sleep(Channel::Ticks, ticks);
        }
        Ok(())
    }

    // ========================================================================
    // PBS
    // ========================================================================

    /// Change the static priority of `pid`.
    ///
    /// Resets the process's dispatch count and PBS history, so its dynamic
    /// priority becomes the neutral value for the new static priority. If
    /// that is better than before, the caller yields so the change takes
    /// effect at once.
    ///
    /// # Returns
    /// The previous static priority
    pub fn set_priority(&self, pid: Pid, new_priority: i64) -> Result<u8, ProcError> {
        let new_priority = match u8::try_from(new_priority) {
            Ok(value) if value <= MAX_PRIORITY => value,
            _ => {
                log::warn!("set_priority: {} out of range", new_priority);
                return Err(ProcError::InvalidArgument);
            }
        };

        for slot in 0..self.table.capacity() {
            let mut p = self.table.proc(slot).lock(self);
            if p.state == ProcState::Unused || p.pid != pid {
                continue;
            }

            let old_priority = p.static_priority;
            let old_dynamic = p.dynamic_priority;
            p.static_priority = new_priority;
            p.run_count = 0;
            p.pbs_run_ticks = 0;
            p.pbs_sleep_ticks = 0;
            p.dynamic_priority = dynamic_priority(new_priority, 0, 0);
            let improved = p.dynamic_priority < old_dynamic;
            drop(p);

            log::debug!(
                "set_priority: pid {} {} -> {}",
                pid,
                old_priority,
                new_priority
            );
            if improved && self.current_slot().is_some() {
                self.yield_now();
            }
            return Ok(old_priority);
        }

        Err(ProcError::NotFound)
    }

    // ========================================================================
    // LBS
    // ========================================================================

    /// Give the calling process `n` more lottery tickets
    pub fn settickets(&self, n: i64) -> Result<(), ProcError> {
        let n = usize::try_from(n).map_err(|_| ProcError::InvalidArgument)?;
        let slot = self.require_current("settickets");
        let mut p = self.table.proc(slot).lock(self);
        if p.ticket_count() + n > MAX_TICKETS {
            log::warn!("settickets: pid {} would exceed {} tickets", p.pid, MAX_TICKETS);
            return Err(ProcError::ResourceExhausted);
        }
        for _ in 0..n {
            let ticket = self.alloc_ticket();
            let _ = p.tickets.push(ticket);
        }
        Ok(())
    }

    // ========================================================================
    // TRACE AND ALARMS
    // ========================================================================

    /// Set the syscall trace mask of the calling process
    pub fn trace(&self, mask: TraceMask) {
        let slot = self.require_current("trace");
        self.table.proc(slot).lock(self).trace_mask = mask;
    }

    /// Call `handler` every `interval` ticks of CPU time; 0 disables.
    pub fn sigalarm(&self, interval: i64, handler: i64) -> Result<(), ProcError> {
        let (Ok(interval), Ok(handler)) = (u64::try_from(interval), u64::try_from(handler)) else {
            return Err(ProcError::InvalidArgument);
        };
        let slot = self.require_current("sigalarm");
        let mut p = self.table.proc(slot).lock(self);
        p.alarm.interval = interval;
        p.alarm.handler = handler;
        p.alarm.elapsed = 0;
        p.alarm.active = false;
        Ok(())
    }

    /// Return from an alarm handler to the interrupted user code
    pub fn sigreturn(&self) -> Result<(), ProcError> {
        let slot = self.require_current("sigreturn");
        {
            let mut p = self.table.proc(slot).lock(self);
            if !p.alarm.active {
                return Err(ProcError::InvalidArgument);
            }
            p.alarm.active = false;
        }

        let mut private = self.table.private(slot).lock();
        let private = &mut *private;
        if let (Some(trapframe), Some(saved)) =
            (private.trapframe.as_deref_mut(), private.alarm_frame.as_deref())
        {
            trapframe.restore_user(saved);
        }
        Ok(())
    }

    /// Count a tick against the alarm of the process in `slot` and
    /// redirect it to its handler when the interval elapses.
    fn alarm_tick(&self, slot: usize) {
        let handler = {
            let mut p = self.table.proc(slot).lock(self);
            let alarm = &mut p.alarm;
            if alarm.interval == 0 || alarm.active {
                return;
            }
            alarm.elapsed += 1;
            if alarm.elapsed < alarm.interval {
                return;
            }
            alarm.elapsed = 0;
            alarm.active = true;
            alarm.handler
        };

        let mut private = self.table.private(slot).lock();
        let private = &mut *private;
        if let (Some(trapframe), Some(saved)) =
            (private.trapframe.as_deref_mut(), private.alarm_frame.as_deref_mut())
        {
            *saved = *trapframe;
            trapframe.epc = handler;
        }
    }
}
