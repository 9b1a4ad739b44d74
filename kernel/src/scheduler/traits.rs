/*
 * Scheduling Policy Trait
 *
 * Separates scheduling policy from mechanism. The scheduler core (see
 * sched_core.rs) owns the dispatch loop, the context switch and all PCB
 * state transitions; a policy only decides which runnable process goes
 * next and keeps whatever bookkeeping it needs to make that decision.
 *
 * One policy object is created at boot from `KernelConfig::policy` and
 * shared by every CPU, so policies use `&self` and keep their own state
 * behind spin locks.
 *
 * Every hook that receives a `&mut Pcb` is called with that PCB's lock
 * held. Policy-internal locks nest inside PCB locks, never the other way
 * around.
 */

use crate::config::PolicyKind;

use super::context::{Pick, SchedCtx};
use super::process::Pcb;

/// Scheduling policy
pub trait SchedPolicy: Send + Sync {
    /// Policy name for logs and procdump headers
    fn name(&self) -> &'static str;

    /// Which configured policy this is
    fn kind(&self) -> PolicyKind;

    /// A process entered the runnable set (new, or woken from sleep).
    ///
    /// Not called when a running process yields; that is `on_return`.
    fn on_runnable(&self, _ctx: &SchedCtx<'_>, _slot: usize, _pcb: &mut Pcb) {}

    /// Choose the next process to run on `ctx.cpu`.
    ///
    /// # Returns
    /// A runnable process with its PCB lock held, or None to idle
    fn pick_next<'a>(&self, ctx: &SchedCtx<'a>) -> Option<Pick<'a>>;

    /// The picked process is about to be switched to
    fn on_dispatch(&self, _ctx: &SchedCtx<'_>, _slot: usize, _pcb: &mut Pcb) {}

    /// The process switched back to the scheduler: it yielded (Runnable),
    /// blocked (Sleeping) or exited (Zombie).
    fn on_return(&self, _ctx: &SchedCtx<'_>, _slot: usize, _pcb: &mut Pcb) {}

    /// Should the running process give up the CPU on this timer tick?
    fn should_preempt(&self, ctx: &SchedCtx<'_>, slot: usize, pcb: &Pcb) -> bool;
}
