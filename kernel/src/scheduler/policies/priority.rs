/*
 * Priority-Based Scheduling Policy (PBS)
 *
 * Dispatches the runnable process with the numerically lowest dynamic
 * priority, recomputed from its static priority and its run/sleep history
 * since the last dispatch. Ties go to the process dispatched fewer times,
 * then to the earliest created.
 *
 * Dispatch starts a new history window. Non-preemptive.
 */

use crate::config::PolicyKind;
use crate::scheduler::accounting::dynamic_priority;

use super::super::{
    context::{Pick, SchedCtx},
    process::Pcb,
    traits::SchedPolicy,
};

/// PBS scheduling policy
#[derive(Debug, Default)]
pub struct PriorityPolicy;

impl PriorityPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl SchedPolicy for PriorityPolicy {
    fn name(&self) -> &'static str {
        "Priority-Based"
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Priority
    }

    fn pick_next<'a>(&self, ctx: &SchedCtx<'a>) -> Option<Pick<'a>> {
        ctx.min_runnable_by_key(|p| {
            p.dynamic_priority =
                dynamic_priority(p.static_priority, p.pbs_run_ticks, p.pbs_sleep_ticks);
            (p.dynamic_priority, p.run_count, p.creation_time)
        })
    }

    fn on_dispatch(&self, _ctx: &SchedCtx<'_>, _slot: usize, pcb: &mut Pcb) {
        pcb.pbs_run_ticks = 0;
        pcb.pbs_sleep_ticks = 0;
    }

    fn should_preempt(&self, _ctx: &SchedCtx<'_>, _slot: usize, _pcb: &Pcb) -> bool {
        false
    }
}
