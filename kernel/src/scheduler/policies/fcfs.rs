/*
 * First-Come, First-Served Scheduling Policy
 *
 * Dispatches the runnable process with the earliest creation time. Two
 * processes created in the same tick run in allocation (pid) order.
 *
 * Non-preemptive: a process runs until it blocks, yields or exits.
 */

use crate::config::PolicyKind;

use super::super::{
    context::{Pick, SchedCtx},
    process::Pcb,
    traits::SchedPolicy,
};

/// FCFS scheduling policy
#[derive(Debug, Default)]
pub struct FcfsPolicy;

impl FcfsPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl SchedPolicy for FcfsPolicy {
    fn name(&self) -> &'static str {
        "First-Come-First-Served"
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Fcfs
    }

    fn pick_next<'a>(&self, ctx: &SchedCtx<'a>) -> Option<Pick<'a>> {
        ctx.min_runnable_by_key(|p| (p.creation_time, p.pid))
    }

    fn should_preempt(&self, _ctx: &SchedCtx<'_>, _slot: usize, _pcb: &Pcb) -> bool {
        false
    }
}
