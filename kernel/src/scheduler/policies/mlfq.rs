/*
 * Multi-Level Feedback Queue Scheduling Policy
 *
 * Five FIFO queues, level 0 first. Every runnable or running process is a
 * member of exactly one level; sleeping and exited processes are members of
 * none.
 *
 * - New and woken processes join the tail of their current level
 * - Dispatch takes the first runnable member of the highest non-empty level
 * - A process that used up its level's time slice moves down one level
 *   (level 4 is the floor), whether it yielded or blocked; a yielding
 *   process rejoins the tail of its level, a blocked one rejoins on wakeup
 * - A runnable process left waiting in a level past that level's aging
 *   threshold moves up one level before the next dispatch
 *
 * The running process is preempted when its slice is used up or when a
 * higher level holds a member that is waiting to run. Members running on
 * other CPUs do not count.
 *
 * The queues sit behind their own lock, taken inside PCB locks. Scans copy
 * a level's members out first and then lock PCBs one at a time.
 */

use alloc::collections::{BTreeSet, VecDeque};
use alloc::vec::Vec;

use crate::config::{MLFQ_LEVELS, MLFQ_LOWEST, MlfqConfig, PolicyKind};
use crate::sync::SpinLock;

use super::super::{
    context::{Pick, SchedCtx},
    process::Pcb,
    traits::SchedPolicy,
    types::ProcState,
};

/// Queue membership, one FIFO of slots per level
struct Levels {
    queues: [VecDeque<usize>; MLFQ_LEVELS],
    /// Members currently dispatched on some CPU
    running: BTreeSet<usize>,
}

impl Levels {
    fn remove(&mut self, slot: usize) {
        for queue in self.queues.iter_mut() {
            queue.retain(|&member| member != slot);
        }
    }

    /// Move `slot` to the tail of `level`
    fn requeue(&mut self, slot: usize, level: usize) {
        self.remove(slot);
        self.queues[level].push_back(slot);
    }

    fn snapshot(&self, level: usize) -> Vec<usize> {
        self.queues[level].iter().copied().collect()
    }

    /// Does any level above `level` hold a member that is not running?
    fn waiting_above(&self, level: usize) -> bool {
        self.queues[..level]
            .iter()
            .flatten()
            .any(|slot| !self.running.contains(slot))
    }
}

/// MLFQ scheduling policy
pub struct MlfqPolicy {
    levels: SpinLock<Levels>,
    config: MlfqConfig,
}

impl MlfqPolicy {
    pub fn new(config: MlfqConfig) -> Self {
        Self {
            levels: SpinLock::new(
                "mlfq",
                Levels {
                    queues: core::array::from_fn(|_| VecDeque::new()),
                    running: BTreeSet::new(),
                },
            ),
            config,
        }
    }

    /// Time slice of `level`, in ticks
    pub fn slice(&self, level: usize) -> u64 {
        self.config.slices[level]
    }

    /// Members of `level`, front first
    pub fn members(&self, ctx: &SchedCtx<'_>, level: usize) -> Vec<usize> {
        self.levels.lock(ctx.irq()).snapshot(level)
    }

    /// Promote runnable processes that waited too long in their level
    fn age(&self, ctx: &SchedCtx<'_>) {
        for level in 1..MLFQ_LEVELS {
            for slot in self.members(ctx, level) {
                let mut p = ctx.lock(slot);
                let waited = ctx.now.saturating_sub(p.queue_entry_time);
                if p.state != ProcState::Runnable
                    || p.queue_level != level
                    || waited <= self.config.aging_ticks[level]
                {
                    continue;
                }

                p.queue_level = level - 1;
                p.queue_entry_time = ctx.now;
                p.ticks_in_queue = 0;
                self.levels.lock(ctx.irq()).requeue(slot, level - 1);
                log::trace!("mlfq: pid {} aged up to level {}", p.pid, level - 1);
            }
        }
    }
}

impl SchedPolicy for MlfqPolicy {
    fn name(&self) -> &'static str {
        "Multi-Level Feedback Queue"
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Mlfq
    }

    fn on_runnable(&self, ctx: &SchedCtx<'_>, slot: usize, pcb: &mut Pcb) {
        pcb.queue_entry_time = ctx.now;
        pcb.ticks_in_queue = 0;
        self.levels.lock(ctx.irq()).requeue(slot, pcb.queue_level);
    }

    fn pick_next<'a>(&self, ctx: &SchedCtx<'a>) -> Option<Pick<'a>> {
        self.age(ctx);

        for level in 0..MLFQ_LEVELS {
            for slot in self.members(ctx, level) {
                if let Some(pick) = ctx.runnable(slot) {
                    return Some(pick);
                }
            }
        }
        None
    }

    fn on_dispatch(&self, ctx: &SchedCtx<'_>, slot: usize, _pcb: &mut Pcb) {
        self.levels.lock(ctx.irq()).running.insert(slot);
    }

    fn on_return(&self, ctx: &SchedCtx<'_>, slot: usize, pcb: &mut Pcb) {
        let mut levels = self.levels.lock(ctx.irq());
        levels.running.remove(&slot);

        if pcb.state == ProcState::Zombie {
            levels.remove(slot);
            return;
        }

        if pcb.ticks_in_queue >= self.slice(pcb.queue_level) {
            let from = pcb.queue_level;
            pcb.queue_level = (from + 1).min(MLFQ_LOWEST);
            pcb.ticks_in_queue = 0;
            if pcb.queue_level != from {
                log::trace!("mlfq: pid {} demoted to level {}", pcb.pid, pcb.queue_level);
            }
        }

        if pcb.state == ProcState::Runnable {
            pcb.queue_entry_time = ctx.now;
            levels.requeue(slot, pcb.queue_level);
        } else {
            // Blocked: rejoins at its (possibly lower) level when woken
            levels.remove(slot);
        }
    }

    fn should_preempt(&self, ctx: &SchedCtx<'_>, _slot: usize, pcb: &Pcb) -> bool {
        pcb.ticks_in_queue >= self.slice(pcb.queue_level)
            || self.levels.lock(ctx.irq()).waiting_above(pcb.queue_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PolicyBench;

    fn policy() -> MlfqPolicy {
        MlfqPolicy::new(MlfqConfig::default())
    }

    #[test]
    fn test_full_slices_demote_one_level_each() {
        let bench = PolicyBench::new(1);
        let mlfq = policy();
        bench.make_runnable(&mlfq, 0);

        for expected in [1, 2, 3, 4, 4, 4] {
            let level = bench.with(0, |p| p.queue_level);
            let used = mlfq.slice(level);
            assert_eq!(bench.dispatch(&mlfq, used, ProcState::Runnable), Some(0));
            assert_eq!(bench.with(0, |p| p.queue_level), expected);
            assert_eq!(bench.ctx_members(&mlfq, expected), [0]);
        }
    }

    #[test]
    fn test_partial_slice_keeps_level_and_rotates() {
        let bench = PolicyBench::new(2);
        let mlfq = policy();
        bench.with(0, |p| p.queue_level = 3);
        bench.with(1, |p| p.queue_level = 3);
        bench.make_runnable(&mlfq, 0);
        bench.make_runnable(&mlfq, 1);

        assert_eq!(bench.dispatch(&mlfq, 2, ProcState::Runnable), Some(0));
        assert_eq!(bench.with(0, |p| (p.queue_level, p.ticks_in_queue)), (3, 2));
        assert_eq!(bench.ctx_members(&mlfq, 3), [1, 0]);
        assert_eq!(bench.pick(&mlfq), Some(1));
    }

    #[test]
    fn test_higher_level_dispatched_first() {
        let bench = PolicyBench::new(3);
        let mlfq = policy();
        bench.with(0, |p| p.queue_level = 2);
        bench.with(2, |p| p.queue_level = 1);
        for slot in 0..3 {
            bench.make_runnable(&mlfq, slot);
        }
        assert_eq!(bench.pick(&mlfq), Some(1));
        bench.set_state(1, ProcState::Sleeping);
        assert_eq!(bench.pick(&mlfq), Some(2));
    }

    #[test]
    fn test_aging_promotes_starved_process() {
        let bench = PolicyBench::new(2);
        let mlfq = policy();
        bench.with(1, |p| p.queue_level = 3);
        bench.make_runnable(&mlfq, 0);
        bench.make_runnable(&mlfq, 1);

        bench.set_now(MlfqConfig::default().aging_ticks[3]);
        assert_eq!(bench.pick(&mlfq), Some(0));
        assert_eq!(bench.with(1, |p| p.queue_level), 3);

        bench.set_now(MlfqConfig::default().aging_ticks[3] + 1);
        assert_eq!(bench.pick(&mlfq), Some(0));
        assert_eq!(bench.with(1, |p| (p.queue_level, p.ticks_in_queue)), (2, 0));
        assert_eq!(bench.ctx_members(&mlfq, 2), [1]);
        assert!(bench.ctx_members(&mlfq, 3).is_empty());
    }

    #[test]
    fn test_blocked_and_exited_leave_queues() {
        let bench = PolicyBench::new(2);
        let mlfq = policy();
        bench.make_runnable(&mlfq, 0);
        bench.make_runnable(&mlfq, 1);

        assert_eq!(bench.dispatch(&mlfq, 0, ProcState::Sleeping), Some(0));
        assert_eq!(bench.ctx_members(&mlfq, 0), [1]);
        assert_eq!(bench.dispatch(&mlfq, 0, ProcState::Zombie), Some(1));
        assert!(bench.ctx_members(&mlfq, 0).is_empty());

        bench.make_runnable(&mlfq, 0);
        assert_eq!(bench.ctx_members(&mlfq, 0), [0]);
    }

    #[test]
    fn test_full_slice_then_block_still_demotes() {
        let bench = PolicyBench::new(1);
        let mlfq = policy();
        bench.make_runnable(&mlfq, 0);

        let used = mlfq.slice(0);
        assert_eq!(bench.dispatch(&mlfq, used, ProcState::Sleeping), Some(0));
        assert!(bench.ctx_members(&mlfq, 0).is_empty());

        bench.make_runnable(&mlfq, 0);
        assert_eq!(bench.with(0, |p| (p.queue_level, p.ticks_in_queue)), (1, 0));
        assert_eq!(bench.ctx_members(&mlfq, 1), [0]);
    }

    #[test]
    fn test_higher_level_running_elsewhere_does_not_preempt() {
        let bench = PolicyBench::new(2);
        let mlfq = policy();
        let mut running = Pcb::new();
        running.state = ProcState::Running;
        running.queue_level = 2;

        // Slot 1 sits at level 0 but is already on another CPU
        bench.make_runnable(&mlfq, 1);
        {
            let ctx = bench.ctx();
            let Pick { slot, mut pcb } = mlfq.pick_next(&ctx).unwrap();
            assert_eq!(slot, 1);
            pcb.state = ProcState::Running;
            mlfq.on_dispatch(&ctx, slot, &mut pcb);
        }
        assert!(!mlfq.should_preempt(&bench.ctx(), 0, &running));

        // Once it yields it waits above the running process
        {
            let ctx = bench.ctx();
            let mut pcb = ctx.lock(1);
            pcb.state = ProcState::Runnable;
            mlfq.on_return(&ctx, 1, &mut pcb);
        }
        assert!(mlfq.should_preempt(&bench.ctx(), 0, &running));
    }

    #[test]
    fn test_preempt_on_slice_or_higher_arrival() {
        let bench = PolicyBench::new(2);
        let mlfq = policy();
        let mut running = Pcb::new();
        running.state = ProcState::Running;
        running.queue_level = 2;

        assert!(!mlfq.should_preempt(&bench.ctx(), 0, &running));
        running.ticks_in_queue = mlfq.slice(2);
        assert!(mlfq.should_preempt(&bench.ctx(), 0, &running));
        running.ticks_in_queue = 0;

        // Slot 1 joins level 0, above the running process
        bench.make_runnable(&mlfq, 1);
        assert!(mlfq.should_preempt(&bench.ctx(), 0, &running));
    }
}
