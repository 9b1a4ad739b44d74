/*
 * Scheduling Policies Module
 *
 * Each policy implements the SchedPolicy trait; one of them is built at
 * boot from `KernelConfig::policy`.
 *
 * Available policies:
 * - RoundRobin: cyclic scan of the process table (default)
 * - Fcfs: earliest created runnable process, non-preemptive
 * - Priority (PBS): lowest dynamic priority, non-preemptive
 * - Lottery (LBS): random draw weighted by ticket count
 * - Mlfq: five feedback queues with aging
 */

pub mod fcfs;
pub mod lottery;
pub mod mlfq;
pub mod priority;
pub mod round_robin;

use alloc::boxed::Box;

use crate::config::{KernelConfig, PolicyKind};

use super::traits::SchedPolicy;

pub use fcfs::FcfsPolicy;
pub use lottery::{LotteryPolicy, TicketRng};
pub use mlfq::MlfqPolicy;
pub use priority::PriorityPolicy;
pub use round_robin::RoundRobinPolicy;

/// Build the policy selected by `config`
pub fn build(config: &KernelConfig) -> Box<dyn SchedPolicy> {
    match config.policy {
        PolicyKind::RoundRobin => Box::new(RoundRobinPolicy::new(config.ncpu)),
        PolicyKind::Fcfs => Box::new(FcfsPolicy::new()),
        PolicyKind::Priority => Box::new(PriorityPolicy::new()),
        PolicyKind::Lottery => Box::new(LotteryPolicy::new(config.lottery_seed)),
        PolicyKind::Mlfq => Box::new(MlfqPolicy::new(config.mlfq)),
    }
}
