/*
 * Sleep and Wakeup
 *
 * Condition synchronization on channels. A process that needs to wait for
 * something calls `sleep(channel, guard)` while holding the lock that
 * protects the condition; whoever changes the condition calls
 * `wakeup(channel)`.
 *
 * No wakeup can be lost: `sleep` takes its own PCB lock before releasing
 * the condition lock, and `wakeup` has to take that PCB lock before it can
 * look at the sleeper. By the time a waker gets the PCB lock, the sleeper
 * is recorded as Sleeping on the channel.
 *
 * Wakeups may be spurious (several processes can share a channel), so
 * sleepers re-check their condition in a loop.
 *
 * ## Usage
 *
 * ```ignore
 * let mut count = kernel_lock.lock(kernel);
 * while *count == 0 {
 *     count = kernel.sleep(Channel::of(&kernel_lock), count);
 * }
 * ```
 */

use crate::platform::Platform;
use crate::sync::SpinGuard;

use super::Kernel;
use super::types::{Channel, ProcState};

impl<P: Platform> Kernel<P> {
    /// Atomically release `guard`'s lock and sleep on `channel`.
    ///
    /// The lock is re-acquired before returning.
    ///
    /// # Arguments
    /// - `channel`: What to wait for
    /// - `guard`: Lock protecting the condition being waited on
    ///
    /// # Returns
    /// The re-acquired guard
    pub fn sleep<'a, T>(&'a self, channel: Channel, guard: SpinGuard<'a, T>) -> SpinGuard<'a, T> {
        let slot = self.require_current("sleep");
        let lock = SpinGuard::source(&guard);

        // Holding the PCB lock, no wakeup can slip in between releasing
        // the condition lock and being marked Sleeping.
        let mut p = self.table.proc(slot).lock(self);
        drop(guard);

        p.channel = Some(channel);
        p.state = ProcState::Sleeping;
        self.sched(&mut p);

        p.channel = None;
        drop(p);

        lock.lock(self)
    }

    /// Wake every process sleeping on `channel`.
    ///
    /// The caller must not hold any PCB lock other than possibly its own
    /// (its own process is skipped).
    pub fn wakeup(&self, channel: Channel) {
        let me = self.current_slot();
        for slot in 0..self.table.capacity() {
            if Some(slot) == me {
                continue;
            }
            let mut p = self.table.proc(slot).lock(self);
            if p.state == ProcState::Sleeping && p.channel == Some(channel) {
                log::trace!("wakeup: pid {} on {:?}", p.pid, channel);
                self.make_runnable(slot, &mut p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::KernelConfig;
    use crate::scheduler::types::{Channel, ProcState};
    use crate::testing::test_kernel;

    fn sleeping_on(kernel: &crate::testing::TestKernel, channel: Channel) -> usize {
        let (slot, mut p) = kernel.allocate().unwrap();
        p.state = ProcState::Sleeping;
        p.channel = Some(channel);
        slot
    }

    #[test]
    fn test_wakeup_only_matching_channel() {
        let kernel = test_kernel(KernelConfig::default());
        let x = sleeping_on(kernel, Channel::Object(0x1000));
        let y = sleeping_on(kernel, Channel::Object(0x2000));
        let x2 = sleeping_on(kernel, Channel::Object(0x1000));

        kernel.wakeup(Channel::Object(0x3000));
        for slot in [x, y, x2] {
            assert_eq!(kernel.table.proc(slot).lock(kernel).state, ProcState::Sleeping);
        }

        kernel.wakeup(Channel::Object(0x1000));
        let state = |slot| kernel.table.proc(slot).lock(kernel).state;
        assert_eq!(state(x), ProcState::Runnable);
        assert_eq!(state(x2), ProcState::Runnable);
        assert_eq!(state(y), ProcState::Sleeping);
        assert_eq!(kernel.table.proc(x).lock(kernel).channel, None);
    }

    #[test]
    fn test_wakeup_ignores_non_sleepers() {
        let kernel = test_kernel(KernelConfig::default());
        let (slot, mut p) = kernel.allocate().unwrap();
        // Used, with a stale channel left behind
        p.channel = Some(Channel::Ticks);
        drop(p);

        kernel.wakeup(Channel::Ticks);
        assert_eq!(kernel.table.proc(slot).lock(kernel).state, ProcState::Used);
    }

    #[test]
    fn test_channel_of_distinguishes_objects() {
        let a = 1u32;
        let b = 2u32;
        assert_eq!(Channel::of(&a), Channel::of(&a));
        assert_ne!(Channel::of(&a), Channel::of(&b));
        assert_ne!(Channel::Proc(1), Channel::Proc(2));
    }
}
