/*
 * Lottery Scheduling Policy (LBS)
 *
 * Every process holds lottery tickets; a draw picks one ticket among the
 * tickets of all runnable processes and dispatches its holder. A process
 * holding k of the T runnable tickets wins with probability k / T.
 *
 * Only runnable holders take part in the draw, so sleeping processes do
 * not dilute the odds of the others.
 *
 * Draws come from a small seeded xorshift generator exposed through the
 * rand_core traits, which keeps runs reproducible for a given seed.
 * Preemptive: a new draw is held on every timer tick.
 */

use rand_core::{RngCore, SeedableRng, impls};

use crate::config::PolicyKind;
use crate::sync::SpinLock;

use super::super::{
    context::{Pick, SchedCtx},
    process::Pcb,
    traits::SchedPolicy,
};

/// Xorshift64* generator used for lottery draws
///
/// Not cryptographic; only needs to be cheap and well distributed.
#[derive(Debug, Clone)]
pub struct TicketRng {
    state: u64,
}

impl TicketRng {
    /// Replaces an all-zero seed, which xorshift cannot leave
    const ZERO_SEED_REPLACEMENT: u64 = 0x9e37_79b9_7f4a_7c15;

    /// Uniform value in `0..bound`
    pub fn below(&mut self, bound: u64) -> u64 {
        // Reject the top partial range to avoid modulo bias
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let value = self.next_u64();
            if value < zone {
                return value % bound;
            }
        }
    }
}

impl RngCore for TicketRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for TicketRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        let state = match u64::from_le_bytes(seed) {
            0 => Self::ZERO_SEED_REPLACEMENT,
            state => state,
        };
        Self { state }
    }
}

/// LBS scheduling policy
pub struct LotteryPolicy {
    rng: SpinLock<TicketRng>,
}

impl LotteryPolicy {
    /// Create a lottery policy drawing from a generator seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SpinLock::new("lottery", TicketRng::seed_from_u64(seed)),
        }
    }
}

impl SchedPolicy for LotteryPolicy {
    fn name(&self) -> &'static str {
        "Lottery"
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Lottery
    }

    fn pick_next<'a>(&self, ctx: &SchedCtx<'a>) -> Option<Pick<'a>> {
        let total = ctx.sum_runnable(|p| p.ticket_count() as u64);
        if total == 0 {
            return None;
        }
        let mut winner = self.rng.lock(ctx.irq()).below(total);

        // Walk the runnable holders until the drawn ticket is reached. If
        // another CPU changed the runnable set since the count, the draw
        // may run off the end; the caller just tries again.
        for slot in 0..ctx.capacity() {
            let Some(pick) = ctx.runnable(slot) else {
                continue;
            };
            let held = pick.pcb.ticket_count() as u64;
            if winner < held {
                return Some(pick);
            }
            winner -= held;
        }
        None
    }

    fn should_preempt(&self, _ctx: &SchedCtx<'_>, _slot: usize, _pcb: &Pcb) -> bool {
        true
    }
}
