/*
 * Kernel Configuration
 *
 * Compile-time limits plus the runtime `KernelConfig` handed to
 * `Kernel::new`. The scheduling policy is chosen here once, at boot, and
 * never changes afterwards.
 */

use core::fmt;
use core::str::FromStr;

/// Maximum number of process table slots
pub const NPROC: usize = 64;

/// Maximum number of CPUs
pub const NCPU: usize = 8;

/// Number of MLFQ levels (level 0 is the highest priority)
pub const MLFQ_LEVELS: usize = 5;

/// Lowest MLFQ level; demotion stops here
pub const MLFQ_LOWEST: usize = MLFQ_LEVELS - 1;

/// Time slice per MLFQ level, in ticks
pub const MLFQ_SLICES: [u64; MLFQ_LEVELS] = [1, 2, 4, 8, 16];

/// Ticks a runnable process may wait in a level before it is promoted
pub const MLFQ_AGING_TICKS: u64 = 500;

/// Static priority given to every new process (PBS)
pub const DEFAULT_PRIORITY: u8 = 60;

/// Highest (numerically largest) PBS priority value
pub const MAX_PRIORITY: u8 = 100;

/// Upper bound on lottery tickets held by one process
pub const MAX_TICKETS: usize = 128;

/// Length of a process name, including room for truncation
pub const PROC_NAME_LEN: usize = 16;

/// Default seed for the lottery generator
pub const DEFAULT_LOTTERY_SEED: u64 = 0x5eed_1e55_cafe_f00d;

/// CPU scheduling policy selected at boot
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PolicyKind {
    /// Round robin over the process table
    #[default]
    RoundRobin,
    /// First come, first served by creation time
    Fcfs,
    /// Priority based with dynamic priority decay
    Priority,
    /// Lottery
    Lottery,
    /// Multi-level feedback queue with aging
    Mlfq,
}

impl PolicyKind {
    /// Short build name (as accepted by `from_str`)
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::RoundRobin => "RR",
            PolicyKind::Fcfs => "FCFS",
            PolicyKind::Priority => "PBS",
            PolicyKind::Lottery => "LBS",
            PolicyKind::Mlfq => "MLFQ",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown policy name passed to `PolicyKind::from_str`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolicy;

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown scheduling policy (expected RR, FCFS, PBS, LBS or MLFQ)")
    }
}

impl FromStr for PolicyKind {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("DEFAULT") || s.eq_ignore_ascii_case("RR") => {
                Ok(PolicyKind::RoundRobin)
            }
            s if s.eq_ignore_ascii_case("FCFS") => Ok(PolicyKind::Fcfs),
            s if s.eq_ignore_ascii_case("PBS") => Ok(PolicyKind::Priority),
            s if s.eq_ignore_ascii_case("LBS") => Ok(PolicyKind::Lottery),
            s if s.eq_ignore_ascii_case("MLFQ") => Ok(PolicyKind::Mlfq),
            _ => Err(UnknownPolicy),
        }
    }
}

/// MLFQ tuning
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MlfqConfig {
    /// Time slice per level, in ticks
    pub slices: [u64; MLFQ_LEVELS],
    /// Aging threshold per level, in ticks
    pub aging_ticks: [u64; MLFQ_LEVELS],
}

impl Default for MlfqConfig {
    fn default() -> Self {
        Self {
            slices: MLFQ_SLICES,
            aging_ticks: [MLFQ_AGING_TICKS; MLFQ_LEVELS],
        }
    }
}

/// Runtime kernel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Process table capacity (at most `NPROC`)
    pub nproc: usize,
    /// Number of CPUs running the scheduler loop (at most `NCPU`)
    pub ncpu: usize,
    /// Active scheduling policy
    pub policy: PolicyKind,
    /// Seed for the lottery generator
    pub lottery_seed: u64,
    /// MLFQ time slices and aging thresholds
    pub mlfq: MlfqConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            nproc: NPROC,
            ncpu: 1,
            policy: PolicyKind::default(),
            lottery_seed: DEFAULT_LOTTERY_SEED,
            mlfq: MlfqConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Select the scheduling policy
    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Set the process table capacity, clamped to `1..=NPROC`
    pub fn with_nproc(mut self, nproc: usize) -> Self {
        self.nproc = nproc.clamp(1, NPROC);
        self
    }

    /// Set the CPU count, clamped to `1..=NCPU`
    pub fn with_ncpu(mut self, ncpu: usize) -> Self {
        self.ncpu = ncpu.clamp(1, NCPU);
        self
    }

    /// Seed the lottery generator
    pub fn with_lottery_seed(mut self, seed: u64) -> Self {
        self.lottery_seed = seed;
        self
    }

    /// Override MLFQ slices and aging thresholds
    pub fn with_mlfq(mut self, mlfq: MlfqConfig) -> Self {
        self.mlfq = mlfq;
        self
    }
}
