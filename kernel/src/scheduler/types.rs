/*
 * Scheduler Type Definitions
 *
 * Small Copy types shared by the process table, the life-cycle manager and
 * the scheduling policies.
 */

use core::fmt;

/// CPU identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl CpuId {
    /// Bootstrap processor (CPU 0)
    pub const BSP: CpuId = CpuId(0);

    /// Get the CPU ID as a usize for indexing
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Process identifier
///
/// Pids are handed out from a monotonically increasing counter and never
/// reused. Zero marks an unused slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pid(pub i32);

impl Pid {
    /// Pid of the first user process
    pub const INIT: Pid = Pid(1);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ProcState {
    /// Free table slot
    #[default]
    Unused,
    /// Allocated, still being set up
    Used,
    /// Sleeping on a channel
    Sleeping,
    /// Ready to be dispatched
    Runnable,
    /// Executing on some CPU
    Running,
    /// Exited, waiting to be reaped by its parent
    Zombie,
}

impl ProcState {
    /// Fixed-width name used by procdump
    pub fn as_str(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Used => "used",
            ProcState::Sleeping => "sleep ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Zombie => "zombie",
        }
    }
}

/// Something a process can sleep on
///
/// Two channels are equal only if they name the same object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// The wait channel of the process in this table slot; parents sleep on
    /// their own slot while waiting for children
    Proc(usize),
    /// The global tick counter
    Ticks,
    /// Any other kernel object, identified by address
    Object(usize),
}

impl Channel {
    /// Channel identified by the address of `object`
    pub fn of<T>(object: &T) -> Self {
        Channel::Object(object as *const T as usize)
    }
}

/// Result of reaping a child
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reaped {
    /// Pid of the reaped child
    pub pid: Pid,
    /// Exit status passed to `exit`
    pub status: i32,
    /// Ticks the child spent running
    pub run_time: u64,
    /// Ticks between creation and exit not spent running
    pub wait_time: u64,
}
