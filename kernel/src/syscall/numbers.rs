/*
 * System Call Numbers
 *
 * Numbers match the xv6 user library, so the usual user programs (wait,
 * kill, sh, strace, setpriority, schedulertest) run unmodified.
 *
 * Syscall Mechanism:
 * - a7 holds the syscall number
 * - Arguments in a0..a5
 * - Return value in a0 (-1 on failure; set_priority also returns -2)
 */

use bitflags::bitflags;

/// Create a process copying the caller
///
/// Arguments: () -> pid
/// Returns: child pid in the parent, 0 in the child, -1 on failure
pub const SYS_FORK: usize = 1;

/// Terminate the calling process
///
/// Arguments: (status: i32) -> !
pub const SYS_EXIT: usize = 2;

/// Wait for a child to exit
///
/// Arguments: (status: *mut i32) -> pid
/// Returns: reaped pid, or -1 when there are no children
pub const SYS_WAIT: usize = 3;

/// Mark a process as killed
///
/// Arguments: (pid: i32) -> 0 or -1
pub const SYS_KILL: usize = 6;

/// Arguments: () -> pid of the caller
pub const SYS_GETPID: usize = 11;

/// Sleep for a number of ticks
///
/// Arguments: (ticks: i32) -> 0, or -1 if killed while sleeping
pub const SYS_SLEEP: usize = 13;

/// Arguments: () -> ticks since boot
pub const SYS_UPTIME: usize = 14;

/// Set the syscall trace mask of the caller
///
/// Arguments: (mask: i32) -> 0
pub const SYS_TRACE: usize = 22;

/// Register a periodic alarm handler
///
/// Arguments: (interval: i32, handler: fn()) -> 0 or -1
pub const SYS_SIGALARM: usize = 23;

/// Return from an alarm handler
///
/// Arguments: () -> 0, restoring the registers saved when the alarm fired
pub const SYS_SIGRETURN: usize = 24;

/// Change a process's static priority (PBS)
///
/// Arguments: (priority: i32, pid: i32) -> old priority
/// Returns: -2 if priority is outside [0,100], -1 if no such process
pub const SYS_SET_PRIORITY: usize = 25;

/// Add lottery tickets to the caller (LBS)
///
/// Arguments: (count: i32) -> 0 or -1
pub const SYS_SETTICKETS: usize = 26;

/// Wait for a child and report its times
///
/// Arguments: (status: *mut i32, wtime: *mut u32, rtime: *mut u32) -> pid
pub const SYS_WAITX: usize = 27;

/// Name of syscall `num`, for trace output
pub fn syscall_name(num: usize) -> &'static str {
    match num {
        SYS_FORK => "fork",
        SYS_EXIT => "exit",
        SYS_WAIT => "wait",
        SYS_KILL => "kill",
        SYS_GETPID => "getpid",
        SYS_SLEEP => "sleep",
        SYS_UPTIME => "uptime",
        SYS_TRACE => "trace",
        SYS_SIGALARM => "sigalarm",
        SYS_SIGRETURN => "sigreturn",
        SYS_SET_PRIORITY => "set_priority",
        SYS_SETTICKETS => "settickets",
        SYS_WAITX => "waitx",
        _ => "unknown",
    }
}

bitflags! {
    /// Syscalls traced for a process; bit n traces syscall number n.
    ///
    /// User masks may set any bit, so build them with `from_bits_retain`.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TraceMask: u32 {
        const FORK = 1 << SYS_FORK;
        const EXIT = 1 << SYS_EXIT;
        const WAIT = 1 << SYS_WAIT;
        const KILL = 1 << SYS_KILL;
        const GETPID = 1 << SYS_GETPID;
        const SLEEP = 1 << SYS_SLEEP;
        const UPTIME = 1 << SYS_UPTIME;
        const TRACE = 1 << SYS_TRACE;
        const SIGALARM = 1 << SYS_SIGALARM;
        const SIGRETURN = 1 << SYS_SIGRETURN;
        const SET_PRIORITY = 1 << SYS_SET_PRIORITY;
        const SETTICKETS = 1 << SYS_SETTICKETS;
        const WAITX = 1 << SYS_WAITX;
    }
}

impl TraceMask {
    /// Does this mask trace syscall `num`?
    pub fn traces(self, num: usize) -> bool {
        num < 32 && self.bits() & (1 << num) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_bits_follow_numbers() {
        let mask = TraceMask::from_bits_retain(1 << SYS_FORK | 1 << SYS_WAITX);
        assert_eq!(mask, TraceMask::FORK | TraceMask::WAITX);
        assert!(mask.traces(SYS_FORK));
        assert!(!mask.traces(SYS_EXIT));
        assert!(!mask.traces(40));
    }

    #[test]
    fn test_names() {
        assert_eq!(syscall_name(SYS_SET_PRIORITY), "set_priority");
        assert_eq!(syscall_name(99), "unknown");
    }
}
