/*
 * Process Control Block
 *
 * `Pcb` is the lock-protected half of a process: identity, state, exit
 * status, time accounting and the per-policy scheduling fields. It lives in
 * a `SpinLock` in the process table and every field only changes while that
 * lock is held.
 *
 * `ProcPrivate` is the other half: trap frames, the address space and the
 * open-file table. Only the owning process touches it while it runs; its
 * parent touches it during fork (before the child is runnable) and during
 * reaping (after the child is a zombie).
 */

use alloc::boxed::Box;

use heapless::{String, Vec};

use crate::config::{DEFAULT_PRIORITY, MAX_TICKETS, MLFQ_LEVELS, PROC_NAME_LEN};
use crate::platform::{Context, Platform, TrapFrame};
use crate::syscall::TraceMask;

use super::types::{Channel, Pid, ProcState};

/// Per-process alarm registered through sigalarm
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Alarm {
    /// Ticks between alarms; zero disables the alarm
    pub interval: u64,
    /// User address of the handler
    pub handler: u64,
    /// Ticks run since the last alarm
    pub elapsed: u64,
    /// The handler is running and has not called sigreturn yet
    pub active: bool,
}

/// Process control block
#[derive(Debug, Default)]
pub struct Pcb {
    pub state: ProcState,
    pub pid: Pid,
    pub name: String<PROC_NAME_LEN>,
    /// Set by kill; checked at safe points
    pub killed: bool,
    /// Exit status, valid once Zombie
    pub xstate: i32,
    /// Channel slept on, when Sleeping
    pub channel: Option<Channel>,
    /// Kernel registers saved when switched out
    pub context: Context,

    // ========== TIME ACCOUNTING ==========
    /// Tick at allocation
    pub creation_time: u64,
    /// Tick at exit
    pub end_time: u64,
    /// Total ticks spent Running
    pub run_time: u64,
    /// Ticks Running since the last PBS dispatch
    pub pbs_run_ticks: u64,
    /// Ticks Sleeping since the last PBS dispatch
    pub pbs_sleep_ticks: u64,

    // ========== PBS ==========
    pub static_priority: u8,
    pub dynamic_priority: u8,
    /// Number of times dispatched
    pub run_count: u64,

    // ========== LBS ==========
    /// Lottery tickets held; each number is globally unique
    pub tickets: Vec<u32, MAX_TICKETS>,

    // ========== MLFQ ==========
    pub queue_level: usize,
    /// Ticks run since entering the current level
    pub ticks_in_queue: u64,
    /// Tick at which the process last joined its level's queue
    pub queue_entry_time: u64,
    /// Ticks spent at each level over the process's life
    pub ticks_per_level: [u64; MLFQ_LEVELS],

    // ========== DEBUGGING ==========
    pub trace_mask: TraceMask,
    pub alarm: Alarm,
}

impl Pcb {
    /// An unused slot: every field zero or empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the process name, truncating to the name buffer size
    pub fn set_name(&mut self, name: &str) {
        self.name.clear();
        for ch in name.chars() {
            if self.name.push(ch).is_err() {
                break;
            }
        }
    }

    /// Reset the fields of a freshly allocated slot
    pub(crate) fn reset_for_allocation(&mut self, pid: Pid, now: u64) {
        *self = Self::new();
        self.pid = pid;
        self.state = ProcState::Used;
        self.creation_time = now;
        self.queue_entry_time = now;
        self.static_priority = DEFAULT_PRIORITY;
        self.dynamic_priority = DEFAULT_PRIORITY;
    }

    /// Number of lottery tickets held
    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }
}

/// Resources owned by a process, outside its PCB lock
pub struct ProcPrivate<P: Platform> {
    pub(crate) trapframe: Option<Box<TrapFrame>>,
    /// Snapshot of the trap frame taken when an alarm fires
    pub(crate) alarm_frame: Option<Box<TrapFrame>>,
    pub(crate) space: Option<P::AddressSpace>,
    pub(crate) files: Option<P::Files>,
}

impl<P: Platform> ProcPrivate<P> {
    pub const fn empty() -> Self {
        Self {
            trapframe: None,
            alarm_frame: None,
            space: None,
            files: None,
        }
    }

    /// The saved user registers
    pub fn trapframe(&self) -> Option<&TrapFrame> {
        self.trapframe.as_deref()
    }

    pub fn trapframe_mut(&mut self) -> Option<&mut TrapFrame> {
        self.trapframe.as_deref_mut()
    }

    /// The user address space
    pub fn address_space(&self) -> Option<&P::AddressSpace> {
        self.space.as_ref()
    }

    /// The open-file table
    pub fn files(&self) -> Option<&P::Files> {
        self.files.as_ref()
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.trapframe.is_none()
            && self.alarm_frame.is_none()
            && self.space.is_none()
            && self.files.is_none()
    }
}
