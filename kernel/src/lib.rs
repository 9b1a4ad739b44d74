/*
 * Process Scheduling Core
 *
 * The process half of a small Unix-like kernel: the process table, process
 * life cycle (fork, exit, wait, kill), sleep/wakeup, per-process time
 * accounting, and five interchangeable CPU scheduling policies:
 *
 * - RR: round robin over the process table
 * - FCFS: first come, first served, non-preemptive
 * - PBS: priority based, with dynamic priority from recent sleep/run time
 * - LBS: lottery, proportional to tickets held
 * - MLFQ: multi-level feedback queue with aging
 *
 * Everything machine specific (context switching, interrupts, page tables,
 * files) is reached through the `Platform` trait. A port creates one
 * `Kernel`, calls `userinit`, and enters `scheduler` on every CPU.
 */

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod platform;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::{KernelConfig, MlfqConfig, PolicyKind};
pub use error::ProcError;
pub use platform::{Context, Platform, TrapFrame};
pub use scheduler::{Channel, Kernel, Pcb, Pid, ProcState, Reaped, SchedPolicy};
pub use sync::{IrqControl, SpinGuard, SpinLock};
pub use syscall::TraceMask;
