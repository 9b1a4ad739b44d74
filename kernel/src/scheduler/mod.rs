/*
 * Process Scheduling Core
 *
 * This module owns the process table and everything that moves processes
 * through their life cycle:
 *
 * - table.rs: slot allocation and release
 * - sched_core.rs: the per-CPU dispatch loop, sched, yield, forkret
 * - sleep.rs: sleep and wakeup on channels
 * - lifecycle.rs: userinit, fork, exit, wait, waitx, kill
 * - accounting.rs: tick accounting, PBS priorities, lottery tickets, alarms
 * - policies/: RR, FCFS, PBS, LBS and MLFQ behind the SchedPolicy trait
 * - procdump.rs: console process listing
 *
 * All state lives in one `Kernel` value, generic over the `Platform` that
 * provides context switching, interrupts and memory. A board port keeps it
 * in a static; the tests create one per test.
 */

pub mod accounting;
pub mod context;
pub mod cpu;
pub mod lifecycle;
pub mod policies;
pub mod procdump;
pub mod process;
pub mod sched_core;
pub mod sleep;
pub mod table;
pub mod traits;
pub mod types;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::{KernelConfig, NCPU, NPROC, PolicyKind};
use crate::platform::Platform;
use crate::sync::{IrqControl, SpinLock};

pub use context::{Pick, SchedCtx};
pub use cpu::Cpu;
pub use process::{Alarm, Pcb, ProcPrivate};
pub use table::ProcTable;
pub use traits::SchedPolicy;
pub use types::{Channel, CpuId, Pid, ProcState, Reaped};

/// The process-scheduling kernel
pub struct Kernel<P: Platform> {
    platform: P,
    config: KernelConfig,
    table: ProcTable<P>,
    cpus: Vec<Cpu>,
    policy: Box<dyn SchedPolicy>,
    /// Tick counter; also the lock timed sleepers sleep under
    ticks: SpinLock<u64>,
    /// Lock-free copy of `ticks` for readers that hold PCB locks
    now: AtomicU64,
    pid_lock: SpinLock<i32>,
    next_ticket: AtomicU32,
    /// Slot of the first process, which adopts orphans
    init_slot: spin::Once<usize>,
}

impl<P: Platform> Kernel<P> {
    /// Build the kernel state and select the scheduling policy
    ///
    /// # Arguments
    /// - `platform`: machine services (context switch, interrupts, memory)
    /// - `config`: table size, CPU count and policy
    pub fn new(platform: P, mut config: KernelConfig) -> Self {
        config.nproc = config.nproc.clamp(1, NPROC);
        config.ncpu = config.ncpu.clamp(1, NCPU);
        let policy = policies::build(&config);

        log::info!(
            "Process table initialized: {} slots, {} CPU(s)",
            config.nproc,
            config.ncpu
        );
        log::info!("Scheduling policy: {}", policy.name());

        Self {
            platform,
            table: ProcTable::new(config.nproc),
            cpus: (0..config.ncpu).map(|i| Cpu::new(CpuId(i as u32))).collect(),
            policy,
            ticks: SpinLock::new("time", 0),
            now: AtomicU64::new(0),
            pid_lock: SpinLock::new("nextpid", 1),
            next_ticket: AtomicU32::new(0),
            init_slot: spin::Once::new(),
            config,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn table(&self) -> &ProcTable<P> {
        &self.table
    }

    /// Active scheduling policy
    pub fn policy_kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Ticks since boot
    pub fn uptime(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    /// Per-CPU state of the executing CPU.
    ///
    /// Interrupts must be off, otherwise the caller may migrate.
    pub fn mycpu(&self) -> &Cpu {
        &self.cpus[self.platform.cpu_id()]
    }

    /// Slot of the process running on this CPU
    pub fn current_slot(&self) -> Option<usize> {
        self.push_off();
        let slot = self.mycpu().proc();
        self.pop_off();
        slot
    }

    /// Slot of the calling process; calling without one is a kernel bug
    pub(crate) fn require_current(&self, op: &str) -> usize {
        match self.current_slot() {
            Some(slot) => slot,
            None => panic!("{}: no current process", op),
        }
    }

    /// Pid of the process running on this CPU
    pub fn current_pid(&self) -> Option<Pid> {
        self.current_slot()
            .map(|slot| self.table.proc(slot).lock(self).pid)
    }

    /// Private resources of the calling process
    pub fn current_private(&self) -> Option<spin::MutexGuard<'_, ProcPrivate<P>>> {
        self.current_slot().map(|slot| self.table.private(slot).lock())
    }

    /// Slot of the first process, once created
    pub fn init_slot(&self) -> Option<usize> {
        self.init_slot.get().copied()
    }

    /// Policy view of the table for the executing CPU
    pub(crate) fn sched_ctx(&self) -> SchedCtx<'_> {
        let cpu = CpuId(self.platform.cpu_id() as u32);
        SchedCtx::new(self.table.procs(), self, cpu, self.uptime())
    }
}
