/*
 * Host Test Support
 *
 * Pieces the unit tests build on:
 *
 * - CountingIrq: interrupt bookkeeping for locks used outside a kernel
 * - PolicyBench: a bare PCB table for driving scheduling policies directly
 * - TestPlatform: a `Platform` that runs every process on its own OS thread
 *
 * TestPlatform emulates a single CPU. `switch` hands a baton between the
 * thread running the scheduler loop (the test thread) and the process
 * threads, so exactly one of them executes at any time and the real
 * `sched`, `sleep` and `forkret` paths run unchanged. A process thread is
 * started the first time its context is switched to; it runs `forkret`,
 * then the program stored in its address space, then `exit(0)`.
 */

use std::boxed::Box;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::string::{String, ToString};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use std::vec::Vec;

use crate::config::KernelConfig;
use crate::error::ProcError;
use crate::platform::{Context, Platform, TrapFrame};
use crate::scheduler::policies::MlfqPolicy;
use crate::scheduler::{CpuId, Kernel, Pcb, Pick, Pid, ProcState, SchedCtx, SchedPolicy};
use crate::sync::{IrqControl, SpinLock};

// ============================================================================
// LOCKS WITHOUT A KERNEL
// ============================================================================

/// Interrupt bookkeeping for a single pretend CPU
pub struct CountingIrq {
    depth: AtomicUsize,
}

impl CountingIrq {
    pub fn new() -> Self {
        Self {
            depth: AtomicUsize::new(0),
        }
    }

    /// Current push_off nesting depth
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

impl IrqControl for CountingIrq {
    fn push_off(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn pop_off(&self) {
        let depth = self.depth();
        if depth == 0 {
            panic!("pop_off: not pushed");
        }
        self.depth.store(depth - 1, Ordering::Relaxed);
    }

    fn cpu_id(&self) -> usize {
        0
    }
}

// ============================================================================
// POLICY BENCH
// ============================================================================

/// A PCB table and clock for exercising a policy without a kernel.
///
/// Slot `n` holds pid `n + 1` in state Used.
pub struct PolicyBench {
    procs: Vec<SpinLock<Pcb>>,
    irq: CountingIrq,
    now: AtomicU64,
}

impl PolicyBench {
    pub fn new(slots: usize) -> Self {
        let procs = (0..slots)
            .map(|slot| {
                let mut p = Pcb::new();
                p.pid = Pid(slot as i32 + 1);
                p.state = ProcState::Used;
                SpinLock::new("proc", p)
            })
            .collect();
        Self {
            procs,
            irq: CountingIrq::new(),
            now: AtomicU64::new(0),
        }
    }

    pub fn ctx(&self) -> SchedCtx<'_> {
        SchedCtx::new(&self.procs, &self.irq, CpuId::BSP, self.now.load(Ordering::Relaxed))
    }

    pub fn set_now(&self, now: u64) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Run `f` on the locked PCB of `slot`
    pub fn with<R>(&self, slot: usize, f: impl FnOnce(&mut Pcb) -> R) -> R {
        let mut p = self.procs[slot].lock(&self.irq);
        f(&mut p)
    }

    pub fn set_state(&self, slot: usize, state: ProcState) {
        self.with(slot, |p| p.state = state);
    }

    /// Mark `slot` Runnable and tell the policy
    pub fn make_runnable(&self, policy: &dyn SchedPolicy, slot: usize) {
        let ctx = self.ctx();
        let mut p = ctx.lock(slot);
        p.state = ProcState::Runnable;
        policy.on_runnable(&ctx, slot, &mut p);
    }

    /// Slot the policy would dispatch next
    pub fn pick(&self, policy: &dyn SchedPolicy) -> Option<usize> {
        policy.pick_next(&self.ctx()).map(|pick| pick.slot)
    }

    /// Dispatch the policy's pick, let it run `ticks` ticks, and return it
    /// to the policy in state `after`.
    pub fn dispatch(&self, policy: &dyn SchedPolicy, ticks: u64, after: ProcState) -> Option<usize> {
        let ctx = self.ctx();
        let Pick { slot, mut pcb } = policy.pick_next(&ctx)?;
        pcb.state = ProcState::Running;
        pcb.run_count += 1;
        policy.on_dispatch(&ctx, slot, &mut pcb);

        pcb.run_time += ticks;
        pcb.pbs_run_ticks += ticks;
        pcb.ticks_in_queue += ticks;
        self.now.fetch_add(ticks, Ordering::Relaxed);

        pcb.state = after;
        policy.on_return(&self.ctx(), slot, &mut pcb);
        Some(slot)
    }

    /// Queue members of an MLFQ level
    pub fn ctx_members(&self, mlfq: &MlfqPolicy, level: usize) -> Vec<usize> {
        mlfq.members(&self.ctx(), level)
    }
}

// ============================================================================
// TEST PLATFORM
// ============================================================================

pub type TestKernel = Kernel<TestPlatform>;

/// Code a test process runs after `forkret`
pub type Program = Arc<dyn Fn(&'static TestKernel) + Send + Sync>;

/// Baton key of the CPU's scheduler context
const SCHEDULER: u64 = 0;
/// Bytes of user memory per address space
const USER_MEMORY: usize = 4096;
/// How long the scheduler waits for a process to give the CPU back
const SWITCH_TIMEOUT: Duration = Duration::from_secs(10);

/// User address space: a program and a small flat memory
pub struct TestSpace {
    program: Option<Program>,
    memory: Mutex<Vec<u8>>,
}

impl TestSpace {
    fn new() -> Self {
        Self {
            program: None,
            memory: Mutex::new(vec![0; USER_MEMORY]),
        }
    }

    fn memory(&self) -> MutexGuard<'_, Vec<u8>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read_i32(&self, addr: u64) -> i32 {
        let memory = self.memory();
        let start = addr as usize;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&memory[start..start + 4]);
        i32::from_le_bytes(bytes)
    }
}

/// Open-file table; the platform counts live ones
pub struct TestFiles;

struct Baton {
    holder: u64,
    started: HashSet<u64>,
    failures: Vec<String>,
}

/// Single-CPU host platform
pub struct TestPlatform {
    kernel: OnceLock<&'static TestKernel>,
    baton: Mutex<Baton>,
    turn: Condvar,
    next_key: AtomicU64,
    intr: AtomicBool,
    next_program: Mutex<Option<Program>>,
    fail_trapframe: AtomicBool,
    fail_space: AtomicBool,
    fail_copy: AtomicBool,
    live_spaces: AtomicUsize,
    open_files: AtomicUsize,
}

impl TestPlatform {
    pub fn new() -> Self {
        Self {
            kernel: OnceLock::new(),
            baton: Mutex::new(Baton {
                holder: SCHEDULER,
                started: HashSet::new(),
                failures: Vec::new(),
            }),
            turn: Condvar::new(),
            next_key: AtomicU64::new(SCHEDULER + 1),
            intr: AtomicBool::new(false),
            next_program: Mutex::new(None),
            fail_trapframe: AtomicBool::new(false),
            fail_space: AtomicBool::new(false),
            fail_copy: AtomicBool::new(false),
            live_spaces: AtomicUsize::new(0),
            open_files: AtomicUsize::new(0),
        }
    }

    /// Give the platform the kernel its process threads run against
    pub fn attach(&self, kernel: &'static TestKernel) {
        let _ = self.kernel.set(kernel);
    }

    /// Program for the next address space that is loaded or copied
    pub fn set_next_program(&self, program: Program) {
        *lock(&self.next_program) = Some(program);
    }

    pub fn fail_next_trapframe(&self) {
        self.fail_trapframe.store(true, Ordering::Relaxed);
    }

    pub fn fail_next_address_space(&self) {
        self.fail_space.store(true, Ordering::Relaxed);
    }

    pub fn fail_next_copy(&self) {
        self.fail_copy.store(true, Ordering::Relaxed);
    }

    pub fn live_address_spaces(&self) -> usize {
        self.live_spaces.load(Ordering::Relaxed)
    }

    pub fn open_files(&self) -> usize {
        self.open_files.load(Ordering::Relaxed)
    }

    /// Block until the baton is `me`'s.
    ///
    /// The scheduler side gives up with a panic when a process fails or
    /// never switches back.
    fn wait_turn(&self, mut baton: MutexGuard<'_, Baton>, me: u64) {
        loop {
            if me == SCHEDULER && !baton.failures.is_empty() {
                panic!("process failed: {}", baton.failures.join("; "));
            }
            if baton.holder == me {
                return;
            }
            if me == SCHEDULER {
                let (next, timeout) = self
                    .turn
                    .wait_timeout(baton, SWITCH_TIMEOUT)
                    .unwrap_or_else(PoisonError::into_inner);
                baton = next;
                if timeout.timed_out() && baton.holder != me {
                    panic!("process holding key {} never switched back", baton.holder);
                }
            } else {
                baton = self.turn.wait(baton).unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    fn start_process(&self, key: u64, slot: usize) {
        let Some(&kernel) = self.kernel.get() else {
            panic!("test platform used before attach");
        };
        std::thread::spawn(move || {
            let platform = kernel.platform();
            platform.wait_turn(lock(&platform.baton), key);

            let outcome = catch_unwind(AssertUnwindSafe(|| run_process(kernel, slot)));
            if let Err(payload) = outcome {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".to_string());
                // Give the scheduler back its PCB lock, as sched would
                let proc = kernel.table().proc(slot);
                if !proc.holding(kernel) {
                    core::mem::forget(proc.lock(kernel));
                }
                let mut baton = lock(&platform.baton);
                baton.failures.push(format!("slot {}: {}", slot, message));
                baton.holder = SCHEDULER;
                platform.turn.notify_all();
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_process(kernel: &'static TestKernel, slot: usize) {
    kernel.forkret();
    let program = kernel
        .table()
        .private(slot)
        .lock()
        .address_space()
        .and_then(|space| space.program.clone());
    if let Some(program) = program {
        program(kernel);
    }
    kernel.exit(0);
}

impl Platform for TestPlatform {
    type AddressSpace = TestSpace;
    type Files = TestFiles;

    fn cpu_id(&self) -> usize {
        0
    }

    fn intr_on(&self) {
        self.intr.store(true, Ordering::Relaxed);
    }

    fn intr_off(&self) {
        self.intr.store(false, Ordering::Relaxed);
    }

    fn intr_get(&self) -> bool {
        self.intr.load(Ordering::Relaxed)
    }

    unsafe fn switch(&self, old: *mut Context, new: *const Context) {
        // s0 holds slot + 1 and s1 the thread key; the CPU context is key 0
        let (me, next, slot) = unsafe { ((*old).s[1], (*new).s[1], (*new).s[0]) };

        let mut baton = lock(&self.baton);
        baton.holder = next;
        if next != SCHEDULER && baton.started.insert(next) {
            self.start_process(next, slot as usize - 1);
        }
        self.turn.notify_all();
        self.wait_turn(baton, me);
    }

    fn init_context(&self, ctx: &mut Context, slot: usize) {
        *ctx = Context::default();
        ctx.s[0] = slot as u64 + 1;
        ctx.s[1] = self.next_key.fetch_add(1, Ordering::Relaxed);
    }

    fn alloc_trapframe(&self) -> Result<Box<TrapFrame>, ProcError> {
        if self.fail_trapframe.swap(false, Ordering::Relaxed) {
            return Err(ProcError::ResourceExhausted);
        }
        Ok(Box::new(TrapFrame::default()))
    }

    fn create_address_space(&self, _trapframe: &TrapFrame) -> Result<TestSpace, ProcError> {
        if self.fail_space.swap(false, Ordering::Relaxed) {
            return Err(ProcError::ResourceExhausted);
        }
        self.live_spaces.fetch_add(1, Ordering::Relaxed);
        Ok(TestSpace::new())
    }

    fn copy_address_space(&self, src: &TestSpace, dst: &mut TestSpace) -> Result<(), ProcError> {
        if self.fail_copy.swap(false, Ordering::Relaxed) {
            return Err(ProcError::ResourceExhausted);
        }
        let memory = src.memory().clone();
        *dst.memory() = memory;
        dst.program = lock(&self.next_program).take().or_else(|| src.program.clone());
        Ok(())
    }

    fn free_address_space(&self, _space: TestSpace) {
        self.live_spaces.fetch_sub(1, Ordering::Relaxed);
    }

    fn load_init_image(&self, space: &mut TestSpace, trapframe: &mut TrapFrame) {
        space.program = lock(&self.next_program).take();
        trapframe.epc = 0;
        trapframe.sp = USER_MEMORY as u64;
    }

    fn copy_out(&self, space: &TestSpace, addr: u64, bytes: &[u8]) -> Result<(), ProcError> {
        let start = addr as usize;
        let end = start.checked_add(bytes.len()).ok_or(ProcError::BadAddress)?;
        if end > USER_MEMORY {
            return Err(ProcError::BadAddress);
        }
        space.memory()[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn root_files(&self) -> TestFiles {
        self.open_files.fetch_add(1, Ordering::Relaxed);
        TestFiles
    }

    fn dup_files(&self, _files: &TestFiles) -> TestFiles {
        self.open_files.fetch_add(1, Ordering::Relaxed);
        TestFiles
    }

    fn close_files(&self, _files: TestFiles) {
        self.open_files.fetch_sub(1, Ordering::Relaxed);
    }
}

// ============================================================================
// KERNEL HELPERS
// ============================================================================

/// A kernel on a fresh test platform, with no processes
pub fn test_kernel(config: KernelConfig) -> &'static TestKernel {
    let kernel: &'static TestKernel = Box::leak(Box::new(Kernel::new(TestPlatform::new(), config)));
    kernel.platform().attach(kernel);
    kernel
}

/// A kernel whose init process runs `init`
pub fn boot(
    config: KernelConfig,
    init: impl Fn(&'static TestKernel) + Send + Sync + 'static,
) -> &'static TestKernel {
    let kernel = test_kernel(config);
    kernel.platform().set_next_program(Arc::new(init));
    if let Err(err) = kernel.userinit() {
        panic!("userinit failed: {}", err);
    }
    kernel
}

/// Fork from the calling process, the child running `program`
pub fn fork_with(
    kernel: &'static TestKernel,
    program: impl Fn(&'static TestKernel) + Send + Sync + 'static,
) -> Result<Pid, ProcError> {
    kernel.platform().set_next_program(Arc::new(program));
    let result = kernel.fork();
    // Not consumed when the fork failed early
    lock(&kernel.platform().next_program).take();
    result
}

/// Drive the scheduler, one dispatch and one clock tick per round, until
/// `done` holds.
pub fn run_until(kernel: &'static TestKernel, done: impl Fn() -> bool, max_rounds: usize) {
    for _ in 0..max_rounds {
        if done() {
            return;
        }
        kernel.schedule_once();
        kernel.clock_tick();
    }
    if !done() {
        panic!("not done after {} scheduling rounds", max_rounds);
    }
}

/// Read an i32 from the calling process's memory
pub fn read_user_i32(kernel: &'static TestKernel, addr: u64) -> i32 {
    kernel
        .current_private()
        .and_then(|private| private.address_space().map(|space| space.read_i32(addr)))
        .unwrap_or_else(|| panic!("no current address space"))
}

/// Issue system call `num` from the calling process
pub fn syscall(kernel: &'static TestKernel, num: usize, args: &[u64]) -> i64 {
    {
        let mut private = kernel
            .current_private()
            .unwrap_or_else(|| panic!("syscall outside a process"));
        let Some(tf) = private.trapframe_mut() else {
            panic!("process without a trap frame");
        };
        tf.a7 = num as u64;
        let regs = [&mut tf.a0, &mut tf.a1, &mut tf.a2, &mut tf.a3, &mut tf.a4, &mut tf.a5];
        for (reg, value) in regs.into_iter().zip(args) {
            *reg = *value;
        }
    }
    kernel.syscall();
    kernel
        .current_private()
        .and_then(|private| private.trapframe().map(|tf| tf.a0 as i64))
        .unwrap_or_else(|| panic!("process lost its trap frame"))
}

/// Keep the calling process alive and out of the way for good
pub fn park(kernel: &'static TestKernel) -> ! {
    loop {
        let _ = kernel.sleep_ticks(1_000);
    }
}

/// Slot of the live process with `pid`
pub fn slot_of(kernel: &'static TestKernel, pid: Pid) -> Option<usize> {
    (0..kernel.table().capacity()).find(|&slot| {
        let p = kernel.table().proc(slot).lock(kernel);
        p.state != ProcState::Unused && p.pid == pid
    })
}
