/*
 * Platform Interface
 *
 * Everything the process core needs from the machine and from neighbouring
 * subsystems: interrupt control, the context switch, trap frames, address
 * spaces and open-file tables. A board port implements `Platform` with real
 * assembly and page tables; the unit tests implement it with host threads.
 *
 * Register layouts follow the RISC-V calling convention: `Context` holds the
 * callee-saved registers a kernel thread needs to resume, `TrapFrame` holds
 * the full user register file saved on entry to the kernel.
 */

use alloc::boxed::Box;

use crate::error::ProcError;

/// Saved kernel registers for a context switch
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Context {
    pub ra: u64,
    pub sp: u64,
    /// Callee-saved s0..s11
    pub s: [u64; 12],
}

/// User registers saved by the trap entry path
///
/// The `kernel_*` fields describe the kernel side of the trap and are never
/// restored from user-controlled copies.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TrapFrame {
    pub kernel_satp: u64,
    pub kernel_sp: u64,
    pub kernel_trap: u64,
    pub epc: u64,
    pub kernel_hartid: u64,
    pub ra: u64,
    pub sp: u64,
    pub gp: u64,
    pub tp: u64,
    pub t0: u64,
    pub t1: u64,
    pub t2: u64,
    pub s0: u64,
    pub s1: u64,
    pub a0: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub a4: u64,
    pub a5: u64,
    pub a6: u64,
    pub a7: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
    pub t3: u64,
    pub t4: u64,
    pub t5: u64,
    pub t6: u64,
}

impl TrapFrame {
    /// Raw syscall argument `n` (a0..a5)
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.a0,
            1 => self.a1,
            2 => self.a2,
            3 => self.a3,
            4 => self.a4,
            5 => self.a5,
            _ => panic!("argraw: argument {} out of range", n),
        }
    }

    /// Overwrite the user registers with `saved`, keeping this frame's
    /// kernel fields.
    pub fn restore_user(&mut self, saved: &TrapFrame) {
        let kernel = (self.kernel_satp, self.kernel_sp, self.kernel_trap, self.kernel_hartid);
        *self = *saved;
        (self.kernel_satp, self.kernel_sp, self.kernel_trap, self.kernel_hartid) = kernel;
    }
}

/// Machine and subsystem services used by the process core
///
/// Allocation hooks report failure as `ProcError::ResourceExhausted`; the
/// caller rolls back whatever it had already set up.
pub trait Platform: Send + Sync + 'static {
    /// A process's user address space
    type AddressSpace: Send;
    /// A process's open-file table together with its current directory
    type Files: Send;

    // ========== CPU ==========

    /// Index of the executing CPU. Only meaningful with interrupts off.
    fn cpu_id(&self) -> usize;

    /// Enable device interrupts on this CPU
    fn intr_on(&self);

    /// Disable device interrupts on this CPU
    fn intr_off(&self);

    /// Whether device interrupts are enabled on this CPU
    fn intr_get(&self) -> bool;

    /// Save the current kernel registers into `old` and resume `new`.
    ///
    /// Returns when some other context switches back into `old`.
    ///
    /// # Safety
    /// Both pointers must be valid for the whole switch, and `new` must hold
    /// a context produced by `init_context` or by an earlier switch.
    unsafe fn switch(&self, old: *mut Context, new: *const Context);

    /// Prepare the first context of the process in `slot` so that switching
    /// to it enters `Kernel::forkret` on that slot's kernel stack.
    fn init_context(&self, ctx: &mut Context, slot: usize);

    // ========== MEMORY ==========

    /// Allocate a zeroed trap frame
    fn alloc_trapframe(&self) -> Result<Box<TrapFrame>, ProcError>;

    /// Create an empty user address space with `trapframe` mapped in
    fn create_address_space(&self, trapframe: &TrapFrame) -> Result<Self::AddressSpace, ProcError>;

    /// Copy all user memory of `src` into `dst`
    fn copy_address_space(
        &self,
        src: &Self::AddressSpace,
        dst: &mut Self::AddressSpace,
    ) -> Result<(), ProcError>;

    /// Release an address space and all of its memory
    fn free_address_space(&self, space: Self::AddressSpace);

    /// Load the first user program into `space` and point `trapframe` at it
    fn load_init_image(&self, space: &mut Self::AddressSpace, trapframe: &mut TrapFrame);

    /// Copy `bytes` to user address `addr`
    fn copy_out(&self, space: &Self::AddressSpace, addr: u64, bytes: &[u8]) -> Result<(), ProcError>;

    // ========== FILES ==========

    /// File table of the first process (console descriptors, root directory)
    fn root_files(&self) -> Self::Files;

    /// Duplicate every open file and the current directory for a child
    fn dup_files(&self, files: &Self::Files) -> Self::Files;

    /// Close every open file and drop the current directory reference
    fn close_files(&self, files: Self::Files);
}
