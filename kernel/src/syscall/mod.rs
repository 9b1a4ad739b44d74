/*
 * System Call Dispatch
 *
 * Entry point for system calls made by user processes. The trap path saves
 * the user registers into the process's trap frame and calls
 * `Kernel::syscall`, which:
 *
 * - reads the syscall number from a7
 * - runs the handler (handlers.rs), which reads its arguments from a0..a5
 * - stores the result in a0
 * - logs the call if the process traces that syscall number
 */

pub mod handlers;
pub mod numbers;

pub use numbers::{TraceMask, syscall_name};

use crate::platform::Platform;
use crate::scheduler::Kernel;

use handlers::*;
use numbers::*;

impl<P: Platform> Kernel<P> {
    /// Handle the pending system call of the current process
    pub fn syscall(&self) {
        let Some(num) = self
            .current_private()
            .and_then(|private| private.trapframe().map(|tf| tf.a7 as usize))
        else {
            log::warn!("syscall: no current process");
            return;
        };

        let ret: i64 = match num {
            SYS_FORK => sys_fork(self),
            SYS_EXIT => sys_exit(self),
            SYS_WAIT => sys_wait(self),
            SYS_KILL => sys_kill(self),
            SYS_GETPID => sys_getpid(self),
            SYS_SLEEP => sys_sleep(self),
            SYS_UPTIME => sys_uptime(self),
            SYS_TRACE => sys_trace(self),
            SYS_SIGALARM => sys_sigalarm(self),
            SYS_SIGRETURN => sys_sigreturn(self),
            SYS_SET_PRIORITY => sys_set_priority(self),
            SYS_SETTICKETS => sys_settickets(self),
            SYS_WAITX => sys_waitx(self),
            _ => {
                log::warn!("{:?}: unknown sys call {}", self.current_pid(), num);
                -1
            }
        };

        if let Some(mut private) = self.current_private() {
            if let Some(tf) = private.trapframe_mut() {
                tf.a0 = ret as u64;
            }
        }

        let traced = self.current_slot().and_then(|slot| {
            let p = self.table().proc(slot).lock(self);
            p.trace_mask.traces(num).then_some(p.pid)
        });
        if let Some(pid) = traced {
            log::info!("{}: syscall {} -> {}", pid, syscall_name(num), ret);
        }
    }
}
