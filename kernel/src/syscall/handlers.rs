/*
 * System Call Handlers
 *
 * Each handler decodes its arguments from the caller's trap frame,
 * delegates to the kernel, and turns the outcome into the value left in
 * a0. User pointers are never dereferenced here; results go out through
 * the platform's `copy_out`, which validates the address.
 */

use crate::error::ProcError;
use crate::platform::Platform;
use crate::scheduler::{Kernel, Pid};

use super::numbers::TraceMask;

/// Raw argument `n` of the current syscall
fn argraw<P: Platform>(kernel: &Kernel<P>, n: usize) -> u64 {
    kernel
        .current_private()
        .and_then(|private| private.trapframe().map(|tf| tf.arg(n)))
        .unwrap_or(0)
}

/// Argument `n` as a C int
fn argint<P: Platform>(kernel: &Kernel<P>, n: usize) -> i64 {
    argraw(kernel, n) as i32 as i64
}

/// Argument `n` as a user address; null means "not wanted"
fn argaddr<P: Platform>(kernel: &Kernel<P>, n: usize) -> Option<u64> {
    match argraw(kernel, n) {
        0 => None,
        addr => Some(addr),
    }
}

/// Copy `bytes` into the calling process's memory at `addr`
fn copy_to_user<P: Platform>(kernel: &Kernel<P>, addr: u64, bytes: &[u8]) -> Result<(), ProcError> {
    let private = kernel.current_private().ok_or(ProcError::BadAddress)?;
    let space = private.address_space().ok_or(ProcError::BadAddress)?;
    kernel.platform().copy_out(space, addr, bytes)
}

fn status(result: Result<(), ProcError>) -> i64 {
    match result {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

pub fn sys_exit<P: Platform>(kernel: &Kernel<P>) -> ! {
    kernel.exit(argint(kernel, 0) as i32)
}

pub fn sys_getpid<P: Platform>(kernel: &Kernel<P>) -> i64 {
    kernel.current_pid().map_or(-1, |pid| pid.0 as i64)
}

pub fn sys_fork<P: Platform>(kernel: &Kernel<P>) -> i64 {
    kernel.fork().map_or(-1, |pid| pid.0 as i64)
}

pub fn sys_wait<P: Platform>(kernel: &Kernel<P>) -> i64 {
    kernel
        .wait(argaddr(kernel, 0))
        .map_or(-1, |pid| pid.0 as i64)
}

pub fn sys_waitx<P: Platform>(kernel: &Kernel<P>) -> i64 {
    let status_addr = argaddr(kernel, 0);
    let wtime_addr = argraw(kernel, 1);
    let rtime_addr = argraw(kernel, 2);

    let reaped = match kernel.waitx(status_addr) {
        Ok(reaped) => reaped,
        Err(_) => return -1,
    };
    let wtime = (reaped.wait_time as u32).to_le_bytes();
    let rtime = (reaped.run_time as u32).to_le_bytes();
    if copy_to_user(kernel, wtime_addr, &wtime).is_err()
        || copy_to_user(kernel, rtime_addr, &rtime).is_err()
    {
        return -1;
    }
    reaped.pid.0 as i64
}

pub fn sys_kill<P: Platform>(kernel: &Kernel<P>) -> i64 {
    status(kernel.kill(Pid(argint(kernel, 0) as i32)))
}

pub fn sys_sleep<P: Platform>(kernel: &Kernel<P>) -> i64 {
    status(kernel.sleep_ticks(argint(kernel, 0)))
}

pub fn sys_uptime<P: Platform>(kernel: &Kernel<P>) -> i64 {
    kernel.uptime() as i64
}

pub fn sys_trace<P: Platform>(kernel: &Kernel<P>) -> i64 {
    kernel.trace(TraceMask::from_bits_retain(argint(kernel, 0) as u32));
    0
}

pub fn sys_sigalarm<P: Platform>(kernel: &Kernel<P>) -> i64 {
    let interval = argint(kernel, 0);
    let handler = argraw(kernel, 1) as i64;
    status(kernel.sigalarm(interval, handler))
}

/// Returns the restored a0, so the interrupted code sees its own register
/// once the dispatcher stores the return value.
pub fn sys_sigreturn<P: Platform>(kernel: &Kernel<P>) -> i64 {
    if kernel.sigreturn().is_err() {
        return -1;
    }
    argraw(kernel, 0) as i64
}

pub fn sys_set_priority<P: Platform>(kernel: &Kernel<P>) -> i64 {
    let priority = argint(kernel, 0);
    let pid = Pid(argint(kernel, 1) as i32);
    match kernel.set_priority(pid, priority) {
        Ok(old) => old as i64,
        Err(ProcError::InvalidArgument) => -2,
        Err(_) => -1,
    }
}

pub fn sys_settickets<P: Platform>(kernel: &Kernel<P>) -> i64 {
    status(kernel.settickets(argint(kernel, 0)))
}
