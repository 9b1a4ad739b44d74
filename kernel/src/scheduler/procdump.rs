/*
 * Process Listing
 *
 * Console debugging aid (^P): one line per allocated slot, with columns
 * chosen by the active scheduling policy. Each PCB is locked only long
 * enough to read it.
 */

use core::fmt::{self, Write};

use crate::config::PolicyKind;
use crate::platform::Platform;

use super::Kernel;
use super::accounting::dynamic_priority;
use super::types::ProcState;

impl<P: Platform> Kernel<P> {
    /// Write the process listing to `out`
    pub fn procdump(&self, out: &mut dyn Write) -> fmt::Result {
        let kind = self.policy.kind();
        let now = self.uptime();

        writeln!(out)?;
        match kind {
            PolicyKind::RoundRobin => writeln!(out, "PID State Name")?,
            PolicyKind::Fcfs => writeln!(out, "PID State Name ctime")?,
            PolicyKind::Lottery => writeln!(out, "PID State Name ctime tickets")?,
            PolicyKind::Priority => writeln!(out, "PID Priority State Name rtime wtime nrun")?,
            PolicyKind::Mlfq => writeln!(out, "PID Level State rtime wtime nrun q0 q1 q2 q3 q4")?,
        }

        for slot in 0..self.table.capacity() {
            let p = self.table.proc(slot).lock(self);
            if p.state == ProcState::Unused {
                continue;
            }
            let state = p.state.as_str();
            let wait_time = now.saturating_sub(p.creation_time).saturating_sub(p.run_time);

            match kind {
                PolicyKind::RoundRobin => writeln!(out, "{} {} {}", p.pid, state, p.name)?,
                PolicyKind::Fcfs => {
                    writeln!(out, "{} {} {} {}", p.pid, state, p.name, p.creation_time)?
                }
                PolicyKind::Lottery => writeln!(
                    out,
                    "{} {} {} {} {}",
                    p.pid,
                    state,
                    p.name,
                    p.creation_time,
                    p.ticket_count()
                )?,
                PolicyKind::Priority => {
                    let priority =
                        dynamic_priority(p.static_priority, p.pbs_run_ticks, p.pbs_sleep_ticks);
                    writeln!(
                        out,
                        "{} {} {} {} {} {} {}",
                        p.pid, priority, state, p.name, p.run_time, wait_time, p.run_count
                    )?
                }
                PolicyKind::Mlfq => {
                    let q = &p.ticks_per_level;
                    writeln!(
                        out,
                        "{} {} {} {} {} {} {} {} {} {} {}",
                        p.pid,
                        p.queue_level,
                        state,
                        p.run_time,
                        wait_time,
                        p.run_count,
                        q[0],
                        q[1],
                        q[2],
                        q[3],
                        q[4]
                    )?
                }
            }
        }
        Ok(())
    }
}
