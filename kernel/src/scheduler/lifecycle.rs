/*
 * Process Life Cycle
 *
 * Creation, termination and reaping:
 *
 * - userinit: build the first process from the platform's init image
 * - fork: duplicate the calling process
 * - exit: turn the caller into a zombie and hand its children to init
 * - wait / waitx: reap a zombie child
 * - kill: flag a process for termination
 *
 * Parent links are only touched under the wait lock, which is always taken
 * before any PCB lock. A parent sleeps on its own wait channel
 * (`Channel::Proc(slot)`) and exiting children wake it there.
 */

use crate::error::ProcError;
use crate::platform::Platform;

use super::Kernel;
use super::types::{Channel, Pid, ProcState, Reaped};

impl<P: Platform> Kernel<P> {
    /// Create the first user process.
    ///
    /// # Returns
    /// The new process's pid
    pub fn userinit(&self) -> Result<Pid, ProcError> {
        let (slot, mut p) = self.allocate()?;
        {
            let mut private = self.table.private(slot).lock();
            let private = &mut *private;
            if let (Some(space), Some(trapframe)) =
                (private.space.as_mut(), private.trapframe.as_deref_mut())
            {
                self.platform.load_init_image(space, trapframe);
            }
            private.files = Some(self.platform.root_files());
        }

        p.set_name("initcode");
        let pid = p.pid;
        self.init_slot.call_once(|| slot);
        self.make_runnable(slot, &mut p);

        log::info!("userinit: init process pid {} in slot {}", pid, slot);
        Ok(pid)
    }

    /// Create a new process copying the caller.
    ///
    /// The child gets a copy of the address space, duplicated files, the
    /// parent's trace mask and name, and a fresh block of lottery tickets
    /// the size of the parent's. It returns 0 from the fork system call.
    ///
    /// # Returns
    /// The child's pid
    pub fn fork(&self) -> Result<Pid, ProcError> {
        let parent = self.require_current("fork");

        // Only the parent itself changes these fields
        let (trace_mask, ticket_count, name) = {
            let p = self.table.proc(parent).lock(self);
            (p.trace_mask, p.ticket_count(), p.name.clone())
        };

        let (child, mut np) = self.allocate()?;
        {
            let parent_private = self.table.private(parent).lock();
            let mut child_private = self.table.private(child).lock();

            let copied = match (parent_private.space.as_ref(), child_private.space.as_mut()) {
                (Some(src), Some(dst)) => self.platform.copy_address_space(src, dst),
                _ => Err(ProcError::ResourceExhausted),
            };
            if let Err(err) = copied {
                drop(child_private);
                drop(parent_private);
                log::warn!("fork: copying address space failed: {}", err);
                self.free_slot(child, &mut np);
                return Err(err);
            }

            if let (Some(src), Some(dst)) = (
                parent_private.trapframe.as_deref(),
                child_private.trapframe.as_deref_mut(),
            ) {
                *dst = *src;
                // Fork returns 0 in the child
                dst.a0 = 0;
            }
            child_private.files = parent_private
                .files
                .as_ref()
                .map(|files| self.platform.dup_files(files));
        }

        np.trace_mask = trace_mask;
        np.name = name;
        np.tickets.clear();
        for _ in 0..ticket_count {
            let ticket = self.alloc_ticket();
            // ticket_count is bounded by the same capacity
            let _ = np.tickets.push(ticket);
        }
        let pid = np.pid;
        drop(np);

        self.table.wait_lock.lock(self).set_parent(child, Some(parent));

        let mut np = self.table.proc(child).lock(self);
        self.make_runnable(child, &mut np);
        drop(np);

        log::debug!("fork: slot {} -> child pid {} (slot {})", parent, pid, child);
        Ok(pid)
    }

    /// Give the children of `slot` to init, waking init if any were moved.
    ///
    /// Caller holds the wait lock (passed in as `links`).
    fn reparent(&self, slot: usize, links: &mut super::table::ParentLinks) {
        let Some(init) = self.init_slot() else {
            return;
        };
        for child in 0..self.table.capacity() {
            if links.parent_of(child) == Some(slot) {
                links.set_parent(child, Some(init));
                self.wakeup(Channel::Proc(init));
            }
        }
    }

    /// Terminate the calling process.
    ///
    /// The process stays a zombie until its parent reaps it. Exiting the
    /// init process is fatal.
    pub fn exit(&self, status: i32) -> ! {
        let slot = self.require_current("exit");
        if Some(slot) == self.init_slot() {
            panic!("init exiting");
        }

        {
            let mut private = self.table.private(slot).lock();
            if let Some(files) = private.files.take() {
                self.platform.close_files(files);
            }
        }

        let mut links = self.table.wait_lock.lock(self);
        self.reparent(slot, &mut links);

        // The parent might be sleeping in wait()
        if let Some(parent) = links.parent_of(slot) {
            self.wakeup(Channel::Proc(parent));
        }

        let mut p = self.table.proc(slot).lock(self);
        p.xstate = status;
        p.end_time = self.uptime();
        p.state = ProcState::Zombie;
        log::debug!("exit: pid {} status {}", p.pid, status);

        drop(links);

        // Jump into the scheduler, never to return
        self.sched(&mut p);
        panic!("zombie exit");
    }

    /// Wait for a child to exit and reap it.
    ///
    /// # Arguments
    /// - `status_addr`: user address to receive the exit status, if any
    ///
    /// # Returns
    /// The reaped child's pid, or `NoChildren` when the caller has no
    /// children or has been killed
    pub fn wait(&self, status_addr: Option<u64>) -> Result<Pid, ProcError> {
        self.reap(status_addr).map(|reaped| reaped.pid)
    }

    /// `wait` that also reports the child's running and waiting time
    pub fn waitx(&self, status_addr: Option<u64>) -> Result<Reaped, ProcError> {
        self.reap(status_addr)
    }

    fn reap(&self, status_addr: Option<u64>) -> Result<Reaped, ProcError> {
        let me = self.require_current("wait");
        let mut links = self.table.wait_lock.lock(self);

        loop {
            // Scan through table looking for exited children
            let mut have_kids = false;
            for child in 0..self.table.capacity() {
                if links.parent_of(child) != Some(me) {
                    continue;
                }
                // Make sure the child isn't still in exit() or sched()
                let mut np = self.table.proc(child).lock(self);
                have_kids = true;
                if np.state != ProcState::Zombie {
                    continue;
                }

                let reaped = Reaped {
                    pid: np.pid,
                    status: np.xstate,
                    run_time: np.run_time,
                    wait_time: np
                        .end_time
                        .saturating_sub(np.creation_time)
                        .saturating_sub(np.run_time),
                };

                if let Some(addr) = status_addr {
                    let private = self.table.private(me).lock();
                    let copied = match private.space.as_ref() {
                        Some(space) => {
                            self.platform.copy_out(space, addr, &reaped.status.to_le_bytes())
                        }
                        None => Err(ProcError::BadAddress),
                    };
                    if copied.is_err() {
                        return Err(ProcError::BadAddress);
                    }
                }

                self.free_slot(child, &mut np);
                links.set_parent(child, None);
                log::debug!("wait: reaped pid {} status {}", reaped.pid, reaped.status);
                return Ok(reaped);
            }

            // No point waiting if we don't have any children
            if !have_kids || self.killed() {
                return Err(ProcError::NoChildren);
            }

            links = self.sleep(Channel::Proc(me), links);
        }
    }

    /// Mark the process with `pid` as killed.
    ///
    /// It won't exit until it next reaches a point that checks `killed`
    /// (for example returning to user space); a sleeping victim is made
    /// runnable so it gets there.
    pub fn kill(&self, pid: Pid) -> Result<(), ProcError> {
        for slot in 0..self.table.capacity() {
            let mut p = self.table.proc(slot).lock(self);
            if p.state == ProcState::Unused || p.pid != pid {
                continue;
            }
            p.killed = true;
            if p.state == ProcState::Sleeping {
                self.make_runnable(slot, &mut p);
            }
            log::debug!("kill: pid {}", pid);
            return Ok(());
        }
        log::warn!("kill: no process with pid {}", pid);
        Err(ProcError::NotFound)
    }

    /// Flag the calling process as killed
    pub fn set_killed(&self) {
        let slot = self.require_current("setkilled");
        self.table.proc(slot).lock(self).killed = true;
    }

    /// Has the calling process been killed?
    pub fn killed(&self) -> bool {
        match self.current_slot() {
            Some(slot) => self.table.proc(slot).lock(self).killed,
            None => false,
        }
    }
}
