/*
 * Synchronization Primitives
 *
 * Interrupt-disabling spin locks used for every piece of shared scheduler
 * state (PCBs, parent links, the tick counter, policy queues).
 *
 * Lock order, outermost first:
 *   wait lock -> ticks lock -> PCB lock (ascending slot index when several
 *   are held) -> policy queue / lottery generator -> per-process private data
 */

pub mod spinlock;

pub use spinlock::{IrqControl, SpinGuard, SpinLock};
