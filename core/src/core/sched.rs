//! Frame scheduling: cycle quotas, periodic timer interrupts, and the
//! cooperative stop flag.
//!
//! Interleave across CPUs is coarse (main CPU first, then sound, then
//! peripheral boards): the hardware's processors handshake through FIFOs
//! and mailbox latches, never shared memory, so a serial interleave with a
//! correct per-frame cycle quota matches observable behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const FRAMES_PER_SECOND: u64 = 60;

/// Cycles a CPU at `clock_hz` gets per 1/60 s video frame.
pub const fn cycles_per_frame(clock_hz: u64) -> u64 {
    clock_hz / FRAMES_PER_SECOND
}

/// Cooperative cancellation flag, polled by CPU cores between instructions.
/// Cloneable so the host side can raise it from outside the frame loop.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        StopFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Tracks cycles-elapsed-in-frame against the next periodic interrupt for
/// one CPU clock domain. Leftover cycles at end of frame carry over: both
/// counters are decremented by the frame period, not zeroed.
pub struct FrameTimer {
    frame_period: u64,
    timer_period: u64,
    cycles_elapsed_this_frame: u64,
    next_timer_interrupt_cycles: u64,
}

impl FrameTimer {
    pub fn new(frame_period: u64, timer_period: u64) -> Self {
        FrameTimer {
            frame_period,
            timer_period,
            cycles_elapsed_this_frame: 0,
            next_timer_interrupt_cycles: timer_period,
        }
    }

    pub fn reset(&mut self) {
        self.cycles_elapsed_this_frame = 0;
        self.next_timer_interrupt_cycles = self.timer_period;
    }

    pub fn cycle_carry(&self) -> u64 {
        self.cycles_elapsed_this_frame
    }

    pub fn set_cycle_carry(&mut self, carry: u64) {
        self.cycles_elapsed_this_frame = carry;
        self.next_timer_interrupt_cycles = self.next_timer_interrupt_cycles.max(carry);
    }

    /// Account for cycles a CPU already consumed this frame outside the
    /// timer loop (e.g. draining a command FIFO).
    pub fn consume(&mut self, cycles: u64) {
        self.cycles_elapsed_this_frame += cycles;
    }

    /// Run the remainder of this frame. The callback receives
    /// [`TimerEvent::Run`] with a cycle quota (returning cycles actually
    /// consumed; early returns happen only at instruction boundaries) and
    /// [`TimerEvent::Fire`] when the periodic interrupt is due.
    pub fn run_frame<F>(&mut self, stop: &StopFlag, mut f: F)
    where
        F: FnMut(TimerEvent) -> u64,
    {
        while self.cycles_elapsed_this_frame < self.frame_period {
            if stop.is_raised() {
                return;
            }
            if self.cycles_elapsed_this_frame >= self.next_timer_interrupt_cycles {
                f(TimerEvent::Fire);
                self.next_timer_interrupt_cycles += self.timer_period;
            }
            let target = self.next_timer_interrupt_cycles.min(self.frame_period);
            let quota = target - self.cycles_elapsed_this_frame;
            let consumed = f(TimerEvent::Run(quota));
            // A core that makes no progress (halted with interrupts off)
            // still burns its quota, otherwise the frame never ends.
            self.cycles_elapsed_this_frame += if consumed == 0 { quota } else { consumed };
        }
        self.cycles_elapsed_this_frame -= self.frame_period;
        self.next_timer_interrupt_cycles -= self.frame_period;
    }
}

/// What the frame loop asks of its CPU callback.
#[derive(Clone, Copy, Debug)]
pub enum TimerEvent {
    /// Advance the CPU by up to this many cycles; return cycles consumed.
    Run(u64),
    /// Assert the periodic interrupt; the return value is ignored.
    Fire,
}
