//! Tachometer pulse counting.
//!
//! The pin-change handler counts pulses and the periodic tick turns them into
//! RPM once per measurement window. Both run in interrupt context and share
//! the counters with the control loop only through atomics, so a
//! `Tachometer` lives in a `static` and every method takes `&self`.

use portable_atomic::{AtomicU16, AtomicU8, Ordering};

/// Ticks of the periodic handler per measurement window (2 s at 100 Hz)
pub const TICKS_PER_WINDOW: u16 = 200;
/// Two pulses per revolution over a 2 s window
pub const RPM_PER_PULSE: u16 = 30;

pub struct Tachometer<const FANS: usize> {
    pulses: [AtomicU16; FANS],
    rpm: [AtomicU16; FANS],
    ticks: AtomicU16,
    /// Pin levels seen by the last edge interrupt
    levels: AtomicU8,
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU16 = AtomicU16::new(0);

impl<const FANS: usize> Default for Tachometer<FANS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const FANS: usize> Tachometer<FANS> {
    pub const fn new() -> Self {
        Tachometer {
            pulses: [ZERO; FANS],
            rpm: [ZERO; FANS],
            ticks: AtomicU16::new(0),
            levels: AtomicU8::new(0),
        }
    }

    /// Counts one pulse of `fan`.
    pub fn record_pulse(&self, fan: usize) {
        if let Some(pulses) = self.pulses.get(fan) {
            pulses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Pin-change handler: `levels` holds one bit per fan. Only rising edges
    /// count.
    pub fn on_pin_change(&self, levels: u8) {
        let previous = self.levels.swap(levels, Ordering::Relaxed);
        let rising = levels & !previous;
        for fan in 0..FANS.min(8) {
            if rising & (1 << fan) != 0 {
                self.record_pulse(fan);
            }
        }
    }

    /// Periodic handler. Returns `true` when a window closed and new RPM
    /// values are available.
    pub fn tick(&self) -> bool {
        if self.ticks.fetch_add(1, Ordering::Relaxed) + 1 < TICKS_PER_WINDOW {
            return false;
        }
        self.ticks.store(0, Ordering::Relaxed);

        let counts = self.snapshot();
        for (rpm, count) in self.rpm.iter().zip(counts) {
            rpm.store(count.saturating_mul(RPM_PER_PULSE), Ordering::Relaxed);
        }
        true
    }

    /// Takes and clears all pulse counters as one step.
    pub fn snapshot(&self) -> [u16; FANS] {
        critical_section::with(|_| {
            core::array::from_fn(|fan| self.pulses[fan].swap(0, Ordering::Relaxed))
        })
    }

    /// Speed measured over the last complete window; 0 for unknown fans.
    pub fn rpm(&self, fan: usize) -> u16 {
        self.rpm
            .get(fan)
            .map(|rpm| rpm.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn rpms(&self) -> [u16; FANS] {
        core::array::from_fn(|fan| self.rpm(fan))
    }
}
