// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Monotonic time unit, one tick per millisecond on the target.
pub type Ticks = u64;

/// Deadline tracking against a monotonic tick counter.
///
/// The timer does not read the clock itself, the caller passes the current tick
/// count so the same code runs against the RTC on target and a fake clock in tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timer {
    period: Ticks,
    deadline: Ticks,
    auto_reset: bool,
}

impl Timer {
    /// Creates a timer expiring `period` ticks after `now`.
    pub fn new(period: Ticks, auto_reset: bool, now: Ticks) -> Self {
        Self {
            period,
            deadline: now.saturating_add(period),
            auto_reset,
        }
    }

    /// Re-arms to `now + period - drift`.
    pub fn reset(&mut self, now: Ticks, drift: Ticks) {
        self.deadline = now.saturating_add(self.period).saturating_sub(drift);
    }

    /// True once `now` reached the deadline. An auto-reset timer re-arms itself,
    /// compensating for how late it was polled.
    pub fn has_elapsed(&mut self, now: Ticks) -> bool {
        let elapsed = now >= self.deadline;
        if elapsed && self.auto_reset {
            let drift = now - self.deadline;
            self.reset(now, drift);
        }
        elapsed
    }

    pub fn period(&self) -> Ticks {
        self.period
    }

    pub fn deadline(&self) -> Ticks {
        self.deadline
    }

    pub fn auto_reset(&self) -> bool {
        self.auto_reset
    }
}
