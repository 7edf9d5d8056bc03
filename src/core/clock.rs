// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 nsrx contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Monotonic time source and GPU tick conversion
//!
//! Semaphore releases with the four-word structure size carry a timestamp in
//! GPU ticks. The GM20B timestamp counter runs at 614.4 MHz, so nanoseconds
//! convert to ticks by the exact rational factor 384/625.

use std::time::Instant;

/// A monotonic nanosecond clock
///
/// The command processor reads this when a semaphore release requires a
/// timestamp. Injecting the clock keeps timestamp generation deterministic
/// under test.
pub trait MonotonicClock: Send + Sync {
    /// Nanoseconds elapsed since an arbitrary fixed origin
    fn nanoseconds(&self) -> u64;
}

/// Monotonic clock backed by [`std::time::Instant`]
///
/// The origin is the moment the clock was constructed, which keeps the
/// nanosecond count well away from overflow for the lifetime of a session.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn nanoseconds(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Nanoseconds-to-ticks numerator (614.4 MHz = 384/625 GHz)
const NS_TO_TICK_NUMERATOR: u64 = 384;

/// Nanoseconds-to-ticks denominator
const NS_TO_TICK_DENOMINATOR: u64 = 625;

/// Convert a nanosecond reading to GPU ticks
///
/// The division is split so that `nanoseconds * 384` can never overflow a
/// `u64`, which a naive multiply-then-divide would for long-running sessions.
///
/// # Examples
///
/// ```
/// use nsrx::core::clock::gpu_ticks_from_nanoseconds;
///
/// assert_eq!(gpu_ticks_from_nanoseconds(625), 384);
/// assert_eq!(gpu_ticks_from_nanoseconds(1250), 768);
/// ```
pub fn gpu_ticks_from_nanoseconds(nanoseconds: u64) -> u64 {
    (nanoseconds / NS_TO_TICK_DENOMINATOR) * NS_TO_TICK_NUMERATOR
        + ((nanoseconds % NS_TO_TICK_DENOMINATOR) * NS_TO_TICK_NUMERATOR) / NS_TO_TICK_DENOMINATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversion_exact_multiples() {
        assert_eq!(gpu_ticks_from_nanoseconds(0), 0);
        assert_eq!(gpu_ticks_from_nanoseconds(625), 384);
        assert_eq!(gpu_ticks_from_nanoseconds(6250), 3840);
    }

    #[test]
    fn test_tick_conversion_remainder() {
        // 1000 ns * 384 / 625 = 614.4, truncated to 614
        assert_eq!(gpu_ticks_from_nanoseconds(1000), 614);
    }

    #[test]
    fn test_tick_conversion_large_values_do_not_overflow() {
        // A naive (ns * 384) / 625 would overflow above ~48 * 10^15 ns
        let ns = u64::MAX / 2;
        let ticks = gpu_ticks_from_nanoseconds(ns);
        assert!(ticks < ns);
        assert_eq!(ticks, (ns / 625) * 384 + ((ns % 625) * 384) / 625);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.nanoseconds();
        let second = clock.nanoseconds();
        assert!(second >= first);
    }
}
