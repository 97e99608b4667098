// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The Cubic window function (C1).
//!
//! Models congestion-window growth as a cubic curve anchored to the window
//! size at the last loss (`W_max`):
//!
//! ```text
//! W(t) = C * (t - K)^3 + origin
//! ```
//!
//! with `C = 0.4` and `K` chosen so the curve passes through `origin` at
//! `t = K`. All arithmetic here is integer, scaled by 1024, so the result is
//! bit-identical across platforms: there is no floating point on this path.

use crate::time::Timestamp;
use core::time::Duration;

/// Fixed-point scale applied to the multiplicative-decrease and
/// fast-convergence factors below.
const SCALE: u64 = 1024;

/// `(1 - beta) * SCALE`, rounded to the nearest integer, where `beta = 0.3`
/// is the Cubic multiplicative decrease factor. `717 / 1024 ≈ 0.70020`.
const CUBIC_BETA_SCALED: u64 = 717;

/// `((1 + beta) / 2) * SCALE`, rounded to the nearest integer. Used when
/// fast convergence lowers `W_max` below the pre-loss window.
/// `666 / 1024 ≈ 0.65039`.
const FAST_CONVERGENCE_SCALED: u64 = 666;

/// `K^3` is computed as `beta * W_max / C` (all exact rationals: `beta = 0.3`,
/// `C = 0.4`, so `beta / C = 0.75`). Expressed in milliseconds, `K_ms^3 =
/// 0.75 * W_max * 1000^3 = W_max * 750_000_000`.
const K_CUBED_MS_PER_SEGMENT: u128 = 750_000_000;

/// `C` expressed as an exact rational, `2 / 5`, applied to a delta in
/// milliseconds cubed, then converted back from ms^3 to segments:
/// `term = 2 * delta_ms^3 / (5 * 1000^3)`.
const C_NUMERATOR: i128 = 2;
const C_DENOMINATOR_MS3: i128 = 5 * 1_000_000_000;

/// Cubic's owned epoch state: the window function is a pure function of
/// elapsed time since the epoch plus a target anchored at `W_max`, but that
/// anchor is only recomputed once per epoch (on the first ACK after a loss
/// or reset).
#[derive(Clone, Copy, Debug, Default)]
pub struct Cubic {
    epoch_start: Option<Timestamp>,
    /// The curve's plateau target for the current epoch: either `w_max`, or
    /// the cwnd at epoch start if we're already past `w_max` (recovering
    /// faster than the last peak).
    origin_point: u32,
    /// `K` in milliseconds, the time at which the curve reaches `origin_point`.
    k_ms: u64,
    /// The cwnd just before the most recent loss, in segments. `None` until
    /// the first loss.
    w_max: Option<u32>,
}

impl Cubic {
    /// Creates a fresh `Cubic` with no epoch or loss history.
    #[inline]
    pub const fn new() -> Self {
        Self {
            epoch_start: None,
            origin_point: 0,
            k_ms: 0,
            w_max: None,
        }
    }

    /// `W_max`, the cwnd at the most recent loss, in segments.
    #[inline]
    pub fn w_max(&self) -> Option<u32> {
        self.w_max
    }

    /// Computes the post-ACK congestion window.
    ///
    /// On the first call in a new epoch this anchors the curve (`origin_point`,
    /// `K`) from `current_cwnd` and `w_max`, then in all cases projects the
    /// curve `min_rtt` past `now` and clamps growth to `[current_cwnd + 1,
    /// current_cwnd + current_cwnd / 2]`.
    #[inline]
    pub fn congestion_window_after_ack(
        &mut self,
        current_cwnd: u32,
        min_rtt: Duration,
        now: Timestamp,
    ) -> u32 {
        if self.epoch_start.is_none() {
            self.epoch_start = Some(now);

            match self.w_max {
                Some(w_max) if (current_cwnd as u64) < (w_max as u64) => {
                    self.origin_point = w_max;
                    self.k_ms = integer_cbrt(w_max as u128 * K_CUBED_MS_PER_SEGMENT);
                }
                _ => {
                    // Either there's no loss history yet, or we've already
                    // recovered past the last peak: project from here.
                    self.origin_point = current_cwnd;
                    self.k_ms = 0;
                }
            }
        }

        let epoch_start = self.epoch_start.expect("set above");

        let elapsed_ms = now.saturating_duration_since(epoch_start).as_millis() as i128
            + min_rtt.as_millis() as i128;
        let delta_ms = elapsed_ms - self.k_ms as i128;

        let term = C_NUMERATOR * delta_ms.pow(3) / C_DENOMINATOR_MS3;
        let target = (self.origin_point as i128 + term).max(0) as u64;

        let lower_bound = current_cwnd as u64 + 1;
        let upper_bound = current_cwnd as u64 + (current_cwnd as u64 >> 1);

        lower_bound.max(target.min(upper_bound)) as u32
    }

    /// Computes the post-loss congestion window, updates `W_max` (applying
    /// fast convergence if the network appears to have shrunk), and clears
    /// the epoch so the next ACK starts a fresh curve.
    #[inline]
    pub fn congestion_window_after_packet_loss(&mut self, current_cwnd: u32) -> u32 {
        let current = current_cwnd as u64;

        self.w_max = Some(match self.w_max {
            Some(w_max) if current < w_max as u64 => {
                ((current * FAST_CONVERGENCE_SCALED) / SCALE) as u32
            }
            _ => current_cwnd,
        });

        self.clear_epoch();

        ((current * CUBIC_BETA_SCALED) / SCALE).max(1) as u32
    }

    /// Clears all epoch state. Called on `OnTimeout`; `W_max` is preserved,
    /// matching the data model's separation of long-lived loss history from
    /// per-epoch curve state.
    #[inline]
    pub fn reset(&mut self) {
        self.clear_epoch();
    }

    #[inline]
    fn clear_epoch(&mut self) {
        self.epoch_start = None;
        self.origin_point = 0;
        self.k_ms = 0;
    }
}

/// Integer cube root via binary search. Deterministic and allocation-free;
/// used instead of a floating-point `cbrt` so the curve is bit-identical
/// across platforms.
#[inline]
fn integer_cbrt(n: u128) -> u64 {
    if n == 0 {
        return 0;
    }

    let mut lo: u128 = 0;
    let mut hi: u128 = 1 << 42; // comfortably above any K we'll compute in ms
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if mid.saturating_mul(mid).saturating_mul(mid) <= n {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo as u64
}
