// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The HyStart slow-start exit detector (C2).
//!
//! Exits slow start early when either of two triggers fires within a round:
//! an ACK-train whose span is too wide to be delay-bound by the path, or a
//! round-local minimum RTT that has drifted meaningfully above the
//! connection's global minimum. Sample storage is two accumulators (the
//! earliest and latest ACK time seen this round) plus a count and a
//! round-local minimum RTT: no per-sample history is kept.

use crate::event::SlowStartExitCause;
use crate::time::Timestamp;
use core::time::Duration;

/// Samples required in a round before either trigger is evaluated. Below
/// this, the signal is considered too noisy to act on.
const MIN_SAMPLES: u32 = 8;

/// Bounds on the delay-increase threshold `eta`.
const DELAY_THRESHOLD_MIN: Duration = Duration::from_millis(2);
const DELAY_THRESHOLD_MAX: Duration = Duration::from_millis(16);

/// `eta` is `min_rtt_global` divided by this, clamped to the bounds above.
const DELAY_THRESHOLD_DIVISOR: u32 = 16;

/// Detects when to exit slow start, independent of `cwnd`/`ssthresh`
/// bookkeeping (the caller gates consultation on `cwnd >= 16 MSS` and
/// `cwnd <= ssthresh`; see the sender state machine).
#[derive(Clone, Copy, Debug)]
pub struct HybridSlowStart {
    started: bool,
    round_start_seq: u64,
    earliest_ack_time: Option<Timestamp>,
    latest_ack_time: Option<Timestamp>,
    round_min_rtt: Duration,
    sample_count: u32,
    exit_cause: Option<SlowStartExitCause>,
}

impl Default for HybridSlowStart {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridSlowStart {
    /// Creates a detector with no round armed yet.
    #[inline]
    pub const fn new() -> Self {
        Self {
            started: false,
            round_start_seq: 0,
            earliest_ack_time: None,
            latest_ack_time: None,
            round_min_rtt: Duration::MAX,
            sample_count: 0,
            exit_cause: None,
        }
    }

    /// Arms a new round ending at `round_start_seq`, clearing sample state
    /// and any prior exit. Does not change `started` to `false` even on the
    /// very first call; `started` tracks "has a round ever been armed".
    #[inline]
    pub fn reset(&mut self, round_start_seq: u64) {
        self.started = true;
        self.round_start_seq = round_start_seq;
        self.earliest_ack_time = None;
        self.latest_ack_time = None;
        self.round_min_rtt = Duration::MAX;
        self.sample_count = 0;
        self.exit_cause = None;
    }

    /// Records an RTT sample and its arrival time, evaluating both triggers
    /// once at least [`MIN_SAMPLES`] samples have landed in this round. Once
    /// a trigger has fired, further samples are recorded but no longer
    /// re-evaluated (the first cause wins until the next [`Self::reset`]).
    #[inline]
    pub fn update(&mut self, rtt_sample: Duration, min_rtt_global: Duration, ack_time: Timestamp) {
        self.sample_count += 1;
        self.earliest_ack_time.get_or_insert(ack_time);
        self.latest_ack_time = Some(ack_time);
        self.round_min_rtt = self.round_min_rtt.min(rtt_sample);

        if self.exit_cause.is_some() || self.sample_count < MIN_SAMPLES {
            return;
        }

        if let (Some(earliest), Some(latest)) = (self.earliest_ack_time, self.latest_ack_time) {
            let span = latest.saturating_duration_since(earliest);
            if span > min_rtt_global / 2 {
                self.exit_cause = Some(SlowStartExitCause::HyStartAckTrain);
                return;
            }
        }

        let eta = (min_rtt_global / DELAY_THRESHOLD_DIVISOR)
            .clamp(DELAY_THRESHOLD_MIN, DELAY_THRESHOLD_MAX);
        if self.round_min_rtt > min_rtt_global.saturating_add(eta) {
            self.exit_cause = Some(SlowStartExitCause::HyStartDelayIncrease);
        }
    }

    /// Whether `ack_seq` acknowledges the end of the currently-armed round.
    #[inline]
    pub fn end_of_round(&self, ack_seq: u64) -> bool {
        self.started && ack_seq >= self.round_start_seq
    }

    /// `true` once a trigger has fired; stays `true` until the next
    /// [`Self::reset`].
    #[inline]
    pub fn exited(&self) -> bool {
        self.exit_cause.is_some()
    }

    /// Which trigger fired, if any.
    #[inline]
    pub fn exit_cause(&self) -> Option<SlowStartExitCause> {
        self.exit_cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::testing::Clock;
    use crate::time::Clock as _;

    #[test]
    fn does_not_exit_before_minimum_samples() {
        let clock = Clock::default();
        let mut hystart = HybridSlowStart::new();
        hystart.reset(100);

        for _ in 0..MIN_SAMPLES - 1 {
            hystart.update(Duration::from_millis(50), Duration::from_millis(50), clock.get_time());
        }

        assert!(!hystart.exited());
    }

    #[test]
    fn ack_train_trigger_fires_on_wide_span() {
        let mut clock = Clock::default();
        let mut hystart = HybridSlowStart::new();
        hystart.reset(100);

        let min_rtt_global = Duration::from_millis(40);
        for _ in 0..MIN_SAMPLES {
            hystart.update(min_rtt_global, min_rtt_global, clock.get_time());
            // advance well past half of min_rtt_global across the round
            clock.inc_by(Duration::from_millis(10));
        }

        assert!(hystart.exited());
        assert_eq!(hystart.exit_cause(), Some(SlowStartExitCause::HyStartAckTrain));
    }

    #[test]
    fn delay_increase_trigger_fires_when_round_min_rtt_drifts_up() {
        let clock = Clock::default();
        let mut hystart = HybridSlowStart::new();
        hystart.reset(100);

        let min_rtt_global = Duration::from_millis(40);
        // All samples land at the same instant, so the ack-train trigger
        // never fires; the round-local min RTT is inflated well past eta.
        for _ in 0..MIN_SAMPLES {
            hystart.update(Duration::from_millis(60), min_rtt_global, clock.get_time());
        }

        assert!(hystart.exited());
        assert_eq!(
            hystart.exit_cause(),
            Some(SlowStartExitCause::HyStartDelayIncrease)
        );
    }

    #[test]
    fn no_trigger_fires_on_well_behaved_samples() {
        let clock = Clock::default();
        let mut hystart = HybridSlowStart::new();
        hystart.reset(100);

        let min_rtt_global = Duration::from_millis(40);
        for _ in 0..MIN_SAMPLES {
            hystart.update(min_rtt_global, min_rtt_global, clock.get_time());
        }

        assert!(!hystart.exited());
    }

    #[test]
    fn end_of_round_requires_reset_first() {
        let hystart = HybridSlowStart::new();
        assert!(!hystart.end_of_round(100));
    }

    #[test]
    fn reset_clears_a_prior_exit() {
        let clock = Clock::default();
        let mut hystart = HybridSlowStart::new();
        hystart.reset(100);
        let min_rtt_global = Duration::from_millis(40);
        for _ in 0..MIN_SAMPLES {
            hystart.update(Duration::from_millis(60), min_rtt_global, clock.get_time());
        }
        assert!(hystart.exited());

        hystart.reset(200);

        assert!(!hystart.exited());
        assert!(hystart.end_of_round(200));
        assert!(!hystart.end_of_round(150));
    }
}
