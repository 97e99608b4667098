// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The diagnostics seam.
//!
//! [`Publisher`] decouples the congestion controller from any particular
//! logging or metrics backend: the sender state machine calls into it at a
//! handful of notable transitions, and callers choose how (or whether) those
//! calls become observable. [`NoopPublisher`] discards everything; the
//! `tracing` feature adds [`TracingPublisher`], which forwards to `tracing`
//! events at a level matching the event's severity.

/// Why slow start was exited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SlowStartExitCause {
    /// HyStart observed an ACK-train whose span exceeded half the minimum RTT.
    HyStartAckTrain,
    /// HyStart observed the round-local minimum RTT exceed the global minimum
    /// by more than its delay-increase threshold.
    HyStartDelayIncrease,
    /// A loss arrived while still in slow start.
    Loss,
}

/// A precondition that a correctly-driven controller should never violate,
/// but which this crate tolerates rather than panicking in release builds.
/// See the error handling design notes for why these are not treated as
/// hard errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PreconditionViolation {
    /// `bytes_in_flight` would have gone negative; it was clamped to zero.
    BytesInFlightUnderflow,
    /// An RTT sample was negative; the sample was discarded.
    NegativeRttSample,
}

/// Receives notifications of notable events from the congestion controller.
///
/// Implementations must not block or panic: this trait is called from the
/// hot path of every mutator.
pub trait Publisher {
    /// Called once when slow start is exited, with the congestion window at
    /// the time of exit (in segments).
    #[inline]
    fn on_slow_start_exited(&mut self, _cause: SlowStartExitCause, _congestion_window: u32) {}

    /// Called after a multiplicative-decrease loss response has been
    /// applied, with the resulting congestion window and slow-start
    /// threshold (in segments).
    #[inline]
    fn on_packet_lost(&mut self, _new_congestion_window: u32, _new_ssthresh: u32) {}

    /// Called whenever a precondition violation is tolerated instead of
    /// causing a panic. Never called more than once per violating call.
    #[inline]
    fn on_precondition_violation(&mut self, _kind: PreconditionViolation) {}

    /// Called once, best-effort, when the sender state is dropped, reporting
    /// the final congestion window in segments.
    #[inline]
    fn on_final_congestion_window(&mut self, _congestion_window: u32) {}
}

/// A [`Publisher`] that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {}

#[cfg(feature = "tracing")]
mod tracing_publisher {
    use super::*;

    /// A [`Publisher`] that forwards every notification to `tracing`.
    ///
    /// Slow-start exits and loss responses are logged at `debug`;
    /// precondition violations are logged at `warn`, since they indicate the
    /// owning transport violated an ordering guarantee (recoverable, but
    /// worth surfacing).
    #[derive(Clone, Copy, Debug, Default)]
    pub struct TracingPublisher;

    impl Publisher for TracingPublisher {
        #[inline]
        fn on_slow_start_exited(&mut self, cause: SlowStartExitCause, congestion_window: u32) {
            tracing::debug!(?cause, congestion_window, "slow_start_exited");
        }

        #[inline]
        fn on_packet_lost(&mut self, new_congestion_window: u32, new_ssthresh: u32) {
            tracing::debug!(new_congestion_window, new_ssthresh, "packet_lost");
        }

        #[inline]
        fn on_precondition_violation(&mut self, kind: PreconditionViolation) {
            tracing::warn!(?kind, "precondition_violation");
        }

        #[inline]
        fn on_final_congestion_window(&mut self, congestion_window: u32) {
            tracing::debug!(congestion_window, "final_congestion_window");
        }
    }
}

#[cfg(feature = "tracing")]
pub use tracing_publisher::TracingPublisher;

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use std::vec::Vec;

    /// A [`Publisher`] that records every call for assertions in tests.
    #[derive(Clone, Debug, Default)]
    pub struct Recorder {
        pub slow_start_exits: Vec<(SlowStartExitCause, u32)>,
        pub packet_losses: Vec<(u32, u32)>,
        pub precondition_violations: Vec<PreconditionViolation>,
        pub final_congestion_window: Option<u32>,
    }

    impl Publisher for Recorder {
        fn on_slow_start_exited(&mut self, cause: SlowStartExitCause, congestion_window: u32) {
            self.slow_start_exits.push((cause, congestion_window));
        }

        fn on_packet_lost(&mut self, new_congestion_window: u32, new_ssthresh: u32) {
            self.packet_losses
                .push((new_congestion_window, new_ssthresh));
        }

        fn on_precondition_violation(&mut self, kind: PreconditionViolation) {
            self.precondition_violations.push(kind);
        }

        fn on_final_congestion_window(&mut self, congestion_window: u32) {
            self.final_congestion_window = Some(congestion_window);
        }
    }
}
