// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Congestion control: the Cubic/Reno window functions, the HyStart
//! slow-start exit detector, the RTT estimator, and the sender state machine
//! that ties them together.

pub mod congestion_controller;
pub mod cubic;
pub mod hybrid_slow_start;
pub mod rtt_estimator;

pub use congestion_controller::CongestionController;
pub use cubic::Cubic;
pub use hybrid_slow_start::HybridSlowStart;
pub use rtt_estimator::RttEstimator;

/// Maximum segment size, in bytes. Windows are tracked internally as a count
/// of this many bytes; this is the one place bytes and segments convert.
pub const MAX_SEGMENT_SIZE: u16 = 1460;

/// Initial congestion window, in segments, before any `Config` override is
/// applied.
pub const DEFAULT_INITIAL_CONGESTION_WINDOW: u32 = 10;

/// The smallest value `cwnd` is ever allowed to take.
pub const MINIMUM_CONGESTION_WINDOW: u32 = 1;

/// `cwnd` below which HyStart samples are considered too noisy to act on.
pub const HYSTART_LOW_WINDOW: u32 = 16;

/// Largest number of segments allowed to depart in a single burst.
pub const MAX_BURST_SEGMENTS: u32 = 3;

/// Peer receive window assumed before the first `OnFeedback`.
pub const DEFAULT_RECEIVE_WINDOW: u32 = 64_000;

/// A generous, arbitrary ceiling used as the default `max_congestion_window`
/// when a `Config` doesn't specify one. Chosen so `ssthresh`'s initial value
/// (`max_cwnd`) never meaningfully constrains slow start.
pub const DEFAULT_MAX_CONGESTION_WINDOW: u32 = 10_000;

/// RTT assumed before any sample has arrived.
pub const INITIAL_RTT: core::time::Duration = core::time::Duration::from_millis(60);
