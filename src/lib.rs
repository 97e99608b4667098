// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Sender-side congestion control for a reliable datagram transport.
//!
//! This crate owns the congestion window, slow-start threshold, and RTT
//! estimation for a single connection. It is driven entirely by the owning
//! transport: packet-sent, ack, loss, feedback, and timeout notifications
//! come in, and a send-permission query goes out. The crate never reads a
//! clock, socket, or wire format on its own.
#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod number;
mod counter;

pub mod config;
pub mod event;
pub mod recovery;
pub mod time;

pub use config::{Config, ConfigBuilder, ConfigError, GrowthLaw};
pub use event::{NoopPublisher, PreconditionViolation, Publisher, SlowStartExitCause};
pub use recovery::congestion_controller::{
    CongestionController, HasRetransmittableData, TransmissionType,
};
