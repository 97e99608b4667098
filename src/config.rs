// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Boot-time configuration for the congestion controller.
//!
//! Configuration is applied once, at construction, via [`Config`] and
//! [`CongestionController::set_from_config`](crate::CongestionController::set_from_config).
//! There is no runtime reconfiguration: anything that would need to change
//! while a connection is live belongs on the transport, not here.

use crate::recovery::{
    DEFAULT_INITIAL_CONGESTION_WINDOW, DEFAULT_MAX_CONGESTION_WINDOW, MAX_SEGMENT_SIZE,
};

/// Which window-growth law the congestion controller uses once it reaches
/// congestion avoidance. Slow start is identical for both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GrowthLaw {
    /// Cubic (RFC 8312-style), the default for production traffic.
    #[default]
    Cubic,
    /// Reno (AIMD), used primarily for testing and comparison.
    Reno,
}

/// Errors that can occur while building a [`Config`].
///
/// This is the only fallible surface in the crate: once a `Config` is valid,
/// every subsequent operation makes forward progress unconditionally (see
/// the error handling design notes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// `server_initial_congestion_window` was set to zero; a zero-segment
    /// window can never send anything.
    #[error("server_initial_congestion_window must be at least 1 segment, got {0}")]
    ZeroInitialCongestionWindow(u32),
    /// The initial congestion window override exceeded `max_congestion_window`.
    #[error(
        "server_initial_congestion_window ({initial}) exceeds max_congestion_window ({max})"
    )]
    InitialCongestionWindowExceedsMax {
        /// The requested initial congestion window, in segments.
        initial: u32,
        /// The configured maximum congestion window, in segments.
        max: u32,
    },
    /// `max_congestion_window` was set to zero.
    #[error("max_congestion_window must be at least 1 segment, got {0}")]
    ZeroMaxCongestionWindow(u32),
}

/// Validated configuration for a [`CongestionController`](crate::CongestionController).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub(crate) growth_law: GrowthLaw,
    pub(crate) max_datagram_size: u16,
    pub(crate) max_congestion_window: u32,
    pub(crate) server_initial_congestion_window: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default()
            .build()
            .expect("default configuration is always valid")
    }
}

impl Config {
    /// Starts building a new [`Config`] from defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The configured growth law.
    pub fn growth_law(&self) -> GrowthLaw {
        self.growth_law
    }

    /// The configured maximum datagram size, in bytes.
    pub fn max_datagram_size(&self) -> u16 {
        self.max_datagram_size
    }

    /// The configured maximum congestion window, in segments.
    pub fn max_congestion_window(&self) -> u32 {
        self.max_congestion_window
    }

    /// The server-only initial congestion window override, in segments, if any.
    pub fn server_initial_congestion_window(&self) -> Option<u32> {
        self.server_initial_congestion_window
    }
}

/// Builds a [`Config`], validating inputs before any hot-path state exists.
#[derive(Clone, Copy, Debug)]
pub struct ConfigBuilder {
    growth_law: GrowthLaw,
    max_datagram_size: u16,
    max_congestion_window: u32,
    server_initial_congestion_window: Option<u32>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            growth_law: GrowthLaw::Cubic,
            max_datagram_size: MAX_SEGMENT_SIZE,
            max_congestion_window: DEFAULT_MAX_CONGESTION_WINDOW,
            server_initial_congestion_window: None,
        }
    }
}

impl ConfigBuilder {
    /// Selects the window-growth law. Defaults to [`GrowthLaw::Cubic`].
    pub fn growth_law(mut self, growth_law: GrowthLaw) -> Self {
        self.growth_law = growth_law;
        self
    }

    /// Overrides the maximum datagram size used to convert segments to bytes.
    /// Defaults to [`MAX_SEGMENT_SIZE`].
    pub fn max_datagram_size(mut self, max_datagram_size: u16) -> Self {
        self.max_datagram_size = max_datagram_size;
        self
    }

    /// Overrides the hard upper bound on the congestion window, in segments.
    pub fn max_congestion_window(mut self, max_congestion_window: u32) -> Self {
        self.max_congestion_window = max_congestion_window;
        self
    }

    /// Overrides the initial congestion window, in segments, applied only
    /// when the owning connection is a server
    /// (see [`CongestionController::set_from_config`](crate::CongestionController::set_from_config)).
    pub fn server_initial_congestion_window(mut self, segments: u32) -> Self {
        self.server_initial_congestion_window = Some(segments);
        self
    }

    /// Validates the builder and produces a [`Config`].
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.max_congestion_window == 0 {
            return Err(ConfigError::ZeroMaxCongestionWindow(
                self.max_congestion_window,
            ));
        }

        if let Some(initial) = self.server_initial_congestion_window {
            if initial == 0 {
                return Err(ConfigError::ZeroInitialCongestionWindow(initial));
            }

            if initial > self.max_congestion_window {
                return Err(ConfigError::InitialCongestionWindowExceedsMax {
                    initial,
                    max: self.max_congestion_window,
                });
            }
        }

        Ok(Config {
            growth_law: self.growth_law,
            max_datagram_size: self.max_datagram_size,
            max_congestion_window: self.max_congestion_window,
            server_initial_congestion_window: self.server_initial_congestion_window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.growth_law(), GrowthLaw::Cubic);
        assert_eq!(config.server_initial_congestion_window(), None);
    }

    #[test]
    fn zero_initial_congestion_window_is_rejected() {
        let err = Config::builder()
            .server_initial_congestion_window(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroInitialCongestionWindow(0));
    }

    #[test]
    fn initial_congestion_window_above_max_is_rejected() {
        let err = Config::builder()
            .max_congestion_window(5)
            .server_initial_congestion_window(10)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InitialCongestionWindowExceedsMax { initial: 10, max: 5 }
        );
    }

    #[test]
    fn zero_max_congestion_window_is_rejected() {
        let err = Config::builder()
            .max_congestion_window(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroMaxCongestionWindow(0));
    }
}
