//! Engine configuration.
//!
//! A [`TcpConfig`] is given to the [`ConnectionManager`] and copied into every
//! connection it creates. Individual opens may override the congestion
//! control algorithm.
//!
//! [`ConnectionManager`]: crate::ConnectionManager

use std::time::Duration;

use crate::ConfigError;
use crate::protocol::congestion::CongestionAlgorithmKind;

/// Largest window representable without window scaling.
pub const TCP_MAX_WIN: u32 = 65535;

/// Largest window representable with the maximum scale shift of 14.
pub const TCP_MAX_WIN_SCALED: u32 = 0x3fff_ffff;

/// RFC 1122 (4.2.2.6)
///
/// If an MSS option is not received at connection setup, TCP MUST assume a
/// default send MSS of 536 (576-40).
pub const DEFAULT_MSS: u32 = 536;

/// Per-connection protocol parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TcpConfig {
    /// Local maximum segment size, advertised in SYN segments.
    pub mss: u32,
    /// Receive buffer size, and so the largest window ever advertised.
    pub advertised_window: u32,
    /// Nagle's algorithm (RFC 896).
    pub nagle_enabled: bool,
    /// Delayed acknowledgments (RFC 1122).
    pub delayed_acks_enabled: bool,
    /// Limited transmit (RFC 3042).
    pub limited_transmit_enabled: bool,
    /// Larger initial congestion window (RFC 3390).
    pub increased_iw_enabled: bool,
    /// Offer and accept window scaling (RFC 1323).
    pub window_scaling_support: bool,
    /// Offer and accept timestamps (RFC 1323).
    pub timestamp_support: bool,
    /// Offer and accept selective acknowledgments (RFC 2018).
    pub sack_support: bool,
    /// Congestion control algorithm used when an open does not name one.
    pub algorithm: CongestionAlgorithmKind,
    /// Maximum segment lifetime. TIME-WAIT lasts twice as long.
    pub msl: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: DEFAULT_MSS,
            advertised_window: 14 * DEFAULT_MSS,
            nagle_enabled: true,
            delayed_acks_enabled: false,
            limited_transmit_enabled: false,
            increased_iw_enabled: false,
            window_scaling_support: false,
            timestamp_support: false,
            sack_support: false,
            algorithm: CongestionAlgorithmKind::Reno,
            msl: Duration::from_secs(120),
        }
    }
}

impl TcpConfig {
    /// Sets the local MSS.
    pub fn with_mss(mut self, mss: u32) -> Self {
        self.mss = mss;
        self
    }

    /// Sets the receive buffer size.
    pub fn with_advertised_window(mut self, window: u32) -> Self {
        self.advertised_window = window;
        self
    }

    /// Enables or disables Nagle's algorithm.
    pub fn with_nagle(mut self, enabled: bool) -> Self {
        self.nagle_enabled = enabled;
        self
    }

    /// Enables or disables delayed acknowledgments.
    pub fn with_delayed_acks(mut self, enabled: bool) -> Self {
        self.delayed_acks_enabled = enabled;
        self
    }

    /// Enables or disables limited transmit.
    pub fn with_limited_transmit(mut self, enabled: bool) -> Self {
        self.limited_transmit_enabled = enabled;
        self
    }

    /// Enables or disables the RFC 3390 initial window.
    pub fn with_increased_iw(mut self, enabled: bool) -> Self {
        self.increased_iw_enabled = enabled;
        self
    }

    /// Enables or disables window scaling support.
    pub fn with_window_scaling(mut self, enabled: bool) -> Self {
        self.window_scaling_support = enabled;
        self
    }

    /// Enables or disables timestamp support.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamp_support = enabled;
        self
    }

    /// Enables or disables SACK support.
    pub fn with_sack(mut self, enabled: bool) -> Self {
        self.sack_support = enabled;
        self
    }

    /// Sets the default congestion control algorithm.
    pub fn with_algorithm(mut self, algorithm: CongestionAlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the maximum segment lifetime.
    pub fn with_msl(mut self, msl: Duration) -> Self {
        self.msl = msl;
        self
    }

    /// Checks the configuration for values the engine cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns an error if the MSS or MSL is zero, the MSS does not fit the
    /// MSS option, or the advertised window cannot be represented.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mss == 0 || self.mss > u16::MAX as u32 {
            return Err(ConfigError::InvalidMss);
        }

        if self.msl.is_zero() {
            return Err(ConfigError::InvalidMsl);
        }

        let max = if self.window_scaling_support {
            TCP_MAX_WIN_SCALED
        } else {
            TCP_MAX_WIN
        };

        if self.advertised_window > max {
            return Err(ConfigError::WindowTooLarge {
                provided: self.advertised_window,
                max,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_is_valid() {
        let config = TcpConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.advertised_window, 7504);
        assert_eq!(config.algorithm, CongestionAlgorithmKind::Reno);
    }

    #[test]
    fn config_rejects_bad_values() {
        assert!(matches!(
            TcpConfig::default().with_mss(0).validate(),
            Err(ConfigError::InvalidMss)
        ));
        assert!(matches!(
            TcpConfig::default().with_msl(Duration::ZERO).validate(),
            Err(ConfigError::InvalidMsl)
        ));
        assert!(matches!(
            TcpConfig::default().with_advertised_window(70_000).validate(),
            Err(ConfigError::WindowTooLarge { max: TCP_MAX_WIN, .. })
        ));
    }

    #[test]
    fn config_window_scaling_allows_large_windows() {
        let config = TcpConfig::default()
            .with_window_scaling(true)
            .with_advertised_window(1 << 20);

        assert!(config.validate().is_ok());
    }
}
