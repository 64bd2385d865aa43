use crate::errors::{MeterError, Result};
use crate::meter::WINDOW_SLOTS;
use std::time::Duration;

pub(crate) const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_LIFECYCLE_TICKS: u32 = WINDOW_SLOTS as u32;

/// The meter configuration values.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterConfig {
    /// The interval in which the clock advances the rolling window.
    pub tick_interval: Duration,
    /// The number of ticks between two invocations of the lifecycle callback.
    pub lifecycle_ticks: u32,
}

impl MeterConfig {
    /// Create a new meter configuration builder.
    pub fn builder() -> MeterConfigBuilder {
        MeterConfigBuilder::builder()
    }

    /// Verify that the configuration values can be used by a meter.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(MeterError::InvalidConfig(
                "tick interval must be greater than zero".to_string(),
            ));
        }
        if self.lifecycle_ticks == 0 {
            return Err(MeterError::InvalidConfig(
                "lifecycle ticks must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
pub struct MeterConfigBuilder {
    tick_interval: Option<Duration>,
    lifecycle_ticks: Option<u32>,
}

impl MeterConfigBuilder {
    /// Create a new meter configuration builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Set the interval in which the rolling window is advanced.
    pub fn tick_interval(&mut self, interval: Duration) -> &mut Self {
        self.tick_interval = Some(interval);
        self
    }

    /// Set the number of ticks between lifecycle callback invocations.
    pub fn lifecycle_ticks(&mut self, ticks: u32) -> &mut Self {
        self.lifecycle_ticks = Some(ticks);
        self
    }

    /// Build the meter configuration.
    /// Missing values are replaced by their defaults.
    pub fn build(&mut self) -> MeterConfig {
        MeterConfig {
            tick_interval: self.tick_interval.take().unwrap_or(DEFAULT_TICK_INTERVAL),
            lifecycle_ticks: self.lifecycle_ticks.take().unwrap_or(DEFAULT_LIFECYCLE_TICKS),
        }
    }
}
