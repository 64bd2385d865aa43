use derive_more::Display;

/// An immutable copy of the derived values of a meter.
///
/// The values of a snapshot will not change after it has been created,
/// which makes it suitable for logging or publishing to subscribers.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq)]
#[display("total: {}, cps: {}, cpm: {}, max cpm: {}", rate, cps, cpm, max_cpm)]
pub struct MeterSnapshot {
    /// The cumulative total of events.
    pub rate: i64,
    /// The events of the most recently completed second.
    pub cps: i64,
    /// The events within the rolling window.
    pub cpm: i64,
    /// The highest number of events observed within the rolling window.
    pub max_cpm: i64,
}
