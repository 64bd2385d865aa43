/// The number of one-second slots within the rolling window.
pub const WINDOW_SLOTS: usize = 60;

/// A rolling window of per-second event totals.
///
/// The window is a circular buffer of [WINDOW_SLOTS] slots in which exactly one slot,
/// the one at `index`, is open for new events.
/// All other slots hold the finalized totals of the trailing seconds.
///
/// The sum of all slots is maintained incrementally, so it's always equal to the
/// actual sum of the slots without the need of a full scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    slots: [i64; WINDOW_SLOTS],
    index: usize,
    current_cpm: i64,
    max_cpm: i64,
}

impl RollingWindow {
    pub fn new() -> Self {
        Self {
            slots: [0; WINDOW_SLOTS],
            index: 0,
            current_cpm: 0,
            max_cpm: 0,
        }
    }

    /// Add the given delta to the open slot of the window.
    /// This raises the max CPM when the new window sum exceeds it.
    pub fn add(&mut self, delta: i64) {
        self.slots[self.index] = self.slots[self.index].wrapping_add(delta);
        self.current_cpm = self.current_cpm.wrapping_add(delta);

        if self.current_cpm > self.max_cpm {
            self.max_cpm = self.current_cpm;
        }
    }

    /// Close the open slot and move the window one slot forward.
    ///
    /// The slot which is being opened is the oldest slot of the window,
    /// its total is expired from the window sum before it's being cleared.
    ///
    /// It returns the final total of the slot that has been closed.
    pub fn advance(&mut self) -> i64 {
        let completed = self.slots[self.index];

        self.index = (self.index + 1) % WINDOW_SLOTS;
        self.current_cpm = self.current_cpm.wrapping_sub(self.slots[self.index]);
        self.slots[self.index] = 0;

        completed
    }

    /// Get the sum of all slots within the window.
    pub fn cpm(&self) -> i64 {
        self.current_cpm
    }

    /// Get the highest window sum that has been observed.
    pub fn max_cpm(&self) -> i64 {
        self.max_cpm
    }

    /// Lower the max CPM back to the current window sum.
    pub fn reset_max_cpm(&mut self) {
        self.max_cpm = self.current_cpm;
    }

    /// Get the position of the open slot.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the slots of the window.
    pub fn slots(&self) -> &[i64] {
        &self.slots
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new()
    }
}
