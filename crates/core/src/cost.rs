//! Per-instruction cost derivation from the engine's remaining budget.

/// Tracks the last observed remaining budget and yields the budget consumed since then.
///
/// Deltas are signed and are not clamped: a budget that grows between two observations
/// produces a negative delta, which points at the metering engine rather than at the tracer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostWindow {
    remaining: Option<u64>,
}

impl CostWindow {
    /// Create an unset window.
    #[must_use]
    pub const fn new() -> Self {
        Self { remaining: None }
    }

    /// Record `current` as the remaining budget.
    ///
    /// Returns `None` on the first call after construction or [`Self::reset`], and
    /// `Some(previous - current)` afterwards.
    pub fn observe(&mut self, current: u64) -> Option<i64> {
        let delta = self.remaining.map(|previous| budget_delta(previous, current));
        self.remaining = Some(current);
        delta
    }

    /// Close the window at transaction end, returning `stored - rest`.
    ///
    /// An unset window has nothing to attribute and yields 0.
    pub fn flush(&mut self, rest: u64) -> i64 {
        let delta = self.remaining.map_or(0, |previous| budget_delta(previous, rest));
        self.remaining = Some(rest);
        delta
    }

    /// Forget the stored budget.
    pub fn reset(&mut self) {
        self.remaining = None;
    }

    /// The stored remaining budget, if any.
    #[must_use]
    pub const fn remaining(&self) -> Option<u64> {
        self.remaining
    }
}

/// `previous - current` as a signed value; wraps so that a small increase reads as a small
/// negative number.
#[inline]
const fn budget_delta(previous: u64, current: u64) -> i64 {
    previous.wrapping_sub(current) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_sequence() {
        let mut window = CostWindow::new();
        let deltas: Vec<_> = [100, 80, 80, 50].into_iter().map(|b| window.observe(b)).collect();
        assert_eq!(deltas, vec![None, Some(20), Some(0), Some(30)]);
        assert_eq!(window.flush(30), 20);
    }

    #[test]
    fn increase_is_passed_through() {
        let mut window = CostWindow::new();
        window.observe(100);
        assert_eq!(window.observe(120), Some(-20));
        assert_eq!(window.flush(125), -5);
    }

    #[test]
    fn reset_forgets_budget() {
        let mut window = CostWindow::new();
        window.observe(10);
        window.reset();
        assert_eq!(window.remaining(), None);
        assert_eq!(window.observe(7), None);
    }

    #[test]
    fn flush_unset_is_zero() {
        let mut window = CostWindow::new();
        assert_eq!(window.flush(42), 0);
        assert_eq!(window.remaining(), Some(42));
    }
}
