//! Step clock mapping step indices to simulated timestamps.

use chrono::{NaiveDateTime, TimeDelta};

/// A simulation clock that counts a fixed number of steps of equal length.
///
/// # Examples
///
/// ```
/// use chrono::{NaiveDate, TimeDelta};
/// use hvac_cosim::sim::clock::Clock;
///
/// let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let mut clock = Clock::new(start, TimeDelta::minutes(15), 3);
/// let mut steps = Vec::new();
///
/// while let Some(step) = clock.tick() {
///     steps.push(step);
/// }
/// assert_eq!(steps, vec![0, 1, 2]);
/// assert_eq!(clock.time_at(2), start + TimeDelta::minutes(30));
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    /// Next step to hand out
    current: usize,
    /// Total steps to run
    total: usize,
    start: NaiveDateTime,
    step: TimeDelta,
}

impl Clock {
    /// Creates a clock running `total` steps of length `step` from `start`.
    pub fn new(start: NaiveDateTime, step: TimeDelta, total: usize) -> Self {
        Self {
            current: 0,
            total,
            start,
            step,
        }
    }

    /// Creates a clock covering `[start, end)` in whole steps.
    ///
    /// A non-positive `step` or an empty window yields a clock with no steps.
    pub fn spanning(start: NaiveDateTime, end: NaiveDateTime, step: TimeDelta) -> Self {
        let window = end.signed_duration_since(start).num_seconds();
        let step_s = step.num_seconds();
        let total = if window > 0 && step_s > 0 {
            usize::try_from(window / step_s).unwrap_or(usize::MAX)
        } else {
            0
        };
        Self::new(start, step, total)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Simulated time at the start of `step`.
    pub fn time_at(&self, step: usize) -> NaiveDateTime {
        let n = i32::try_from(step).unwrap_or(i32::MAX);
        self.start + self.step * n
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(step)` - The step number (starting from 0) before advancing
    /// * `None` - If the clock has reached its total steps
    pub fn tick(&mut self) -> Option<usize> {
        if self.current < self.total {
            let step = self.current;
            self.current += 1;
            Some(step)
        } else {
            None
        }
    }

    /// Runs `f` for each remaining step, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_run<E>(&mut self, mut f: impl FnMut(usize) -> Result<(), E>) -> Result<(), E> {
        while let Some(step) = self.tick() {
            f(step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn test_tick() {
        let mut clock = Clock::new(start(), TimeDelta::minutes(1), 2);
        assert_eq!(clock.tick(), Some(0));
        assert_eq!(clock.tick(), Some(1));
        assert_eq!(clock.tick(), None);
    }

    #[test]
    fn test_empty_clock() {
        let mut clock = Clock::new(start(), TimeDelta::minutes(1), 0);
        assert_eq!(clock.tick(), None);

        let mut was_called = false;
        let result: Result<(), ()> = clock.try_run(|_| {
            was_called = true;
            Ok(())
        });
        assert!(result.is_ok());
        assert!(!was_called);
    }

    #[test]
    fn test_spanning_counts_whole_steps() {
        let end = start() + TimeDelta::hours(1) + TimeDelta::minutes(10);
        assert_eq!(Clock::spanning(start(), end, TimeDelta::minutes(15)).total(), 4);
        assert_eq!(Clock::spanning(end, start(), TimeDelta::minutes(15)).total(), 0);
        assert_eq!(Clock::spanning(start(), end, TimeDelta::zero()).total(), 0);
    }

    #[test]
    fn test_try_run_stops_on_error() {
        let mut clock = Clock::new(start(), TimeDelta::minutes(1), 10);
        let mut seen = 0;
        let result = clock.try_run(|step| {
            seen += 1;
            if step == 3 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(seen, 4);
    }
}
