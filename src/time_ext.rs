use std::time::Duration as StdDuration;

pub(crate) trait TimeDurationExt {
    /// Negative durations become zero. Durations too large for `std` saturate.
    fn to_std_duration(self) -> StdDuration;
}

impl TimeDurationExt for time::Duration {
    fn to_std_duration(self) -> StdDuration {
        match self.is_negative() {
            true => StdDuration::ZERO,
            false => u64::try_from(self.whole_nanoseconds())
                .map(StdDuration::from_nanos)
                .unwrap_or(StdDuration::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn negative_durations_are_zero() {
        assert_that(time::Duration::seconds(-5).to_std_duration()).is_equal_to(StdDuration::ZERO);
        assert_that(time::Duration::seconds(5).to_std_duration())
            .is_equal_to(StdDuration::from_secs(5));
    }
}
