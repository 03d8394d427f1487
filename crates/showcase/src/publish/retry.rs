// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded exponential backoff for registration attempts.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed per job before it is aborted.
    pub max_attempts: u32,
    pub base: Duration,
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_millis(500),
            ceiling: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.ceiling)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::from_secs(1),
            ceiling: Duration::from_secs(60),
        }
    }

    #[yare::parameterized(
        none = { 0, 0 },
        first = { 1, 1 },
        second = { 2, 2 },
        third = { 3, 4 },
        sixth = { 6, 32 },
        capped = { 7, 60 },
        huge = { 40, 60 },
    )]
    fn backoff_doubles_until_ceiling(failures: u32, secs: u64) {
        assert_eq!(policy().backoff(failures), Duration::from_secs(secs));
    }

    #[test]
    fn exhausted_at_max_attempts() {
        assert!(!policy().exhausted(2));
        assert!(policy().exhausted(3));
    }
}
