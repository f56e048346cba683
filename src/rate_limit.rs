// In-memory rate limiter for write endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Different rate limit types with their constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Claim attempts per hour (failed guesses included).
    ClaimAttempts,
    /// Workout logs per hour.
    WorkoutLogs,
    /// Direct commentary requests per hour.
    CommentaryCalls,
}

impl RateLimitType {
    /// Maximum number of events allowed in the window.
    pub fn max_count(&self) -> usize {
        match self {
            RateLimitType::ClaimAttempts => 10,
            RateLimitType::WorkoutLogs => 120,
            RateLimitType::CommentaryCalls => 60,
        }
    }

    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        Duration::from_secs(3600)
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::ClaimAttempts => write!(f, "claim attempts per hour"),
            RateLimitType::WorkoutLogs => write!(f, "workout logs per hour"),
            RateLimitType::CommentaryCalls => write!(f, "commentary requests per hour"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone)]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: usize,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rate limit exceeded: max {} {}",
            self.max, self.limit_type
        )
    }
}

/// Key for the rate limit map: (identity_id, limit_type).
type LimitKey = (i64, RateLimitType);

/// Thread-safe in-memory rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if the identity is within the rate limit for the given type.
    /// If within limits, records the event and returns Ok(()).
    /// If exceeded, returns Err(RateLimitError).
    pub fn check_limit(
        &self,
        identity_id: i64,
        limit_type: RateLimitType,
    ) -> Result<(), RateLimitError> {
        let mut map = self.inner.lock().unwrap();
        let key = (identity_id, limit_type);
        let window = limit_type.window();
        let max = limit_type.max_count();
        let now = Instant::now();

        let entries = map.entry(key).or_default();

        // Remove expired entries
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            return Err(RateLimitError { limit_type, max });
        }

        entries.push(now);
        Ok(())
    }

    /// Get the current count for an identity and limit type (for testing/diagnostics).
    pub fn current_count(&self, identity_id: i64, limit_type: RateLimitType) -> usize {
        let mut map = self.inner.lock().unwrap();
        let key = (identity_id, limit_type);
        let window = limit_type.window();
        let now = Instant::now();

        if let Some(entries) = map.get_mut(&key) {
            entries.retain(|t| now.duration_since(*t) < window);
            entries.len()
        } else {
            0
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
