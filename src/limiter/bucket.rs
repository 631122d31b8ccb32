//! Continuous-refill token bucket

use chrono::{DateTime, Utc};

/// Token bucket holding at most `capacity` permits, refilled at `rate` per second
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    /// Full bucket
    pub fn new(capacity: u32, refill_rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate,
            last_refill: now,
        }
    }

    /// Take one permit if available
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        // Clock going backwards adds nothing
        let elapsed = (now - self.last_refill)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    pub fn available_tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_burst_then_refill() {
        let start = Utc::now();
        let mut bucket = TokenBucket::new(4, 2.0, start);

        for _ in 0..4 {
            assert!(bucket.try_consume(start));
        }
        assert!(!bucket.try_consume(start));

        // 600ms at 2/s is 1.2 tokens: one more admit, then empty again
        let later = start + Duration::milliseconds(600);
        assert!(bucket.try_consume(later));
        assert!(!bucket.try_consume(later));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let start = Utc::now();
        let mut bucket = TokenBucket::new(4, 2.0, start);
        assert!(bucket.try_consume(start));

        let much_later = start + Duration::hours(1);
        bucket.refill(much_later);
        assert_eq!(bucket.available_tokens(), bucket.capacity());
    }

    #[test]
    fn test_never_negative() {
        let start = Utc::now();
        let mut bucket = TokenBucket::new(1, 1.0, start);
        assert!(bucket.try_consume(start));
        for _ in 0..10 {
            assert!(!bucket.try_consume(start));
        }
        assert!(bucket.available_tokens() >= 0.0);
    }

    #[test]
    fn test_backwards_clock_adds_nothing() {
        let start = Utc::now();
        let mut bucket = TokenBucket::new(1, 1.0, start);
        assert!(bucket.try_consume(start));
        assert!(!bucket.try_consume(start - Duration::seconds(30)));
        // Refill still measured from the latest instant seen
        assert!(!bucket.try_consume(start + Duration::milliseconds(500)));
        assert!(bucket.try_consume(start + Duration::seconds(1)));
    }

    #[test]
    fn test_one_over_rate_admits_exactly_one() {
        let start = Utc::now();
        let mut bucket = TokenBucket::new(2, 4.0, start);
        assert!(bucket.try_consume(start));
        assert!(bucket.try_consume(start));
        assert!(!bucket.try_consume(start));

        let next = start + Duration::milliseconds(250);
        assert!(bucket.try_consume(next));
        assert!(!bucket.try_consume(next));
    }
}
