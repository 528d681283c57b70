use chrono::{DateTime, Duration, Utc};

/// A rearming time-to-live deadline.
///
/// The deadline only counts when armed. Buffers arm it on the first record
/// after a flush and disarm it when they are emptied, so an idle empty buffer
/// never reads as expired. All clock reads are passed in by the caller, which
/// keeps the state machine deterministic under test.
#[derive(Debug, Clone)]
pub struct Expiry {
    ttl: Duration,
    expires_at: DateTime<Utc>,
    armed: bool,
}

impl Expiry {
    /// Creates a disarmed deadline with the given time-to-live.
    pub fn new(ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            ttl,
            expires_at: now + ttl,
            armed: false,
        }
    }

    /// Pushes the deadline out to `now + ttl` and arms it.
    pub fn rearm(&mut self, now: DateTime<Utc>) {
        self.expires_at = now + self.ttl;
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Returns whether the deadline has passed, as observed at `at`.
    pub fn expired(&self, at: DateTime<Utc>) -> bool {
        self.armed && at >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn disarmed_deadline_never_expires() {
        let expiry = Expiry::new(Duration::seconds(60), base());
        assert!(!expiry.expired(base() + Duration::hours(5)));
    }

    #[test]
    fn armed_deadline_expires_after_ttl() {
        let mut expiry = Expiry::new(Duration::seconds(60), base());
        expiry.rearm(base());

        assert!(!expiry.expired(base() + Duration::seconds(59)));
        assert!(expiry.expired(base() + Duration::seconds(60)));
        assert!(expiry.expired(base() + Duration::seconds(61)));
    }

    #[test]
    fn rearming_pushes_the_deadline_out() {
        let mut expiry = Expiry::new(Duration::seconds(60), base());
        expiry.rearm(base());
        expiry.rearm(base() + Duration::seconds(50));

        assert!(!expiry.expired(base() + Duration::seconds(100)));
        assert!(expiry.expired(base() + Duration::seconds(110)));
    }

    #[test]
    fn disarming_clears_a_passed_deadline() {
        let mut expiry = Expiry::new(Duration::seconds(60), base());
        expiry.rearm(base());
        let late = base() + Duration::seconds(120);
        assert!(expiry.expired(late));

        expiry.disarm();
        assert!(!expiry.expired(late));
    }
}
