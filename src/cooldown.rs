use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{ExamError, ExamResult};
use crate::store::Datastore;

/// Minimum wait between a submitted attempt and the next start.
///
/// The submission timestamps on the attempts themselves are the only record;
/// nothing else is persisted.
#[derive(Debug, Clone, Copy)]
pub struct CooldownPolicy {
    interval: Duration,
}

impl CooldownPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::zero()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `max(0, interval - (now - last_submitted_at))`; zero when nothing was submitted.
    pub fn remaining(&self, last_submitted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        match last_submitted_at {
            None => Duration::zero(),
            Some(at) => (self.interval - (now - at)).max(Duration::zero()),
        }
    }

    pub async fn remaining_cooldown(
        &self,
        store: &Datastore,
        user_id: Uuid,
        module_id: Uuid,
        now: DateTime<Utc>,
    ) -> ExamResult<Duration> {
        let last = store.last_submitted_at(user_id, module_id).await?;
        Ok(self.remaining(last, now))
    }

    /// Rejects a start while the cooldown is running.
    pub fn admit(&self, last_submitted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ExamResult<()> {
        let remaining = self.remaining(last_submitted_at, now);
        if remaining > Duration::zero() {
            return Err(ExamError::CooldownActive {
                remaining_seconds: ceil_seconds(remaining),
            });
        }
        Ok(())
    }

    pub fn record_outcome(&self, user_id: Uuid, module_id: Uuid, submitted_at: DateTime<Utc>) {
        tracing::debug!(
            %user_id,
            %module_id,
            next_attempt_at = %(submitted_at + self.interval),
            "cooldown started"
        );
    }
}

pub fn ceil_seconds(d: Duration) -> i64 {
    let whole = d.num_seconds();
    if d > Duration::seconds(whole) {
        whole + 1
    } else {
        whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CooldownPolicy {
        CooldownPolicy::new(Duration::seconds(600))
    }

    #[test]
    fn no_prior_submission_means_no_cooldown() {
        assert_eq!(policy().remaining(None, Utc::now()), Duration::zero());
        assert!(policy().admit(None, Utc::now()).is_ok());
    }

    #[test]
    fn remaining_decreases_until_exact_expiry() {
        let p = policy();
        let last = Utc::now();
        let mut prev = p.remaining(Some(last), last);
        assert_eq!(prev, Duration::seconds(600));
        for step in 1..600 {
            let now = last + Duration::seconds(step);
            let r = p.remaining(Some(last), now);
            assert!(r < prev, "not decreasing at {step}s");
            prev = r;
        }
        assert_eq!(p.remaining(Some(last), last + Duration::seconds(600)), Duration::zero());
        assert_eq!(p.remaining(Some(last), last + Duration::seconds(900)), Duration::zero());
    }

    #[test]
    fn admit_reports_remaining_rounded_up() {
        let last = Utc::now();
        let now = last + Duration::milliseconds(100_500);
        match policy().admit(Some(last), now) {
            Err(ExamError::CooldownActive { remaining_seconds }) => assert_eq!(remaining_seconds, 500),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ceil_seconds_rounds_partial_seconds_up() {
        assert_eq!(ceil_seconds(Duration::milliseconds(1)), 1);
        assert_eq!(ceil_seconds(Duration::seconds(3)), 3);
        assert_eq!(ceil_seconds(Duration::zero()), 0);
    }
}
