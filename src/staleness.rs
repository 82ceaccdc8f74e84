/// Staleness: whole minutes since a device last reported data.
use crate::status_client::DeviceStatus;
#[cfg(test)]
use crate::status_client::{StatusError, StatusSource};
use chrono::{DateTime, Utc};

/// Reported for devices that have never sent data (`latest_data` is null).
pub const NEVER_SEEN_MINUTES: i64 = 99_999;

/// Minutes between `latest_data` (unix seconds) and `now`.
///
/// Truncates toward zero. A timestamp in the future clamps to 0.
pub fn minutes_since_last_data(latest_data: Option<f64>, now: DateTime<Utc>) -> i64 {
    let Some(latest) = latest_data else {
        return NEVER_SEEN_MINUTES;
    };
    let now_secs = now.timestamp_millis() as f64 / 1000.0;
    let elapsed = now_secs - latest;
    if elapsed <= 0.0 {
        return 0;
    }
    (elapsed / 60.0).trunc() as i64
}

/// Converts device status into staleness minutes against a clock.
#[derive(Debug, Clone, Copy)]
pub struct StalenessEvaluator {
    clock: fn() -> DateTime<Utc>,
}

impl Default for StalenessEvaluator {
    fn default() -> Self {
        Self::new(Utc::now)
    }
}

impl StalenessEvaluator {
    pub fn new(clock: fn() -> DateTime<Utc>) -> Self {
        Self { clock }
    }

    /// Staleness of an already-fetched status.
    pub fn minutes(&self, status: &DeviceStatus) -> i64 {
        minutes_since_last_data(status.latest_data, (self.clock)())
    }

    /// Fetch the device's status from `source` and compute its staleness.
    #[cfg(test)]
    pub async fn minutes_since_last_data<S: StatusSource>(
        &self,
        source: &S,
        origin: &str,
    ) -> Result<i64, StatusError> {
        let status = source.device_status(origin).await?;
        Ok(self.minutes(&status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn secs_ago(secs: i64) -> Option<f64> {
        Some((now().timestamp() - secs) as f64)
    }

    #[test]
    fn test_null_latest_data_is_never_seen() {
        assert_eq!(minutes_since_last_data(None, now()), NEVER_SEEN_MINUTES);
    }

    #[test]
    fn test_truncates_not_rounds() {
        // 700s = 11.67 minutes
        assert_eq!(minutes_since_last_data(secs_ago(700), now()), 11);
        assert_eq!(minutes_since_last_data(secs_ago(59), now()), 0);
        assert_eq!(minutes_since_last_data(secs_ago(60), now()), 1);
        assert_eq!(minutes_since_last_data(secs_ago(660), now()), 11);
    }

    #[test]
    fn test_fractional_timestamp() {
        let latest = now().timestamp() as f64 - 599.5;
        assert_eq!(minutes_since_last_data(Some(latest), now()), 9);
    }

    #[test]
    fn test_future_timestamp_clamps_to_zero() {
        assert_eq!(minutes_since_last_data(secs_ago(-3600), now()), 0);
        assert_eq!(minutes_since_last_data(secs_ago(0), now()), 0);
    }

    struct Fixed(DeviceStatus);

    impl StatusSource for Fixed {
        async fn device_status(&self, _origin: &str) -> Result<DeviceStatus, StatusError> {
            Ok(self.0.clone())
        }
    }

    struct Missing;

    impl StatusSource for Missing {
        async fn device_status(&self, origin: &str) -> Result<DeviceStatus, StatusError> {
            Err(StatusError::UnknownDevice {
                origin: origin.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_evaluator_null_regardless_of_injection() {
        for injection_status in [Some(true), Some(false), None] {
            let source = Fixed(DeviceStatus {
                injection_status,
                latest_data: None,
            });
            let evaluator = StalenessEvaluator::new(now);
            assert_eq!(
                evaluator
                    .minutes_since_last_data(&source, "ATV1")
                    .await
                    .unwrap(),
                NEVER_SEEN_MINUTES
            );
        }
    }

    #[tokio::test]
    async fn test_evaluator_uses_clock() {
        let source = Fixed(DeviceStatus {
            injection_status: Some(false),
            latest_data: secs_ago(700),
        });
        let evaluator = StalenessEvaluator::new(now);
        assert_eq!(
            evaluator
                .minutes_since_last_data(&source, "ATV1")
                .await
                .unwrap(),
            11
        );
    }

    #[tokio::test]
    async fn test_evaluator_propagates_unknown_device() {
        let evaluator = StalenessEvaluator::new(now);
        let err = evaluator
            .minutes_since_last_data(&Missing, "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, StatusError::UnknownDevice { .. }));
    }
}
