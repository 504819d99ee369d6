//! Derived expiry calculations over instance records.
//!
//! Expiry is never stored: a record is expired iff `now >= created_at +
//! ttl_secs`, computed on demand from the record's own fields. The core
//! never calls these helpers itself; they exist for callers that track the
//! records they were handed. Each helper has a variant taking an explicit
//! instant for reproducible tests and one sampling the system clock.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::instance::InstanceRecord;

/// Current time as seconds since the Unix epoch.
///
/// A clock set before the epoch reads as zero rather than failing; records
/// simply never expire on such a host.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Returns true when the record is expired at the supplied instant.
///
/// The boundary instant (`now == created_at + ttl_secs`) counts as expired.
#[must_use]
pub fn is_expired_at(record: &InstanceRecord, now_secs: u64) -> bool {
    now_secs >= record.created_at.saturating_add(record.ttl_secs)
}

/// Returns true when the record is expired now.
#[must_use]
pub fn is_expired(record: &InstanceRecord) -> bool {
    is_expired_at(record, unix_now())
}

/// Signed seconds until the record expires at the supplied instant;
/// negative once expiry has passed.
#[must_use]
pub fn time_to_expiry_at(record: &InstanceRecord, now_secs: u64) -> i64 {
    let expires_at = i128::from(record.created_at) + i128::from(record.ttl_secs);
    let delta = expires_at - i128::from(now_secs);
    i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX })
}

/// Signed seconds until the record expires, measured from now.
#[must_use]
pub fn time_to_expiry(record: &InstanceRecord) -> i64 {
    time_to_expiry_at(record, unix_now())
}

/// Returns the records expired at the supplied instant.
#[must_use]
pub fn filter_expired_at<'a>(
    records: &'a [InstanceRecord],
    now_secs: u64,
) -> Vec<&'a InstanceRecord> {
    records
        .iter()
        .filter(|record| is_expired_at(record, now_secs))
        .collect()
}

/// Returns the records expired now.
#[must_use]
pub fn filter_expired(records: &[InstanceRecord]) -> Vec<&InstanceRecord> {
    filter_expired_at(records, unix_now())
}

/// Returns the records still active at the supplied instant.
#[must_use]
pub fn filter_active_at<'a>(
    records: &'a [InstanceRecord],
    now_secs: u64,
) -> Vec<&'a InstanceRecord> {
    records
        .iter()
        .filter(|record| !is_expired_at(record, now_secs))
        .collect()
}

/// Returns the records still active now.
#[must_use]
pub fn filter_active(records: &[InstanceRecord]) -> Vec<&InstanceRecord> {
    filter_active_at(records, unix_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceState;

    fn record(created_at: u64, ttl_secs: u64) -> InstanceRecord {
        InstanceRecord::from_state(
            InstanceState::new("id", "198.51.100.7"),
            "p1",
            "ubuntu-22-small",
            created_at,
            ttl_secs,
            "key",
        )
    }

    #[test]
    fn boundary_instant_counts_as_expired() {
        let subject = record(1_000, 3_600);
        assert!(!is_expired_at(&subject, 4_599));
        assert!(is_expired_at(&subject, 4_600));
        assert!(is_expired_at(&subject, 4_601));
    }

    #[test]
    fn time_to_expiry_goes_negative_after_expiry() {
        let subject = record(1_000, 3_600);
        assert_eq!(time_to_expiry_at(&subject, 1_000), 3_600);
        assert_eq!(time_to_expiry_at(&subject, 4_600), 0);
        assert_eq!(time_to_expiry_at(&subject, 4_601), -1);
    }

    #[test]
    fn expired_instance_from_spec_scenario() {
        // createdAt = now - 3601, ttl = 3600.
        let now = 10_000;
        let subject = record(now - 3_601, 3_600);
        assert!(is_expired_at(&subject, now));
        assert!(time_to_expiry_at(&subject, now) < 0);
    }

    #[test]
    fn filters_partition_the_input_exactly() {
        let records = vec![record(0, 100), record(0, 10_000), record(500, 1), record(9_999, 10)];
        let now = 1_000;
        let expired = filter_expired_at(&records, now);
        let active = filter_active_at(&records, now);
        assert_eq!(expired.len() + active.len(), records.len());
        for subject in &records {
            let in_expired = expired.iter().any(|candidate| std::ptr::eq(*candidate, subject));
            let in_active = active.iter().any(|candidate| std::ptr::eq(*candidate, subject));
            assert!(in_expired != in_active, "record must land in exactly one partition");
        }
    }

    #[test]
    fn saturating_ttl_never_expires() {
        let subject = record(u64::MAX - 10, u64::MAX);
        assert!(!is_expired_at(&subject, u64::MAX - 1));
        assert_eq!(time_to_expiry_at(&subject, 0), i64::MAX);
    }
}
