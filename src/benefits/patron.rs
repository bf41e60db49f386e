//! Patron validity and pledge tiering
//!
//! Pure functions of pledge and lifetime pledge. The multi-patron merge takes
//! the most generous value for each numeric limit; the refresh rate keeps the
//! first defined value in input order for compatibility with existing
//! accounts, and that ordering quirk is deliberately not extended elsewhere.

use chrono::{DateTime, Duration, Utc};

use super::models::{PatronRecord, PatronStatus};
use crate::constants::entitlements::{
    DECLINED_PATRON_GRACE_DAYS, PATRON_REFRESH_RATE_PLEDGE_CENTS, PATRON_REFRESH_RATE_SECS,
};

/// Benefits derived from an owner's set of patrons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatronBenefits {
    pub max_feeds: u32,
    pub max_user_feeds: u32,
    pub max_guilds: u32,
    pub allow_webhooks: bool,
    pub refresh_rate_seconds: Option<u32>,
}

/// A patron counts while actively pledging, or for a short grace period
/// after a declined charge
pub fn is_valid_patron(patron: &PatronRecord, now: DateTime<Utc>) -> bool {
    match patron.status {
        PatronStatus::Active => patron.pledge > 0,
        PatronStatus::Declined => {
            patron.pledge > 0
                && patron.last_charge.is_some_and(|charged| {
                    now - charged <= Duration::days(DECLINED_PATRON_GRACE_DAYS)
                })
        }
        PatronStatus::Former => false,
    }
}

pub fn max_feeds_from_pledge(pledge_cents: u32, default_max_feeds: u32) -> u32 {
    match pledge_cents {
        p if p >= 2000 => 140,
        p if p >= 1500 => 105,
        p if p >= 1000 => 70,
        p if p >= 500 => 35,
        p if p >= 250 => 15,
        _ => default_max_feeds,
    }
}

pub fn max_guilds_from_lifetime_pledge(lifetime_cents: u32) -> u32 {
    match lifetime_cents {
        p if p >= 2500 => 4,
        p if p >= 1500 => 3,
        p if p >= 500 => 2,
        _ => 1,
    }
}

pub fn refresh_rate_from_pledge(pledge_cents: u32) -> Option<u32> {
    if pledge_cents >= PATRON_REFRESH_RATE_PLEDGE_CENTS {
        Some(PATRON_REFRESH_RATE_SECS)
    } else {
        None
    }
}

/// Merge benefits across an owner's patrons: the most generous value wins for
/// each limit, webhooks are granted by any valid patron, and the refresh rate
/// keeps the first defined value in input order.
///
/// With no valid patrons this yields the defaults with zero guilds, no
/// webhook allowance, and no refresh rate.
pub fn max_benefits_from_patrons(
    patrons: &[PatronRecord],
    default_max_feeds: u32,
    now: DateTime<Utc>,
) -> PatronBenefits {
    let mut merged = PatronBenefits {
        max_feeds: default_max_feeds,
        max_user_feeds: 0,
        max_guilds: 0,
        allow_webhooks: false,
        refresh_rate_seconds: None,
    };

    for patron in patrons.iter().filter(|p| is_valid_patron(p, now)) {
        let pledge = patron.effective_pledge();
        merged.max_feeds = merged
            .max_feeds
            .max(max_feeds_from_pledge(pledge, default_max_feeds));
        merged.max_user_feeds = merged
            .max_user_feeds
            .max(max_feeds_from_pledge(pledge, default_max_feeds));
        merged.max_guilds = merged
            .max_guilds
            .max(max_guilds_from_lifetime_pledge(patron.pledge_lifetime));
        merged.allow_webhooks = true;
        if merged.refresh_rate_seconds.is_none() {
            merged.refresh_rate_seconds = refresh_rate_from_pledge(pledge);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patron(status: PatronStatus, pledge: u32) -> PatronRecord {
        PatronRecord {
            status,
            pledge,
            pledge_lifetime: pledge,
            pledge_override: None,
            last_charge: None,
        }
    }

    #[test]
    fn test_active_patron_requires_pledge() {
        let now = Utc::now();
        assert!(is_valid_patron(&patron(PatronStatus::Active, 100), now));
        assert!(!is_valid_patron(&patron(PatronStatus::Active, 0), now));
    }

    #[test]
    fn test_declined_patron_grace_window() {
        let now = Utc::now();

        let mut declined = patron(PatronStatus::Declined, 100);
        declined.last_charge = Some(now - Duration::days(2));
        assert!(is_valid_patron(&declined, now));

        declined.last_charge = Some(now - Duration::days(5));
        assert!(!is_valid_patron(&declined, now));

        declined.last_charge = None;
        assert!(!is_valid_patron(&declined, now));
    }

    #[test]
    fn test_former_patron_never_valid() {
        let now = Utc::now();
        let mut former = patron(PatronStatus::Former, 1000);
        former.last_charge = Some(now);
        assert!(!is_valid_patron(&former, now));
    }

    #[test]
    fn test_max_feeds_pledge_boundaries() {
        let default_max = 5;
        assert_eq!(max_feeds_from_pledge(2000, default_max), 140);
        assert_eq!(max_feeds_from_pledge(1999, default_max), 105);
        assert_eq!(max_feeds_from_pledge(1499, default_max), 70);
        assert_eq!(max_feeds_from_pledge(999, default_max), 35);
        assert_eq!(max_feeds_from_pledge(499, default_max), 15);
        assert_eq!(max_feeds_from_pledge(249, default_max), default_max);
    }

    #[test]
    fn test_max_guilds_lifetime_boundaries() {
        assert_eq!(max_guilds_from_lifetime_pledge(2500), 4);
        assert_eq!(max_guilds_from_lifetime_pledge(1500), 3);
        assert_eq!(max_guilds_from_lifetime_pledge(500), 2);
        assert_eq!(max_guilds_from_lifetime_pledge(499), 1);
    }

    #[test]
    fn test_refresh_rate_pledge_threshold() {
        assert_eq!(refresh_rate_from_pledge(500), Some(120));
        assert_eq!(refresh_rate_from_pledge(499), None);
    }

    #[test]
    fn test_merge_with_no_patrons() {
        let merged = max_benefits_from_patrons(&[], 5, Utc::now());
        assert_eq!(
            merged,
            PatronBenefits {
                max_feeds: 5,
                max_user_feeds: 0,
                max_guilds: 0,
                allow_webhooks: false,
                refresh_rate_seconds: None,
            }
        );
    }

    #[test]
    fn test_merge_takes_most_generous_limits() {
        let now = Utc::now();
        let mut small = patron(PatronStatus::Active, 250);
        small.pledge_lifetime = 2500;
        let large = patron(PatronStatus::Active, 1000);

        let merged = max_benefits_from_patrons(&[small, large], 5, now);
        assert_eq!(merged.max_feeds, 70);
        assert_eq!(merged.max_guilds, 4);
        assert!(merged.allow_webhooks);
    }

    #[test]
    fn test_merge_keeps_first_defined_refresh_rate() {
        let now = Utc::now();
        let no_rate = patron(PatronStatus::Active, 250);
        let with_rate = patron(PatronStatus::Active, 600);

        let merged = max_benefits_from_patrons(&[no_rate.clone(), with_rate.clone()], 5, now);
        assert_eq!(merged.refresh_rate_seconds, Some(120));

        let merged = max_benefits_from_patrons(&[with_rate, no_rate], 5, now);
        assert_eq!(merged.refresh_rate_seconds, Some(120));
    }

    #[test]
    fn test_merge_skips_invalid_patrons() {
        let now = Utc::now();
        let former = patron(PatronStatus::Former, 2000);
        let merged = max_benefits_from_patrons(&[former], 5, now);
        assert_eq!(merged.max_feeds, 5);
        assert!(!merged.allow_webhooks);
    }

    #[test]
    fn test_pledge_override_drives_tiering() {
        let now = Utc::now();
        let mut overridden = patron(PatronStatus::Active, 100);
        overridden.pledge_override = Some(2000);

        let merged = max_benefits_from_patrons(&[overridden], 5, now);
        assert_eq!(merged.max_feeds, 140);
        assert_eq!(merged.refresh_rate_seconds, Some(120));
    }
}
