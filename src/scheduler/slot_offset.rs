//! Slot offset distribution
//!
//! Every feed gets a deterministic delay inside its refresh window so feeds
//! sharing a rate do not hit the fetch subsystem in one burst. The offset is
//! a stable hash of the url reduced into the window, so it survives restarts
//! and only moves when the effective rate changes.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic sub-window offset in milliseconds, always in
/// `[0, rate_seconds * 1000)`
pub fn calculate_slot_offset_ms(url: &str, rate_seconds: u32) -> i64 {
    let window_ms = u64::from(rate_seconds) * 1000;
    if window_ms == 0 {
        return 0;
    }
    (fnv1a_64(url.as_bytes()) % window_ms) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_is_deterministic() {
        let first = calculate_slot_offset_ms("https://example.com/feed.xml", 600);
        let second = calculate_slot_offset_ms("https://example.com/feed.xml", 600);
        assert_eq!(first, second);
    }

    #[test]
    fn test_offset_moves_with_the_window() {
        let url = "https://example.com/feed.xml";
        let wide = calculate_slot_offset_ms(url, 600);
        let narrow = calculate_slot_offset_ms(url, 120);
        assert!(wide < 600_000);
        assert!(narrow < 120_000);
    }

    #[test]
    fn test_offset_always_in_range() {
        for i in 0..1000 {
            let url = format!("https://example.com/feeds/{i}.xml");
            let offset = calculate_slot_offset_ms(&url, 120);
            assert!((0..120_000).contains(&offset), "offset {offset} out of range");
        }
    }

    #[test]
    fn test_zero_rate_yields_zero_offset() {
        assert_eq!(calculate_slot_offset_ms("https://example.com/feed.xml", 0), 0);
    }

    #[test]
    fn test_offsets_are_close_to_uniform() {
        // 10,000 distinct urls at one rate, bucketed over 100 equal-width
        // sub-intervals of the window; expected count per bucket is 100
        let rate_seconds = 600;
        let window_ms = i64::from(rate_seconds) * 1000;
        let bucket_width = window_ms / 100;
        let mut buckets = [0u32; 100];

        for i in 0..10_000 {
            let url = format!("https://news.example.org/{i}/rss.xml");
            let offset = calculate_slot_offset_ms(&url, rate_seconds as u32);
            let bucket = (offset / bucket_width).min(99) as usize;
            buckets[bucket] += 1;
        }

        for (bucket, count) in buckets.iter().enumerate() {
            assert!(
                (40..=160).contains(count),
                "bucket {bucket} holds {count} offsets, outside tolerance"
            );
        }
    }
}
