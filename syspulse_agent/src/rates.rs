//! Pure derivation math: tick deltas, byte rates and bounded percentages.

use std::time::Duration;

use crate::counters::CpuTicks;

/// Percentage of `part` in `total`, clamped to 0..=100. A zero total is 0%.
pub fn percent_of(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    clamp_percent(part as f64 / total as f64 * 100.0)
}

/// Clamp to 0..=100, mapping NaN to 0.
pub fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

/// CPU busy percentage between two cumulative tick readings.
///
/// `prev == None` is the first sample and reports 0. Each field delta saturates
/// at zero so a wrapped or reset counter contributes nothing.
pub fn cpu_usage_percent(prev: Option<&CpuTicks>, cur: &CpuTicks) -> f64 {
    let Some(prev) = prev else {
        return 0.0;
    };
    let user = cur.user.saturating_sub(prev.user);
    let system = cur.system.saturating_sub(prev.system);
    let nice = cur.nice.saturating_sub(prev.nice);
    let idle = cur.idle.saturating_sub(prev.idle);

    let busy = user.saturating_add(system).saturating_add(nice);
    let total = busy.saturating_add(idle);
    percent_of(busy, total)
}

/// Bytes per second between two cumulative totals.
///
/// First sample, a counter that went backwards (interface reset) or a
/// non-positive elapsed time all yield 0; the result is never negative.
pub fn byte_rate(prev: Option<u64>, cur: u64, elapsed: Duration) -> f64 {
    let Some(prev) = prev else {
        return 0.0;
    };
    if cur < prev {
        return 0.0;
    }
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (cur - prev) as f64 / secs
}

/// Seconds between boot and now, saturating at 0. A boot time of 0 means the
/// read failed and also yields 0.
pub fn uptime_secs(now_unix: u64, boot_unix: u64) -> u64 {
    if boot_unix == 0 {
        return 0;
    }
    now_unix.saturating_sub(boot_unix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(user: u64, system: u64, idle: u64, nice: u64) -> CpuTicks {
        CpuTicks {
            user,
            system,
            idle,
            nice,
        }
    }

    #[test]
    fn cpu_usage_from_tick_deltas() {
        let a = ticks(10, 5, 85, 0);
        let b = ticks(20, 10, 90, 0);
        assert_eq!(cpu_usage_percent(Some(&a), &b), 75.0);
    }

    #[test]
    fn cpu_first_sample_is_zero() {
        assert_eq!(cpu_usage_percent(None, &ticks(500, 200, 9000, 3)), 0.0);
    }

    #[test]
    fn cpu_wrapped_fields_contribute_nothing() {
        let a = ticks(100, 100, 100, 100);
        // user wrapped; only idle advanced
        let b = ticks(5, 100, 150, 100);
        assert_eq!(cpu_usage_percent(Some(&a), &b), 0.0);
        // nothing advanced at all
        assert_eq!(cpu_usage_percent(Some(&a), &a), 0.0);
    }

    #[test]
    fn cpu_usage_stays_in_range() {
        let a = ticks(0, 0, 0, 0);
        let b = ticks(u64::MAX, u64::MAX, 0, u64::MAX);
        let v = cpu_usage_percent(Some(&a), &b);
        assert!((0.0..=100.0).contains(&v));
    }

    #[test]
    fn network_rates_clamp_on_reset() {
        let samples = [1000u64, 1500, 1200, 1800];
        let mut prev = None;
        let mut rates = Vec::new();
        for cur in samples {
            rates.push(byte_rate(prev, cur, Duration::from_secs(1)));
            prev = Some(cur);
        }
        assert_eq!(rates, vec![0.0, 500.0, 0.0, 600.0]);
    }

    #[test]
    fn network_rate_uses_actual_elapsed() {
        let r = byte_rate(Some(1000), 2000, Duration::from_millis(2500));
        assert!((r - 400.0).abs() < 1e-9);
        assert_eq!(byte_rate(Some(1000), 2000, Duration::ZERO), 0.0);
    }

    #[test]
    fn percent_handles_zero_total() {
        assert_eq!(percent_of(10, 0), 0.0);
        assert_eq!(percent_of(50, 200), 25.0);
        assert_eq!(percent_of(300, 200), 100.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        assert_eq!(clamp_percent(-3.0), 0.0);
    }

    #[test]
    fn uptime_never_negative() {
        assert_eq!(uptime_secs(1_000, 400), 600);
        assert_eq!(uptime_secs(400, 1_000), 0);
        assert_eq!(uptime_secs(1_000, 0), 0);
    }
}
