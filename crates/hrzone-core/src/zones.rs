//! Heart-rate zone math (Tanaka max HR + Karvonen reserve bands).

/// Lower reserve fraction of each zone, zone 1 first. Zone k spans
/// `[ZONE_FRACTIONS[k], ZONE_FRACTIONS[k + 1]]`, zone 5 ends at max HR.
pub const ZONE_FRACTIONS: [f64; 5] = [0.5, 0.6, 0.7, 0.8, 0.9];

/// Inclusive heart-rate range in beats per minute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneRange {
    pub low: i32,
    pub high: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneResult {
    pub max_heart_rate: i32,
    /// Zones 1..=5, ascending by intensity.
    pub zones: [ZoneRange; 5],
}

impl ZoneResult {
    /// Zones paired with their 1-based index.
    pub fn iter(&self) -> impl Iterator<Item = (u8, ZoneRange)> + '_ {
        self.zones.iter().enumerate().map(|(i, z)| (i as u8 + 1, *z))
    }
}

/// Tanaka estimate of maximal heart rate, rounded half away from zero.
pub fn max_heart_rate(age: u32) -> i32 {
    (205.8 - 0.685 * age as f64).round() as i32
}

/// Compute max HR and the five training zones.
///
/// Inputs are expected to be validated already (age 1..=150, resting 20..=100).
/// Every boundary is rounded on its own, so zone k's upper bound is the same
/// value as zone k+1's lower bound.
pub fn compute_zones(age: u32, resting_heart_rate: u32) -> ZoneResult {
    let max = max_heart_rate(age);
    let resting = resting_heart_rate as f64;
    let reserve = (max - resting_heart_rate as i32) as f64;

    let boundary = |fraction: f64| (resting + reserve * fraction).round() as i32;

    let mut zones = [ZoneRange { low: 0, high: 0 }; 5];
    for (i, zone) in zones.iter_mut().enumerate() {
        let low = boundary(ZONE_FRACTIONS[i]);
        let high = match ZONE_FRACTIONS.get(i + 1) {
            Some(&next) => boundary(next),
            None => max,
        };
        *zone = ZoneRange { low, high };
    }

    ZoneResult {
        max_heart_rate: max,
        zones,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_example_age_35_resting_60() {
        let r = compute_zones(35, 60);
        assert_eq!(r.max_heart_rate, 182);
        assert_eq!(r.max_heart_rate - 60, 122);
        assert_eq!(
            r.zones,
            [
                ZoneRange { low: 121, high: 133 },
                ZoneRange { low: 133, high: 145 },
                ZoneRange { low: 145, high: 158 },
                ZoneRange { low: 158, high: 170 },
                ZoneRange { low: 170, high: 182 },
            ]
        );
    }

    #[test]
    fn max_heart_rate_follows_tanaka_over_full_age_range() {
        for age in 1..=150u32 {
            let expected = (205.8 - 0.685 * age as f64).round() as i32;
            assert_eq!(max_heart_rate(age), expected, "age {age}");
        }
        assert_eq!(max_heart_rate(1), 205);
        assert_eq!(max_heart_rate(150), 103);
    }

    #[test]
    fn boundaries_are_monotonic_and_shared_for_all_valid_inputs() {
        for age in 1..=150u32 {
            for resting in 20..=100u32 {
                let r = compute_zones(age, resting);
                // Max HR never drops to the resting rate inside the validated ranges.
                assert!(r.max_heart_rate - resting as i32 >= 3, "age {age} resting {resting}");

                for (idx, z) in r.iter() {
                    assert!(z.low <= z.high, "zone {idx} inverted: {z:?}");
                }
                for pair in r.zones.windows(2) {
                    assert_eq!(pair[0].high, pair[1].low);
                }
                assert_eq!(r.zones[4].high, r.max_heart_rate);
                assert!(r.zones[0].low >= resting as i32);
            }
        }
    }

    #[test]
    fn same_inputs_give_same_output() {
        assert_eq!(compute_zones(42, 55), compute_zones(42, 55));
    }

    #[test]
    fn iter_is_one_based() {
        let r = compute_zones(30, 50);
        let idx: Vec<u8> = r.iter().map(|(i, _)| i).collect();
        assert_eq!(idx, vec![1, 2, 3, 4, 5]);
    }
}
