//! Thermal zones: a set of fans driven by the hottest of a set of sensors.

use crate::Temperature;

/// PWM channels available to zones
pub const MAX_FANS: usize = 2;
/// Control cycles a stalled zone is held at full duty before it is checked again
pub const STALL_COOLDOWN_CYCLES: u8 = 4;
/// Consecutive stalls after which the zone is reported as failing
pub const STALL_ALARM_THRESHOLD: u8 = 3;
/// Largest accepted hysteresis band, 180.0 °C
pub const MAX_HYSTERESIS: u16 = 1800;

/// Thresholds of one zone. Temperatures are in decicelsius, duties in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneConfig {
    /// PWM channels driven by this zone, one bit per channel
    pub fans: u8,
    /// Directory slots read by this zone, one bit per slot
    pub sensors: u8,
    pub pct_max: u8,
    pub pct_min: u8,
    /// Duty applied at power-up, before the first reading
    pub pct_start: u8,
    /// Slowest acceptable fan; 0 disables stall detection
    pub min_rpm: u16,
    /// Switch the fans off below `temp_min - hysteresis` instead of
    /// running them at `pct_min`
    pub min_off: bool,
    /// Fewer valid readings than this force full duty
    pub min_sensors: u8,
    pub temp_min: i16,
    pub temp_max: i16,
    pub hysteresis: u16,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        ZoneConfig {
            fans: 0b01,
            sensors: ZoneConfig::ALL_SENSORS,
            pct_max: 100,
            pct_min: 20,
            pct_start: 20,
            min_rpm: 0,
            min_off: false,
            min_sensors: 0,
            temp_min: 180,
            temp_max: 300,
            hysteresis: 0,
        }
    }
}

impl ZoneConfig {
    pub const ALL_SENSORS: u8 = 0xFF;

    pub fn is_valid(&self) -> bool {
        let in_range = |t: i16| Temperature::from_decicelsius(t).is_some();
        self.fans != 0
            && u32::from(self.fans) < (1 << MAX_FANS)
            && self.pct_max <= 100
            && self.pct_min <= self.pct_max
            && self.pct_start <= 100
            && in_range(self.temp_min)
            && in_range(self.temp_max)
            && self.temp_min < self.temp_max
            && self.hysteresis <= MAX_HYSTERESIS
    }

    pub fn fan_channels(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_FANS).filter(move |channel| self.fans & (1 << channel) != 0)
    }

    pub fn drives(&self, channel: usize) -> bool {
        channel < MAX_FANS && self.fans & (1 << channel) != 0
    }

    pub fn watches(&self, slot: usize) -> bool {
        slot < 8 && self.sensors & (1 << slot) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneMode {
    Normal,
    /// Fans off until the temperature climbs back to `temp_min`
    HystLockout,
    /// Full duty while a stalled fan restarts
    Stalled { remaining: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneState {
    mode: ZoneMode,
    duty: u8,
    stall_count: u8,
}

impl Default for ZoneState {
    fn default() -> Self {
        // fans must not start while a boot reading sits inside the band
        ZoneState {
            mode: ZoneMode::HystLockout,
            duty: 0,
            stall_count: 0,
        }
    }
}

impl ZoneState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ZoneMode {
        self.mode
    }

    /// Duty decided in the last cycle.
    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn stall_count(&self) -> u8 {
        self.stall_count
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self.mode, ZoneMode::Stalled { .. })
    }

    /// Maps a reading onto the duty range.
    ///
    /// Linear between (`temp_min`, `pct_min`) and (`temp_max`, `pct_max`),
    /// flat outside. With `min_off` the fans stop below
    /// `temp_min - hysteresis` and stay off until `temp_min` is reached again.
    pub fn compute_duty(&mut self, temperature: Temperature, config: &ZoneConfig) -> u8 {
        let measured = i32::from(temperature.decicelsius());
        let temp_min = i32::from(config.temp_min);
        let temp_max = i32::from(config.temp_max);

        if config.min_off {
            if measured < temp_min - i32::from(config.hysteresis) {
                self.mode = ZoneMode::HystLockout;
                self.duty = 0;
                return 0;
            }
            if self.mode == ZoneMode::HystLockout {
                if measured < temp_min {
                    self.duty = 0;
                    return 0;
                }
                self.mode = ZoneMode::Normal;
            }
        } else if self.mode == ZoneMode::HystLockout {
            self.mode = ZoneMode::Normal;
        }

        let pct_max = i32::from(config.pct_max);
        let pct_min = i32::from(config.pct_min);
        let range = temp_max - temp_min;
        let duty = if range <= 0 {
            pct_max
        } else {
            let measured = measured.max(temp_min).min(temp_max);
            pct_min + (pct_max - pct_min) * (measured - temp_min) / range
        };

        self.duty = duty.min(pct_max).max(0) as u8;
        self.duty
    }

    /// Full duty without a reading. Spends one cooldown cycle if stalled.
    pub fn hold_max(&mut self, config: &ZoneConfig) -> u8 {
        if let ZoneMode::Stalled { remaining } = self.mode {
            self.mode = match remaining.saturating_sub(1) {
                0 => ZoneMode::Normal,
                remaining => ZoneMode::Stalled { remaining },
            };
        }
        self.duty = config.pct_max;
        self.duty
    }

    /// Compares the slowest fan of the zone against `min_rpm`.
    ///
    /// On a stall the zone goes to full duty for [`STALL_COOLDOWN_CYCLES`]
    /// and `true` is returned. Skipped with `min_off`, where stopped fans
    /// are expected, and while a previous stall is still cooling down.
    pub fn stall_check(&mut self, rpm: u16, config: &ZoneConfig) -> bool {
        if config.min_off || self.is_stalled() {
            return false;
        }
        if rpm >= config.min_rpm {
            self.stall_count = 0;
            return false;
        }
        self.mode = ZoneMode::Stalled {
            remaining: STALL_COOLDOWN_CYCLES,
        };
        self.stall_count = self.stall_count.saturating_add(1);
        self.duty = config.pct_max;
        true
    }

    /// Stalls keep coming back after restarts.
    pub fn is_failing(&self) -> bool {
        self.stall_count >= STALL_ALARM_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::{ZoneConfig, ZoneMode, ZoneState, STALL_COOLDOWN_CYCLES};
    use crate::Temperature;
    use rstest::rstest;

    fn t(decicelsius: i16) -> Temperature {
        Temperature::from_decicelsius(decicelsius).unwrap()
    }

    fn min_off(hysteresis: u16) -> ZoneConfig {
        ZoneConfig {
            min_off: true,
            hysteresis,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(-550, 20)]
    #[case(179, 20)]
    #[case(180, 20)]
    #[case(240, 60)]
    #[case(270, 80)]
    #[case(299, 99)]
    #[case(300, 100)]
    #[case(1250, 100)]
    fn interpolates_between_thresholds(#[case] measured: i16, #[case] expected: u8) {
        let config = ZoneConfig::default();
        let mut state = ZoneState::new();
        assert_eq!(state.compute_duty(t(measured), &config), expected);
        assert_eq!(state.mode(), ZoneMode::Normal);
    }

    #[test]
    fn never_exceeds_max_duty() {
        let config = ZoneConfig {
            pct_max: 70,
            pct_min: 30,
            temp_min: -550,
            temp_max: 1250,
            ..Default::default()
        };
        let mut state = ZoneState::new();
        for measured in (-550..=1250).step_by(7) {
            let duty = state.compute_duty(t(measured), &config);
            assert!((30..=70).contains(&duty), "{measured} -> {duty}");
        }
        assert_eq!(state.compute_duty(t(1250), &config), 70);
    }

    #[test]
    fn full_scale_does_not_overflow() {
        let config = ZoneConfig {
            pct_max: 100,
            pct_min: 0,
            temp_min: -550,
            temp_max: 1250,
            ..Default::default()
        };
        let mut state = ZoneState::new();
        assert_eq!(state.compute_duty(t(1250), &config), 100);
        assert_eq!(state.compute_duty(t(350), &config), 50);
        assert_eq!(state.compute_duty(t(-550), &config), 0);
    }

    #[test]
    fn starts_locked_out_inside_hysteresis_band() {
        let config = min_off(20);
        let mut state = ZoneState::new();
        // inside the band at boot: stays off
        assert_eq!(state.compute_duty(t(170), &config), 0);
        assert_eq!(state.mode(), ZoneMode::HystLockout);
        assert_eq!(state.compute_duty(t(180), &config), 20);
        assert_eq!(state.mode(), ZoneMode::Normal);
    }

    #[test]
    fn hysteresis_band_prevents_oscillation() {
        let config = min_off(20);
        let mut state = ZoneState::new();
        assert_eq!(state.compute_duty(t(240), &config), 60);
        // falling through the band keeps the fan at minimum
        assert_eq!(state.compute_duty(t(170), &config), 20);
        assert_eq!(state.compute_duty(t(160), &config), 20);
        // below the band: off
        assert_eq!(state.compute_duty(t(159), &config), 0);
        assert_eq!(state.mode(), ZoneMode::HystLockout);
        // rising through the band keeps it off
        assert_eq!(state.compute_duty(t(165), &config), 0);
        assert_eq!(state.compute_duty(t(179), &config), 0);
        assert_eq!(state.compute_duty(t(180), &config), 20);
    }

    // temp_min 18.0 °C, band 2.0 °C
    #[rstest]
    #[case(&[200, 150, 190, 175], &[33, 0, 26, 20])]
    #[case(&[200, 150, 179, 175], &[33, 0, 0, 0])]
    #[case(&[200, 150, 179, 180], &[33, 0, 0, 20])]
    fn min_off_sequences(#[case] readings: &[i16], #[case] expected: &[u8]) {
        let config = min_off(20);
        let mut state = ZoneState::new();
        let duties: std::vec::Vec<u8> = readings
            .iter()
            .map(|measured| state.compute_duty(t(*measured), &config))
            .collect();
        assert_eq!(duties, expected);
    }

    #[test]
    fn zero_hysteresis_switches_at_threshold() {
        let config = min_off(0);
        let mut state = ZoneState::new();
        assert_eq!(state.compute_duty(t(180), &config), 20);
        assert_eq!(state.compute_duty(t(179), &config), 0);
        assert_eq!(state.compute_duty(t(180), &config), 20);
    }

    #[test]
    fn stall_holds_max_for_cooldown() {
        let config = ZoneConfig {
            min_rpm: 600,
            pct_max: 90,
            ..Default::default()
        };
        let mut state = ZoneState::new();
        assert!(!state.stall_check(1200, &config));
        assert!(state.stall_check(300, &config));
        assert_eq!(state.duty(), 90);
        assert_eq!(
            state.mode(),
            ZoneMode::Stalled {
                remaining: STALL_COOLDOWN_CYCLES
            }
        );

        for _ in 0..STALL_COOLDOWN_CYCLES {
            // no re-check while the fan spins up
            assert!(!state.stall_check(0, &config));
            assert_eq!(state.hold_max(&config), 90);
        }
        assert_eq!(state.mode(), ZoneMode::Normal);
        assert_eq!(state.stall_count(), 1);
    }

    #[test]
    fn repeated_stalls_are_counted_until_recovery() {
        let config = ZoneConfig {
            min_rpm: 600,
            ..Default::default()
        };
        let mut state = ZoneState::new();
        for expected in 1..=3 {
            assert!(state.stall_check(0, &config));
            for _ in 0..STALL_COOLDOWN_CYCLES {
                state.hold_max(&config);
            }
            assert_eq!(state.stall_count(), expected);
        }
        assert!(state.is_failing());
        assert!(!state.stall_check(900, &config));
        assert_eq!(state.stall_count(), 0);
        assert!(!state.is_failing());
    }

    #[test]
    fn stopped_fans_are_expected_with_min_off() {
        let config = ZoneConfig {
            min_rpm: 600,
            ..min_off(0)
        };
        let mut state = ZoneState::new();
        assert!(!state.stall_check(0, &config));
        assert_eq!(state.mode(), ZoneMode::HystLockout);
    }

    #[test]
    fn hold_max_keeps_normal_mode() {
        let config = ZoneConfig::default();
        let mut state = ZoneState::new();
        state.compute_duty(t(200), &config);
        assert_eq!(state.hold_max(&config), 100);
        assert_eq!(state.mode(), ZoneMode::Normal);
    }

    #[rstest]
    #[case(ZoneConfig { fans: 0, ..Default::default() })]
    #[case(ZoneConfig { fans: 0b100, ..Default::default() })]
    #[case(ZoneConfig { pct_max: 101, ..Default::default() })]
    #[case(ZoneConfig { pct_min: 60, pct_max: 50, ..Default::default() })]
    #[case(ZoneConfig { temp_min: 300, temp_max: 300, ..Default::default() })]
    #[case(ZoneConfig { temp_max: 1260, ..Default::default() })]
    #[case(ZoneConfig { hysteresis: 1801, ..Default::default() })]
    fn rejects_inconsistent_thresholds(#[case] config: ZoneConfig) {
        assert!(!config.is_valid());
    }

    #[test]
    fn default_zone_is_valid() {
        let config = ZoneConfig::default();
        assert!(config.is_valid());
        assert_eq!(config.fan_channels().collect::<std::vec::Vec<_>>(), [0]);
        assert!(config.watches(0) && config.watches(3));
        assert!(config.drives(0) && !config.drives(1));
    }
}
