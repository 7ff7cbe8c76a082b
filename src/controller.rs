//! The control loop: read every sensor, decide a duty per zone, drive the fans.

use crate::config::{Assignment, Configuration, MAX_ZONES};
use crate::directory::MAX_SENSORS;
use crate::ds18b20::{self, Ds18b20, CONVERSION_WAIT_MS};
use crate::zone::{ZoneConfig, ZoneMode, ZoneState};
use crate::{BusTransport, Device, Directory, DutyOutput, Temperature};
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, error, info, warn};

/// Control cycles to run before fan speeds are trusted
pub const STALL_CHECK_WARMUP: u8 = 5;

/// Why a zone got its duty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyReason {
    Interpolated,
    /// Fans off below the hysteresis band
    Lockout,
    NoSensors,
    /// A sensor of the zone failed, or too few readings are valid
    InsufficientSensors,
    StallRecovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneReport {
    pub duty: u8,
    pub reason: DutyReason,
    /// Hottest valid reading of the zone, if one drove the duty
    pub temperature: Option<Temperature>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub zones: Vec<ZoneReport, MAX_ZONES>,
    /// Sensors that returned a valid reading this cycle
    pub valid_sensors: u8,
}

pub struct Controller {
    config: Configuration,
    directory: Directory,
    zones: Vec<ZoneState, MAX_ZONES>,
    readings: [Option<Temperature>; MAX_SENSORS],
    last_valid: [Option<Temperature>; MAX_SENSORS],
    cycles: u8,
}

impl Controller {
    pub fn new(config: Configuration, directory: Directory) -> Self {
        let zones = config.zones.iter().map(|_| ZoneState::new()).collect();
        Controller {
            config,
            directory,
            zones,
            readings: [None; MAX_SENSORS],
            last_valid: [None; MAX_SENSORS],
            cycles: 0,
        }
    }

    /// Fills the directory from the manual table, or by searching the bus
    /// for DS18B20 thermometers.
    ///
    /// A failed search leaves the directory empty, so every zone runs at
    /// full duty.
    pub fn discover<B: BusTransport>(
        bus: &mut B,
        delay: &mut impl DelayNs,
        config: Configuration,
    ) -> Self {
        let directory = match config.assignment {
            Assignment::Manual => {
                let directory = Directory::from_assigned(&config.sensors);
                info!("using {} manually assigned sensors", directory.len());
                directory
            }
            Assignment::Search => {
                match Directory::search(bus, delay, &[ds18b20::FAMILY_CODE]) {
                    Ok(directory) => directory,
                    Err(e) => {
                        error!("hardware error searching for sensors: {}", e);
                        Directory::new()
                    }
                }
            }
        };
        if directory.is_empty() {
            warn!("no sensors found, fans will be set to max");
        }
        for (slot, address) in directory.iter().enumerate() {
            info!("sensor {}: {}", slot + 1, address);
        }
        Controller::new(config, directory)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn zone(&self, index: usize) -> Option<&ZoneState> {
        self.zones.get(index)
    }

    /// Reading of `slot` from the current cycle.
    pub fn reading(&self, slot: usize) -> Option<Temperature> {
        self.readings.get(slot).copied().flatten()
    }

    /// Most recent valid reading of `slot`. For display only, never used
    /// to drive the fans.
    pub fn last_valid(&self, slot: usize) -> Option<Temperature> {
        self.last_valid.get(slot).copied().flatten()
    }

    /// Power-up duty: each zone's start duty, idle channels off.
    pub fn apply_start_duty<P: DutyOutput>(&self, pwm: &mut P) -> Result<(), P::Error> {
        for zone in self.config.zones.iter() {
            for channel in zone.fan_channels() {
                pwm.set_duty(channel, zone.pct_start)?;
            }
        }
        for channel in self.config.idle_fans() {
            pwm.set_duty(channel, 0)?;
        }
        Ok(())
    }

    /// One control cycle.
    ///
    /// `rpm` holds the last measured speed per fan channel. Bus and output
    /// failures are logged and never abort the cycle; the affected zones
    /// fall back to full duty.
    pub fn run_cycle<B: BusTransport, P: DutyOutput>(
        &mut self,
        bus: &mut B,
        delay: &mut impl DelayNs,
        pwm: &mut P,
        rpm: &[u16],
    ) -> CycleReport {
        let check_stall = self.cycles >= STALL_CHECK_WARMUP;
        if !check_stall {
            self.cycles += 1;
        }

        self.readings = [None; MAX_SENSORS];
        if !self.directory.is_empty() {
            self.read_sensors(bus, delay);
        }

        let mut report = CycleReport {
            valid_sensors: self.readings.iter().filter(|r| r.is_some()).count() as u8,
            ..Default::default()
        };

        let zones = self.config.zones.iter().zip(self.zones.iter_mut());
        for (index, (config, state)) in zones.enumerate() {
            let mut zone = decide(&self.directory, &self.readings, config, state);
            if !matches!(zone.reason, DutyReason::Interpolated | DutyReason::Lockout) {
                debug!("zone {} at max: {:?}", index + 1, zone.reason);
            }

            if check_stall {
                let slowest = config
                    .fan_channels()
                    .map(|channel| rpm.get(channel).copied().unwrap_or(0))
                    .min()
                    .unwrap_or(0);
                if state.stall_check(slowest, config) {
                    warn!("zone {} fan stall at {} rpm, restarting", index + 1, slowest);
                    if state.is_failing() {
                        error!(
                            "zone {} fans stalled {} times in a row",
                            index + 1,
                            state.stall_count()
                        );
                    }
                    zone.duty = state.duty();
                    zone.reason = DutyReason::StallRecovery;
                }
            }

            for channel in config.fan_channels() {
                if let Err(e) = pwm.set_duty(channel, zone.duty) {
                    warn!("fan {} duty not applied: {:?}", channel + 1, e);
                }
            }
            let _ = report.zones.push(zone);
        }
        report
    }

    fn read_sensors<B: BusTransport>(&mut self, bus: &mut B, delay: &mut impl DelayNs) {
        let sensors: Vec<Ds18b20, MAX_SENSORS> = self
            .directory
            .iter()
            .map(|address| Ds18b20::from_address_unchecked(*address))
            .collect();

        let mut started = [false; MAX_SENSORS];
        for (slot, sensor) in sensors.iter().enumerate() {
            match sensor.start_conversion(bus, delay) {
                Ok(()) => started[slot] = true,
                Err(e) => warn!("sensor {} conversion not started: {}", sensor.address(), e),
            }
        }
        delay.delay_ms(CONVERSION_WAIT_MS);

        // a scratchpad without a fresh conversion holds last cycle's value
        for (slot, sensor) in sensors.iter().enumerate().filter(|(slot, _)| started[*slot]) {
            match sensor.read_temperature(bus, delay) {
                Ok(temperature) => {
                    debug!("sensor {}: {} C", slot + 1, temperature);
                    self.readings[slot] = Some(temperature);
                    self.last_valid[slot] = Some(temperature);
                }
                Err(e) => warn!("failed to read sensor {}: {}", slot + 1, e),
            }
        }
    }
}

/// Duty of one zone from this cycle's readings.
fn decide(
    directory: &Directory,
    readings: &[Option<Temperature>; MAX_SENSORS],
    config: &ZoneConfig,
    state: &mut ZoneState,
) -> ZoneReport {
    let held = |state: &mut ZoneState, reason| ZoneReport {
        duty: state.hold_max(config),
        reason,
        temperature: None,
    };

    if state.is_stalled() {
        return held(state, DutyReason::StallRecovery);
    }
    if directory.is_empty() {
        return held(state, DutyReason::NoSensors);
    }

    // a zone none of whose sensors exist reads every sensor present
    let watched = |slot: &usize| config.watches(*slot);
    let watches_any = (0..directory.len()).any(|slot| watched(&slot));
    let slots = (0..directory.len()).filter(|slot| !watches_any || watched(slot));

    let mut expected = 0u8;
    let mut hottest: Option<Temperature> = None;
    let mut valid = 0u8;
    for slot in slots {
        expected += 1;
        if let Some(temperature) = readings[slot] {
            valid += 1;
            hottest = hottest.max(Some(temperature));
        }
    }

    match hottest {
        Some(temperature) if valid == expected && valid >= config.min_sensors => {
            let duty = state.compute_duty(temperature, config);
            let reason = if duty == 0 && state.mode() == ZoneMode::HystLockout {
                DutyReason::Lockout
            } else {
                DutyReason::Interpolated
            };
            ZoneReport {
                duty,
                reason,
                temperature: Some(temperature),
            }
        }
        _ => {
            warn!(
                "{} of {} sensors valid (minimum {}), setting max",
                valid, expected, config.min_sensors
            );
            held(state, DutyReason::InsufficientSensors)
        }
    }
}
