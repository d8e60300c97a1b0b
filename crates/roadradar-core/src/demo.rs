//! Demo Mode - Simulated radar for testing
//!
//! Generates random target reports inside the configured detection envelope,
//! so front-ends can be exercised without a sensor attached.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::thread;
use tracing::debug;

use crate::protocol::{DataFrequency, FirmwareVersion, RadarError, ZeroReport};
use crate::radar::{Parameters, RadarDevice, TargetRecord, TargetSet, DEFAULT_TARGET_CAPACITY};

/// Random target generator
pub struct TargetGenerator {
    rng: StdRng,
}

impl Default for TargetGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetGenerator {
    /// Generator seeded from the OS entropy source
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self, min: f32, max: f32) -> f32 {
        if max > min {
            self.rng.gen_range(min..=max)
        } else {
            min
        }
    }

    /// One record with every measurement inside `params`
    pub fn record(&mut self, id: u8, params: &Parameters) -> TargetRecord {
        TargetRecord {
            id,
            distance: self.sample(params.min_distance, params.max_distance),
            speed: self.sample(params.min_speed, params.max_speed),
            angle: self.sample(params.min_angle, params.max_angle),
            snr: self.sample(0.0, 100.0),
        }
    }

    /// Between zero and `capacity` records, ids counting up from 1
    pub fn frame(&mut self, capacity: usize, params: &Parameters) -> TargetSet {
        let limit = capacity.min(DEFAULT_TARGET_CAPACITY);
        let count = self.rng.gen_range(0..=limit);
        (1..=count as u8).map(|id| self.record(id, params)).collect()
    }
}

/// In-process radar with no wire
pub struct DemoRadar {
    generator: TargetGenerator,
    parameters: Parameters,
    target_number: u8,
    frequency: DataFrequency,
    zero_report: ZeroReport,
    transmitting: bool,
}

impl Default for DemoRadar {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoRadar {
    /// Firmware version reported by the demo radar
    pub const VERSION: FirmwareVersion = FirmwareVersion {
        major: 255,
        minor: 255,
        patch: 255,
    };

    /// Demo radar with random targets and factory defaults
    pub fn new() -> Self {
        Self::with_generator(TargetGenerator::new())
    }

    /// Demo radar drawing targets from `generator`
    pub fn with_generator(generator: TargetGenerator) -> Self {
        Self {
            generator,
            parameters: Parameters::default(),
            target_number: DEFAULT_TARGET_CAPACITY as u8,
            frequency: DataFrequency::default(),
            zero_report: ZeroReport::Report,
            transmitting: false,
        }
    }

    /// Envelope set by the last `set_parameters`
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Last configured target number
    pub fn target_number(&self) -> u8 {
        self.target_number
    }

    /// Report rate, also the pace of `get_target_data`
    pub fn frequency(&self) -> DataFrequency {
        self.frequency
    }

    /// Whether empty reports are delivered
    pub fn zero_report(&self) -> ZeroReport {
        self.zero_report
    }

    /// Whether data transmit is enabled
    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }
}

impl RadarDevice for DemoRadar {
    fn get_firmware_version(&mut self) -> Result<FirmwareVersion, RadarError> {
        Ok(Self::VERSION)
    }

    fn set_parameters(&mut self, params: &Parameters) -> Result<(), RadarError> {
        self.parameters = *params;
        Ok(())
    }

    fn get_parameters(&mut self) -> Result<Parameters, RadarError> {
        Ok(self.parameters)
    }

    fn set_target_number(&mut self, number: u8) -> Result<(), RadarError> {
        self.target_number = number;
        Ok(())
    }

    fn get_target_data(&mut self, capacity: usize) -> Result<TargetSet, RadarError> {
        thread::sleep(self.frequency.report_interval());

        let capacity = capacity.min(self.target_number as usize);
        let mut targets = self.generator.frame(capacity, &self.parameters);
        // Without zero reports the radar stays quiet until something shows up
        if self.zero_report == ZeroReport::NotReport && capacity > 0 {
            while targets.is_empty() {
                targets = self.generator.frame(capacity, &self.parameters);
            }
        }

        debug!("demo: generated {} targets", targets.len());
        Ok(targets)
    }

    fn enable_data_transmit(&mut self) -> Result<(), RadarError> {
        self.transmitting = true;
        Ok(())
    }

    fn disable_data_transmit(&mut self) -> Result<(), RadarError> {
        self.transmitting = false;
        Ok(())
    }

    fn set_data_transmit_frequency(&mut self, frequency: DataFrequency) -> Result<(), RadarError> {
        self.frequency = frequency;
        Ok(())
    }

    fn set_zero_data_reporting(&mut self, enabled: bool) -> Result<(), RadarError> {
        self.zero_report = ZeroReport::from(enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_stay_in_envelope() {
        let params = Parameters::default();
        let mut gen = TargetGenerator::seeded(7);
        for _ in 0..200 {
            let r = gen.record(1, &params);
            assert!(params.contains(r.distance, r.speed, r.angle), "{:?}", r);
            assert!((0.0..=100.0).contains(&r.snr));
        }
    }

    #[test]
    fn test_frame_ids_and_capacity() {
        let params = Parameters::default();
        let mut gen = TargetGenerator::seeded(42);
        for _ in 0..50 {
            let frame = gen.frame(4, &params);
            assert!(frame.len() <= 4);
            for (i, t) in frame.iter().enumerate() {
                assert_eq!(t.id as usize, i + 1);
            }
        }
    }

    #[test]
    fn test_degenerate_range() {
        let params = Parameters {
            min_distance: 5.0,
            max_distance: 5.0,
            ..Default::default()
        };
        let r = TargetGenerator::seeded(1).record(9, &params);
        assert_eq!(r.distance, 5.0);
    }

    #[test]
    fn test_seeded_generators_agree() {
        let params = Parameters::default();
        let a = TargetGenerator::seeded(3).frame(35, &params);
        let b = TargetGenerator::seeded(3).frame(35, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_demo_radar_settings() {
        let mut radar = DemoRadar::with_generator(TargetGenerator::seeded(5));
        assert_eq!(radar.get_firmware_version().unwrap().to_string(), "V255.255.255");

        let params = Parameters {
            max_distance: 8.0,
            ..Default::default()
        };
        radar.set_parameters(&params).unwrap();
        assert_eq!(radar.get_parameters().unwrap(), params);

        radar.set_data_transmit_frequency(DataFrequency::HZ_20).unwrap();
        radar.set_zero_data_reporting(false).unwrap();
        radar.set_target_number(3).unwrap();
        radar.enable_data_transmit().unwrap();

        assert_eq!(radar.frequency(), DataFrequency::HZ_20);
        assert_eq!(radar.zero_report(), ZeroReport::NotReport);
        assert!(radar.is_transmitting());

        let targets = radar.get_target_data(35).unwrap();
        assert!(!targets.is_empty());
        assert!(targets.len() <= 3);
        assert!(targets.iter().all(|t| t.distance <= 8.0));
    }
}
