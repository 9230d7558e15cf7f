//! Simulated probe.
//!
//! Each channel does a bounded random walk inside a fixed band around its
//! baseline, so charts look plausible without hardware attached.

use super::{SensorError, SensorReading, SensorSource};
use rand_core::{OsRng, RngCore};

/// Band of one simulated channel.
#[derive(Debug, Clone, Copy)]
struct Band {
    low: f32,
    high: f32,
}

impl Band {
    const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    fn mid(&self) -> f32 {
        (self.low + self.high) / 2.0
    }

    fn width(&self) -> f32 {
        self.high - self.low
    }

    /// Move `value` by at most a tenth of the band, staying inside it.
    fn step(&self, value: f32, unit: f32) -> f32 {
        let delta = (unit * 2.0 - 1.0) * self.width() * 0.1;
        (value + delta).clamp(self.low, self.high)
    }
}

const TEMPERATURE: Band = Band::new(19.0, 20.0);
const CONDUCTIVITY: Band = Band::new(30.5, 31.0);
const PRESSURE: Band = Band::new(-0.000_02, 0.0);

/// Random-walk source. Never yields the all-zero reading.
#[derive(Debug)]
pub struct SimulatedSource {
    current: SensorReading,
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            current: SensorReading::new(TEMPERATURE.mid(), CONDUCTIVITY.mid(), PRESSURE.mid()),
        }
    }
}

impl SensorSource for SimulatedSource {
    fn poll(&mut self) -> Result<SensorReading, SensorError> {
        let c = self.current;
        self.current = SensorReading::new(
            TEMPERATURE.step(c.temperature, unit_random()),
            CONDUCTIVITY.step(c.conductivity, unit_random()),
            PRESSURE.step(c.pressure, unit_random()),
        );
        Ok(self.current)
    }
}

/// Uniform value in `[0, 1)`.
fn unit_random() -> f32 {
    (OsRng.next_u32() >> 8) as f32 / (1u32 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_stay_in_bands() {
        let mut source = SimulatedSource::new();
        for _ in 0..1_000 {
            let r = source.poll().unwrap();
            assert!((19.0..=20.0).contains(&r.temperature), "{:?}", r);
            assert!((30.5..=31.0).contains(&r.conductivity), "{:?}", r);
            assert!((-0.000_02..=0.0).contains(&r.pressure), "{:?}", r);
            assert!(!r.is_sentinel());
        }
    }

    #[test]
    fn test_walk_moves_in_small_steps() {
        let mut source = SimulatedSource::new();
        let mut prev = source.poll().unwrap();
        for _ in 0..100 {
            let next = source.poll().unwrap();
            assert!((next.temperature - prev.temperature).abs() <= 0.1 + f32::EPSILON * 32.0);
            prev = next;
        }
    }

    #[test]
    fn test_unit_random_range() {
        for _ in 0..1_000 {
            let u = unit_random();
            assert!((0.0..1.0).contains(&u));
        }
    }
}
