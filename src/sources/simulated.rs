//! # Simulated Sources
//!
//! Random-walk producers used when no hardware is attached (demo mode).
//!
//! Each channel starts at a random value inside its range, then on roughly
//! one call in ten drifts by at most `step`, clamped to the range. Values are
//! rounded to two decimals like the real sensors.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Source;
use crate::record::{now_timestamp, ElectricalReading, GnssFix, MotorTelemetry, SystemReading};

/// Probability that a channel changes on a given sample
const CHANGE_PROBABILITY: f64 = 0.1;

/// One simulated channel
#[derive(Debug, Clone)]
pub struct RandomWalk {
    from: f64,
    to: f64,
    step: f64,
    value: Option<f64>,
}

impl RandomWalk {
    pub fn new(from: f64, to: f64, step: f64) -> Self {
        Self {
            from,
            to,
            step,
            value: None,
        }
    }

    /// Advance the walk and return the new value
    pub fn next<R: Rng>(&mut self, rng: &mut R) -> f64 {
        let value = match self.value {
            None => rng.gen_range(self.from..=self.to),
            Some(previous) if rng.gen_bool(CHANGE_PROBABILITY) => {
                (previous + rng.gen_range(-self.step..=self.step)).clamp(self.from, self.to)
            }
            Some(previous) => previous,
        };
        let value = (value * 100.0).round() / 100.0;
        self.value = Some(value);
        value
    }
}

/// Simulated Cycle Analyst
#[derive(Debug)]
pub struct SimulatedMotor {
    rng: StdRng,
    amper_hours: RandomWalk,
    voltage: RandomWalk,
    current: RandomWalk,
    speed: RandomWalk,
    trip_distance: RandomWalk,
    motor_temp: RandomWalk,
    pedal_rpm: RandomWalk,
    human_watts: RandomWalk,
    human_torque: RandomWalk,
    throttle_input: RandomWalk,
    throttle_output: RandomWalk,
}

impl SimulatedMotor {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            amper_hours: RandomWalk::new(0.0, 10.0, 0.01),
            voltage: RandomWalk::new(35.0, 55.0, 0.1),
            current: RandomWalk::new(0.0, 25.0, 1.0),
            speed: RandomWalk::new(0.0, 50.0, 1.0),
            trip_distance: RandomWalk::new(0.0, 100.0, 0.1),
            motor_temp: RandomWalk::new(20.0, 80.0, 0.1),
            pedal_rpm: RandomWalk::new(0.0, 200.0, 10.0),
            human_watts: RandomWalk::new(0.0, 500.0, 1.0),
            human_torque: RandomWalk::new(0.0, 50.0, 0.1),
            throttle_input: RandomWalk::new(0.0, 100.0, 0.1),
            throttle_output: RandomWalk::new(0.0, 100.0, 0.1),
        }
    }

    pub fn sample(&mut self) -> MotorTelemetry {
        let rng = &mut self.rng;
        MotorTelemetry {
            timestamp: now_timestamp(),
            amper_hours: self.amper_hours.next(rng),
            voltage: self.voltage.next(rng),
            current: self.current.next(rng),
            speed: self.speed.next(rng),
            trip_distance: self.trip_distance.next(rng),
            motor_temp: self.motor_temp.next(rng),
            pedal_rpm: self.pedal_rpm.next(rng),
            human_watts: self.human_watts.next(rng),
            human_torque: self.human_torque.next(rng),
            throttle_input: self.throttle_input.next(rng),
            throttle_output: self.throttle_output.next(rng),
            aux_a: 0.0,
            aux_d: 0.0,
            mode: 1,
            flags: String::new(),
            is_brake_pressed: false,
        }
    }
}

impl Default for SimulatedMotor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SimulatedMotor {
    type Record = MotorTelemetry;

    fn name(&self) -> &str {
        "simulated_cycle_analyst"
    }

    async fn read(&mut self) -> anyhow::Result<Option<MotorTelemetry>> {
        Ok(Some(self.sample()))
    }
}

/// Simulated GNSS receiver
#[derive(Debug)]
pub struct SimulatedGnss {
    rng: StdRng,
    latitude: RandomWalk,
    longitude: RandomWalk,
    speed: RandomWalk,
    altitude: RandomWalk,
    sat_num: RandomWalk,
}

impl SimulatedGnss {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            latitude: RandomWalk::new(99.0, 100.0, 0.001),
            longitude: RandomWalk::new(99.0, 100.0, 0.001),
            speed: RandomWalk::new(10.0, 40.0, 0.5),
            altitude: RandomWalk::new(800.0, 1000.0, 1.0),
            sat_num: RandomWalk::new(0.0, 20.0, 1.0),
        }
    }

    pub fn sample(&mut self) -> GnssFix {
        let rng = &mut self.rng;
        GnssFix {
            timestamp: now_timestamp(),
            latitude: self.latitude.next(rng),
            longitude: self.longitude.next(rng),
            altitude: Some(self.altitude.next(rng)),
            speed: Some(self.speed.next(rng)),
            hdop: None,
            sat_num: Some(self.sat_num.next(rng) as u32),
        }
    }
}

impl Default for SimulatedGnss {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SimulatedGnss {
    type Record = GnssFix;

    fn name(&self) -> &str {
        "simulated_gnss"
    }

    async fn read(&mut self) -> anyhow::Result<Option<GnssFix>> {
        Ok(Some(self.sample()))
    }
}

/// Simulated battery current/voltage sensor
#[derive(Debug)]
pub struct SimulatedElectric {
    rng: StdRng,
    current: RandomWalk,
    voltage: RandomWalk,
    temp: RandomWalk,
}

impl SimulatedElectric {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            current: RandomWalk::new(0.0, 5.0, 0.05),
            voltage: RandomWalk::new(38.0, 55.0, 0.5),
            temp: RandomWalk::new(20.0, 50.0, 1.0),
        }
    }

    pub fn sample(&mut self) -> ElectricalReading {
        let rng = &mut self.rng;
        let current = self.current.next(rng);
        let voltage = self.voltage.next(rng);
        let temp = self.temp.next(rng);
        ElectricalReading::new(current, voltage, Some(temp))
    }
}

impl Default for SimulatedElectric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SimulatedElectric {
    type Record = ElectricalReading;

    fn name(&self) -> &str {
        "simulated_electric"
    }

    async fn read(&mut self) -> anyhow::Result<Option<ElectricalReading>> {
        Ok(Some(self.sample()))
    }
}

/// Simulated host metrics
#[derive(Debug)]
pub struct SimulatedSystem {
    rng: StdRng,
    cpu_temp: RandomWalk,
    memory_usage: RandomWalk,
    cpu_usage: RandomWalk,
}

impl SimulatedSystem {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            cpu_temp: RandomWalk::new(30.0, 80.0, 1.0),
            memory_usage: RandomWalk::new(10.0, 90.0, 1.0),
            cpu_usage: RandomWalk::new(0.0, 100.0, 5.0),
        }
    }

    pub fn sample(&mut self) -> SystemReading {
        let rng = &mut self.rng;
        let cpu_temp = self.cpu_temp.next(rng);
        let memory_usage = self.memory_usage.next(rng);
        let cpu_usage = self.cpu_usage.next(rng);
        SystemReading::new(Some(cpu_temp), memory_usage, cpu_usage)
    }
}

impl Default for SimulatedSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SimulatedSystem {
    type Record = SystemReading;

    fn name(&self) -> &str {
        "simulated_system"
    }

    async fn read(&mut self) -> anyhow::Result<Option<SystemReading>> {
        Ok(Some(self.sample()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_random_walk_stays_in_range() {
        let mut rng = seeded();
        let mut walk = RandomWalk::new(35.0, 55.0, 5.0);

        for _ in 0..1000 {
            let value = walk.next(&mut rng);
            assert!((35.0..=55.0).contains(&value), "{} out of range", value);
            assert_eq!((value * 100.0).round() / 100.0, value, "Rounded to 2 decimals");
        }
    }

    #[test]
    fn test_random_walk_changes_by_at_most_step() {
        let mut rng = seeded();
        let mut walk = RandomWalk::new(0.0, 100.0, 1.0);
        let mut previous = walk.next(&mut rng);

        for _ in 0..1000 {
            let value = walk.next(&mut rng);
            assert!((value - previous).abs() <= 1.0 + 0.01);
            previous = value;
        }
    }

    #[tokio::test]
    async fn test_simulated_sources_always_produce() {
        let mut motor = SimulatedMotor::with_rng(seeded());
        let mut gnss = SimulatedGnss::with_rng(seeded());
        let mut electric = SimulatedElectric::with_rng(seeded());
        let mut system = SimulatedSystem::with_rng(seeded());

        let record = motor.read().await.unwrap().unwrap();
        assert!((35.0..=55.0).contains(&record.voltage));
        assert_eq!(record.mode, 1);

        let fix = gnss.read().await.unwrap().unwrap();
        assert!(fix.sat_num.unwrap() <= 20);

        let reading = electric.read().await.unwrap().unwrap();
        assert!((38.0..=55.0).contains(&reading.voltage));

        let metrics = system.read().await.unwrap().unwrap();
        assert!((0.0..=100.0).contains(&metrics.cpu_usage));
    }
}
