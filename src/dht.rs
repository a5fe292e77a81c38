use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use rppal::gpio::{Bias, Gpio, IoPin, Level, Mode};

use crate::sensor::Thermohygrometer;

/// BCM number of the GPIO wired to the sensor's data line.
pub const DATA_PIN: u8 = 4;
pub const MODEL: Model = Model::Dht22;

/// The sensor refuses to be sampled more often than this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(2000);
pub const PULSE_TIMEOUT: Duration = Duration::from_millis(1);
/// Wait after releasing the line; lands inside the sensor's response-low pulse.
pub const RESPONSE_SETTLE: Duration = Duration::from_micros(55);

// Sensor answers 20-40 us after release and holds the line low for 80 us.
const RESPONSE_DELAY: (Duration, Duration) =
    (Duration::from_micros(20), Duration::from_micros(40));
const RESPONSE_LOW: Duration = Duration::from_micros(80);

pub const FRAME_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Dht11,
    Dht22,
}

impl Model {
    /// How long the host holds the line low to wake the sensor.
    pub fn start_signal(self) -> Duration {
        match self {
            Model::Dht11 => Duration::from_millis(20),
            Model::Dht22 => Duration::from_micros(1100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DhtError {
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("Invalid checksum: expected {expected}, got {actual}")]
    Checksum { expected: u8, actual: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhtMeasurement {
    pub temperature: f32,
    pub humidity: f32,
}

pub fn checksum(frame: &[u8; FRAME_LEN]) -> u8 {
    frame[..4].iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

pub fn decode(model: Model, frame: &[u8; FRAME_LEN]) -> Result<DhtMeasurement, DhtError> {
    let expected = checksum(frame);
    if frame[4] != expected {
        return Err(DhtError::Checksum {
            expected,
            actual: frame[4],
        });
    }

    let (temperature, humidity) = match model {
        Model::Dht11 => {
            let humidity = frame[0] as f32 + frame[1] as f32 * 0.1;
            // Sign bit in the decimal byte: the integer part becomes -1 - int, the
            // decimal still adds, as the common DHT library decodes it.
            let mut temperature = frame[2] as f32;
            if frame[3] & 0x80 != 0 {
                temperature = -1.0 - temperature;
            }
            temperature += (frame[3] & 0x0f) as f32 * 0.1;
            (temperature, humidity)
        }
        Model::Dht22 => {
            let humidity = u16::from_be_bytes([frame[0], frame[1]]) as f32 * 0.1;
            let mut temperature = u16::from_be_bytes([frame[2] & 0x7f, frame[3]]) as f32 * 0.1;
            if frame[2] & 0x80 != 0 {
                temperature = -temperature;
            }
            (temperature, humidity)
        }
    };

    Ok(DhtMeasurement {
        temperature,
        humidity,
    })
}

/// Holds the last transaction result so back-to-back reads share one frame.
#[derive(Debug, Default)]
struct TransactionCache {
    last: Option<(Instant, Result<DhtMeasurement, DhtError>)>,
}

impl TransactionCache {
    fn get(&self, now: Instant) -> Option<Result<DhtMeasurement, DhtError>> {
        match self.last {
            Some((at, result)) if now.saturating_duration_since(at) < MIN_INTERVAL => Some(result),
            _ => None,
        }
    }

    fn store(&mut self, at: Instant, result: Result<DhtMeasurement, DhtError>) {
        self.last = Some((at, result));
    }
}

#[derive(Debug)]
pub struct Dht {
    pin: IoPin,
    model: Model,
    cache: TransactionCache,
}

impl Dht {
    pub fn new(pin: u8, model: Model) -> Result<Dht, anyhow::Error> {
        let gpio = Gpio::new().context("Failed to initialize GPIO")?;
        let mut pin = gpio
            .get(pin)
            .with_context(|| format!("Failed to acquire GPIO {pin}"))?
            .into_io(Mode::Input);
        pin.set_bias(Bias::PullUp);

        Ok(Dht {
            pin,
            model,
            cache: TransactionCache::default(),
        })
    }

    pub fn read(&mut self) -> Result<DhtMeasurement, DhtError> {
        if let Some(result) = self.cache.get(Instant::now()) {
            return result;
        }

        let result = self
            .transact()
            .and_then(|frame| decode(self.model, &frame));
        if let Err(e) = &result {
            log::debug!("{:?} transaction failed: {e}", self.model);
        }

        self.cache.store(Instant::now(), result);
        result
    }

    fn transact(&mut self) -> Result<[u8; FRAME_LEN], DhtError> {
        self.pin.set_mode(Mode::Output);
        self.pin.set_low();
        thread::sleep(self.model.start_signal());

        self.pin.set_mode(Mode::Input);
        spin(RESPONSE_SETTLE);

        self.pulse(Level::Low, "response low")?;
        self.pulse(Level::High, "response high")?;

        let mut frame = [0u8; FRAME_LEN];
        for bit in 0..FRAME_LEN * 8 {
            let low = self.pulse(Level::Low, "bit start")?;
            let high = self.pulse(Level::High, "bit value")?;
            if high > low {
                frame[bit / 8] |= 0x80 >> (bit % 8);
            }
        }

        Ok(frame)
    }

    /// Busy-waits while the line stays at `level` and returns how long it stayed there.
    fn pulse(&self, level: Level, phase: &'static str) -> Result<Duration, DhtError> {
        let start = Instant::now();
        while self.pin.read() == level {
            if start.elapsed() > PULSE_TIMEOUT {
                return Err(DhtError::Timeout(phase));
            }
        }
        Ok(start.elapsed())
    }
}

/// `thread::sleep` overshoots by far more than a microsecond pulse.
fn spin(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

impl Thermohygrometer for Dht {
    fn read_temperature(&mut self) -> f32 {
        self.read().map_or(f32::NAN, |m| m.temperature)
    }

    fn read_humidity(&mut self) -> f32 {
        self.read().map_or(f32::NAN, |m| m.humidity)
    }
}
