use std::io::Write;
use std::time::Duration;

use anyhow::Context;

use crate::reading::{LINE_ENDING, Reading, STARTUP_LINE};
use crate::sensor::{SensorReader, Thermohygrometer};

/// Post power-up settling time before the first sample.
pub const STABILIZATION_DELAY: Duration = Duration::from_millis(2000);
/// Pause between the end of one iteration and the start of the next.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(5000);

#[derive(Debug)]
pub struct SampleLoop<S, W> {
    reader: SensorReader<S>,
    serial: W,
    announced: bool,
}

impl<S: Thermohygrometer, W: Write> SampleLoop<S, W> {
    pub fn new(reader: SensorReader<S>, serial: W) -> SampleLoop<S, W> {
        SampleLoop {
            reader,
            serial,
            announced: false,
        }
    }

    /// Waits out the stabilization period and announces startup. Runs at most once.
    pub async fn startup(&mut self) -> Result<(), anyhow::Error> {
        if self.announced {
            return Ok(());
        }

        tokio::time::sleep(STABILIZATION_DELAY).await;
        self.emit(STARTUP_LINE)?;
        self.announced = true;
        log::info!("Sensor stabilized, sampling every {SAMPLE_INTERVAL:?}");

        Ok(())
    }

    /// One iteration: sample and emit either the data line or the fault line.
    pub fn step(&mut self) -> Result<Reading, anyhow::Error> {
        let reading = self.reader.sample();
        let line = reading.line();
        self.emit(&line)?;

        if reading.is_valid() {
            log::info!("{line}");
        }

        Ok(reading)
    }

    pub async fn run(&mut self) -> Result<(), anyhow::Error> {
        self.startup().await?;

        loop {
            self.step()?;
            tokio::time::sleep(SAMPLE_INTERVAL).await;
        }
    }

    fn emit(&mut self, line: &str) -> Result<(), anyhow::Error> {
        write!(self.serial, "{line}{LINE_ENDING}").context("Failed to write to serial")?;
        self.serial.flush().context("Failed to flush serial")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tokio::time::Instant;

    use super::*;
    use crate::reading::FAULT_LINE;

    /// Replays `(temperature, humidity)` pairs, repeating the last one once exhausted.
    struct ScriptedSensor {
        script: Vec<(f32, f32)>,
        next: usize,
    }

    impl ScriptedSensor {
        fn new(script: &[(f32, f32)]) -> ScriptedSensor {
            ScriptedSensor {
                script: script.to_vec(),
                next: 0,
            }
        }

        fn current(&self) -> (f32, f32) {
            self.script[self.next.min(self.script.len() - 1)]
        }
    }

    impl Thermohygrometer for ScriptedSensor {
        fn read_humidity(&mut self) -> f32 {
            self.current().1
        }

        fn read_temperature(&mut self) -> f32 {
            let (temperature, _) = self.current();
            self.next += 1;
            temperature
        }
    }

    struct BrokenSerial;

    impl io::Write for BrokenSerial {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sample_loop(script: &[(f32, f32)]) -> SampleLoop<ScriptedSensor, Vec<u8>> {
        SampleLoop::new(SensorReader::new(ScriptedSensor::new(script)), Vec::new())
    }

    fn lines(sample_loop: &SampleLoop<ScriptedSensor, Vec<u8>>) -> Vec<String> {
        String::from_utf8(sample_loop.serial.clone())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_step_emits_data_line() {
        let mut sample_loop = sample_loop(&[(22.0, 55.0)]);
        let reading = sample_loop.step().unwrap();

        assert!(reading.is_valid());
        assert_eq!(sample_loop.serial, b"22.0,55.0\n");
    }

    #[test]
    fn test_step_emits_fault_line_on_any_nan() {
        for pair in [(f32::NAN, 55.0), (22.0, f32::NAN), (f32::NAN, f32::NAN)] {
            let mut sample_loop = sample_loop(&[pair]);
            assert_eq!(sample_loop.step().unwrap(), Reading::Invalid);
            assert_eq!(lines(&sample_loop), [FAULT_LINE]);
        }
    }

    #[test]
    fn test_one_line_per_iteration() {
        let script = [
            (21.0, 40.0),
            (f32::NAN, 40.0),
            (21.5, 41.0),
            (21.5, f32::NAN),
            (22.0, 42.0),
        ];
        let mut sample_loop = sample_loop(&script);
        for _ in 0..script.len() {
            sample_loop.step().unwrap();
        }

        assert_eq!(
            lines(&sample_loop),
            ["21.0,40.0", FAULT_LINE, "21.5,41.0", FAULT_LINE, "22.0,42.0"]
        );
    }

    #[test]
    fn test_recovers_after_disconnect() {
        let nan = (f32::NAN, f32::NAN);
        let mut sample_loop = sample_loop(&[nan, nan, nan, (22.0, 55.0)]);
        for _ in 0..4 {
            sample_loop.step().unwrap();
        }

        assert_eq!(
            lines(&sample_loop),
            [FAULT_LINE, FAULT_LINE, FAULT_LINE, "22.0,55.0"]
        );
    }

    #[test]
    fn test_step_fails_on_serial_error() {
        let reader = SensorReader::new(ScriptedSensor::new(&[(22.0, 55.0)]));
        let mut sample_loop = SampleLoop::new(reader, BrokenSerial);
        assert!(sample_loop.step().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_waits_then_announces_once() {
        let mut sample_loop = sample_loop(&[(22.0, 55.0)]);
        let start = Instant::now();

        sample_loop.startup().await.unwrap();
        assert!(start.elapsed() >= STABILIZATION_DELAY);
        sample_loop.startup().await.unwrap();

        assert_eq!(lines(&sample_loop), [STARTUP_LINE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_cadence() {
        let nan = (f32::NAN, 50.0);
        let mut sample_loop = sample_loop(&[nan, nan, nan, (22.0, 55.0)]);

        // Iterations start at 2 s, 7 s, 12 s and 17 s.
        let deadline = STABILIZATION_DELAY + SAMPLE_INTERVAL * 3 + SAMPLE_INTERVAL / 2;
        let result = tokio::time::timeout(deadline, sample_loop.run()).await;
        assert!(result.is_err(), "run should never return on its own");

        assert_eq!(
            lines(&sample_loop),
            [STARTUP_LINE, FAULT_LINE, FAULT_LINE, FAULT_LINE, "22.0,55.0"]
        );
    }

    /// Blocks for `cost` on every transaction, like the real sensor does.
    struct SlowSensor {
        cost: Duration,
        samples: Vec<std::time::Instant>,
    }

    impl Thermohygrometer for SlowSensor {
        fn read_humidity(&mut self) -> f32 {
            self.samples.push(std::time::Instant::now());
            std::thread::sleep(self.cost);
            48.2
        }

        fn read_temperature(&mut self) -> f32 {
            23.5
        }
    }

    // Runs on the real clock: a paused clock does not see blocking sensor time.
    #[tokio::test]
    async fn test_interval_starts_after_sampling() {
        let cost = Duration::from_millis(300);
        let sensor = SlowSensor {
            cost,
            samples: Vec::new(),
        };
        let mut sample_loop = SampleLoop::new(SensorReader::new(sensor), Vec::new());

        // Long enough for exactly two iterations.
        let deadline =
            STABILIZATION_DELAY + (cost + SAMPLE_INTERVAL) + cost + SAMPLE_INTERVAL / 2;
        let result = tokio::time::timeout(deadline, sample_loop.run()).await;
        assert!(result.is_err());

        let samples = &sample_loop.reader.sensor().samples;
        assert_eq!(samples.len(), 2);
        assert!(samples[1] - samples[0] >= SAMPLE_INTERVAL + cost);
    }
}
