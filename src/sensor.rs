use crate::reading::Reading;

/// A combined temperature/humidity sensor in its native units (°C, %RH).
///
/// Both reads return NaN when the sensor transaction fails.
pub trait Thermohygrometer {
    fn read_temperature(&mut self) -> f32;
    fn read_humidity(&mut self) -> f32;
}

#[derive(Debug)]
pub struct SensorReader<S> {
    sensor: S,
}

impl<S: Thermohygrometer> SensorReader<S> {
    pub fn new(sensor: S) -> SensorReader<S> {
        SensorReader { sensor }
    }

    #[cfg(test)]
    pub(crate) fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Queries the sensor once. Faults come back as [`Reading::Invalid`] and are not retried.
    pub fn sample(&mut self) -> Reading {
        let humidity = self.sensor.read_humidity();
        let temperature = self.sensor.read_temperature();

        let reading = Reading::from_raw(temperature, humidity);
        if !reading.is_valid() {
            log::warn!("Sensor fault: temperature={temperature}, humidity={humidity}");
        }

        reading
    }
}
