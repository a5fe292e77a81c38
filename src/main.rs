use anyhow::Context;
use dht::Dht;
use log::LevelFilter;
use sample_loop::SampleLoop;
use sensor::SensorReader;
use serial::SerialPort;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

mod dht;
mod reading;
mod sample_loop;
mod sensor;
mod serial;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    TermLogger::init(
        LevelFilter::Info,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if let Err(e) = run().await {
        log::error!("{e:#}");
    }

    Ok(())
}

pub async fn run() -> Result<(), anyhow::Error> {
    let serial = SerialPort::new().context("Failed to initialize serial port")?;
    let sensor = Dht::new(dht::DATA_PIN, dht::MODEL).context("Failed to initialize DHT sensor")?;
    log::info!(
        "{:?} on GPIO {}, serial at {} baud",
        dht::MODEL,
        dht::DATA_PIN,
        serial::BAUD_RATE
    );

    let mut sample_loop = SampleLoop::new(SensorReader::new(sensor), serial);

    tokio::select! {
        result = sample_loop.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to wait for Ctrl+C signal")?;
            log::info!("Stopping");
        }
    }

    Ok(())
}
