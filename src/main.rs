use hall_logger::app;
use hall_logger::device::Device;
use hall_logger::domain::settings::SettingsService;
use hall_logger::infrastructure::bluetooth::UartService;
use hall_logger::infrastructure::console;
use hall_logger::infrastructure::hardware::{SimulatedHallSensor, SystemClock};
use hall_logger::infrastructure::logging::init_logger;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let settings_service = match std::env::args_os().nth(1) {
        Some(path) => SettingsService::from_path(PathBuf::from(path))?,
        None => SettingsService::new()?,
    };
    let settings = settings_service.get().clone();

    let _log_guard = init_logger(&settings.log_settings)?;
    info!("Analog Hall Sensor device setup");
    info!(
        "Device name: {}, settings: {}",
        settings.device_name,
        settings_service.path().display()
    );
    if settings_service.created() {
        info!("Wrote default settings to {}", settings_service.path().display());
    }

    let config = settings.device_config()?;

    let (uart, central) = UartService::new();
    // Detached; a read still blocked on stdin must not hold up exit
    let _reader = console::spawn_stdin_reader(central.input)?;
    let writer = console::spawn_stdout_writer(central.frames);

    let mut device = Device::new(
        config,
        uart,
        SimulatedHallSensor::new(&settings.simulated_sensor),
        SystemClock::new(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would stop the loop
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    info!("Started");
    app::run(&mut device, shutdown_rx).await;

    // Dropping the device closes the frame channel and lets the writer finish
    drop(device);
    if let Err(e) = writer.await {
        error!("Frame writer task failed: {}", e);
    }

    Ok(())
}
