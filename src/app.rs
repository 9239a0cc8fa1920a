//! Cooperative device loop

use crate::device::Device;
use crate::infrastructure::bluetooth::Transport;
use crate::infrastructure::hardware::{Clock, Sensor};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Tick the device until `shutdown` turns true or its sender is dropped.
///
/// The inter-tick sleep is the only suspension point, so a tick always
/// runs to completion before shutdown is observed.
pub async fn run<T, S, C>(device: &mut Device<T, S, C>, mut shutdown: watch::Receiver<bool>)
where
    T: Transport,
    S: Sensor,
    C: Clock,
{
    let tick = Duration::from_millis(device.config().tick_interval_ms);
    info!(
        "Device loop started ({} protocol, {} ms tick)",
        device.config().protocol,
        tick.as_millis()
    );

    loop {
        let report = device.tick();
        if report.command.is_some() || report.flush.is_some() || report.forced_flush.is_some() {
            debug!("Tick: {:?}", report);
        }

        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let stats = device.stats();
    info!(
        "Device loop stopped: {} frames sent, {} records, {} dropped, {} forced flushes, {} send failures",
        stats.frames_sent,
        stats.records_appended,
        stats.samples_dropped,
        stats.forced_flushes,
        stats.send_failures
    );
}
