//! Periodic status log

use embassy_time::{Duration, Ticker};
use log::info;

use crate::engine::EngineMetrics;
use crate::link::DynLink;
use crate::shared::SharedFrameBuffer;
use crate::status::StatusSnapshot;
use crate::transport::Transport;

#[embassy_executor::task]
pub async fn status_task(
    buffer: &'static SharedFrameBuffer,
    transport: &'static Transport<DynLink>,
    metrics: &'static EngineMetrics,
    period: Duration,
) {
    info!("Status task started");
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        info!("Status: {}", StatusSnapshot::collect(buffer, transport, metrics));
    }
}
