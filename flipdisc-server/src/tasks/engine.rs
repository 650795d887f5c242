//! Display loop task

use log::info;

use crate::channels::STOP;
use crate::engine::Engine;
use crate::link::DynLink;

/// Engine task - paces frames onto the bus until [`STOP`] fires
#[embassy_executor::task]
pub async fn engine_task(mut engine: Engine<'static, DynLink>) {
    info!("Engine task started");
    engine.run(&STOP).await;
    // The executor never returns, so the process ends here
    std::process::exit(0);
}
