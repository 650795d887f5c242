//! Ingest task
//!
//! Drains the ingest channel into the frame buffer. A read timeout drops a
//! partially received message so a stalled producer cannot wedge the stream.

use embassy_time::{with_timeout, Duration, Timer};
use log::{debug, info};

use crate::channels::{IngestEvent, INGEST_CHANNEL, STOP};
use crate::ingest::{Ingest, IngestStream};
use crate::shared::SharedFrameBuffer;

/// Ingest task settings
#[derive(Debug, Clone, Copy)]
pub struct IngestTaskConfig {
    /// Idle time after which a partial message is dropped
    pub read_timeout: Duration,
    /// Stop the server once the input ends and the buffer has played out
    pub stop_at_end: bool,
}

#[embassy_executor::task]
pub async fn ingest_task(
    buffer: &'static SharedFrameBuffer,
    ingest: Ingest<'static>,
    config: IngestTaskConfig,
) {
    info!("Ingest task started");
    let mut stream = IngestStream::new(ingest);

    loop {
        match with_timeout(config.read_timeout, INGEST_CHANNEL.receive()).await {
            Ok(IngestEvent::Data(chunk)) => {
                let report = stream.handle_chunk(&chunk);
                if report.accepted > 0 || report.rejected > 0 {
                    debug!(
                        "Ingest: {} accepted, {} rejected, {} evicted",
                        report.accepted, report.rejected, report.evicted
                    );
                }
            }
            Ok(IngestEvent::End) => {
                stream.on_timeout();
                info!("Input closed");
                break;
            }
            Err(_) => {
                stream.on_timeout();
            }
        }
    }

    if config.stop_at_end {
        play_out(buffer).await;
        STOP.signal(());
    }
}

/// Wait until every queued frame has been displayed for its interval
async fn play_out(buffer: &SharedFrameBuffer) {
    loop {
        let (empty, interval) = buffer.with(|fb| (fb.is_empty(), fb.current_interval()));
        Timer::after(interval).await;
        if empty {
            return;
        }
    }
}
