//! Read-only status snapshots

use core::fmt;

use serde::Serialize;

use flipdisc_core::buffer::{BufferStats, HealthReport};
use flipdisc_core::state::ConnectionState;
use flipdisc_core::traits::SerialLink;
use flipdisc_core::BufferHealth;

use crate::engine::{EngineMetrics, EngineStats};
use crate::shared::SharedFrameBuffer;
use crate::transport::{Transport, TransportStats};

/// Point-in-time view of the whole pipeline
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub buffer_size: usize,
    pub buffer_cap: usize,
    pub buffer_level: f32,
    pub health: BufferHealth,
    pub credits: usize,
    pub target_fps: u32,
    pub retry_after_ms: u64,
    pub connection: ConnectionState,
    pub last_write_ms: f32,
    pub last_interval_ms: f32,
    pub ticks: u64,
    pub last_seq: Option<u32>,
    pub buffer: BufferStats,
    pub buffer_health: HealthReport,
    pub engine: EngineStats,
    pub transport: TransportStats,
}

impl StatusSnapshot {
    /// Gather a snapshot; takes each lock briefly and never waits on a write
    pub fn collect<L: SerialLink>(
        buffer: &SharedFrameBuffer,
        transport: &Transport<L>,
        metrics: &EngineMetrics,
    ) -> Self {
        let (status, buffer_health, retry_after) =
            buffer.with(|fb| (fb.status(), fb.health(), fb.retry_after()));
        let engine = metrics.snapshot();
        Self {
            buffer_size: status.buffer_size,
            buffer_cap: status.max_buffer_size,
            buffer_level: status.buffer_utilization,
            health: buffer_health.health,
            credits: status.credits_available,
            target_fps: status.target_fps,
            retry_after_ms: retry_after.as_millis(),
            connection: transport.state(),
            last_write_ms: engine.last_write_us as f32 / 1000.0,
            last_interval_ms: engine.last_interval_us as f32 / 1000.0,
            ticks: engine.ticks,
            last_seq: engine.last_seq,
            buffer: status.stats,
            buffer_health,
            engine,
            transport: transport.stats(),
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffer {}/{} ({:?}), credits {}, link {:?}, shown {} (seq {:?}), dropped {}, underruns {}, \
             write {:.1}ms, interval {:.1}ms, {:.1} fps",
            self.buffer_size,
            self.buffer_cap,
            self.health,
            self.credits,
            self.connection,
            self.engine.frames_displayed,
            self.last_seq,
            self.buffer.frames_dropped,
            self.buffer.buffer_underruns,
            self.last_write_ms,
            self.last_interval_ms,
            self.buffer.fps_actual
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MockLink;
    use embassy_time::Duration;
    use flipdisc_core::config::SerialSettings;
    use flipdisc_core::{BufferConfig, Canvas, Frame};

    #[test]
    fn test_collect_reflects_buffer_and_link() {
        let buffer = SharedFrameBuffer::new(BufferConfig {
            target_fps: 30,
            buffer_duration_ms: 100,
        });
        let transport = Transport::new(MockLink::new(), SerialSettings::default(), Duration::from_ticks(0));
        let metrics = EngineMetrics::new();

        for seq in 0..2 {
            buffer.with(|fb| fb.submit(Frame::new(seq, Canvas::new(7, 7))));
        }

        let snapshot = StatusSnapshot::collect(&buffer, &transport, &metrics);
        assert_eq!(snapshot.buffer_size, 2);
        assert_eq!(snapshot.buffer_cap, 3);
        assert_eq!(snapshot.credits, 1);
        assert_eq!(snapshot.health, BufferHealth::Good);
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert_eq!(snapshot.retry_after_ms, 33);
        assert_eq!(snapshot.buffer.last_seq, Some(1));
        assert_eq!(snapshot.last_seq, None);

        let line = snapshot.to_string();
        assert!(line.starts_with("buffer 2/3 (Good), credits 1"));
    }
}
