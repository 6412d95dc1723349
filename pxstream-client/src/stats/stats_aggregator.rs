use crate::transport::TransportStats;
use tokio::time::Instant;
use tracing::debug;

/// One periodic view of the inbound video stream.
///
/// Rates need two samples from the same transport, so the first sample
/// after connecting only carries the counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AggregatedStats {
    pub bytes_received: u64,
    pub packets_received: u64,
    pub packets_lost: Option<u64>,
    pub frames_decoded: Option<u64>,
    pub bitrate_kbps: Option<f64>,
    pub frames_per_second: Option<f64>,
    /// Lost share of the packets expected since the previous sample.
    pub packet_loss_percent: Option<f64>,
}

/// Turns cumulative transport counters into rates between samples.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    previous: Option<(Instant, TransportStats)>,
    latest: Option<AggregatedStats>,
}

fn delta(now: Option<u64>, before: Option<u64>) -> Option<u64> {
    now?.checked_sub(before?)
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<AggregatedStats> {
        self.latest
    }

    /// Forget the previous sample; the next one starts a new baseline.
    pub fn reset(&mut self) {
        self.previous = None;
        self.latest = None;
    }

    pub fn update(&mut self, now: Instant, sample: TransportStats) -> AggregatedStats {
        let mut stats = AggregatedStats {
            bytes_received: sample.bytes_received,
            packets_received: sample.packets_received,
            packets_lost: sample.packets_lost,
            frames_decoded: sample.frames_decoded,
            ..AggregatedStats::default()
        };

        if let Some((at, before)) = self.previous {
            let elapsed = now.saturating_duration_since(at).as_secs_f64();
            let counters_grew = sample.bytes_received >= before.bytes_received
                && sample.packets_received >= before.packets_received;

            if !counters_grew {
                debug!("Transport counters went backwards; starting a new baseline");
            } else if elapsed > 0.0 {
                let bytes = (sample.bytes_received - before.bytes_received) as f64;
                stats.bitrate_kbps = Some(bytes * 8.0 / elapsed / 1000.0);
                stats.frames_per_second =
                    delta(sample.frames_decoded, before.frames_decoded).map(|frames| frames as f64 / elapsed);

                let received = sample.packets_received - before.packets_received;
                stats.packet_loss_percent = delta(sample.packets_lost, before.packets_lost)
                    .and_then(|lost| {
                        let expected = lost + received;
                        (expected > 0).then(|| lost as f64 * 100.0 / expected as f64)
                    });
            }
        }

        self.previous = Some((now, sample));
        self.latest = Some(stats);
        stats
    }
}
