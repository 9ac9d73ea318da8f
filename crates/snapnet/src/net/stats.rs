use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// 0 to 100.
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl PacketLossSimulation {
    pub fn should_drop(&self, rng: &mut impl Rng) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rng.gen_range(0.0..100.0) < self.loss_percent
    }

    pub fn delay_ms(&self, rng: &mut impl Rng) -> u32 {
        if !self.enabled || self.max_latency_ms == 0 {
            return 0;
        }
        let base = self.min_latency_ms;
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        base + rng.gen_range(0..=range) + jitter
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Gaps in the incoming sequence.
    pub packets_dropped: u64,
    /// Stale, duplicate or malformed datagrams.
    pub packets_rejected: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub reliable_sent: u64,
    pub reliable_resent: u64,
    pub unreliable_dumped: u64,
    pub rate_suppressed: u64,
}

impl ChannelStats {
    pub fn loss_percent(&self) -> f32 {
        let expected = self.packets_received + self.packets_dropped;
        if expected == 0 {
            return 0.0;
        }
        self.packets_dropped as f32 / expected as f32 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_disabled_simulation_is_transparent() {
        let mut rng = StdRng::seed_from_u64(1);
        let sim = PacketLossSimulation {
            enabled: false,
            loss_percent: 100.0,
            max_latency_ms: 500,
            ..Default::default()
        };

        assert!(!sim.should_drop(&mut rng));
        assert_eq!(sim.delay_ms(&mut rng), 0);
    }

    #[test]
    fn test_delay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let sim = PacketLossSimulation {
            enabled: true,
            loss_percent: 0.0,
            min_latency_ms: 20,
            max_latency_ms: 50,
            jitter_ms: 5,
        };

        for _ in 0..100 {
            let delay = sim.delay_ms(&mut rng);
            assert!((20..=55).contains(&delay));
        }
    }

    #[test]
    fn test_loss_percent() {
        let stats = ChannelStats {
            packets_received: 90,
            packets_dropped: 10,
            ..Default::default()
        };
        assert!((stats.loss_percent() - 10.0).abs() < f32::EPSILON);
        assert_eq!(ChannelStats::default().loss_percent(), 0.0);
    }
}
