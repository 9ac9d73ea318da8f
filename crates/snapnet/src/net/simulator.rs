use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::stats::PacketLossSimulation;
use super::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub from: SocketAddr,
    pub to: SocketAddr,
}

#[derive(Debug)]
struct DelayedPacket {
    release_ms: u64,
    id: u64,
    datagram: Datagram,
}

impl PartialEq for DelayedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.release_ms == other.release_ms && self.id == other.id
    }
}

impl Eq for DelayedPacket {}

impl PartialOrd for DelayedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties release in send order.
        other
            .release_ms
            .cmp(&self.release_ms)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

/// One direction of a lossy link, driven by a logical clock so runs are
/// reproducible for a given seed.
#[derive(Debug)]
pub struct LinkSimulator {
    local_addr: SocketAddr,
    config: PacketLossSimulation,
    rng: StdRng,
    now_ms: u64,
    next_id: u64,
    queue: BinaryHeap<DelayedPacket>,
    stats: LinkStats,
}

impl LinkSimulator {
    pub fn new(local_addr: SocketAddr, config: PacketLossSimulation, seed: u64) -> Self {
        Self {
            local_addr,
            config,
            rng: StdRng::seed_from_u64(seed),
            now_ms: 0,
            next_id: 0,
            queue: BinaryHeap::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &PacketLossSimulation {
        &self.config
    }

    pub fn set_config(&mut self, config: PacketLossSimulation) {
        self.config = config;
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms)
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub fn advance(&mut self, elapsed: Duration) {
        self.now_ms += elapsed.as_millis() as u64;
    }

    /// Pops every datagram whose release time has passed.
    pub fn take_ready(&mut self) -> Vec<Datagram> {
        let mut ready = Vec::new();
        while self
            .queue
            .peek()
            .is_some_and(|delayed| delayed.release_ms <= self.now_ms)
        {
            if let Some(delayed) = self.queue.pop() {
                self.stats.delivered += 1;
                ready.push(delayed.datagram);
            }
        }
        ready
    }
}

impl Transport for LinkSimulator {
    fn send_packet(&mut self, data: &[u8], to: SocketAddr) -> io::Result<()> {
        self.stats.sent += 1;

        if self.config.should_drop(&mut self.rng) {
            self.stats.dropped += 1;
            return Ok(());
        }

        let delay = self.config.delay_ms(&mut self.rng);
        let id = self.next_id;
        self.next_id += 1;

        self.queue.push(DelayedPacket {
            release_ms: self.now_ms + u64::from(delay),
            id,
            datagram: Datagram {
                data: data.to_vec(),
                from: self.local_addr,
                to,
            },
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_perfect_link_delivers_in_order() {
        let mut link = LinkSimulator::new(addr(1000), PacketLossSimulation::default(), 1);
        for i in 0..5u8 {
            link.send_packet(&[i], addr(2000)).unwrap();
        }

        let ready = link.take_ready();
        let payloads: Vec<u8> = ready.iter().map(|d| d.data[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
        assert!(ready.iter().all(|d| d.from == addr(1000) && d.to == addr(2000)));
    }

    #[test]
    fn test_latency_holds_packets_until_clock_advances() {
        let config = PacketLossSimulation {
            enabled: true,
            loss_percent: 0.0,
            min_latency_ms: 40,
            max_latency_ms: 40,
            jitter_ms: 0,
        };
        let mut link = LinkSimulator::new(addr(1000), config, 1);
        link.send_packet(&[9], addr(2000)).unwrap();

        link.advance(Duration::from_millis(39));
        assert!(link.take_ready().is_empty());

        link.advance(Duration::from_millis(1));
        assert_eq!(link.take_ready().len(), 1);
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn test_total_loss_drops_everything() {
        let config = PacketLossSimulation {
            enabled: true,
            loss_percent: 100.0,
            ..Default::default()
        };
        let mut link = LinkSimulator::new(addr(1000), config, 3);
        for _ in 0..10 {
            link.send_packet(&[0], addr(2000)).unwrap();
        }

        assert!(link.take_ready().is_empty());
        assert_eq!(link.stats().dropped, 10);
    }
}
