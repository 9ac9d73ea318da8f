use std::time::Duration;

use snapnet::{PORT_SERVER, PacketLossSimulation};

#[derive(Debug, Clone)]
pub struct SoakConfig {
    pub ticks: u32,
    pub tick_rate: u32,
    pub entities: u16,
    pub seed: u64,
    pub port: u16,
    /// Ticks between reliable chat lines from the client.
    pub chat_interval: u32,
    pub link: PacketLossSimulation,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            ticks: 600,
            tick_rate: 20,
            entities: 32,
            seed: 0,
            port: PORT_SERVER,
            chat_interval: 25,
            link: PacketLossSimulation::default(),
        }
    }
}

impl SoakConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}
