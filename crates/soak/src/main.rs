mod client;
mod config;
mod frames;
mod server;
mod world;

use std::thread;

use anyhow::Result;
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use client::SoakClient;
use config::SoakConfig;
use server::SoakServer;
use snapnet::PacketLossSimulation;
use world::World;

#[derive(Parser)]
#[command(name = "snapnet-soak")]
#[command(about = "Drives a client and server channel over a lossy loopback link")]
struct Args {
    #[arg(short, long, default_value_t = 600)]
    ticks: u32,

    #[arg(long, default_value_t = 20)]
    tick_rate: u32,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,

    #[arg(short, long, default_value_t = 32, value_parser = clap::value_parser!(u16).range(1..1024))]
    entities: u16,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(short, long, default_value_t = snapnet::PORT_SERVER)]
    port: u16,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let simulate = args.loss_percent > 0.0 || args.max_latency > 0 || args.jitter > 0;
    let config = SoakConfig {
        ticks: args.ticks,
        tick_rate: args.tick_rate,
        entities: args.entities,
        seed: args.seed,
        port: args.port,
        link: PacketLossSimulation {
            enabled: simulate,
            loss_percent: args.loss_percent,
            min_latency_ms: args.min_latency,
            max_latency_ms: args.max_latency.max(args.min_latency),
            jitter_ms: args.jitter,
        },
        ..Default::default()
    };

    run(&config)
}

fn run(config: &SoakConfig) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut server = SoakServer::bind(config)?;
    let mut client = SoakClient::bind(config, server.local_addr(), rng.gen_range(1..=u16::MAX))?;
    let mut world = World::new(config.entities, &mut rng);

    log::info!(
        "soak: {} ticks at {} Hz, {} entities, link {:?}",
        config.ticks,
        config.tick_rate,
        config.entities,
        config.link
    );

    let dt = config.tick_duration();
    let mut mismatches = 0u64;
    let mut decoded = 0u64;

    // Extra ticks let the last reliable lines drain.
    let drain = config.tick_rate * 10;
    for tick in 0..config.ticks + drain {
        server.receive()?;
        client.receive()?;

        for sequence in client.take_decoded() {
            decoded += 1;
            let (Some(got), Some(want)) = (client.frame(sequence), server.frame_truth(sequence))
            else {
                continue;
            };
            if got.entities != want.entities {
                log::error!("frame {} decoded differently from what was sent", sequence);
                mismatches += 1;
            }
        }

        if tick >= config.ticks && client.reliable_idle() {
            break;
        }

        world.advance();
        server.send_frame(&world)?;
        client.send(tick, tick < config.ticks)?;

        server.flush(dt)?;
        client.flush(dt)?;

        if tick > 0 && tick % (config.tick_rate.max(1) * 5) == 0 {
            log::info!("tick {}: {} frames decoded", world.tick(), decoded);
        }

        thread::sleep(dt);
    }

    report(&server, &client, decoded);

    if !client.is_connected() {
        anyhow::bail!("client never connected to {}", server.local_addr());
    }
    if mismatches > 0 {
        anyhow::bail!("{} frames decoded incorrectly", mismatches);
    }
    if server.chat() != client.chat_sent() {
        anyhow::bail!(
            "reliable stream diverged: sent {}, received {}",
            client.chat_sent().len(),
            server.chat().len()
        );
    }
    Ok(())
}

fn report(server: &SoakServer, client: &SoakClient, decoded: u64) {
    log::info!(
        "frames decoded: {}, invalid: {}, commands received: {}",
        decoded,
        client.invalid_frames(),
        server.commands()
    );
    log::info!(
        "chat: {} sent, {} received, {} echoed back",
        client.chat_sent().len(),
        server.chat().len(),
        client.echoes().len()
    );

    if let Some(stats) = server.stats() {
        log::info!(
            "server channel: sent {} recv {} dropped {} ({:.1}%) rejected {} resent {} suppressed {}",
            stats.packets_sent,
            stats.packets_received,
            stats.packets_dropped,
            stats.loss_percent(),
            stats.packets_rejected,
            stats.reliable_resent,
            stats.rate_suppressed
        );
    }
    if let Some(stats) = client.stats() {
        log::info!(
            "client channel: sent {} recv {} dropped {} ({:.1}%) rejected {} resent {}",
            stats.packets_sent,
            stats.packets_received,
            stats.packets_dropped,
            stats.loss_percent(),
            stats.packets_rejected,
            stats.reliable_resent
        );
    }
    log::info!(
        "link: server->client {:?}, client->server {:?}",
        server.link().stats(),
        client.link().stats()
    );
}
