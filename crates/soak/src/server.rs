use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use snapnet::net::{LinkSimulator, is_out_of_band};
use snapnet::{
    ChannelConfig, ChannelStats, MAX_MSGLEN, MsgBuf, MsgError, NetChan, NetSrc, PACKET_HEADER,
    PacketHeader, Transport, UdpTransport, UserCmd, print_out_of_band, read_delta_usercmd,
    write_packet_entities,
};

use crate::config::SoakConfig;
use crate::frames::{
    CLC_MOVE, CLC_STRINGCMD, Frame, FrameHistory, SVC_FRAME, SVC_PRINT, baseline,
};
use crate::world::World;

struct ServerClient {
    chan: NetChan,
    last_cmd: UserCmd,
    /// Newest frame the client reports holding.
    last_frame: Option<u32>,
    commands: u64,
}

pub struct SoakServer {
    sock: UdpTransport,
    link: LinkSimulator,
    client: Option<ServerClient>,
    frames: FrameHistory,
    chat: Vec<String>,
}

impl SoakServer {
    pub fn bind(config: &SoakConfig) -> Result<Self> {
        let sock = UdpTransport::bind(("127.0.0.1", config.port))
            .with_context(|| format!("binding server socket on port {}", config.port))?;
        let link = LinkSimulator::new(sock.local_addr(), config.link.clone(), config.seed);

        Ok(Self {
            sock,
            link,
            client: None,
            frames: FrameHistory::default(),
            chat: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.sock.local_addr()
    }

    pub fn chat(&self) -> &[String] {
        &self.chat
    }

    pub fn stats(&self) -> Option<&ChannelStats> {
        self.client.as_ref().map(|client| client.chan.stats())
    }

    pub fn commands(&self) -> u64 {
        self.client.as_ref().map_or(0, |client| client.commands)
    }

    pub fn link(&self) -> &LinkSimulator {
        &self.link
    }

    pub fn frame_truth(&self, sequence: u32) -> Option<&Frame> {
        self.frames.get(sequence)
    }

    pub fn receive(&mut self) -> Result<()> {
        for (mut msg, from) in self.sock.receive()? {
            if is_out_of_band(msg.as_bytes()) {
                self.connectionless(&msg, from)?;
                continue;
            }

            let Some(header) = PacketHeader::peek(msg.as_bytes(), NetSrc::Server) else {
                log::debug!("{}: unreadable header", from);
                continue;
            };
            let Some(client) = self.client.as_mut() else {
                log::debug!("{}: sequenced packet without a connection", from);
                continue;
            };
            if !client.chan.matches(from, header.qport.unwrap_or_default()) {
                log::debug!("{}: no channel for qport {:?}", from, header.qport);
                continue;
            }

            client.chan.update_remote_port(from.port());
            if client.chan.process(&mut msg) {
                parse_client_message(client, &mut msg, &mut self.chat)?;
            }
        }
        Ok(())
    }

    fn connectionless(&mut self, msg: &MsgBuf, from: SocketAddr) -> Result<()> {
        let text = String::from_utf8_lossy(&msg.as_bytes()[4..]);
        let Some(qport) = text.strip_prefix("connect ") else {
            log::warn!("{}: unknown connectionless packet {:?}", from, text);
            return Ok(());
        };
        let Ok(qport) = qport.trim().parse::<u16>() else {
            log::warn!("{}: bad qport in connect", from);
            return Ok(());
        };

        let reconnect = self
            .client
            .as_ref()
            .is_some_and(|client| client.chan.matches(from, qport));
        if !reconnect {
            log::info!("client connected from {} (qport {})", from, qport);
            self.client = Some(ServerClient {
                chan: NetChan::new(NetSrc::Server, from, qport, ChannelConfig::default()),
                last_cmd: UserCmd::default(),
                last_frame: None,
                commands: 0,
            });
        }

        print_out_of_band(&mut self.link, from, "client_connect")?;
        Ok(())
    }

    /// Sends the current world to the client, delta compressed against the
    /// newest frame it reported.
    pub fn send_frame(&mut self, world: &World) -> Result<()> {
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };
        if client.chan.rate_drop() {
            log::debug!("{}: frame suppressed by rate", client.chan.remote_address());
            return Ok(());
        }

        let sequence = client.chan.outgoing_sequence();
        let entities = world.snapshot().to_vec();
        let delta = client.last_frame.and_then(|last| self.frames.get(last));

        let mut payload = MsgBuf::new(MAX_MSGLEN - PACKET_HEADER);
        payload.write_byte(SVC_FRAME)?;
        payload.write_long(sequence as i32)?;
        payload.write_long(delta.map_or(-1, |frame| frame.sequence as i32))?;

        let from = delta.map_or(&[][..], |frame| frame.entities.as_slice());
        match write_packet_entities(from, &entities, baseline, &mut payload) {
            Ok(()) => {}
            Err(MsgError::Overflow { requested, available }) => {
                log::warn!(
                    "frame {} does not fit ({} bytes, {} free)",
                    sequence,
                    requested,
                    available
                );
                payload.clear();
            }
            Err(err) => return Err(err.into()),
        }

        if !client.chan.transmit(payload.as_bytes(), &mut self.link)? {
            anyhow::bail!("server channel overflowed");
        }
        self.frames.store(Frame {
            sequence,
            entities,
        });
        Ok(())
    }

    pub fn flush(&mut self, elapsed: Duration) -> Result<()> {
        flush_link(&mut self.link, &mut self.sock, elapsed)
    }
}

fn parse_client_message(
    client: &mut ServerClient,
    msg: &mut MsgBuf,
    chat: &mut Vec<String>,
) -> Result<()> {
    while !msg.unread().is_empty() {
        match msg.read_byte()? {
            CLC_MOVE => {
                let last = msg.read_long()?;
                client.last_frame = u32::try_from(last).ok();

                // Oldest against the null command, the rest chained.
                let oldest = read_delta_usercmd(msg, &UserCmd::default())?;
                let older = read_delta_usercmd(msg, &oldest)?;
                client.last_cmd = read_delta_usercmd(msg, &older)?;
                client.commands += 1;
            }
            CLC_STRINGCMD => {
                let line = msg.read_string();
                log::info!("{}: {}", client.chan.remote_address(), line);

                client.chan.message.write_byte(SVC_PRINT)?;
                client.chan.message.write_string(&format!("echo {}", line))?;
                chat.push(line);
            }
            other => {
                log::warn!("{}: unknown client command {}", client.chan.remote_address(), other);
                break;
            }
        }
    }
    Ok(())
}

/// Releases whatever the simulated link let through onto the real socket.
pub fn flush_link(
    link: &mut LinkSimulator,
    sock: &mut UdpTransport,
    elapsed: Duration,
) -> Result<()> {
    link.advance(elapsed);
    for datagram in link.take_ready() {
        sock.send_packet(&datagram.data, datagram.to)?;
    }
    Ok(())
}
