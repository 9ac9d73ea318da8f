use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use snapnet::net::{LinkSimulator, is_out_of_band};
use snapnet::{
    ChannelConfig, ChannelStats, MsgBuf, NetChan, NetSrc, UdpTransport, UserCmd,
    print_out_of_band, read_packet_entities, write_delta_usercmd,
};

use crate::config::SoakConfig;
use crate::frames::{CLC_MOVE, CLC_STRINGCMD, Frame, FrameHistory, SVC_FRAME, SVC_PRINT, baseline};
use crate::server::flush_link;

/// Ticks between connect attempts.
const CONNECT_RETRY: u32 = 10;

pub struct SoakClient {
    sock: UdpTransport,
    link: LinkSimulator,
    server_addr: SocketAddr,
    qport: u16,
    chan: Option<NetChan>,
    frames: FrameHistory,
    last_frame: Option<u32>,
    /// The last three commands, newest last.
    cmds: [UserCmd; 3],
    msec: u8,
    chat_interval: u32,
    decoded: Vec<u32>,
    invalid_frames: u64,
    chat_sent: Vec<String>,
    echoes: Vec<String>,
}

impl SoakClient {
    pub fn bind(config: &SoakConfig, server_addr: SocketAddr, qport: u16) -> Result<Self> {
        let sock = UdpTransport::bind("127.0.0.1:0").context("binding client socket")?;
        let link = LinkSimulator::new(sock.local_addr(), config.link.clone(), config.seed ^ 0x5eed);

        Ok(Self {
            sock,
            link,
            server_addr,
            qport,
            chan: None,
            frames: FrameHistory::default(),
            last_frame: None,
            cmds: [UserCmd::default(); 3],
            msec: config.tick_duration().as_millis().min(250) as u8,
            chat_interval: config.chat_interval.max(1),
            decoded: Vec::new(),
            invalid_frames: 0,
            chat_sent: Vec::new(),
            echoes: Vec::new(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.chan.is_some()
    }

    pub fn stats(&self) -> Option<&ChannelStats> {
        self.chan.as_ref().map(NetChan::stats)
    }

    pub fn link(&self) -> &LinkSimulator {
        &self.link
    }

    pub fn chat_sent(&self) -> &[String] {
        &self.chat_sent
    }

    pub fn echoes(&self) -> &[String] {
        &self.echoes
    }

    pub fn invalid_frames(&self) -> u64 {
        self.invalid_frames
    }

    /// True once every reliable line has left the channel and been acked.
    pub fn reliable_idle(&self) -> bool {
        self.chan
            .as_ref()
            .is_some_and(|chan| chan.can_reliable() && chan.message.is_empty())
    }

    pub fn frame(&self, sequence: u32) -> Option<&Frame> {
        self.frames.get(sequence)
    }

    /// Sequences of the frames decoded since the last call.
    pub fn take_decoded(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.decoded)
    }

    pub fn receive(&mut self) -> Result<()> {
        for (mut msg, from) in self.sock.receive()? {
            if from != self.server_addr {
                log::debug!("{}: packet from unknown address", from);
                continue;
            }

            if is_out_of_band(msg.as_bytes()) {
                let text = String::from_utf8_lossy(&msg.as_bytes()[4..]);
                if text.starts_with("client_connect") && self.chan.is_none() {
                    log::info!("connected to {} with qport {}", self.server_addr, self.qport);
                    self.chan = Some(NetChan::new(
                        NetSrc::Client,
                        self.server_addr,
                        self.qport,
                        ChannelConfig::default(),
                    ));
                }
                continue;
            }

            let Some(chan) = self.chan.as_mut() else {
                continue;
            };
            if chan.process(&mut msg) {
                self.parse_server_message(&mut msg)?;
            }
        }
        Ok(())
    }

    fn parse_server_message(&mut self, msg: &mut MsgBuf) -> Result<()> {
        while !msg.unread().is_empty() {
            match msg.read_byte()? {
                SVC_PRINT => {
                    let line = msg.read_string();
                    log::debug!("server: {}", line);
                    self.echoes.push(line);
                }
                SVC_FRAME => {
                    if !self.parse_frame(msg)? {
                        break;
                    }
                }
                other => {
                    log::warn!("unknown server command {}", other);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Returns false when the frame could not be decoded and the rest of the
    /// message has to be skipped.
    fn parse_frame(&mut self, msg: &mut MsgBuf) -> Result<bool> {
        let sequence = msg.read_long()? as u32;
        let delta = msg.read_long()?;

        let from = match u32::try_from(delta) {
            Err(_) => Some(&[][..]),
            Ok(delta) => self.frames.get(delta).map(|frame| frame.entities.as_slice()),
        };
        let Some(from) = from else {
            log::warn!("frame {} deltas from expired frame {}", sequence, delta);
            self.invalid_frames += 1;
            return Ok(false);
        };

        let entities = read_packet_entities(from, baseline, msg)?;
        self.frames.store(Frame {
            sequence,
            entities,
        });
        self.last_frame = Some(sequence);
        self.decoded.push(sequence);
        Ok(true)
    }

    /// Sends this tick's commands, plus a reliable chat line every
    /// `chat_interval` ticks when `chat` is set.
    pub fn send(&mut self, tick: u32, chat: bool) -> Result<()> {
        let Some(chan) = self.chan.as_mut() else {
            if tick % CONNECT_RETRY == 0 {
                log::info!("connecting to {}", self.server_addr);
                print_out_of_band(
                    &mut self.link,
                    self.server_addr,
                    &format!("connect {}", self.qport),
                )?;
            }
            return Ok(());
        };

        if chat && tick % self.chat_interval == 0 {
            let line = format!("say tick {}", tick);
            chan.message.write_byte(CLC_STRINGCMD)?;
            chan.message.write_string(&line)?;
            self.chat_sent.push(line);
        }

        let mut cmd = UserCmd {
            msec: self.msec,
            lightlevel: 128,
            ..Default::default()
        };
        cmd.angles[1] = (tick.wrapping_mul(91) & 0xFFFF) as u16 as i16;
        cmd.forwardmove = if tick % 40 < 20 { 200 } else { -200 };
        cmd.sidemove = if tick % 13 == 0 { 150 } else { 0 };
        cmd.set_button(UserCmd::BUTTON_ATTACK, tick % 17 < 3);
        self.cmds.rotate_left(1);
        self.cmds[2] = cmd;

        let mut payload = MsgBuf::new(64);
        payload.write_byte(CLC_MOVE)?;
        payload.write_long(self.last_frame.map_or(-1, |sequence| sequence as i32))?;
        write_delta_usercmd(&UserCmd::default(), &self.cmds[0], &mut payload)?;
        write_delta_usercmd(&self.cmds[0], &self.cmds[1], &mut payload)?;
        write_delta_usercmd(&self.cmds[1], &self.cmds[2], &mut payload)?;

        if !chan.transmit(payload.as_bytes(), &mut self.link)? {
            anyhow::bail!("client channel overflowed");
        }
        if chan.is_timed_out(chan.config().timeout) {
            anyhow::bail!("server timed out");
        }
        Ok(())
    }

    pub fn flush(&mut self, elapsed: Duration) -> Result<()> {
        flush_link(&mut self.link, &mut self.sock, elapsed)
    }
}
