use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use snapnet::net::{LinkSimulator, is_out_of_band};
use snapnet::{
    ChannelConfig, MsgBuf, NetChan, NetSrc, PacketHeader, PacketLossSimulation, ReliableSlot,
    UdpTransport, print_out_of_band,
};

const QPORT: u16 = 3071;

fn bind() -> UdpTransport {
    UdpTransport::bind("127.0.0.1:0").unwrap()
}

fn wait_for_packet(
    transport: &mut UdpTransport,
    timeout_ms: u64,
) -> Option<Vec<(MsgBuf, SocketAddr)>> {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        let received = transport.receive().unwrap();
        if !received.is_empty() {
            return Some(received);
        }
        thread::sleep(Duration::from_millis(1));
    }
    None
}

fn lossy(loss_percent: f32) -> PacketLossSimulation {
    PacketLossSimulation {
        enabled: true,
        loss_percent,
        min_latency_ms: 5,
        max_latency_ms: 30,
        jitter_ms: 10,
    }
}

fn read_strings(msg: &mut MsgBuf) -> Vec<String> {
    let mut out = Vec::new();
    while !msg.unread().is_empty() {
        out.push(msg.read_string());
    }
    out
}

#[test]
fn test_udp_reliable_round_trip() {
    let mut server_sock = bind();
    let mut client_sock = bind();

    let mut client = NetChan::new(
        NetSrc::Client,
        server_sock.local_addr(),
        QPORT,
        ChannelConfig::default(),
    );
    let mut server = NetChan::new(
        NetSrc::Server,
        client_sock.local_addr(),
        QPORT,
        ChannelConfig::default(),
    );

    client.message.write_string("connect").unwrap();
    assert!(client.transmit(&[], &mut client_sock).unwrap());

    let received = wait_for_packet(&mut server_sock, 500).expect("No packet received");
    assert_eq!(received.len(), 1);
    let (mut msg, from) = received.into_iter().next().unwrap();

    let header = PacketHeader::peek(msg.as_bytes(), NetSrc::Server).unwrap();
    assert!(server.matches(from, header.qport.unwrap()));
    assert!(server.process(&mut msg));
    assert_eq!(read_strings(&mut msg), vec!["connect".to_string()]);

    server.transmit(&[], &mut server_sock).unwrap();
    let received = wait_for_packet(&mut client_sock, 500).expect("No packet received");
    let (mut msg, _) = received.into_iter().next().unwrap();
    assert!(client.process(&mut msg));

    assert!(client.can_reliable());
    assert_eq!(client_sock.stats().packets_sent, 1);
    assert_eq!(server_sock.stats().packets_received, 1);
}

#[test]
fn test_udp_out_of_band_is_not_sequenced() {
    let mut server_sock = bind();
    let mut client_sock = bind();

    print_out_of_band(&mut client_sock, server_sock.local_addr(), "getchallenge\n").unwrap();

    let received = wait_for_packet(&mut server_sock, 500).expect("No packet received");
    let (msg, _) = &received[0];
    assert!(is_out_of_band(msg.as_bytes()));
    assert_eq!(&msg.as_bytes()[4..], b"getchallenge\n");
    assert!(PacketHeader::peek(msg.as_bytes(), NetSrc::Server).is_none());
}

#[test]
fn test_udp_qport_follows_port_remap() {
    let mut server_sock = bind();
    let mut old_client_sock = bind();
    let mut new_client_sock = bind();

    let mut client = NetChan::new(
        NetSrc::Client,
        server_sock.local_addr(),
        QPORT,
        ChannelConfig::default(),
    );
    let mut server = NetChan::new(
        NetSrc::Server,
        old_client_sock.local_addr(),
        QPORT,
        ChannelConfig::default(),
    );

    client.transmit(&[1], &mut old_client_sock).unwrap();
    let (mut msg, _) = wait_for_packet(&mut server_sock, 500).unwrap().remove(0);
    assert!(server.process(&mut msg));

    // Same peer, new source port.
    client.transmit(&[2], &mut new_client_sock).unwrap();
    let (mut msg, from) = wait_for_packet(&mut server_sock, 500).unwrap().remove(0);
    assert_ne!(from, server.remote_address());

    let header = PacketHeader::peek(msg.as_bytes(), NetSrc::Server).unwrap();
    assert!(server.matches(from, header.qport.unwrap()));
    server.update_remote_port(from.port());
    assert_eq!(server.remote_address(), new_client_sock.local_addr());

    assert!(server.process(&mut msg));
    assert_eq!(msg.read_byte().unwrap(), 2);
}

struct LossyPair {
    client: NetChan,
    server: NetChan,
    to_server: LinkSimulator,
    to_client: LinkSimulator,
}

impl LossyPair {
    fn new(loss_percent: f32, seed: u64) -> Self {
        let client_addr: SocketAddr = "10.0.0.2:27901".parse().unwrap();
        let server_addr: SocketAddr = "10.0.0.1:27910".parse().unwrap();

        Self {
            client: NetChan::new(NetSrc::Client, server_addr, QPORT, ChannelConfig::default()),
            server: NetChan::new(NetSrc::Server, client_addr, QPORT, ChannelConfig::default()),
            to_server: LinkSimulator::new(client_addr, lossy(loss_percent), seed),
            to_client: LinkSimulator::new(server_addr, lossy(loss_percent), seed + 1),
        }
    }

    /// Runs one 10ms step and returns the accepted server-side messages with
    /// the read cursor on their payload.
    fn step(&mut self) -> Vec<MsgBuf> {
        self.client.transmit(&[], &mut self.to_server).unwrap();
        self.server.transmit(&[], &mut self.to_client).unwrap();

        self.to_server.advance(Duration::from_millis(10));
        self.to_client.advance(Duration::from_millis(10));

        let mut accepted = Vec::new();
        for datagram in self.to_server.take_ready() {
            let mut msg = MsgBuf::from_bytes(&datagram.data);
            if self.server.process(&mut msg) {
                accepted.push(msg);
            }
        }
        for datagram in self.to_client.take_ready() {
            let mut msg = MsgBuf::from_bytes(&datagram.data);
            self.client.process(&mut msg);
        }
        accepted
    }

    fn step_strings(&mut self) -> Vec<String> {
        self.step().iter_mut().flat_map(read_strings).collect()
    }
}

#[test]
fn test_reliable_delivery_over_lossy_link_in_order() {
    let mut link = LossyPair::new(30.0, 42);
    let expected: Vec<String> = (0..20).map(|i| format!("cmd {}", i)).collect();

    let mut received = Vec::new();
    let mut queued = 0;
    for _ in 0..5000 {
        if queued < expected.len() && link.client.can_reliable() {
            link.client.message.write_string(&expected[queued]).unwrap();
            queued += 1;
        }

        received.extend(link.step_strings());

        if received.len() == expected.len() && link.client.can_reliable() {
            break;
        }
    }

    assert_eq!(received, expected);
    assert!(link.client.stats().reliable_resent > 0);
    assert!(link.to_server.stats().dropped > 0);
}

#[test]
fn test_batched_reliable_messages_arrive_once() {
    let mut link = LossyPair::new(50.0, 7);

    // Written while a payload is in flight, so they ride together next time.
    link.client.message.write_string("first").unwrap();
    let mut received = link.step_strings();
    link.client.message.write_string("second").unwrap();
    link.client.message.write_string("third").unwrap();

    for _ in 0..5000 {
        received.extend(link.step_strings());
        if link.client.can_reliable() && link.client.message.is_empty() && received.len() >= 3 {
            break;
        }
    }

    assert_eq!(received, vec!["first", "second", "third"]);
}

#[test]
fn test_single_payload_in_flight() {
    let mut link = LossyPair::new(40.0, 99);
    let mut delivered: Vec<u8> = Vec::new();

    for i in 0..600u32 {
        if i % 3 == 0 {
            link.client.message.write_byte((i / 3) as u8).unwrap();
        }

        let before = link.client.reliable_slot().clone();
        for msg in link.step() {
            delivered.extend_from_slice(msg.unread());
        }

        // A payload leaves the slot only once the peer holds all of it.
        if let ReliableSlot::Staged { payload, .. } = before {
            let replaced = match link.client.reliable_slot() {
                ReliableSlot::Idle => true,
                ReliableSlot::Staged { payload: now, .. } => *now != payload,
            };
            if replaced {
                assert!(delivered.windows(payload.len()).any(|w| w == payload.as_slice()));
            }
        }
    }

    // Exactly once and in order.
    assert!(delivered.windows(2).all(|w| w[0] < w[1]));
    assert!(link.client.stats().reliable_resent > 0);
}
