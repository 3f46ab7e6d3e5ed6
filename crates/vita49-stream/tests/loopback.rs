use std::net::UdpSocket;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use bytes::BytesMut;
use vita49_frame::{encode_frame, ContextAssocLists, ContextPacket, Packet};
use vita49_stream::{
    ContextReader, DiscoveryError, LegacyReader, ReaderConfig, Severity, StreamError, VrtWriter,
    WriterConfig,
};
use vita49_transport::TransportConfig;

const WAIT: Duration = Duration::from_secs(3);

fn reader_config() -> ReaderConfig {
    ReaderConfig {
        transport: TransportConfig {
            read_timeout: Duration::from_millis(20),
            buffer_size: 256 * 1024,
            ..TransportConfig::new("127.0.0.1", 0)
        },
        poll_interval: Duration::from_millis(2),
        ..ReaderConfig::default()
    }
}

fn writer_to(port: u16, framing: bool) -> VrtWriter {
    let mut config = WriterConfig::new("127.0.0.1", port).with_framing(framing, true);
    config.transport.buffer_size = 256 * 1024;
    VrtWriter::open(config).unwrap()
}

fn data(sid: u32) -> Packet {
    Packet::data(Some(sid), vec![0u8; 8])
}

fn send_raw(port: u16, packets: &[Packet]) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    for packet in packets {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        socket.send_to(&buf, ("127.0.0.1", port)).unwrap();
    }
}

#[test]
fn legacy_reader_delivers_in_wire_order() {
    let reader = LegacyReader::open(reader_config()).unwrap();
    let (tx, rx) = mpsc::channel();
    reader.fanout().on_received(None, move |p| {
        let _ = tx.send(p.stream_id);
    });
    reader.start().unwrap();

    let writer = writer_to(reader.local_addr().port(), true);
    let batch: Vec<Packet> = [1, 2, 3, 1].into_iter().map(data).collect();
    writer.send_packets(&batch).unwrap();

    let got: Vec<Option<u32>> = (0..4).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
    assert_eq!(got, vec![Some(1), Some(2), Some(3), Some(1)]);
    reader.close().unwrap();
}

#[test]
fn context_reader_reports_initial_context_then_streams() {
    let reader = ContextReader::open(reader_config()).unwrap();
    let (init_tx, init_rx) = mpsc::channel();
    let (data_tx, data_rx) = mpsc::channel();
    reader.fanout().on_initial_context(None, move |ctx| {
        let _ = init_tx.send(ctx.clone());
    });
    reader.fanout().on_data(None, move |d| {
        let _ = data_tx.send(d.stream_id);
    });
    reader.start().unwrap();

    let writer = writer_to(reader.local_addr().port(), false);
    let mut context = ContextPacket::with_stream_id(7);
    context.set_bandwidth(Some(1.0e6));
    writer.send_packet(&data(7)).unwrap();
    writer.send_packet(context.packet()).unwrap();

    let initial = init_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(initial.error, None);
    assert_eq!(initial.stream_id(), Some(7));
    assert_eq!(initial.contexts.keys().copied().collect::<Vec<_>>(), vec![7]);
    assert_eq!(
        initial.context.as_ref().and_then(ContextPacket::bandwidth),
        Some(1.0e6)
    );

    // Discovery consumed the first data packet.
    assert!(data_rx.recv_timeout(Duration::from_millis(100)).is_err());
    writer.send_packet(&data(7)).unwrap();
    assert_eq!(data_rx.recv_timeout(WAIT).unwrap(), Some(7));
    reader.close().unwrap();
}

#[test]
fn missing_linked_context_reported_after_timeout() {
    let config = reader_config().with_discovery_timeout(Duration::from_millis(200));
    let reader = ContextReader::open(config).unwrap();
    let (tx, rx) = mpsc::channel();
    reader.fanout().on_initial_context(None, move |ctx| {
        let _ = tx.send(ctx.clone());
    });
    reader.start().unwrap();

    let mut context = ContextPacket::with_stream_id(7);
    let lists = ContextAssocLists {
        source: vec![9],
        ..Default::default()
    };
    context.set_association_lists(Some(&lists)).unwrap();
    send_raw(reader.local_addr().port(), &[data(7), context.into_packet()]);

    let initial = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(
        initial.error,
        Some(DiscoveryError::RequiredContextMissing { missing: vec![9] })
    );
    assert_eq!(initial.contexts.len(), 1);
    reader.close().unwrap();
}

#[test]
fn packet_counter_gap_raises_warning() {
    let reader = LegacyReader::open(reader_config()).unwrap();
    let (tx, rx) = mpsc::channel();
    reader.fanout().on_diagnostic(None, move |d| {
        let _ = tx.send(d.clone());
    });
    let (pkt_tx, pkt_rx) = mpsc::channel();
    reader.fanout().on_received(None, move |p| {
        let _ = pkt_tx.send(p.packet_count);
    });
    reader.start().unwrap();

    let packets: Vec<Packet> = [0u8, 1, 3]
        .into_iter()
        .map(|count| {
            let mut p = data(5);
            p.packet_count = count;
            p
        })
        .collect();
    send_raw(reader.local_addr().port(), &packets);

    let diag = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(diag.severity, Severity::Warning);
    assert_eq!(diag.message, "packet counter gap: expected 2, got 3 (1 missing)");
    assert_eq!(diag.stream_id, Some(5));

    // The packet revealing the gap is still delivered.
    let counts: Vec<u8> = (0..3).map(|_| pkt_rx.recv_timeout(WAIT).unwrap()).collect();
    assert_eq!(counts, vec![0, 1, 3]);
    reader.close().unwrap();
}

#[test]
fn corrupt_frame_is_reported_and_skipped() {
    let reader = LegacyReader::open(reader_config()).unwrap();
    let (tx, rx) = mpsc::channel();
    reader.fanout().on_diagnostic(None, move |d| {
        let _ = tx.send(d.clone());
    });
    let (pkt_tx, pkt_rx) = mpsc::channel();
    reader.fanout().on_received(None, move |p| {
        let _ = pkt_tx.send(p.stream_id);
    });
    reader.start().unwrap();

    let mut frame = BytesMut::new();
    encode_frame(0, &[data(3)], 1024, true, &mut frame).unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let target = ("127.0.0.1", reader.local_addr().port());
    socket.send_to(&frame, target).unwrap();

    let diag = rx.recv_timeout(WAIT).unwrap();
    assert!(diag.is_error());
    assert!(diag.message.starts_with("corrupt frame"), "{}", diag.message);

    send_raw(reader.local_addr().port(), &[data(4)]);
    assert_eq!(pkt_rx.recv_timeout(WAIT).unwrap(), Some(4));
    reader.close().unwrap();
}

#[test]
fn reconnect_replaces_socket_and_keeps_receiving() {
    let reader = LegacyReader::open(reader_config()).unwrap();
    let (tx, rx) = mpsc::channel();
    reader.fanout().on_received(None, move |p| {
        let _ = tx.send(p.stream_id);
    });
    reader.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let before = reader.generation();
    let port = reader.local_addr().port();
    reader.reconnect().unwrap();
    assert_ne!(reader.generation(), before);
    assert_eq!(reader.local_addr().port(), port);

    send_raw(port, &[data(11)]);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(11));
    reader.close().unwrap();
}

#[test]
fn stop_from_listener_fails_fast() {
    let reader = Arc::new(LegacyReader::open(reader_config()).unwrap());
    let (tx, rx) = mpsc::channel();
    {
        let weak = Arc::downgrade(&reader);
        reader.fanout().on_received(None, move |_| {
            if let Some(reader) = weak.upgrade() {
                let _ = tx.send(reader.stop());
            }
        });
    }
    reader.start().unwrap();
    send_raw(reader.local_addr().port(), &[data(1)]);

    let result = rx.recv_timeout(WAIT).unwrap();
    assert!(matches!(result, Err(StreamError::StopFromReaderThread)));
    assert!(reader.is_running());
    reader.stop().unwrap();
    assert!(!reader.is_running());
}

#[test]
fn stop_from_listener_detected_on_first_dispatch() {
    let reader = Arc::new(LegacyReader::open(reader_config()).unwrap());
    let (tx, rx) = mpsc::channel();
    {
        let weak = Arc::downgrade(&reader);
        reader.fanout().on_received(None, move |_| {
            if let Some(reader) = weak.upgrade() {
                let _ = tx.send(reader.stop());
            }
        });
    }
    // Already waiting in the socket buffer, so dispatch begins as soon as
    // the threads are up.
    send_raw(reader.local_addr().port(), &[data(1), data(1)]);
    reader.start().unwrap();

    for _ in 0..2 {
        let result = rx.recv_timeout(WAIT).unwrap();
        assert!(matches!(result, Err(StreamError::StopFromReaderThread)));
    }
    reader.stop().unwrap();
}

#[test]
fn receive_packet_unpacks_frames_synchronously() {
    let reader = LegacyReader::open(reader_config()).unwrap();
    let writer = writer_to(reader.local_addr().port(), true);
    writer.send_packets(&[data(1), data(2)]).unwrap();

    let first = reader.receive_packet(WAIT).unwrap();
    let second = reader.receive_packet(WAIT).unwrap();
    assert_eq!((first.stream_id, second.stream_id), (Some(1), Some(2)));
}
