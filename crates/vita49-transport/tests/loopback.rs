use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use vita49_transport::{DatagramTransport, TransportConfig, TransportError};

fn config(port: u16, read_timeout: Duration) -> TransportConfig {
    TransportConfig {
        read_timeout,
        buffer_size: 256 * 1024,
        ..TransportConfig::new("127.0.0.1", port)
    }
}

struct Running {
    transport: Arc<DatagramTransport>,
    stop: Arc<AtomicBool>,
    rx: mpsc::Receiver<Vec<u8>>,
    handle: thread::JoinHandle<()>,
}

fn spawn_loop(read_timeout: Duration) -> Running {
    spawn_loop_with(config(0, read_timeout))
}

fn spawn_loop_with(config: TransportConfig) -> Running {
    let transport = Arc::new(DatagramTransport::receiver(config).unwrap());
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let handle = {
        let transport = Arc::clone(&transport);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            transport.receive_loop(
                &stop,
                |datagram| {
                    let _ = tx.send(datagram.to_vec());
                },
                |_err| {},
            );
        })
    };

    Running {
        transport,
        stop,
        rx,
        handle,
    }
}

impl Running {
    fn sender(&self) -> DatagramTransport {
        let port = self.transport.local_addr().port();
        DatagramTransport::sender(config(port, Duration::from_millis(50))).unwrap()
    }

    fn finish(self) {
        self.stop.store(true, Ordering::Release);
        self.handle.join().unwrap();
    }
}

#[test]
fn receive_loop_delivers_in_order() {
    let running = spawn_loop(Duration::from_millis(20));
    let sender = running.sender();

    for i in 0..10u8 {
        sender.send(&[i, 0, 0, 0]).unwrap();
    }
    for i in 0..10u8 {
        let got = running.rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, vec![i, 0, 0, 0]);
    }
    running.finish();
}

#[test]
fn reconnect_swaps_socket_under_running_loop() {
    let running = spawn_loop(Duration::from_millis(20));
    // Let the loop register itself.
    thread::sleep(Duration::from_millis(50));
    let before = running.transport.generation();

    running.transport.reconnect().unwrap();
    assert_ne!(running.transport.generation(), before);

    // The reopened socket keeps the original port.
    let sender = running.sender();
    sender.send(b"after").unwrap();
    let got = running.rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(got, b"after");
    running.finish();
}

#[test]
fn reconnect_without_address_reuse_rebinds_port() {
    let running = spawn_loop_with(TransportConfig {
        reuse_address: false,
        ..config(0, Duration::from_millis(20))
    });
    thread::sleep(Duration::from_millis(50));
    let port = running.transport.local_addr().port();

    running.transport.reconnect().unwrap();
    assert_eq!(running.transport.local_addr().port(), port);

    let sender = running.sender();
    sender.send(b"rebound").unwrap();
    let got = running.rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(got, b"rebound");
    running.finish();
}

#[test]
fn loop_reopen_error_is_returned_to_caller() {
    let running = spawn_loop_with(TransportConfig {
        reuse_address: false,
        ..config(0, Duration::from_millis(20))
    });
    thread::sleep(Duration::from_millis(50));
    // An outside handle keeps the port bound, so the loop's rebind fails.
    let pinned = running.transport.current().unwrap();

    let err = running.transport.reconnect().unwrap_err();
    match err {
        TransportError::ReconnectFailed(inner) => {
            assert!(matches!(*inner, TransportError::Bind { .. }), "{inner}")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(running.transport.generation(), pinned.generation());

    // The loop keeps receiving on the original socket.
    let sender = running.sender();
    sender.send(b"still").unwrap();
    let got = running.rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(got, b"still");
    running.finish();
}

#[test]
fn second_concurrent_reconnect_fails_fast() {
    // A long read timeout keeps the first request pending for a while.
    let running = spawn_loop(Duration::from_millis(400));
    thread::sleep(Duration::from_millis(50));

    let first = {
        let transport = Arc::clone(&running.transport);
        thread::spawn(move || transport.reconnect())
    };
    thread::sleep(Duration::from_millis(50));
    assert!(matches!(
        running.transport.reconnect(),
        Err(TransportError::ReconnectInProgress)
    ));

    first.join().unwrap().unwrap();
    running.finish();
}

#[test]
fn stop_flag_ends_loop_within_timeout() {
    let running = spawn_loop(Duration::from_millis(20));
    thread::sleep(Duration::from_millis(30));
    let started = std::time::Instant::now();
    running.finish();
    assert!(started.elapsed() < Duration::from_secs(1));
}
