use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tracing::{error, info, warn};
use vita49_frame::Packet;
use vita49_stream::{
    ContextReader, Diagnostic, DispatchMode, EventFanout, InitialContext, LegacyReader,
    ReaderConfig, VrtReader,
};
use vita49_transport::TransportConfig;

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{stream_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_initial_context, print_packet, OutputFormat};

/// How often the print loop checks the interrupt flag.
const EVENT_POLL: Duration = Duration::from_millis(100);

enum Event {
    Packet(Packet),
    InitialContext(InitialContext),
    Diagnostic(Diagnostic),
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ReaderConfig {
        transport: TransportConfig {
            device: args.device.clone(),
            read_timeout: parse_duration(&args.read_timeout)?,
            ..TransportConfig::new(args.host.as_str(), args.port)
        },
        discovery_timeout: parse_duration(&args.discovery_timeout)?,
        ..ReaderConfig::default()
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;
    let (tx, rx) = mpsc::channel();

    if args.legacy {
        let reader =
            LegacyReader::open(config).map_err(|err| stream_error("open failed", err))?;
        let packets = tx.clone();
        reader.fanout().on_received(None, move |p| {
            let _ = packets.send(Event::Packet(p.clone()));
        });
        serve(reader, tx, &rx, &running, args.count, format)
    } else {
        let reader =
            ContextReader::open(config).map_err(|err| stream_error("open failed", err))?;
        let fanout = reader.fanout();
        let initial = tx.clone();
        fanout.on_initial_context(None, move |ctx| {
            let _ = initial.send(Event::InitialContext(ctx.clone()));
        });
        let data = tx.clone();
        fanout.on_data(None, move |d| {
            let _ = data.send(Event::Packet(d.packet().clone()));
        });
        let context = tx.clone();
        fanout.on_context(None, move |c| {
            let _ = context.send(Event::Packet(c.packet().clone()));
        });
        serve(reader, tx, &rx, &running, args.count, format)
    }
}

fn serve<M: DispatchMode>(
    reader: VrtReader<M>,
    tx: mpsc::Sender<Event>,
    rx: &mpsc::Receiver<Event>,
    running: &AtomicBool,
    count: Option<usize>,
    format: OutputFormat,
) -> CliResult<i32> {
    subscribe_diagnostics(reader.fanout(), tx);
    reader
        .start()
        .map_err(|err| stream_error("start failed", err))?;
    info!(addr = %reader.local_addr(), "listening");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let event = match rx.recv_timeout(EVENT_POLL) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        match event {
            Event::Packet(packet) => {
                print_packet(&packet, format);
                printed = printed.saturating_add(1);
                if count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Event::InitialContext(initial) => print_initial_context(&initial, format),
            Event::Diagnostic(diag) if diag.is_error() => error!(
                stream_id = diag.stream_id,
                "{}", diag.message
            ),
            Event::Diagnostic(diag) => warn!(stream_id = diag.stream_id, "{}", diag.message),
        }
    }

    reader
        .close()
        .map_err(|err| stream_error("close failed", err))?;
    Ok(SUCCESS)
}

fn subscribe_diagnostics<M>(fanout: &EventFanout<M>, tx: mpsc::Sender<Event>) {
    fanout.on_diagnostic(None, move |d| {
        let _ = tx.send(Event::Diagnostic(d.clone()));
    });
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
