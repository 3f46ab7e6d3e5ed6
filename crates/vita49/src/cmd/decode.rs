use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use vita49_frame::{Packet, PacketReader};

use crate::cmd::DecodeArgs;
use crate::exit::{codec_error, io_error, CliResult, SUCCESS};
use crate::output::{print_packet, print_packets, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input: Box<dyn Read> = if args.input == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&args.input).map_err(|err| {
            io_error(&format!("failed opening {}", args.input.display()), err)
        })?;
        Box::new(BufReader::new(file))
    };
    decode(PacketReader::new(input), format)
}

fn decode<R: Read>(reader: PacketReader<R>, format: OutputFormat) -> CliResult<i32> {
    // Tables are printed whole, other formats stream.
    let mut table_rows: Vec<Packet> = Vec::new();
    let mut failure = None;
    for packet in reader {
        match packet {
            Ok(packet) if matches!(format, OutputFormat::Table) => table_rows.push(packet),
            Ok(packet) => print_packet(&packet, format),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }
    if !table_rows.is_empty() {
        print_packets(&table_rows, format);
    }
    match failure {
        Some(err) => Err(codec_error("decode failed", err)),
        None => Ok(SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::exit::DATA_INVALID;

    #[test]
    fn bad_capture_exit_codes() {
        let mut buf = Packet::data(Some(1), vec![0u8; 8]).to_bytes().unwrap().to_vec();
        buf.truncate(buf.len() - 2);

        let err = decode(PacketReader::new(Cursor::new(buf)), OutputFormat::Json)
            .unwrap_err();
        assert_eq!(err.code, crate::exit::FAILURE);

        let garbage = vec![0xF0u8, 0, 0, 1];
        let err = decode(PacketReader::new(Cursor::new(garbage)), OutputFormat::Json)
            .unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
