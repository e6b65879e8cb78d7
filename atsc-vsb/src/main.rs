use std::fs;
use std::io;
use std::io::Write;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use atsc_vsb::io::{write_packets, write_segments, PacketReader, SampleFormat, SampleReader};
use atsc_vsb::{DecoderKind, Receiver, ReceiverConfig, Transmitter, SEGMENT_SIZE, TS_SIZE};

const PACKETS_PER_READ: usize = 156;
const SAMPLES_PER_READ: usize = SEGMENT_SIZE * 16;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a transport stream into 8-VSB symbols
    Modulate {
        #[arg(short, long)]
        input: Option<String>,
        #[arg(short, long)]
        output: String,
        #[arg(value_enum, long, default_value_t = SampleFormat::F32)]
        format: SampleFormat,
    },
    /// Recover a transport stream from 8-VSB baseband samples
    Demodulate {
        #[arg(short, long)]
        input: Option<String>,
        #[arg(short, long)]
        output: String,
        #[arg(value_enum, long, default_value_t = SampleFormat::F32)]
        format: SampleFormat,
        /// Input is interleaved I/Q
        #[arg(long)]
        complex: bool,
        /// Take the real part of complex input without carrier tracking
        #[arg(long)]
        no_fpll: bool,
        #[arg(value_enum, long, default_value_t = DecoderKind::Viterbi)]
        decoder: DecoderKind,
        /// Sample rate divided by symbol rate
        #[arg(long, default_value_t = 1.0)]
        ratio: f64,
        /// Packets between statistics reports, 0 to disable
        #[arg(long, default_value_t = 10000)]
        stats_interval: u64,
    },
}

fn open_input(input: &Option<String>) -> Result<Box<dyn io::Read>> {
    let reader: Box<dyn io::Read> = if let Some(input) = input {
        Box::new(io::BufReader::new(
            fs::OpenOptions::new()
                .read(true)
                .open(input)
                .with_context(|| format!("opening {input}"))?,
        ))
    } else {
        Box::new(io::BufReader::new(std::io::stdin()))
    };
    return Ok(reader);
}

fn open_output(output: &str, capacity: usize) -> Result<io::BufWriter<fs::File>> {
    let out_file = fs::OpenOptions::new()
        .truncate(true)
        .create(true)
        .write(true)
        .open(output)
        .with_context(|| format!("creating {output}"))?;
    return Ok(io::BufWriter::with_capacity(capacity, out_file));
}

fn modulate(input: &Option<String>, output: &str, format: SampleFormat) -> Result<()> {
    let mut reader = PacketReader::new(open_input(input)?);
    let mut writer = open_output(output, SEGMENT_SIZE * format.sample_size() * 16)?;
    let mut tx = Transmitter::new();
    let mut packets_in = 0u64;
    loop {
        let packets = reader.read_packets(PACKETS_PER_READ)?;
        if packets.is_empty() {
            break;
        }
        packets_in += packets.len() as u64;
        let segments = tx.push_packets(&packets);
        write_segments(&mut writer, &segments, format)?;
    }
    writer.flush()?;
    info!(packets = packets_in, segments = tx.segments_out(), "modulation done");
    return Ok(());
}

fn demodulate(
    input: &Option<String>,
    output: &str,
    format: SampleFormat,
    complex: bool,
    config: ReceiverConfig,
) -> Result<()> {
    let mut reader = SampleReader::new(open_input(input)?, format);
    let mut writer = open_output(output, TS_SIZE * 40)?;
    let mut rx = Receiver::new(config);
    loop {
        let packets = if complex {
            let samples = reader.read_complex(SAMPLES_PER_READ)?;
            if samples.is_empty() {
                break;
            }
            rx.push_complex(&samples)
        } else {
            let samples = reader.read_real(SAMPLES_PER_READ)?;
            if samples.is_empty() {
                break;
            }
            rx.push_samples(&samples)
        };
        write_packets(&mut writer, &packets)?;
    }
    writer.flush()?;
    let d = rx.diagnostics();
    info!(
        packets = d.packets_out,
        corrected = d.rs.corrected_symbols,
        bad = d.rs.bad_packets,
        "demodulation done"
    );
    return Ok(());
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "atsc_vsb=debug" } else { "atsc_vsb=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(io::stderr)
        .init();

    match &args.command {
        Command::Modulate {
            input,
            output,
            format,
        } => modulate(input, output, *format),
        Command::Demodulate {
            input,
            output,
            format,
            complex,
            no_fpll,
            decoder,
            ratio,
            stats_interval,
        } => {
            ensure!(*ratio >= 1.0, "--ratio must be at least 1.0, got {ratio}");
            let config = ReceiverConfig::default()
                .with_ratio(*ratio)
                .with_decoder(*decoder)
                .with_fpll(!*no_fpll)
                .with_stats_interval(*stats_interval);
            demodulate(input, output, *format, *complex, config)
        }
    }
}
