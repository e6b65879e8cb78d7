//! Transport stream and sample stream I/O.

use std::io::{self, Read, Write};

use num_complex::Complex32;

use crate::error::{AtscError, Result};
use crate::segment::{DataSegment, MpegPacket};
use crate::{TS_SIZE, TS_SYNC_BYTE};

/// Full scale of integer samples: nominal level 1.0 maps to this value.
const I16_SCALE: f32 = 1024.0;
const I8_SCALE: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SampleFormat {
    #[clap(name = "f32")]
    F32,
    #[clap(name = "i16")]
    I16,
    #[clap(name = "i8")]
    I8,
}

impl SampleFormat {
    pub fn sample_size(&self) -> usize {
        match self {
            SampleFormat::F32 => 4,
            SampleFormat::I16 => 2,
            SampleFormat::I8 => 1,
        }
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    return Ok(filled);
}

pub struct PacketReader<R> {
    reader: R,
    offset: u64,
    buffer: Vec<u8>,
}

impl<R: Read> PacketReader<R> {
    pub fn new(reader: R) -> PacketReader<R> {
        PacketReader {
            reader,
            offset: 0,
            buffer: Vec::new(),
        }
    }

    /// Up to `max` packets; an empty result means end of stream.
    pub fn read_packets(&mut self, max: usize) -> Result<Vec<MpegPacket>> {
        self.buffer.resize(max * TS_SIZE, 0);
        let n = read_full(&mut self.reader, &mut self.buffer)?;
        if n % TS_SIZE != 0 {
            return Err(AtscError::Truncated {
                expected: TS_SIZE,
                actual: n % TS_SIZE,
            });
        }
        let mut packets = Vec::with_capacity(n / TS_SIZE);
        for chunk in self.buffer[..n].chunks_exact(TS_SIZE) {
            if chunk[0] != TS_SYNC_BYTE {
                return Err(AtscError::InvalidSyncByte {
                    offset: self.offset,
                    found: chunk[0],
                });
            }
            let mut packet = MpegPacket::default();
            packet.data.copy_from_slice(chunk);
            packets.push(packet);
            self.offset += TS_SIZE as u64;
        }
        return Ok(packets);
    }
}

pub fn write_packets<W: Write>(writer: &mut W, packets: &[MpegPacket]) -> Result<()> {
    for p in packets {
        writer.write_all(&p.data)?;
    }
    return Ok(());
}

pub struct SampleReader<R> {
    reader: R,
    format: SampleFormat,
    buffer: Vec<u8>,
}

impl<R: Read> SampleReader<R> {
    pub fn new(reader: R, format: SampleFormat) -> SampleReader<R> {
        SampleReader {
            reader,
            format,
            buffer: Vec::new(),
        }
    }

    fn read_values(&mut self, max: usize, per_record: usize) -> Result<Vec<f32>> {
        let size = self.format.sample_size();
        let record = size * per_record;
        self.buffer.resize(max * record, 0);
        let n = read_full(&mut self.reader, &mut self.buffer)?;
        if n % record != 0 {
            return Err(AtscError::Truncated {
                expected: record,
                actual: n % record,
            });
        }
        let bytes = &self.buffer[..n];
        let values = match self.format {
            SampleFormat::F32 => bytes
                .chunks_exact(size)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            SampleFormat::I16 => bytes
                .chunks_exact(size)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / I16_SCALE)
                .collect(),
            SampleFormat::I8 => bytes
                .iter()
                .map(|b| i8::from_le_bytes([*b]) as f32 / I8_SCALE)
                .collect(),
        };
        return Ok(values);
    }

    /// Up to `max` real samples; an empty result means end of stream.
    pub fn read_real(&mut self, max: usize) -> Result<Vec<f32>> {
        self.read_values(max, 1)
    }

    /// Up to `max` interleaved I/Q samples.
    pub fn read_complex(&mut self, max: usize) -> Result<Vec<Complex32>> {
        let values = self.read_values(max, 2)?;
        return Ok(values
            .chunks_exact(2)
            .map(|iq| Complex32::new(iq[0], iq[1]))
            .collect());
    }
}

pub fn write_samples<W: Write>(
    writer: &mut W,
    samples: &[f32],
    format: SampleFormat,
) -> Result<()> {
    let mut buffer = Vec::with_capacity(samples.len() * format.sample_size());
    for &s in samples {
        match format {
            SampleFormat::F32 => buffer.extend_from_slice(&s.to_le_bytes()),
            SampleFormat::I16 => {
                let v = (s * I16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                buffer.extend_from_slice(&v.to_le_bytes());
            }
            SampleFormat::I8 => {
                let v = (s * I8_SCALE).round().clamp(i8::MIN as f32, i8::MAX as f32) as i8;
                buffer.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    writer.write_all(&buffer)?;
    return Ok(());
}

/// Write segments as nominal 8-VSB levels.
pub fn write_segments<W: Write>(
    writer: &mut W,
    segments: &[DataSegment],
    format: SampleFormat,
) -> Result<()> {
    for seg in segments {
        write_samples(writer, &seg.to_levels(), format)?;
    }
    return Ok(());
}
