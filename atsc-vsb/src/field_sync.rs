//! Field sync segments and the multiplexer that inserts them.
//!
//! ```text
//! | 4 sync | PN511 | PN63 | PN63 (inverted in field 2) | PN63 |
//! | 24 VSB mode | 92 reserved | 12 precode |
//! ```
//!
//! The last 12 symbols repeat the last 12 symbols of the previous field's
//! final data segment.

use std::sync::OnceLock;

use crate::block::{Block, Work};
use crate::plinfo::PipelineInfo;
use crate::segment::DataSegment;
use crate::{symbol_level, SEGMENT_SIZE, SEGMENT_SYNC, SEGMENT_SYNC_LEN};

pub const PN511_LEN: usize = 511;
pub const PN63_LEN: usize = 63;
pub const PN511_OFFSET: usize = SEGMENT_SYNC_LEN;
pub const PN63_OFFSET: usize = PN511_OFFSET + PN511_LEN;
/// The second PN63, whose polarity tells field 1 from field 2.
pub const PN63_FIELD_OFFSET: usize = PN63_OFFSET + PN63_LEN;
pub const VSB_MODE_OFFSET: usize = PN63_OFFSET + 3 * PN63_LEN;
pub const RESERVED_OFFSET: usize = VSB_MODE_OFFSET + VSB_MODE.len();
pub const RESERVED_LEN: usize = 92;
pub const PRECODE_LEN: usize = 12;
/// Symbols of the field sync known in advance, usable as equalizer training.
pub const TRAINING_LEN: usize = VSB_MODE_OFFSET;

const VSB_MODE: [u8; 24] = [
    0, 0, 0, 0, 1, 0, 1, 0, 0, 1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 1, 1, 0, 1, 0,
];

/// Code of a binary field sync symbol: 0 is -5, 1 is +5.
const BIN_MAP: [u8; 2] = [1, 6];

static PN511: OnceLock<Vec<u8>> = OnceLock::new();
static PN63: OnceLock<Vec<u8>> = OnceLock::new();

/// Maximal length sequence from a Fibonacci LFSR. Bit `t - 1` of the state
/// holds the register stage of tap `t`; the output is the top stage.
fn pn_sequence(taps: &[u32], degree: u32, preload: u16, len: usize) -> Vec<u8> {
    let mask = (1u16 << degree) - 1;
    let mut state = preload;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(((state >> (degree - 1)) & 1) as u8);
        let mut feedback = 0;
        for t in taps {
            feedback ^= (state >> (t - 1)) & 1;
        }
        state = ((state << 1) | feedback) & mask;
    }
    return out;
}

pub fn pn511() -> &'static [u8] {
    PN511.get_or_init(|| pn_sequence(&[2, 3, 5, 6, 8, 9], 9, 0b000000010, PN511_LEN))
}

pub fn pn63() -> &'static [u8] {
    PN63.get_or_init(|| pn_sequence(&[5, 6], 6, 0b111001, PN63_LEN))
}

/// Complete field sync segment as symbol codes.
pub fn field_sync_symbols(field2: bool, saved_symbols: &[u8; PRECODE_LEN]) -> [u8; SEGMENT_SIZE] {
    let mut out = [0u8; SEGMENT_SIZE];
    out[..SEGMENT_SYNC_LEN].copy_from_slice(&SEGMENT_SYNC);
    for (o, b) in out[PN511_OFFSET..].iter_mut().zip(pn511()) {
        *o = BIN_MAP[*b as usize];
    }
    let invert = field2 as u8;
    for (i, b) in pn63().iter().enumerate() {
        out[PN63_OFFSET + i] = BIN_MAP[*b as usize];
        out[PN63_FIELD_OFFSET + i] = BIN_MAP[(*b ^ invert) as usize];
        out[PN63_FIELD_OFFSET + PN63_LEN + i] = BIN_MAP[*b as usize];
    }
    for (o, b) in out[VSB_MODE_OFFSET..].iter_mut().zip(VSB_MODE.iter()) {
        *o = BIN_MAP[*b as usize];
    }
    for j in 0..RESERVED_LEN {
        out[RESERVED_OFFSET + j] = BIN_MAP[j & 1];
    }
    out[SEGMENT_SIZE - PRECODE_LEN..].copy_from_slice(saved_symbols);
    return out;
}

/// Known leading part of the field sync as nominal levels.
pub fn training_sequence(field2: bool) -> [f32; TRAINING_LEN] {
    let symbols = field_sync_symbols(field2, &[0; PRECODE_LEN]);
    let mut out = [0f32; TRAINING_LEN];
    for (o, s) in out.iter_mut().zip(symbols.iter()) {
        *o = symbol_level(*s);
    }
    return out;
}

/// Inserts a field sync segment ahead of data segment 0 of every field.
#[derive(Debug, Clone)]
pub struct FieldSyncMux {
    already_output_field_sync: bool,
    saved_symbols: [u8; PRECODE_LEN],
}

impl Default for FieldSyncMux {
    fn default() -> Self {
        FieldSyncMux::new()
    }
}

impl FieldSyncMux {
    pub fn new() -> FieldSyncMux {
        FieldSyncMux {
            already_output_field_sync: false,
            saved_symbols: [0; PRECODE_LEN],
        }
    }
}

impl Block for FieldSyncMux {
    type Input = DataSegment;
    type Output = DataSegment;

    fn work(&mut self, input: &[DataSegment], output: &mut [DataSegment]) -> Work {
        let mut consumed = 0;
        let mut produced = 0;
        while consumed < input.len() && produced < output.len() {
            let seg = &input[consumed];
            assert!(seg.pli.is_regular(), "field sync mux fed a field sync segment");
            if seg.pli.is_first_regular() && !self.already_output_field_sync {
                output[produced] = DataSegment {
                    pli: PipelineInfo::field_sync(seg.pli.in_field2()),
                    data: field_sync_symbols(seg.pli.in_field2(), &self.saved_symbols),
                };
                self.already_output_field_sync = true;
                produced += 1;
                continue;
            }
            if seg.pli.is_last_regular() {
                self.saved_symbols
                    .copy_from_slice(&seg.data[SEGMENT_SIZE - PRECODE_LEN..]);
            }
            output[produced] = seg.clone();
            self.already_output_field_sync = false;
            consumed += 1;
            produced += 1;
        }
        return Work::new(consumed, produced);
    }

    fn reset(&mut self) {
        self.already_output_field_sync = false;
        self.saved_symbols = [0; PRECODE_LEN];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DATA_SEGMENTS_PER_FIELD;

    fn bits(seq: &[u8]) -> String {
        seq.iter().map(|b| if *b == 1 { '1' } else { '0' }).collect()
    }

    #[test]
    fn test_pn_sequences() {
        let pn511 = pn511();
        let pn63 = pn63();
        assert_eq!(pn511.len(), PN511_LEN);
        assert_eq!(pn63.len(), PN63_LEN);
        assert_eq!(bits(&pn511[..24]), "000000010111111111001010");
        assert_eq!(bits(&pn63[..24]), "111001001011011101100110");
        // maximal length sequences are balanced to within one
        assert_eq!(pn511.iter().filter(|&&b| b == 1).count(), 256);
        assert_eq!(pn63.iter().filter(|&&b| b == 1).count(), 32);
    }

    #[test]
    fn test_field_sync_layout() {
        let saved = [7u8; PRECODE_LEN];
        let f1 = field_sync_symbols(false, &saved);
        let f2 = field_sync_symbols(true, &saved);
        assert_eq!(RESERVED_OFFSET + RESERVED_LEN + PRECODE_LEN, SEGMENT_SIZE);
        assert_eq!(f1[..4], SEGMENT_SYNC);
        assert_eq!(f1[SEGMENT_SIZE - PRECODE_LEN..], saved);
        assert!(f1[..SEGMENT_SIZE - PRECODE_LEN]
            .iter()
            .all(|&z| z == 1 || z == 6));
        for i in 0..SEGMENT_SIZE {
            let in_middle_pn63 = (PN63_FIELD_OFFSET..PN63_FIELD_OFFSET + PN63_LEN).contains(&i);
            if in_middle_pn63 {
                assert_ne!(f1[i], f2[i]);
            } else {
                assert_eq!(f1[i], f2[i]);
            }
        }
    }

    #[test]
    fn test_training_sequence() {
        let t = training_sequence(true);
        assert_eq!(t[..4], [5.0, -5.0, -5.0, 5.0]);
        assert!(t.iter().all(|&l| l == 5.0 || l == -5.0));
    }

    #[test]
    fn test_mux_inserts_field_sync() {
        let mut pli = PipelineInfo::regular(true, 300);
        let mut input = Vec::new();
        for i in 0..30 {
            let mut seg = DataSegment::default();
            seg.pli = pli;
            seg.data.fill((i % 8) as u8);
            input.push(seg);
            pli = pli.next();
        }
        let out = FieldSyncMux::new().run(&input);
        assert_eq!(out.len(), input.len() + 1);
        let sync_pos = DATA_SEGMENTS_PER_FIELD - 300;
        assert!(out[sync_pos].pli.is_field_sync());
        assert!(!out[sync_pos].pli.in_field2());
        assert_eq!(out[sync_pos + 1].pli, PipelineInfo::regular(false, 0));
        let last = &input[sync_pos - 1];
        assert!(last.pli.is_last_regular());
        assert_eq!(
            out[sync_pos].data[SEGMENT_SIZE - PRECODE_LEN..],
            last.data[SEGMENT_SIZE - PRECODE_LEN..]
        );
    }

    #[test]
    fn test_mux_across_small_output_buffers() {
        let mut seg = DataSegment::default();
        seg.pli = PipelineInfo::regular(false, 0);
        let mut mux = FieldSyncMux::new();
        let mut out = vec![DataSegment::default(); 1];
        let w = mux.work(std::slice::from_ref(&seg), &mut out);
        assert_eq!(w, Work::new(0, 1));
        assert!(out[0].pli.is_field_sync());
        let w = mux.work(std::slice::from_ref(&seg), &mut out);
        assert_eq!(w, Work::new(1, 1));
        assert_eq!(out[0].pli, seg.pli);
    }
}
