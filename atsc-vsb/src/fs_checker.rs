//! Frame sync checker.
//!
//! Looks for the PN511 of a field sync segment in the stream of timing
//! aligned segments. Once found, the polarity of the middle PN63 tells which
//! field starts, and the following 312 segments are tagged with their
//! position. Segments seen while unlocked are dropped.

use tracing::{debug, info, warn};

use crate::block::{Block, Work};
use crate::field_sync::{pn511, pn63, PN511_OFFSET, PN63_FIELD_OFFSET};
use crate::plinfo::PipelineInfo;
use crate::segment::SoftDataSegment;
use crate::{DATA_SEGMENTS_PER_FIELD, SEGMENT_SIZE};

const PN511_ERROR_LIMIT: usize = 20;
const PN63_ERROR_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSyncMatch {
    /// Not a field sync segment.
    None { pn511_errors: usize },
    /// Field sync of field 1 or 2.
    Field {
        field2: bool,
        pn511_errors: usize,
        pn63_errors: usize,
    },
    /// PN511 matched but the PN63 polarity is unclear.
    Ambiguous { pn511_errors: usize, pn63_errors: usize },
}

fn count_errors(data: &[f32], reference: &[u8]) -> usize {
    return data
        .iter()
        .zip(reference.iter())
        .filter(|(x, b)| (**x >= 0.0) as u8 != **b)
        .count();
}

/// Hard-decide the PN511 and the middle PN63 of `data`.
pub fn match_field_sync(data: &[f32; SEGMENT_SIZE]) -> FieldSyncMatch {
    let pn511_errors = count_errors(&data[PN511_OFFSET..], pn511());
    if pn511_errors > PN511_ERROR_LIMIT {
        return FieldSyncMatch::None { pn511_errors };
    }
    let pn63_errors = count_errors(&data[PN63_FIELD_OFFSET..], pn63());
    if pn63_errors <= PN63_ERROR_LIMIT {
        return FieldSyncMatch::Field {
            field2: false,
            pn511_errors,
            pn63_errors,
        };
    }
    if pn63_errors >= pn63().len() - PN63_ERROR_LIMIT {
        return FieldSyncMatch::Field {
            field2: true,
            pn511_errors,
            pn63_errors,
        };
    }
    return FieldSyncMatch::Ambiguous {
        pn511_errors,
        pn63_errors,
    };
}

#[derive(Debug, Clone, Default)]
pub struct FsChecker {
    /// 0 while unlocked, else the field being tagged.
    field_num: u8,
    /// Number the next data segment gets.
    segno: usize,
}

impl FsChecker {
    pub fn new() -> FsChecker {
        FsChecker {
            field_num: 0,
            segno: 0,
        }
    }

    pub fn field_num(&self) -> u8 {
        self.field_num
    }

    pub fn is_locked(&self) -> bool {
        self.field_num != 0
    }

    /// Tag one segment. Returns None for dropped segments.
    pub fn check(&mut self, segment: &SoftDataSegment) -> Option<SoftDataSegment> {
        match match_field_sync(&segment.data) {
            FieldSyncMatch::Field {
                field2,
                pn511_errors,
                pn63_errors,
            } => {
                if !self.is_locked() {
                    info!(field = field2 as u8 + 1, "field sync found");
                }
                debug!(pn511_errors, pn63_errors, "field sync");
                self.field_num = if field2 { 2 } else { 1 };
                self.segno = 0;
                return Some(SoftDataSegment {
                    pli: PipelineInfo::field_sync(field2),
                    data: segment.data,
                });
            }
            FieldSyncMatch::Ambiguous {
                pn511_errors,
                pn63_errors,
            } => {
                warn!(pn511_errors, pn63_errors, "field sync with unclear field polarity");
                self.field_num = 0;
                self.segno = 0;
                return None;
            }
            FieldSyncMatch::None { .. } => {}
        }
        if !self.is_locked() {
            return None;
        }
        if self.segno >= DATA_SEGMENTS_PER_FIELD {
            warn!("no field sync after {} segments, lost lock", self.segno);
            self.field_num = 0;
            self.segno = 0;
            return None;
        }
        let pli = PipelineInfo::regular(self.field_num == 2, self.segno);
        self.segno += 1;
        return Some(SoftDataSegment {
            pli,
            data: segment.data,
        });
    }
}

impl Block for FsChecker {
    type Input = SoftDataSegment;
    type Output = SoftDataSegment;

    fn work(&mut self, input: &[SoftDataSegment], output: &mut [SoftDataSegment]) -> Work {
        let mut consumed = 0;
        let mut produced = 0;
        while consumed < input.len() && produced < output.len() {
            if let Some(seg) = self.check(&input[consumed]) {
                output[produced] = seg;
                produced += 1;
            }
            consumed += 1;
        }
        return Work::new(consumed, produced);
    }

    fn reset(&mut self) {
        self.field_num = 0;
        self.segno = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_sync::{field_sync_symbols, PRECODE_LEN};
    use crate::segment::DataSegment;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn field_sync(field2: bool) -> SoftDataSegment {
        let seg = DataSegment {
            pli: PipelineInfo::default(),
            data: field_sync_symbols(field2, &[3; PRECODE_LEN]),
        };
        return SoftDataSegment::from_segment(&seg);
    }

    fn random_segment(rng: &mut StdRng) -> SoftDataSegment {
        let mut seg = SoftDataSegment::default();
        for x in seg.data.iter_mut() {
            *x = (2 * rng.gen_range(0..8) - 7) as f32;
        }
        return seg;
    }

    #[test]
    fn test_match_field_polarity() {
        assert!(matches!(
            match_field_sync(&field_sync(false).data),
            FieldSyncMatch::Field { field2: false, pn511_errors: 0, pn63_errors: 0 }
        ));
        assert!(matches!(
            match_field_sync(&field_sync(true).data),
            FieldSyncMatch::Field { field2: true, pn511_errors: 0, pn63_errors: 63 }
        ));
    }

    #[test]
    fn test_tolerates_pn511_errors() {
        let mut seg = field_sync(false);
        for i in 0..PN511_ERROR_LIMIT {
            seg.data[PN511_OFFSET + 10 * i] = -seg.data[PN511_OFFSET + 10 * i];
        }
        assert!(matches!(match_field_sync(&seg.data), FieldSyncMatch::Field { .. }));
        seg.data[PN511_OFFSET + 500] = -seg.data[PN511_OFFSET + 500];
        assert!(matches!(match_field_sync(&seg.data), FieldSyncMatch::None { .. }));
    }

    #[test]
    fn test_ambiguous_polarity() {
        let mut seg = field_sync(false);
        for i in 0..20 {
            seg.data[PN63_FIELD_OFFSET + i] = -seg.data[PN63_FIELD_OFFSET + i];
        }
        assert!(matches!(
            match_field_sync(&seg.data),
            FieldSyncMatch::Ambiguous { pn63_errors: 20, .. }
        ));
        let mut checker = FsChecker::new();
        assert!(checker.check(&field_sync(true)).is_some());
        assert!(checker.check(&seg).is_none());
        assert!(!checker.is_locked());
    }

    #[test]
    fn test_data_never_matches() {
        let mut rng = StdRng::seed_from_u64(40);
        for _ in 0..200 {
            let seg = random_segment(&mut rng);
            assert!(matches!(match_field_sync(&seg.data), FieldSyncMatch::None { .. }));
        }
    }

    #[test]
    fn test_locks_and_tags_segments() {
        let mut rng = StdRng::seed_from_u64(41);
        let mut input = Vec::new();
        for _ in 0..5 {
            input.push(random_segment(&mut rng));
        }
        input.push(field_sync(true));
        for _ in 0..DATA_SEGMENTS_PER_FIELD {
            input.push(random_segment(&mut rng));
        }
        input.push(field_sync(false));
        for _ in 0..3 {
            input.push(random_segment(&mut rng));
        }
        let mut checker = FsChecker::new();
        let out = checker.run(&input);
        assert_eq!(out.len(), 1 + DATA_SEGMENTS_PER_FIELD + 1 + 3);
        assert_eq!(out[0].pli, PipelineInfo::field_sync(true));
        assert_eq!(out[1].pli, PipelineInfo::regular(true, 0));
        assert_eq!(out[312].pli, PipelineInfo::regular(true, 311));
        assert_eq!(out[312].data, input[5 + 312].data);
        assert_eq!(out[313].pli, PipelineInfo::field_sync(false));
        assert_eq!(out[316].pli, PipelineInfo::regular(false, 2));
        assert_eq!(checker.field_num(), 1);
    }

    #[test]
    fn test_unlocks_without_field_sync() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut checker = FsChecker::new();
        assert!(checker.check(&field_sync(false)).is_some());
        for _ in 0..DATA_SEGMENTS_PER_FIELD {
            assert!(checker.check(&random_segment(&mut rng)).is_some());
        }
        assert!(checker.check(&random_segment(&mut rng)).is_none());
        assert!(!checker.is_locked());
        assert!(checker.check(&random_segment(&mut rng)).is_none());
    }
}
