//! Per-segment pipeline metadata.
//!
//! Every record travelling through the chain carries a [`PipelineInfo`] that
//! says where in the frame the payload came from. Stages that hold data back
//! for N segments must hand out `pli.delay(N)` so the position still describes
//! the payload that leaves the stage.

use crate::DATA_SEGMENTS_PER_FIELD;

/// Segment number used for the field-sync segment.
pub const FIELD_SYNC_SEGNO: i16 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineInfo {
    segno: i16,
    field2: bool,
    transport_error: bool,
}

impl PipelineInfo {
    /// Metadata for data segment `segno` (0..312) of field 1 or field 2.
    pub fn regular(field2: bool, segno: usize) -> PipelineInfo {
        assert!(
            segno < DATA_SEGMENTS_PER_FIELD,
            "segment number {segno} out of range"
        );
        return PipelineInfo {
            segno: segno as i16,
            field2,
            transport_error: false,
        };
    }

    pub fn field_sync(field2: bool) -> PipelineInfo {
        return PipelineInfo {
            segno: FIELD_SYNC_SEGNO,
            field2,
            transport_error: false,
        };
    }

    pub fn segno(&self) -> i16 {
        self.segno
    }

    pub fn in_field2(&self) -> bool {
        self.field2
    }

    pub fn field_num(&self) -> u8 {
        if self.field2 {
            2
        } else {
            1
        }
    }

    pub fn transport_error(&self) -> bool {
        self.transport_error
    }

    pub fn set_transport_error(&mut self, error: bool) {
        self.transport_error = error;
    }

    pub fn is_field_sync(&self) -> bool {
        self.segno == FIELD_SYNC_SEGNO
    }

    pub fn is_regular(&self) -> bool {
        self.segno >= 0
    }

    pub fn is_first_regular(&self) -> bool {
        self.segno == 0
    }

    pub fn is_last_regular(&self) -> bool {
        self.segno == DATA_SEGMENTS_PER_FIELD as i16 - 1
    }

    /// Position of this segment within the two-field frame (0..624).
    fn frame_position(&self) -> usize {
        let mut s = self.segno as usize;
        if self.field2 {
            s += DATA_SEGMENTS_PER_FIELD;
        }
        return s;
    }

    /// The following regular segment, wrapping from field 1 to field 2 and
    /// from field 2 back to field 1.
    pub fn next(&self) -> PipelineInfo {
        assert!(self.is_regular(), "next() of a field sync segment");
        let s = (self.frame_position() + 1) % (2 * DATA_SEGMENTS_PER_FIELD);
        let mut out = PipelineInfo::regular(
            s >= DATA_SEGMENTS_PER_FIELD,
            s % DATA_SEGMENTS_PER_FIELD,
        );
        out.transport_error = self.transport_error;
        return out;
    }

    /// Metadata of the segment `nsegs` regular segments earlier.
    pub fn delay(&self, nsegs: usize) -> PipelineInfo {
        assert!(self.is_regular(), "only regular segments can be delayed");
        let frame = 2 * DATA_SEGMENTS_PER_FIELD;
        let s = (self.frame_position() + frame - nsegs % frame) % frame;
        let mut out = PipelineInfo::regular(
            s >= DATA_SEGMENTS_PER_FIELD,
            s % DATA_SEGMENTS_PER_FIELD,
        );
        out.transport_error = self.transport_error;
        return out;
    }

    pub fn sanity_check(&self) {
        assert!(
            self.segno >= FIELD_SYNC_SEGNO && self.segno < DATA_SEGMENTS_PER_FIELD as i16,
            "corrupt segment number {}",
            self.segno
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_wraps_into_previous_field() {
        let pli = PipelineInfo::regular(false, 5);
        let d = pli.delay(12);
        assert!(d.in_field2());
        assert_eq!(d.segno(), 305);

        let pli = PipelineInfo::regular(true, 40);
        let d = pli.delay(52);
        assert!(!d.in_field2());
        assert_eq!(d.segno(), 300);
    }

    #[test]
    fn delay_then_next_is_identity() {
        let mut pli = PipelineInfo::regular(true, 311);
        let start = pli;
        for _ in 0..64 {
            pli = pli.next();
        }
        assert_eq!(pli.delay(64), start);
        assert_eq!(pli.delay(0), pli);
        assert_eq!(start.delay(624), start);
    }

    #[test]
    fn keeps_transport_error_when_delayed() {
        let mut pli = PipelineInfo::regular(false, 100);
        pli.set_transport_error(true);
        assert!(pli.delay(3).transport_error());
        assert!(pli.next().transport_error());
    }

    #[test]
    fn field_sync_sentinel() {
        let pli = PipelineInfo::field_sync(true);
        assert!(pli.is_field_sync());
        assert!(!pli.is_regular());
        assert_eq!(pli.field_num(), 2);
        pli.sanity_check();
    }

    #[test]
    #[should_panic]
    fn field_sync_cannot_be_delayed() {
        PipelineInfo::field_sync(false).delay(1);
    }

    #[test]
    #[should_panic]
    fn rejects_out_of_range_segment() {
        PipelineInfo::regular(false, DATA_SEGMENTS_PER_FIELD);
    }
}
