//! 15-minute day grid arithmetic. A working day is `SLOTS_PER_DAY` blocks;
//! availability is a 32-bit mask so resource intersection is a bitwise AND
//! and contiguous-run search is a handful of shifted ANDs.

use chrono::NaiveTime;

use shared_config::{DAY_START_HOUR, SLOTS_PER_DAY, SLOT_MINUTES};

/// Free/busy bitmap for one resource on one day. Bit `b` set = block `b` free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DayMask(pub u32);

impl DayMask {
    pub const EMPTY: DayMask = DayMask(0);

    pub fn full() -> Self {
        debug_assert!(SLOTS_PER_DAY <= 32);
        if SLOTS_PER_DAY == 32 {
            DayMask(u32::MAX)
        } else {
            DayMask((1u32 << SLOTS_PER_DAY) - 1)
        }
    }

    /// Mark `[start, end)` free. Out-of-range ends are clamped to the grid.
    pub fn set_range(&mut self, start: usize, end: usize) {
        let end = end.min(SLOTS_PER_DAY);
        for b in start..end {
            self.0 |= 1 << b;
        }
    }

    pub fn clear(&mut self, block: usize) {
        if block < SLOTS_PER_DAY {
            self.0 &= !(1 << block);
        }
    }

    pub fn is_free(&self, block: usize) -> bool {
        block < SLOTS_PER_DAY && (self.0 >> block) & 1 == 1
    }

    pub fn intersect(self, other: DayMask) -> DayMask {
        DayMask(self.0 & other.0)
    }

    pub fn count_free(&self) -> u32 {
        self.0.count_ones()
    }

    /// All start blocks admitting `len` contiguous free blocks, ascending.
    /// Bit `i` of the folded word is set iff blocks `i..i+len` are all free,
    /// so the scan is O(len + number of starts).
    pub fn find_contiguous(&self, len: usize) -> Vec<usize> {
        if len == 0 || len > SLOTS_PER_DAY {
            return Vec::new();
        }
        let mut folded = self.0;
        for _ in 1..len {
            folded &= folded >> 1;
        }

        let mut starts = Vec::new();
        let mut bits = folded;
        while bits != 0 {
            let i = bits.trailing_zeros() as usize;
            if i + len <= SLOTS_PER_DAY {
                starts.push(i);
            }
            bits &= bits - 1;
        }
        starts
    }
}

/// Minutes round UP to whole blocks.
pub fn blocks_needed(minutes: u32) -> usize {
    (minutes as usize).div_ceil(SLOT_MINUTES as usize)
}

/// Block index to wall-clock "HH:MM".
pub fn block_to_time(block: usize) -> String {
    let total_min = DAY_START_HOUR * 60 + block as u32 * SLOT_MINUTES;
    format!("{:02}:{:02}", total_min / 60, total_min % 60)
}

/// Wall-clock time to block index, flooring onto the grid. Times before the
/// working day map to negative values so callers can clamp.
pub fn time_to_block(t: NaiveTime) -> i64 {
    use chrono::Timelike;
    let minutes = t.hour() as i64 * 60 + t.minute() as i64;
    (minutes - (DAY_START_HOUR as i64) * 60).div_euclid(SLOT_MINUTES as i64)
}

/// The `[start_block, end_block)` a weekly template covers. The start honors
/// partial-hour offsets; the end truncates to the hour boundary.
pub fn template_blocks(start: NaiveTime, end: NaiveTime) -> (usize, usize) {
    use chrono::Timelike;
    let per_hour = (60 / SLOT_MINUTES) as i64;
    let start_block = (start.hour() as i64 - DAY_START_HOUR as i64) * per_hour
        + start.minute() as i64 / SLOT_MINUTES as i64;
    let end_block = (end.hour() as i64 - DAY_START_HOUR as i64) * per_hour;
    (
        start_block.max(0) as usize,
        end_block.clamp(0, SLOTS_PER_DAY as i64) as usize,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_day_template_covers_every_block() {
        let (start, end) = template_blocks(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        );
        let mut mask = DayMask::EMPTY;
        mask.set_range(start, end);
        assert_eq!(mask.count_free() as usize, SLOTS_PER_DAY);
    }

    #[test]
    fn template_before_opening_clamps_to_zero() {
        let (start, end) = template_blocks(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        );
        assert_eq!(start, 0);
        assert_eq!(end, 12);
    }

    #[test]
    fn half_hour_template_start_offsets_by_two_blocks() {
        let (start, _) = template_blocks(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        );
        assert_eq!(start, 2);
    }

    #[test]
    fn blocks_needed_ceils() {
        assert_eq!(blocks_needed(15), 1);
        assert_eq!(blocks_needed(20), 2);
        assert_eq!(blocks_needed(90), 6);
        assert_eq!(blocks_needed(1), 1);
    }

    #[test]
    fn ceil_blocks_is_idempotent() {
        for minutes in [1u32, 15, 20, 45, 90, 130] {
            let once = blocks_needed(minutes);
            let twice = blocks_needed(once as u32 * SLOT_MINUTES);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn block_time_round_trip_floors_to_grid() {
        for block in 0..SLOTS_PER_DAY {
            let t = NaiveTime::parse_from_str(&block_to_time(block), "%H:%M").unwrap();
            assert_eq!(time_to_block(t), block as i64);
        }
        // Off-grid times floor down.
        let t = NaiveTime::from_hms_opt(9, 20, 0).unwrap();
        assert_eq!(block_to_time(time_to_block(t) as usize), "09:15");
    }

    #[test]
    fn find_contiguous_reports_every_start_in_order() {
        // Free blocks: 0..4 and 10..13.
        let mut mask = DayMask::EMPTY;
        mask.set_range(0, 4);
        mask.set_range(10, 13);

        assert_eq!(mask.find_contiguous(2), vec![0, 1, 2, 10, 11]);
        assert_eq!(mask.find_contiguous(3), vec![0, 1, 10]);
        assert_eq!(mask.find_contiguous(4), vec![0]);
        assert_eq!(mask.find_contiguous(5), Vec::<usize>::new());
    }

    #[test]
    fn find_contiguous_run_reaching_day_end() {
        let mut mask = DayMask::EMPTY;
        mask.set_range(SLOTS_PER_DAY - 3, SLOTS_PER_DAY);
        assert_eq!(mask.find_contiguous(3), vec![SLOTS_PER_DAY - 3]);
        assert_eq!(mask.find_contiguous(4), Vec::<usize>::new());
    }

    #[test]
    fn intersection_is_bitwise_and() {
        let mut a = DayMask::EMPTY;
        a.set_range(0, 8);
        let mut b = DayMask::EMPTY;
        b.set_range(4, 12);
        let c = a.intersect(b);
        assert!(!c.is_free(3));
        assert!(c.is_free(4));
        assert!(c.is_free(7));
        assert!(!c.is_free(8));
    }

    #[test]
    fn combo_block_arithmetic_example() {
        // base=90, consult=20, buffer=1 -> 2 + 1 + 6 = 9 combo blocks.
        let consult = blocks_needed(20);
        let treatment = blocks_needed(90);
        assert_eq!(consult + shared_config::BUFFER_SLOTS + treatment, 9);
        assert_eq!(consult, 2);
    }
}
