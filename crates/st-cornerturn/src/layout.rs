//! Flattened record layout shared by the emitted kernels and the simulator.

/// `records` logical elements of `lanes` components each, stored flat.
///
/// Register `k` of the lane owning element `n` maps to flattened index
/// `n + k * padded()`, where `padded()` is the group-aligned element count.
/// Indices at or beyond `flat_len()` are padding and are neither read nor
/// written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordLayout {
    pub records: usize,
    pub lanes: usize,
}

impl RecordLayout {
    pub fn new(records: usize, lanes: usize) -> Self {
        debug_assert!(crate::cycles::valid_group(lanes));
        Self { records, lanes }
    }

    /// Group-aligned padded element count (`lanes * ceil(records / lanes)`).
    pub fn padded(&self) -> usize {
        self.lanes * self.records.div_ceil(self.lanes)
    }

    /// Total flattened element count (`records * lanes`).
    pub fn flat_len(&self) -> usize {
        self.records * self.lanes
    }

    /// Number of full lane groups after padding.
    pub fn groups(&self) -> usize {
        self.padded() / self.lanes
    }

    /// Flattened index touched by register `k` of the lane owning element `n`.
    pub fn slot_index(&self, n: usize, k: usize) -> usize {
        n + k * self.padded()
    }

    /// Whether that flattened index holds real data.
    pub fn in_bounds(&self, n: usize, k: usize) -> bool {
        self.slot_index(n, k) < self.flat_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_the_next_group() {
        let layout = RecordLayout::new(10, 4);
        assert_eq!(layout.padded(), 12);
        assert_eq!(layout.flat_len(), 40);
        assert_eq!(layout.groups(), 3);
    }

    #[test]
    fn multiples_do_not_pad() {
        let layout = RecordLayout::new(8, 4);
        assert_eq!(layout.padded(), 8);
        assert_eq!(layout.groups(), 2);
    }

    #[test]
    fn empty_input_stays_empty() {
        let layout = RecordLayout::new(0, 4);
        assert_eq!(layout.padded(), 0);
        assert_eq!(layout.flat_len(), 0);
        assert_eq!(layout.groups(), 0);
    }

    #[test]
    fn tail_lanes_lose_their_top_registers() {
        // 10 elements in groups of 4: the top register row is flat indices
        // 36..48, truncated at 40, so only lanes 0..=3 keep k = 3. The
        // padding lanes 10 and 11 still carry real data for low k.
        let layout = RecordLayout::new(10, 4);
        assert!(layout.in_bounds(10, 2));
        assert!(!layout.in_bounds(10, 3));
        assert!(layout.in_bounds(11, 2));
        assert!(!layout.in_bounds(11, 3));
        assert!(layout.in_bounds(3, 3));
        assert!(!layout.in_bounds(4, 3));
    }

    #[test]
    fn every_flat_index_is_reachable_exactly_once() {
        let layout = RecordLayout::new(10, 4);
        let mut hits = vec![0usize; layout.flat_len()];
        for n in 0..layout.padded() {
            for k in 0..layout.lanes {
                if layout.in_bounds(n, k) {
                    hits[layout.slot_index(n, k)] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn single_lane_layout_is_flat() {
        let layout = RecordLayout::new(7, 1);
        assert_eq!(layout.padded(), 7);
        assert_eq!(layout.slot_index(3, 0), 3);
    }
}
