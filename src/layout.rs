use std::collections::HashMap;

use crate::bus::UiSignal;

/// Measured row heights for the grid, keyed by visible row index.
///
/// Rows without a measurement use `default_height`. Entries are dropped only
/// through `invalidate_from` / `clear`, never as a side effect of drawing.
#[derive(Debug, Clone)]
pub struct RowMeasurements {
    heights: HashMap<usize, u16>,
    default_height: u16,
}

impl RowMeasurements {
    pub fn new(default_height: u16) -> Self {
        Self {
            heights: HashMap::new(),
            default_height: default_height.max(1),
        }
    }

    pub fn height(&self, index: usize) -> u16 {
        self.heights
            .get(&index)
            .copied()
            .unwrap_or(self.default_height)
    }

    pub fn is_measured(&self, index: usize) -> bool {
        self.heights.contains_key(&index)
    }

    pub fn record(&mut self, index: usize, height: u16) {
        self.heights.insert(index, height.max(1));
    }

    pub fn invalidate_from(&mut self, index: usize) {
        self.heights.retain(|i, _| *i < index);
    }

    pub fn clear(&mut self) {
        self.heights.clear();
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn apply(&mut self, signal: &UiSignal) {
        match signal {
            UiSignal::RowResized(index) => self.invalidate_from(*index),
            UiSignal::LayoutChanged | UiSignal::RowsReplaced => self.clear(),
            UiSignal::FiltersClosed => {}
        }
    }

    /// Index of the first row to draw so that `selected` fits in `viewport` lines.
    pub fn scroll_offset(&self, selected: usize, current: usize, viewport: u16) -> usize {
        if selected < current {
            return selected;
        }
        let mut used: u32 = 0;
        let mut first = selected;
        loop {
            used += u32::from(self.height(first));
            if used > u32::from(viewport) {
                return (first + 1).min(selected).max(current);
            }
            if first == current || first == 0 {
                return first;
            }
            first -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_drops_the_index_and_everything_below() {
        let mut rows = RowMeasurements::new(1);
        for i in 0..5 {
            rows.record(i, 2);
        }
        rows.apply(&UiSignal::RowResized(3));
        assert!(rows.is_measured(2));
        assert!(!rows.is_measured(3));
        assert_eq!(rows.height(4), 1);
        rows.apply(&UiSignal::LayoutChanged);
        assert!(rows.is_empty());
    }

    #[test]
    fn scroll_keeps_selection_visible() {
        let mut rows = RowMeasurements::new(1);
        rows.record(8, 3);
        assert_eq!(rows.scroll_offset(2, 5, 10), 2);
        assert_eq!(rows.scroll_offset(6, 0, 10), 0);
        // row 8 takes three lines, rows 1..=7 the other seven
        assert_eq!(rows.scroll_offset(8, 0, 10), 1);
    }
}
