//! Index bookkeeping for a feed window.
//!
//! Two maps record positions inside the window: the [`CursorLedger`] (row
//! index → backend cursor of the page ending at that row) and the
//! [`GapRegistry`] (gap id → row index of its placeholder). Both move their
//! indices with the same [`shift_index`] rule whenever rows are inserted or
//! removed.
//!
//! # Shift rule
//!
//! `shift(from, delta)` moves every recorded index `>= from` by `delta`.
//! Indices below `from` are untouched. For removals the caller drops entries
//! inside the removed range first; a negative shift that would move an entry
//! below `from` is an invariant violation.

use crate::model::{Cursor, GapId};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Applies the shift rule to one index.
///
/// Returns `None` when the shifted index would fall below `from`, which
/// means the entry sat inside a removed range.
///
/// # Examples
///
/// ```
/// # use skyfeed::feed::ledger::shift_index;
/// assert_eq!(shift_index(3, 5, 2), Some(3));
/// assert_eq!(shift_index(5, 5, 2), Some(7));
/// assert_eq!(shift_index(9, 5, -3), Some(6));
/// assert_eq!(shift_index(6, 5, -3), None);
/// ```
pub fn shift_index(index: usize, from: usize, delta: isize) -> Option<usize> {
    if index < from {
        return Some(index);
    }
    let shifted = index.checked_add_signed(delta)?;
    (shifted >= from).then_some(shifted)
}

/// Row index → cursor of the page that ends at that row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorLedger {
    by_index: BTreeMap<usize, Cursor>,
}

impl CursorLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `cursor` at `index`, replacing any previous cursor there.
    pub fn insert(&mut self, index: usize, cursor: Cursor) {
        self.by_index.insert(index, cursor);
    }

    /// Cursor recorded at exactly `index`.
    pub fn get(&self, index: usize) -> Option<&Cursor> {
        self.by_index.get(&index)
    }

    /// Entry with the highest index.
    pub fn last(&self) -> Option<(usize, &Cursor)> {
        self.by_index
            .last_key_value()
            .map(|(index, cursor)| (*index, cursor))
    }

    /// First entry at or after `index`.
    pub fn lower_bound(&self, index: usize) -> Option<(usize, &Cursor)> {
        self.by_index
            .range(index..)
            .next()
            .map(|(index, cursor)| (*index, cursor))
    }

    /// Drops every entry with index `> index`.
    pub fn remove_after(&mut self, index: usize) {
        let _ = self.by_index.split_off(&(index + 1));
    }

    /// Drops every entry with index `<= index`.
    pub fn remove_through(&mut self, index: usize) {
        self.by_index = self.by_index.split_off(&(index + 1));
    }

    /// Applies the shift rule to every entry.
    pub fn shift(&mut self, from: usize, delta: isize) {
        if delta == 0 {
            return;
        }
        let moved = self.by_index.split_off(&from);
        for (index, cursor) in moved {
            match shift_index(index, from, delta) {
                Some(shifted) => {
                    self.by_index.insert(shifted, cursor);
                }
                None => {
                    debug_assert!(false, "cursor at {index} inside shifted range");
                    warn!(index, from, delta, "Dropping cursor inside removed range");
                }
            }
        }
    }

    /// Iterates entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Cursor)> {
        self.by_index.iter().map(|(index, cursor)| (*index, cursor))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// True when no cursor is recorded.
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.by_index.clear();
    }
}

/// Gap id → row index of the gap placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapRegistry {
    by_id: HashMap<GapId, usize>,
}

impl GapRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gap at `index`.
    pub fn insert(&mut self, gap_id: GapId, index: usize) {
        self.by_id.insert(gap_id, index);
    }

    /// Index of a registered gap.
    pub fn get(&self, gap_id: GapId) -> Option<usize> {
        self.by_id.get(&gap_id).copied()
    }

    /// Unregisters a gap, returning its index.
    pub fn remove(&mut self, gap_id: GapId) -> Option<usize> {
        self.by_id.remove(&gap_id)
    }

    /// Keeps only gaps whose index satisfies `keep`.
    pub fn retain_indices(&mut self, mut keep: impl FnMut(usize) -> bool) {
        self.by_id.retain(|_, index| keep(*index));
    }

    /// Applies the shift rule to every entry.
    pub fn shift(&mut self, from: usize, delta: isize) {
        if delta == 0 {
            return;
        }
        self.by_id.retain(|gap_id, index| match shift_index(*index, from, delta) {
            Some(shifted) => {
                *index = shifted;
                true
            }
            None => {
                debug_assert!(false, "gap {gap_id} inside shifted range");
                warn!(%gap_id, index = *index, from, delta, "Dropping gap inside removed range");
                false
            }
        });
    }

    /// Registered gap ids, ordered by row index.
    pub fn ids_by_index(&self) -> Vec<(GapId, usize)> {
        let mut gaps: Vec<_> = self.by_id.iter().map(|(id, index)| (*id, *index)).collect();
        gaps.sort_by_key(|(_, index)| *index);
        gaps
    }

    /// Number of registered gaps.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when no gap is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(raw: &str) -> Cursor {
        Cursor::new(raw).unwrap()
    }

    fn gap(raw: u64) -> GapId {
        GapId::new(raw).unwrap()
    }

    fn ledger(entries: &[(usize, &str)]) -> CursorLedger {
        let mut ledger = CursorLedger::new();
        for (index, raw) in entries {
            ledger.insert(*index, cursor(raw));
        }
        ledger
    }

    fn indices(ledger: &CursorLedger) -> Vec<(usize, String)> {
        ledger
            .iter()
            .map(|(index, cursor)| (index, cursor.to_string()))
            .collect()
    }

    // ===== shift_index =====

    #[test]
    fn shift_index_leaves_lower_indices_alone() {
        assert_eq!(shift_index(4, 5, 10), Some(4));
        assert_eq!(shift_index(4, 5, -10), Some(4));
    }

    #[test]
    fn shift_index_moves_boundary_index() {
        assert_eq!(shift_index(5, 5, 1), Some(6));
    }

    #[test]
    fn shift_index_rejects_underflow() {
        assert_eq!(shift_index(1, 0, -2), None);
    }

    // ===== CursorLedger =====

    #[test]
    fn insertion_shift_moves_only_indices_at_or_after_position() {
        // GIVEN cursors at 2, 5, 9
        let mut ledger = ledger(&[(2, "a"), (5, "b"), (9, "c")]);

        // WHEN 3 rows are inserted at index 5
        ledger.shift(5, 3);

        // THEN index 2 is unchanged and 5, 9 moved by 3
        assert_eq!(
            indices(&ledger),
            vec![(2, "a".into()), (8, "b".into()), (12, "c".into())]
        );
    }

    #[test]
    fn removal_shift_moves_later_indices_down() {
        // GIVEN cursors at 1 and 7, rows 3..5 removed (nothing recorded inside)
        let mut ledger = ledger(&[(1, "a"), (7, "b")]);

        // WHEN the removal of 2 rows starting at 3 is applied
        ledger.shift(3, -2);

        // THEN 1 stays and 7 becomes 5
        assert_eq!(indices(&ledger), vec![(1, "a".into()), (5, "b".into())]);
    }

    #[test]
    fn zero_shift_is_noop() {
        let mut ledger = ledger(&[(1, "a")]);
        ledger.shift(0, 0);
        assert_eq!(indices(&ledger), vec![(1, "a".into())]);
    }

    #[test]
    fn last_returns_highest_index() {
        let ledger = ledger(&[(4, "a"), (10, "b"), (7, "c")]);
        assert_eq!(ledger.last().map(|(i, c)| (i, c.as_str())), Some((10, "b")));
    }

    #[test]
    fn lower_bound_finds_first_entry_at_or_after() {
        let ledger = ledger(&[(4, "a"), (10, "b")]);
        assert_eq!(ledger.lower_bound(4).map(|(i, _)| i), Some(4));
        assert_eq!(ledger.lower_bound(5).map(|(i, _)| i), Some(10));
        assert_eq!(ledger.lower_bound(11), None);
    }

    #[test]
    fn remove_after_keeps_boundary_entry() {
        let mut ledger = ledger(&[(4, "a"), (10, "b"), (12, "c")]);
        ledger.remove_after(10);
        assert_eq!(indices(&ledger), vec![(4, "a".into()), (10, "b".into())]);
    }

    #[test]
    fn remove_through_drops_boundary_entry() {
        let mut ledger = ledger(&[(4, "a"), (10, "b"), (12, "c")]);
        ledger.remove_through(10);
        assert_eq!(indices(&ledger), vec![(12, "c".into())]);
    }

    // ===== GapRegistry =====

    #[test]
    fn gap_registry_shares_shift_rule() {
        let mut gaps = GapRegistry::new();
        gaps.insert(gap(1), 3);
        gaps.insert(gap(2), 8);

        gaps.shift(4, 2);

        assert_eq!(gaps.get(gap(1)), Some(3));
        assert_eq!(gaps.get(gap(2)), Some(10));
    }

    #[test]
    fn gap_registry_remove_returns_index() {
        let mut gaps = GapRegistry::new();
        gaps.insert(gap(1), 3);
        assert_eq!(gaps.remove(gap(1)), Some(3));
        assert_eq!(gaps.get(gap(1)), None);
        assert!(gaps.is_empty());
    }

    #[test]
    fn ids_by_index_is_sorted_by_position() {
        let mut gaps = GapRegistry::new();
        gaps.insert(gap(1), 30);
        gaps.insert(gap(2), 10);
        gaps.insert(gap(3), 20);
        let order: Vec<u64> = gaps.ids_by_index().into_iter().map(|(id, _)| id.get()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn retain_indices_filters_by_position() {
        let mut gaps = GapRegistry::new();
        gaps.insert(gap(1), 2);
        gaps.insert(gap(2), 6);
        gaps.retain_indices(|index| index < 5);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps.get(gap(1)), Some(2));
    }
}
