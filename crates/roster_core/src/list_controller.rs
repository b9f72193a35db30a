//! Filterable, multi-selectable, reorderable list backing every editor screen.
//!
//! Block moves gather the selected items, in their original relative order,
//! into one contiguous run. `move_selections_to(t)` removes the selection,
//! clamps `t` to the shortened list and reinserts the run starting at `t`;
//! the selection then covers exactly that run.

use std::{collections::BTreeSet, fmt};

use crate::error::ListError;

#[derive(Debug, Clone)]
pub struct ListController<E> {
    items: Vec<E>,
    selection: BTreeSet<usize>,
    filter: String,
    matches: Vec<usize>,
    scroll_hint: Option<usize>,
}

impl<E: fmt::Display> Default for ListController<E> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<E: fmt::Display> ListController<E> {
    pub fn new(items: Vec<E>) -> Self {
        let mut controller = Self {
            items,
            selection: BTreeSet::new(),
            filter: String::new(),
            matches: Vec::new(),
            scroll_hint: None,
        };
        controller.recompute_matches();
        controller
    }

    /// Replaces the backing items. The selection survives only if every
    /// selected index still exists.
    pub fn set_list_data(&mut self, items: Vec<E>) {
        self.items = items;
        if self.selection.iter().any(|&index| index >= self.items.len()) {
            self.selection.clear();
        }
        if self.scroll_hint.is_some_and(|index| index >= self.items.len()) {
            self.scroll_hint = None;
        }
        self.recompute_matches();
    }

    pub fn set_filter(&mut self, text: impl Into<String>) {
        self.filter = text.into();
        self.recompute_matches();
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn matches(&self) -> usize {
        self.matches.len()
    }

    pub fn match_indices(&self) -> &[usize] {
        &self.matches
    }

    pub fn is_match(&self, index: usize) -> bool {
        self.matches.binary_search(&index).is_ok()
    }

    pub fn items(&self) -> &[E] {
        &self.items
    }

    pub fn into_items(self) -> Vec<E> {
        self.items
    }

    pub fn get(&self, index: usize) -> Option<&E> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: E) {
        self.items.push(item);
        self.recompute_matches();
    }

    pub fn replace(&mut self, index: usize, item: E) -> Result<E, ListError> {
        self.check_index(index)?;
        let previous = std::mem::replace(&mut self.items[index], item);
        self.recompute_matches();
        Ok(previous)
    }

    /// Removes the selected items and returns them in list order.
    pub fn remove_selected(&mut self) -> Vec<E> {
        let (removed, kept) = self.split_selected();
        self.items = kept;
        self.selection.clear();
        self.scroll_hint = None;
        self.recompute_matches();
        removed
    }

    pub fn selection(&self) -> &BTreeSet<usize> {
        &self.selection
    }

    pub fn selected_items(&self) -> Vec<&E> {
        self.selection
            .iter()
            .filter_map(|&index| self.items.get(index))
            .collect()
    }

    pub fn select(&mut self, index: usize) -> Result<(), ListError> {
        self.check_index(index)?;
        self.selection.insert(index);
        Ok(())
    }

    pub fn toggle(&mut self, index: usize) -> Result<(), ListError> {
        self.check_index(index)?;
        if !self.selection.remove(&index) {
            self.selection.insert(index);
        }
        Ok(())
    }

    /// Replaces the selection. Nothing changes if any index is out of range.
    pub fn set_selection(
        &mut self,
        indices: impl IntoIterator<Item = usize>,
    ) -> Result<(), ListError> {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        if let Some(&index) = indices.iter().find(|&&index| index >= self.items.len()) {
            return Err(self.out_of_range(index));
        }
        self.selection = indices;
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.selection = (0..self.items.len()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn move_selections_to(&mut self, target: usize) {
        if self.selection.is_empty() {
            return;
        }
        let (moved, mut kept) = self.split_selected();
        let start = target.min(kept.len());
        let count = moved.len();
        let tail = kept.split_off(start);
        kept.extend(moved);
        kept.extend(tail);
        self.items = kept;
        self.selection = (start..start + count).collect();
        self.recompute_matches();
    }

    /// Moves the selection to just before the nearest unselected item above
    /// it. Returns false when nothing moved.
    pub fn move_selection_up(&mut self) -> bool {
        let Some(&first) = self.selection.first() else {
            return false;
        };
        if first == 0 {
            return false;
        }
        self.move_selections_to(first - 1);
        true
    }

    /// Moves the selection to just after the nearest unselected item below
    /// it. Returns false when nothing moved.
    pub fn move_selection_down(&mut self) -> bool {
        let Some(&last) = self.selection.last() else {
            return false;
        };
        if last + 1 >= self.items.len() {
            return false;
        }
        // every selected index is <= last, so the neighbour at last + 1
        // shifts left by the selection size once the selection is removed
        let target = last + 2 - self.selection.len();
        self.move_selections_to(target);
        true
    }

    pub fn ensure_index_is_visible(&mut self, index: usize) -> Result<(), ListError> {
        self.check_index(index)?;
        self.scroll_hint = Some(index);
        Ok(())
    }

    pub fn scroll_hint(&self) -> Option<usize> {
        self.scroll_hint
    }

    /// Nearest match strictly before `from`, wrapping to the last match.
    pub fn prev_match(&self, from: usize) -> Result<usize, ListError> {
        let last = *self.matches.last().ok_or(ListError::NoMatches)?;
        let position = self.matches.partition_point(|&index| index < from);
        Ok(match position {
            0 => last,
            _ => self.matches[position - 1],
        })
    }

    /// Nearest match at or after `from`, wrapping to the first match.
    pub fn next_match(&self, from: usize) -> Result<usize, ListError> {
        let first = *self.matches.first().ok_or(ListError::NoMatches)?;
        let position = self.matches.partition_point(|&index| index < from);
        Ok(self.matches.get(position).copied().unwrap_or(first))
    }

    fn recompute_matches(&mut self) {
        let needle = self.filter.to_lowercase();
        self.matches = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| needle.is_empty() || item.to_string().to_lowercase().contains(&needle))
            .map(|(index, _)| index)
            .collect();
    }

    fn split_selected(&mut self) -> (Vec<E>, Vec<E>) {
        let mut selected = Vec::with_capacity(self.selection.len());
        let mut rest = Vec::with_capacity(self.items.len());
        for (index, item) in std::mem::take(&mut self.items).into_iter().enumerate() {
            if self.selection.contains(&index) {
                selected.push(item);
            } else {
                rest.push(item);
            }
        }
        (selected, rest)
    }

    fn check_index(&self, index: usize) -> Result<(), ListError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(self.out_of_range(index))
        }
    }

    fn out_of_range(&self, index: usize) -> ListError {
        ListError::IndexOutOfRange {
            index,
            len: self.items.len(),
        }
    }
}

#[cfg(test)]
#[path = "tests/list_controller_tests.rs"]
mod tests;
