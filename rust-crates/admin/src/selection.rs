//! Turns grid checkbox state (row handles) into the set of players a batch
//! action will target.

use crate::model::{
    RecordSnapshot,
    RowHandle,
    TelegramId,
};
use std::collections::BTreeSet;

pub type HandleSet = BTreeSet<RowHandle>;
pub type IdSet = BTreeSet<TelegramId>;

/// Maps row handles to player ids. Handles that are not in `snapshot` are dropped.
pub fn resolve<'a, I>(handles: I, snapshot: &RecordSnapshot) -> IdSet
where
    I: IntoIterator<Item = &'a RowHandle>,
{
    handles
        .into_iter()
        .filter_map(|handle| snapshot.get(handle))
        .map(|record| record.telegram_id.clone())
        .collect()
}

/// Applies one selection-change event incrementally.
///
/// With an unchanged snapshot this equals `resolve(new_handles, snapshot)`. Several
/// rows may share a player, so an id only leaves the set once no ticked row still
/// maps to it.
pub fn reconcile(
    previous_handles: &HandleSet,
    new_handles: &HandleSet,
    previous_ids: &IdSet,
    snapshot: &RecordSnapshot,
) -> IdSet {
    let added = resolve(new_handles.difference(previous_handles), snapshot);
    let kept = resolve(new_handles.intersection(previous_handles), snapshot);
    let removed: IdSet = resolve(previous_handles.difference(new_handles), snapshot)
        .difference(&kept)
        .cloned()
        .collect();
    previous_ids
        .difference(&removed)
        .cloned()
        .chain(added)
        .collect()
}

/// Players currently ticked in the dashboard grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionSet {
    handles: HandleSet,
    ids: IdSet,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handles(&self) -> &HandleSet {
        &self.handles
    }

    pub fn ids(&self) -> &IdSet {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_selected(&self, handle: &RowHandle) -> bool {
        self.handles.contains(handle)
    }

    /// Replaces the grid selection with `new_handles`, the authoritative final set
    /// for one selection-change event.
    pub fn apply(&mut self, new_handles: HandleSet, snapshot: &RecordSnapshot) {
        self.ids = reconcile(&self.handles, &new_handles, &self.ids, snapshot);
        self.handles = new_handles;
        tracing::debug!(selected = self.ids.len(), "selection updated");
    }

    pub fn toggle(&mut self, handle: &RowHandle, snapshot: &RecordSnapshot) {
        let mut next = self.handles.clone();
        if !next.remove(handle) {
            next.insert(handle.clone());
        }
        self.apply(next, snapshot);
    }

    /// Ticks every handle in `handles`, or unticks them all if they already are.
    pub fn toggle_all<'a, I>(&mut self, handles: I, snapshot: &RecordSnapshot)
    where
        I: IntoIterator<Item = &'a RowHandle>,
    {
        let handles: HandleSet = handles.into_iter().cloned().collect();
        let all_selected = handles.is_subset(&self.handles);
        let next = if all_selected {
            self.handles.difference(&handles).cloned().collect()
        } else {
            self.handles.union(&handles).cloned().collect()
        };
        self.apply(next, snapshot);
    }

    pub fn clear(&mut self) {
        self.handles.clear();
        self.ids.clear();
    }

    /// Drops handles that no longer exist in `snapshot` and re-derives the ids from
    /// what is left.
    pub fn prune(&mut self, snapshot: &RecordSnapshot) {
        let before = self.ids.len();
        self.handles.retain(|handle| snapshot.contains(handle));
        self.ids = resolve(&self.handles, snapshot);
        if self.ids.len() != before {
            tracing::info!(
                before,
                after = self.ids.len(),
                "pruned stale selection after refresh"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::model::PlayerRecord;
    use proptest::prelude::*;

    fn two_players() -> RecordSnapshot {
        RecordSnapshot::new(vec![
            PlayerRecord::new("r1", "u1"),
            PlayerRecord::new("r2", "u2"),
        ])
    }

    fn handles(raw: &[&str]) -> HandleSet {
        raw.iter().map(|h| RowHandle::new(*h)).collect()
    }

    fn ids(raw: &[&str]) -> IdSet {
        raw.iter().map(|id| TelegramId::new(*id)).collect()
    }

    #[test]
    fn resolve__empty_handles_yield_empty_set() {
        // given
        let snapshot = two_players();

        // when
        let resolved = resolve(&HandleSet::new(), &snapshot);

        // then
        assert!(resolved.is_empty());
    }

    #[test]
    fn resolve__drops_unknown_handles_and_duplicates() {
        // given
        let snapshot = two_players();
        let requested = vec![
            RowHandle::new("r1"),
            RowHandle::new("gone"),
            RowHandle::new("r1"),
        ];

        // when
        let resolved = resolve(&requested, &snapshot);

        // then
        assert_eq!(resolved, ids(&["u1"]));
    }

    #[test]
    fn reconcile__adding_a_row_extends_the_selection() {
        // given
        let snapshot = two_players();

        // when
        let result = reconcile(
            &handles(&["r1"]),
            &handles(&["r1", "r2"]),
            &ids(&["u1"]),
            &snapshot,
        );

        // then
        assert_eq!(result, ids(&["u1", "u2"]));
    }

    #[test]
    fn reconcile__removing_a_row_shrinks_the_selection() {
        // given
        let snapshot = two_players();

        // when
        let result = reconcile(
            &handles(&["r1", "r2"]),
            &handles(&["r2"]),
            &ids(&["u1", "u2"]),
            &snapshot,
        );

        // then
        assert_eq!(result, ids(&["u2"]));
    }

    #[test]
    fn selection_set__toggle_twice_restores_empty_selection() {
        // given
        let snapshot = two_players();
        let mut selection = SelectionSet::new();
        let handle = RowHandle::new("r2");

        // when
        selection.toggle(&handle, &snapshot);
        let after_first = selection.ids().clone();
        selection.toggle(&handle, &snapshot);

        // then
        assert_eq!(after_first, ids(&["u2"]));
        assert!(selection.is_empty());
    }

    #[test]
    fn selection_set__toggle_all_selects_then_deselects_visible_rows() {
        // given
        let snapshot = two_players();
        let mut selection = SelectionSet::new();
        let visible = handles(&["r1", "r2"]);

        // when
        selection.toggle_all(&visible, &snapshot);
        let after_select = selection.ids().clone();
        selection.toggle_all(&visible, &snapshot);

        // then
        assert_eq!(after_select, ids(&["u1", "u2"]));
        assert!(selection.is_empty());
    }

    #[test]
    fn selection_set__prune_drops_rows_missing_from_new_snapshot() {
        // given
        let mut selection = SelectionSet::new();
        selection.apply(handles(&["r1", "r2"]), &two_players());
        let refreshed = RecordSnapshot::new(vec![
            PlayerRecord::new("r2", "u2"),
            PlayerRecord::new("r3", "u3"),
        ]);

        // when
        selection.prune(&refreshed);

        // then
        assert_eq!(selection.handles(), &handles(&["r2"]));
        assert_eq!(selection.ids(), &ids(&["u2"]));
    }

    fn shared_player() -> RecordSnapshot {
        RecordSnapshot::new(vec![
            PlayerRecord::new("r1", "u1"),
            PlayerRecord::new("r2", "u1"),
        ])
    }

    #[test]
    fn reconcile__unticking_one_of_two_rows_for_a_player_keeps_the_player() {
        // given
        let snapshot = shared_player();

        // when
        let result = reconcile(
            &handles(&["r1", "r2"]),
            &handles(&["r1"]),
            &ids(&["u1"]),
            &snapshot,
        );

        // then
        assert_eq!(result, ids(&["u1"]));
    }

    #[test]
    fn selection_set__toggle_keeps_player_while_another_row_is_ticked() {
        // given
        let snapshot = shared_player();
        let mut selection = SelectionSet::new();
        selection.toggle_all(&handles(&["r1", "r2"]), &snapshot);

        // when
        selection.toggle(&RowHandle::new("r2"), &snapshot);

        // then
        assert_eq!(selection.handles(), &handles(&["r1"]));
        assert_eq!(selection.ids(), &resolve(selection.handles(), &snapshot));
        assert_eq!(selection.ids(), &ids(&["u1"]));
    }

    fn snapshot_strategy() -> impl Strategy<Value = RecordSnapshot> {
        prop::collection::btree_map(0u8..16, 0u8..8, 0..12).prop_map(|rows| {
            RecordSnapshot::new(
                rows.into_iter()
                    .map(|(handle, id)| {
                        PlayerRecord::new(format!("r{handle}").as_str(), format!("u{id}").as_str())
                    })
                    .collect(),
            )
        })
    }

    fn handle_set_strategy() -> impl Strategy<Value = HandleSet> {
        prop::collection::btree_set(0u8..20, 0..10).prop_map(|raw| {
            raw.into_iter()
                .map(|h| RowHandle::new(format!("r{h}")))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn reconcile__cold_start_matches_direct_resolution(
            snapshot in snapshot_strategy(),
            new_handles in handle_set_strategy(),
        ) {
            let incremental = reconcile(&HandleSet::new(), &new_handles, &IdSet::new(), &snapshot);
            prop_assert_eq!(incremental, resolve(&new_handles, &snapshot));
        }

        #[test]
        fn reconcile__unchanged_handles_leave_ids_untouched(
            snapshot in snapshot_strategy(),
            current in handle_set_strategy(),
        ) {
            let current_ids = resolve(&current, &snapshot);
            let result = reconcile(&current, &current, &current_ids, &snapshot);
            prop_assert_eq!(result, current_ids);
        }

        #[test]
        fn reconcile__incremental_matches_direct_resolution(
            snapshot in snapshot_strategy(),
            previous in handle_set_strategy(),
            next in handle_set_strategy(),
        ) {
            let previous_ids = resolve(&previous, &snapshot);
            let incremental = reconcile(&previous, &next, &previous_ids, &snapshot);
            prop_assert_eq!(incremental, resolve(&next, &snapshot));
        }
    }
}
