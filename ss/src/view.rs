//! Disposition view layer
//!
//! The disposition log is the truth; this module derives the current
//! per-item state by folding the log in order. The fold is a pure function
//! of (original groups, disposition sequence), which keeps undo trivial and
//! the whole thing property-testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::disposition::{Disposition, DispositionAction};
use crate::error::DispositionError;
use crate::session::Session;
use crate::store::SessionStore;

/// Current status of a classified item, derived from its dispositions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Trashed,
    Completed,
    Promoted,
    Deferred,
    Later,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Trashed => "trashed",
            Self::Completed => "completed",
            Self::Promoted => "promoted",
            Self::Deferred => "deferred",
            Self::Later => "later",
        };
        write!(f, "{name}")
    }
}

/// Derived state for one item (never persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemState {
    pub tab_index: u32,
    pub title: String,
    pub url: String,
    pub status: ItemStatus,
    pub original_category: String,
    pub current_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regrouped_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub later_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undone_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undone_action: Option<DispositionAction>,
}

impl ItemState {
    fn clear_status_fields(&mut self) {
        self.trashed_at = None;
        self.completed_at = None;
        self.promoted_at = None;
        self.promoted_to = None;
        self.deferred_at = None;
        self.later_at = None;
    }
}

/// A session together with its folded item states
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session: Session,
    pub item_states: BTreeMap<String, ItemState>,
    pub unresolved_count: u32,
    pub all_resolved: bool,
}

/// The applied view: groups reshaped to current categories, terminal items
/// pulled out into their own lists
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedSessionView {
    pub session: Session,
    #[serde(rename = "_trashedItems")]
    pub trashed_items: Vec<ItemState>,
    #[serde(rename = "_completedItems")]
    pub completed_items: Vec<ItemState>,
    #[serde(rename = "_laterItems")]
    pub later_items: Vec<ItemState>,
    pub unresolved_count: u32,
    pub all_resolved: bool,
}

/// Fold the disposition log into per-item states.
///
/// Dispositions referencing ids outside the original groups are ignored, so
/// the result keys are always a subset of the session's item keys. For
/// conflicting status actions the later entry wins; `regroup` accumulates by
/// overwriting `currentCategory`.
pub fn fold_item_states(session: &Session) -> BTreeMap<String, ItemState> {
    let mut states: BTreeMap<String, ItemState> = BTreeMap::new();

    for (category, item) in session.items() {
        states.insert(
            Session::item_key(item),
            ItemState {
                tab_index: item.tab_index,
                title: item.title.clone(),
                url: item.url.clone(),
                status: ItemStatus::Pending,
                original_category: category.to_string(),
                current_category: category.to_string(),
                regrouped_from: None,
                priority: None,
                trashed_at: None,
                completed_at: None,
                promoted_at: None,
                promoted_to: None,
                deferred_at: None,
                later_at: None,
                undone_at: None,
                undone_action: None,
            },
        );
    }

    for d in &session.dispositions {
        apply(&mut states, d);
    }

    states
}

fn apply(states: &mut BTreeMap<String, ItemState>, d: &Disposition) {
    let Some(state) = states.get_mut(&d.item_id) else {
        debug!(item = %d.item_id, action = %d.action, "Disposition for unknown item ignored");
        return;
    };

    match d.action {
        DispositionAction::Trash => {
            state.status = ItemStatus::Trashed;
            state.trashed_at = Some(d.at);
        }
        DispositionAction::Complete => {
            state.status = ItemStatus::Completed;
            state.completed_at = Some(d.at);
        }
        DispositionAction::Promote => {
            state.status = ItemStatus::Promoted;
            state.promoted_at = Some(d.at);
            state.promoted_to = d.target.clone();
        }
        DispositionAction::Defer => {
            state.status = ItemStatus::Deferred;
            state.deferred_at = Some(d.at);
        }
        DispositionAction::Later => {
            state.status = ItemStatus::Later;
            state.later_at = Some(d.at);
        }
        DispositionAction::Regroup => {
            state.regrouped_from = d.from.clone();
            if let Some(to) = &d.to {
                state.current_category = to.clone();
            }
        }
        DispositionAction::Reprioritize => {
            state.priority = d.priority.clone();
        }
        DispositionAction::Undo => {
            state.status = ItemStatus::Pending;
            state.clear_status_fields();
            state.undone_at = Some(d.at);
            state.undone_action = d.undoes;
            if d.undoes == Some(DispositionAction::Regroup) {
                state.current_category = state.original_category.clone();
                state.regrouped_from = None;
            }
        }
    }
}

fn unresolved(states: &BTreeMap<String, ItemState>) -> u32 {
    states.values().filter(|s| s.status == ItemStatus::Pending).count() as u32
}

impl SessionStore {
    /// The session plus its folded per-item view
    pub fn get_session_with_dispositions(&self, session_id: &str) -> Result<SessionView, DispositionError> {
        let session = self
            .read(session_id)?
            .ok_or_else(|| DispositionError::SessionNotFound(session_id.to_string()))?;
        let item_states = fold_item_states(&session);
        let unresolved_count = unresolved(&item_states);
        Ok(SessionView {
            session,
            unresolved_count,
            all_resolved: unresolved_count == 0,
            item_states,
        })
    }

    /// The applied view: groups physically reshaped to current categories,
    /// trashed/completed/later items extracted
    pub fn get_session_with_dispositions_applied(
        &self,
        session_id: &str,
    ) -> Result<AppliedSessionView, DispositionError> {
        let view = self.get_session_with_dispositions(session_id)?;
        let mut session = view.session;

        let mut groups: BTreeMap<String, Vec<crate::session::GroupItem>> = BTreeMap::new();
        let mut trashed_items = Vec::new();
        let mut completed_items = Vec::new();
        let mut later_items = Vec::new();

        for state in view.item_states.values() {
            match state.status {
                ItemStatus::Trashed => trashed_items.push(state.clone()),
                ItemStatus::Completed => completed_items.push(state.clone()),
                ItemStatus::Later => later_items.push(state.clone()),
                _ => {
                    groups
                        .entry(state.current_category.clone())
                        .or_default()
                        .push(crate::session::GroupItem {
                            tab_index: state.tab_index,
                            title: state.title.clone(),
                            url: state.url.clone(),
                        });
                }
            }
        }
        for items in groups.values_mut() {
            items.sort_by_key(|i| i.tab_index);
        }
        session.groups = groups;

        Ok(AppliedSessionView {
            session,
            trashed_items,
            completed_items,
            later_items,
            unresolved_count: view.unresolved_count,
            all_resolved: view.all_resolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposition::NewDisposition;
    use crate::session::{GroupItem, SessionMode};
    use tempfile::TempDir;

    fn two_tab_session(store: &SessionStore) -> String {
        let mut s = Session::new(SessionMode::Launchpad, 2);
        s.groups.insert(
            "A".into(),
            vec![GroupItem {
                tab_index: 1,
                title: "tab1".into(),
                url: "https://one.example".into(),
            }],
        );
        s.groups.insert(
            "B".into(),
            vec![GroupItem {
                tab_index: 2,
                title: "tab2".into(),
                url: "https://two.example".into(),
            }],
        );
        s.classified_count = 2;
        store.save(&mut s).unwrap()
    }

    #[test]
    fn test_initial_view_all_pending() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = two_tab_session(&store);

        let view = store.get_session_with_dispositions(&id).unwrap();
        assert_eq!(view.unresolved_count, 2);
        assert!(!view.all_resolved);
        assert!(view.item_states.values().all(|s| s.status == ItemStatus::Pending));
    }

    #[test]
    fn test_trash_regroup_undo_scenario() {
        // spec-level scenario: trash(tab1), regroup(tab2 B->A), undo(regroup)
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = two_tab_session(&store);

        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Trash, "https://one.example"))
            .unwrap();
        let mut regroup = NewDisposition::new(DispositionAction::Regroup, "https://two.example");
        regroup.from = Some("B".into());
        regroup.to = Some("A".into());
        store.append_disposition(&id, regroup).unwrap();
        let mut undo = NewDisposition::new(DispositionAction::Undo, "https://two.example");
        undo.undoes = Some(DispositionAction::Regroup);
        store.append_disposition(&id, undo).unwrap();

        let view = store.get_session_with_dispositions(&id).unwrap();
        let tab1 = &view.item_states["https://one.example"];
        let tab2 = &view.item_states["https://two.example"];

        assert_eq!(tab1.status, ItemStatus::Trashed);
        assert!(tab1.trashed_at.is_some());
        assert_eq!(tab2.status, ItemStatus::Pending);
        assert_eq!(tab2.current_category, "B");
        assert!(tab2.regrouped_from.is_none());
        assert_eq!(view.unresolved_count, 1);
    }

    #[test]
    fn test_later_disposition_wins_status() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = two_tab_session(&store);

        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Defer, "https://one.example"))
            .unwrap();
        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Complete, "https://one.example"))
            .unwrap();

        let view = store.get_session_with_dispositions(&id).unwrap();
        let tab1 = &view.item_states["https://one.example"];
        assert_eq!(tab1.status, ItemStatus::Completed);
        // deferredAt survives until an undo clears it; status is what changed
        assert!(tab1.completed_at.is_some());
    }

    #[test]
    fn test_undo_clears_status_fields() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = two_tab_session(&store);

        let mut promote = NewDisposition::new(DispositionAction::Promote, "https://one.example");
        promote.target = Some("notes".into());
        store.append_disposition(&id, promote).unwrap();
        let mut undo = NewDisposition::new(DispositionAction::Undo, "https://one.example");
        undo.undoes = Some(DispositionAction::Promote);
        store.append_disposition(&id, undo).unwrap();

        let view = store.get_session_with_dispositions(&id).unwrap();
        let tab1 = &view.item_states["https://one.example"];
        assert_eq!(tab1.status, ItemStatus::Pending);
        assert!(tab1.promoted_at.is_none());
        assert!(tab1.promoted_to.is_none());
        assert_eq!(tab1.undone_action, Some(DispositionAction::Promote));
        assert!(tab1.undone_at.is_some());
    }

    #[test]
    fn test_regroup_accumulates_by_overwriting() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = two_tab_session(&store);

        for (from, to) in [("A", "B"), ("B", "C")] {
            let mut d = NewDisposition::new(DispositionAction::Regroup, "https://one.example");
            d.from = Some(from.into());
            d.to = Some(to.into());
            store.append_disposition(&id, d).unwrap();
        }

        let view = store.get_session_with_dispositions(&id).unwrap();
        let tab1 = &view.item_states["https://one.example"];
        assert_eq!(tab1.current_category, "C");
        assert_eq!(tab1.regrouped_from.as_deref(), Some("B"));
        assert_eq!(tab1.original_category, "A");
    }

    #[test]
    fn test_unknown_item_ignored_closure() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = two_tab_session(&store);

        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Trash, "https://ghost.example"))
            .unwrap();

        let view = store.get_session_with_dispositions(&id).unwrap();
        assert_eq!(view.item_states.len(), 2);
        assert!(!view.item_states.contains_key("https://ghost.example"));
    }

    #[test]
    fn test_applied_view_reshapes_groups() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = two_tab_session(&store);

        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Trash, "https://one.example"))
            .unwrap();
        let mut regroup = NewDisposition::new(DispositionAction::Regroup, "https://two.example");
        regroup.from = Some("B".into());
        regroup.to = Some("A".into());
        store.append_disposition(&id, regroup).unwrap();

        let applied = store.get_session_with_dispositions_applied(&id).unwrap();
        assert_eq!(applied.trashed_items.len(), 1);
        assert_eq!(applied.trashed_items[0].url, "https://one.example");
        assert!(applied.session.groups.get("B").is_none());
        let a = applied.session.groups.get("A").unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].url, "https://two.example");
    }

    #[test]
    fn test_all_resolved_flips_when_everything_handled() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = two_tab_session(&store);

        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Complete, "https://one.example"))
            .unwrap();
        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Later, "https://two.example"))
            .unwrap();

        let view = store.get_session_with_dispositions(&id).unwrap();
        assert_eq!(view.unresolved_count, 0);
        assert!(view.all_resolved);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_action() -> impl Strategy<Value = DispositionAction> {
            prop_oneof![
                Just(DispositionAction::Trash),
                Just(DispositionAction::Complete),
                Just(DispositionAction::Defer),
                Just(DispositionAction::Later),
                Just(DispositionAction::Undo),
            ]
        }

        fn session_of(urls: &[&str]) -> Session {
            let mut s = Session::new(SessionMode::Results, urls.len() as u32);
            s.groups.insert(
                "A".into(),
                urls.iter()
                    .enumerate()
                    .map(|(i, u)| GroupItem {
                        tab_index: i as u32 + 1,
                        title: format!("t{i}"),
                        url: u.to_string(),
                    })
                    .collect(),
            );
            s.classified_count = urls.len() as u32;
            s
        }

        proptest! {
            #[test]
            fn fold_is_deterministic_and_closed(
                picks in proptest::collection::vec((0usize..3, arb_action()), 0..40)
            ) {
                let urls = ["https://a.example", "https://b.example", "https://c.example"];
                let mut session = session_of(&urls);
                for (idx, action) in picks {
                    session.dispositions.push(Disposition {
                        action,
                        item_id: urls[idx].to_string(),
                        at: Utc::now(),
                        from: None,
                        to: None,
                        target: None,
                        priority: None,
                        undoes: (action == DispositionAction::Undo).then_some(DispositionAction::Trash),
                        batch: None,
                    });
                }

                let once = fold_item_states(&session);
                let twice = fold_item_states(&session);
                prop_assert_eq!(
                    serde_json::to_value(&once).unwrap(),
                    serde_json::to_value(&twice).unwrap()
                );
                // closure: every key is one of the original item keys
                for key in once.keys() {
                    prop_assert!(urls.contains(&key.as_str()));
                }
            }
        }
    }
}
