//! Effort manager
//!
//! An effort is a user-named batch of items inside one session. Completing
//! or deferring an effort resolves every member through the disposition log,
//! so the view layer stays the single source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::disposition::{DispositionAction, NewDisposition};
use crate::error::EffortError;
use crate::store::SessionStore;

/// Effort lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EffortStatus {
    #[default]
    Pending,
    Completed,
    Deferred,
}

impl std::fmt::Display for EffortStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Deferred => "deferred",
        };
        write!(f, "{name}")
    }
}

/// One item captured into an effort, with the category it had at creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffortItem {
    pub item_id: String,
    pub category: String,
}

/// A user-named group of items resolved atomically
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effort {
    pub id: String,
    pub name: String,
    pub items: Vec<EffortItem>,
    pub status: EffortStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_at: Option<DateTime<Utc>>,
}

/// Aggregate effort counts for a session
#[derive(Debug, Clone, Copy, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EffortStats {
    pub total: u32,
    pub pending: u32,
    pub completed: u32,
    pub deferred: u32,
    pub total_items: u32,
}

fn effort_id(now: DateTime<Utc>) -> String {
    format!("effort-{}-{:06x}", now.timestamp_millis(), rand::random::<u32>() & 0xff_ffff)
}

impl SessionStore {
    /// Create an effort over the given item ids. Items are recorded with the
    /// category they currently sit in.
    pub fn create_effort(
        &self,
        session_id: &str,
        name: &str,
        item_ids: Vec<String>,
    ) -> Result<Effort, EffortError> {
        if name.trim().is_empty() {
            return Err(EffortError::EmptyName);
        }
        if item_ids.is_empty() {
            return Err(EffortError::EmptyItems);
        }

        let guard = self.guard_for(session_id);
        let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

        let mut session = self
            .read(session_id)?
            .ok_or_else(|| EffortError::SessionNotFound(session_id.to_string()))?;

        let now = Utc::now();
        let items = item_ids
            .into_iter()
            .map(|item_id| {
                let category = session
                    .find_item(&item_id)
                    .map(|(category, _)| category.to_string())
                    .unwrap_or_default();
                EffortItem { item_id, category }
            })
            .collect();

        let effort = Effort {
            id: effort_id(now),
            name: name.to_string(),
            items,
            status: EffortStatus::Pending,
            created_at: now,
            completed_at: None,
            deferred_at: None,
        };

        session.efforts.push(effort.clone());
        self.write(session_id, &session)?;

        info!(%session_id, effort = %effort.id, name, "Created effort");
        Ok(effort)
    }

    /// Transition a pending effort to completed and resolve every member
    /// with a batch `complete` disposition.
    pub fn complete_effort(&self, session_id: &str, effort_id: &str) -> Result<Effort, EffortError> {
        self.finish_effort(session_id, effort_id, EffortStatus::Completed, DispositionAction::Complete)
    }

    /// Transition a pending effort to deferred; members get a batch `later`
    /// disposition so they drop out of the unresolved count.
    pub fn defer_effort(&self, session_id: &str, effort_id: &str) -> Result<Effort, EffortError> {
        self.finish_effort(session_id, effort_id, EffortStatus::Deferred, DispositionAction::Later)
    }

    fn finish_effort(
        &self,
        session_id: &str,
        effort_id: &str,
        to_status: EffortStatus,
        action: DispositionAction,
    ) -> Result<Effort, EffortError> {
        let updated = {
            let guard = self.guard_for(session_id);
            let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

            let mut session = self
                .read(session_id)?
                .ok_or_else(|| EffortError::SessionNotFound(session_id.to_string()))?;

            let effort = session
                .efforts
                .iter_mut()
                .find(|e| e.id == effort_id)
                .ok_or_else(|| EffortError::NotFound(effort_id.to_string()))?;

            if effort.status != EffortStatus::Pending {
                return Err(EffortError::NotPending {
                    id: effort_id.to_string(),
                    status: effort.status.to_string(),
                });
            }

            let now = Utc::now();
            effort.status = to_status;
            match to_status {
                EffortStatus::Completed => effort.completed_at = Some(now),
                EffortStatus::Deferred => effort.deferred_at = Some(now),
                EffortStatus::Pending => {}
            }
            let updated = effort.clone();
            self.write(session_id, &session)?;
            updated
        };

        let batch: Vec<NewDisposition> = updated
            .items
            .iter()
            .map(|i| NewDisposition::new(action, i.item_id.clone()))
            .collect();
        self.append_batch_disposition(session_id, batch)?;

        info!(%session_id, effort = %updated.id, status = %updated.status, "Resolved effort");
        Ok(updated)
    }

    /// Aggregate counts over a session's efforts
    pub fn effort_stats(&self, session_id: &str) -> Result<EffortStats, EffortError> {
        let session = self
            .read(session_id)?
            .ok_or_else(|| EffortError::SessionNotFound(session_id.to_string()))?;

        let mut stats = EffortStats::default();
        for effort in &session.efforts {
            stats.total += 1;
            stats.total_items += effort.items.len() as u32;
            match effort.status {
                EffortStatus::Pending => stats.pending += 1,
                EffortStatus::Completed => stats.completed += 1,
                EffortStatus::Deferred => stats.deferred += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{GroupItem, Session, SessionMode};
    use crate::view::ItemStatus;
    use tempfile::TempDir;

    fn seeded(store: &SessionStore) -> String {
        let mut s = Session::new(SessionMode::Launchpad, 2);
        s.groups.insert(
            "Research".into(),
            vec![
                GroupItem {
                    tab_index: 1,
                    title: "one".into(),
                    url: "https://one.example".into(),
                },
                GroupItem {
                    tab_index: 2,
                    title: "two".into(),
                    url: "https://two.example".into(),
                },
            ],
        );
        s.classified_count = 2;
        store.save(&mut s).unwrap()
    }

    #[test]
    fn test_create_effort_records_original_category() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = seeded(&store);

        let effort = store
            .create_effort(&id, "morning sweep", vec!["https://one.example".into()])
            .unwrap();
        assert!(effort.id.starts_with("effort-"));
        assert_eq!(effort.status, EffortStatus::Pending);
        assert_eq!(effort.items[0].category, "Research");

        let session = store.read(&id).unwrap().unwrap();
        assert_eq!(session.efforts.len(), 1);
    }

    #[test]
    fn test_create_effort_validation() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = seeded(&store);

        assert!(matches!(
            store.create_effort(&id, "  ", vec!["x".into()]),
            Err(EffortError::EmptyName)
        ));
        assert!(matches!(
            store.create_effort(&id, "sweep", vec![]),
            Err(EffortError::EmptyItems)
        ));
    }

    #[test]
    fn test_complete_effort_resolves_members() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = seeded(&store);

        let effort = store
            .create_effort(
                &id,
                "sweep",
                vec!["https://one.example".into(), "https://two.example".into()],
            )
            .unwrap();
        let done = store.complete_effort(&id, &effort.id).unwrap();
        assert_eq!(done.status, EffortStatus::Completed);
        assert!(done.completed_at.is_some());

        let view = store.get_session_with_dispositions(&id).unwrap();
        assert!(view.all_resolved);
        assert!(
            view.item_states
                .values()
                .all(|s| s.status == ItemStatus::Completed)
        );
        // batch markers on the emitted dispositions
        let log = store.get_dispositions(&id).unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|d| d.batch == Some(true)));
    }

    #[test]
    fn test_defer_effort_emits_later() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = seeded(&store);

        let effort = store
            .create_effort(&id, "sweep", vec!["https://one.example".into()])
            .unwrap();
        let deferred = store.defer_effort(&id, &effort.id).unwrap();
        assert_eq!(deferred.status, EffortStatus::Deferred);
        assert!(deferred.deferred_at.is_some());

        let view = store.get_session_with_dispositions(&id).unwrap();
        assert_eq!(view.item_states["https://one.example"].status, ItemStatus::Later);
    }

    #[test]
    fn test_finish_requires_pending() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = seeded(&store);

        let effort = store
            .create_effort(&id, "sweep", vec!["https://one.example".into()])
            .unwrap();
        store.complete_effort(&id, &effort.id).unwrap();

        let err = store.defer_effort(&id, &effort.id).unwrap_err();
        assert!(matches!(err, EffortError::NotPending { .. }));
    }

    #[test]
    fn test_missing_effort() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = seeded(&store);
        assert!(matches!(
            store.complete_effort(&id, "effort-0-zzz"),
            Err(EffortError::NotFound(_))
        ));
    }

    #[test]
    fn test_effort_stats() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let id = seeded(&store);

        let a = store
            .create_effort(&id, "a", vec!["https://one.example".into()])
            .unwrap();
        store
            .create_effort(&id, "b", vec!["https://two.example".into()])
            .unwrap();
        store.complete_effort(&id, &a.id).unwrap();

        let stats = store.effort_stats(&id).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.deferred, 0);
        assert_eq!(stats.total_items, 2);
    }
}
