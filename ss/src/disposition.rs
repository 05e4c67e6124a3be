//! Append-only disposition log
//!
//! Dispositions are the store's source of truth for user actions on
//! classified items. Entries are validated, stamped, and appended; nothing is
//! ever edited in place. The current per-item state is derived by the view
//! layer in [`crate::view`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DispositionError;
use crate::store::SessionStore;

/// User action on a classified item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispositionAction {
    Trash,
    Complete,
    Regroup,
    Reprioritize,
    Promote,
    Defer,
    Later,
    Undo,
}

impl DispositionAction {
    /// Parse an action name as received from the wire
    pub fn parse(name: &str) -> Result<Self, DispositionError> {
        match name {
            "trash" => Ok(Self::Trash),
            "complete" => Ok(Self::Complete),
            "regroup" => Ok(Self::Regroup),
            "reprioritize" => Ok(Self::Reprioritize),
            "promote" => Ok(Self::Promote),
            "defer" => Ok(Self::Defer),
            "later" => Ok(Self::Later),
            "undo" => Ok(Self::Undo),
            other => Err(DispositionError::UnknownAction(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Trash => "trash",
            Self::Complete => "complete",
            Self::Regroup => "regroup",
            Self::Reprioritize => "reprioritize",
            Self::Promote => "promote",
            Self::Defer => "defer",
            Self::Later => "later",
            Self::Undo => "undo",
        }
    }
}

impl std::fmt::Display for DispositionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One recorded disposition entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disposition {
    pub action: DispositionAction,
    /// The item's url, or `tab-<index>` when the url is absent
    pub item_id: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undoes: Option<DispositionAction>,
    /// Set on entries appended through the batch path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<bool>,
}

/// A disposition as submitted by the caller, before stamping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDisposition {
    pub action: DispositionAction,
    pub item_id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub undoes: Option<DispositionAction>,
}

impl NewDisposition {
    pub fn new(action: DispositionAction, item_id: impl Into<String>) -> Self {
        Self {
            action,
            item_id: item_id.into(),
            from: None,
            to: None,
            target: None,
            priority: None,
            undoes: None,
        }
    }

    /// Validate required fields for this entry's action
    pub fn validate(&self) -> Result<(), DispositionError> {
        if self.item_id.is_empty() {
            return Err(DispositionError::EmptyItemId);
        }
        let missing = |field: &str| DispositionError::MissingField {
            action: self.action.name().to_string(),
            field: field.to_string(),
        };
        match self.action {
            DispositionAction::Regroup => {
                if self.from.as_deref().unwrap_or("").is_empty() {
                    return Err(missing("from"));
                }
                if self.to.as_deref().unwrap_or("").is_empty() {
                    return Err(missing("to"));
                }
            }
            DispositionAction::Promote => {
                if self.target.as_deref().unwrap_or("").is_empty() {
                    return Err(missing("target"));
                }
            }
            DispositionAction::Undo => {
                if self.undoes.is_none() {
                    return Err(missing("undoes"));
                }
            }
            DispositionAction::Reprioritize => {
                if self.priority.as_deref().unwrap_or("").is_empty() {
                    return Err(missing("priority"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Stamp the entry, copying only the fields this action carries
    fn stamp(&self, at: DateTime<Utc>, batch: bool) -> Disposition {
        let mut d = Disposition {
            action: self.action,
            item_id: self.item_id.clone(),
            at,
            from: None,
            to: None,
            target: None,
            priority: None,
            undoes: None,
            batch: batch.then_some(true),
        };
        match self.action {
            DispositionAction::Regroup => {
                d.from = self.from.clone();
                d.to = self.to.clone();
            }
            DispositionAction::Promote => {
                d.target = self.target.clone();
            }
            DispositionAction::Reprioritize => {
                d.priority = self.priority.clone();
            }
            DispositionAction::Undo => {
                d.undoes = self.undoes;
            }
            _ => {}
        }
        d
    }
}

impl SessionStore {
    /// Validate, stamp, and append one disposition. All-or-nothing: on any
    /// error the artifact is unchanged.
    pub fn append_disposition(
        &self,
        session_id: &str,
        disposition: NewDisposition,
    ) -> Result<Disposition, DispositionError> {
        disposition.validate()?;

        let guard = self.guard_for(session_id);
        let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

        let mut session = self
            .read(session_id)?
            .ok_or_else(|| DispositionError::SessionNotFound(session_id.to_string()))?;

        let stamped = disposition.stamp(Utc::now(), false);
        session.dispositions.push(stamped.clone());
        self.write(session_id, &session)?;

        info!(%session_id, action = %stamped.action, item = %stamped.item_id, "Appended disposition");
        Ok(stamped)
    }

    /// Append a batch atomically: every entry is validated before any write,
    /// all entries share one timestamp and carry `batch: true`.
    pub fn append_batch_disposition(
        &self,
        session_id: &str,
        dispositions: Vec<NewDisposition>,
    ) -> Result<Vec<Disposition>, DispositionError> {
        if dispositions.is_empty() {
            return Err(DispositionError::EmptyBatch);
        }
        for d in &dispositions {
            d.validate()?;
        }

        let guard = self.guard_for(session_id);
        let _held = guard.lock().unwrap_or_else(|e| e.into_inner());

        let mut session = self
            .read(session_id)?
            .ok_or_else(|| DispositionError::SessionNotFound(session_id.to_string()))?;

        let at = Utc::now();
        let stamped: Vec<Disposition> = dispositions.iter().map(|d| d.stamp(at, true)).collect();
        session.dispositions.extend(stamped.iter().cloned());
        self.write(session_id, &session)?;

        debug!(%session_id, count = stamped.len(), "Appended batch disposition");
        Ok(stamped)
    }

    /// The raw disposition list for a session (possibly empty)
    pub fn get_dispositions(&self, session_id: &str) -> Result<Vec<Disposition>, DispositionError> {
        let session = self
            .read(session_id)?
            .ok_or_else(|| DispositionError::SessionNotFound(session_id.to_string()))?;
        Ok(session.dispositions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{GroupItem, Session, SessionMode};
    use tempfile::TempDir;

    fn seeded_store(temp: &TempDir) -> (SessionStore, String) {
        let store = SessionStore::open(temp.path()).unwrap();
        let mut s = Session::new(SessionMode::Launchpad, 2);
        s.groups.insert(
            "Research".into(),
            vec![GroupItem {
                tab_index: 1,
                title: "Paper".into(),
                url: "https://a.example/paper".into(),
            }],
        );
        s.groups.insert(
            "Shopping".into(),
            vec![GroupItem {
                tab_index: 2,
                title: "Cart".into(),
                url: "https://b.example/cart".into(),
            }],
        );
        s.classified_count = 2;
        let id = store.save(&mut s).unwrap();
        (store, id)
    }

    #[test]
    fn test_append_lands_at_end_of_list() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);

        store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Trash, "https://a.example/paper"))
            .unwrap();
        let d2 = store
            .append_disposition(
                &id,
                NewDisposition::new(DispositionAction::Complete, "https://b.example/cart"),
            )
            .unwrap();

        let log = store.get_dispositions(&id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].action, d2.action);
        assert_eq!(log[1].item_id, "https://b.example/cart");
    }

    #[test]
    fn test_regroup_requires_from_and_to() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);

        let mut d = NewDisposition::new(DispositionAction::Regroup, "https://a.example/paper");
        d.to = Some("Shopping".into());
        let err = store.append_disposition(&id, d).unwrap_err();
        assert!(matches!(err, DispositionError::MissingField { ref field, .. } if field == "from"));

        // nothing was appended
        assert!(store.get_dispositions(&id).unwrap().is_empty());
    }

    #[test]
    fn test_promote_requires_target_and_undo_requires_undoes() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);

        let d = NewDisposition::new(DispositionAction::Promote, "https://a.example/paper");
        assert!(store.append_disposition(&id, d).is_err());

        let d = NewDisposition::new(DispositionAction::Undo, "https://a.example/paper");
        assert!(store.append_disposition(&id, d).is_err());
    }

    #[test]
    fn test_empty_item_id_rejected() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);
        let err = store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Trash, ""))
            .unwrap_err();
        assert!(matches!(err, DispositionError::EmptyItemId));
    }

    #[test]
    fn test_missing_session_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::open(temp.path()).unwrap();
        let err = store
            .append_disposition(
                "2026-01-01T00-00-00Z",
                NewDisposition::new(DispositionAction::Trash, "https://a.example"),
            )
            .unwrap_err();
        assert!(matches!(err, DispositionError::SessionNotFound(_)));
    }

    #[test]
    fn test_stamp_copies_only_action_fields() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);

        // a trash entry carrying junk extras: extras must not persist
        let mut d = NewDisposition::new(DispositionAction::Trash, "https://a.example/paper");
        d.to = Some("Nonsense".into());
        d.target = Some("notes".into());
        let stamped = store.append_disposition(&id, d).unwrap();
        assert!(stamped.to.is_none());
        assert!(stamped.target.is_none());
    }

    #[test]
    fn test_batch_shares_timestamp_and_marks_batch() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);

        let batch = vec![
            NewDisposition::new(DispositionAction::Complete, "https://a.example/paper"),
            NewDisposition::new(DispositionAction::Complete, "https://b.example/cart"),
        ];
        let stamped = store.append_batch_disposition(&id, batch).unwrap();
        assert_eq!(stamped.len(), 2);
        assert_eq!(stamped[0].at, stamped[1].at);
        assert_eq!(stamped[0].batch, Some(true));
        assert_eq!(stamped[1].batch, Some(true));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);
        let err = store.append_batch_disposition(&id, vec![]).unwrap_err();
        assert!(matches!(err, DispositionError::EmptyBatch));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);

        let batch = vec![
            NewDisposition::new(DispositionAction::Complete, "https://a.example/paper"),
            NewDisposition::new(DispositionAction::Promote, "https://b.example/cart"), // missing target
        ];
        assert!(store.append_batch_disposition(&id, batch).is_err());
        assert!(store.get_dispositions(&id).unwrap().is_empty());
    }

    #[test]
    fn test_action_parse_round_trip() {
        for name in ["trash", "complete", "regroup", "reprioritize", "promote", "defer", "later", "undo"] {
            assert_eq!(DispositionAction::parse(name).unwrap().name(), name);
        }
        assert!(matches!(
            DispositionAction::parse("obliterate"),
            Err(DispositionError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_timestamps_not_before_session() {
        let temp = TempDir::new().unwrap();
        let (store, id) = seeded_store(&temp);
        let d = store
            .append_disposition(&id, NewDisposition::new(DispositionAction::Trash, "https://a.example/paper"))
            .unwrap();
        let session = store.read(&id).unwrap().unwrap();
        assert!(d.at >= session.timestamp);
    }
}
