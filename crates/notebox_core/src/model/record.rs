//! Note record model.
//!
//! # Responsibility
//! - Define the single persisted entity (`id`, `title`, `notes`).
//! - Fix the JSON shape records take when crossing the worker boundary.
//!
//! # Invariants
//! - `id` is assigned by the store, monotonically increasing and never
//!   reassigned to another record.
//! - `id` is `None` only for records that have not been created yet.

use serde::{Deserialize, Serialize};

/// Store-assigned record identifier.
pub type RecordId = i64;

/// One persisted note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Omitted on the wire until the store assigns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Indexed title used by substring filtering.
    #[serde(default)]
    pub title: String,
    /// Free-form body text.
    #[serde(default)]
    pub notes: String,
}

impl Record {
    /// Creates a record that has not been persisted yet.
    pub fn new(title: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            notes: notes.into(),
        }
    }

    /// Returns a copy carrying the given id.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether the store has assigned an id to this record.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::Record;
    use serde_json::json;

    #[test]
    fn new_record_omits_id_on_the_wire() {
        let value = serde_json::to_value(Record::new("Groceries", "milk")).unwrap();
        assert_eq!(value, json!({"title": "Groceries", "notes": "milk"}));
    }

    #[test]
    fn missing_text_fields_default_to_empty() {
        let record: Record = serde_json::from_value(json!({"id": 4})).unwrap();
        assert_eq!(record.id, Some(4));
        assert!(record.title.is_empty());
        assert!(record.notes.is_empty());
        assert!(record.is_persisted());
    }
}
