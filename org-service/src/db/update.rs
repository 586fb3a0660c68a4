use super::error::StoreError;
use bson::{doc, Bson, Document};
use serde::Serialize;

/// A partial-update document.
///
/// Only [`UpdateDocBuilder::build`] creates one, so every update the executor
/// issues carries the `updatedAt` stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDoc(Document);

impl UpdateDoc {
    /// True when the update touches anything besides the timestamp.
    pub fn has_changes(&self) -> bool {
        self.0.keys().any(|key| key != "$currentDate")
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

#[derive(Debug, Default, Clone)]
pub struct UpdateDocBuilder {
    set: Option<Document>,
    push: Option<Document>,
    pull: Option<Document>,
}

impl UpdateDocBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(mut self, fields: Document) -> Self {
        merge_group(&mut self.set, fields);
        self
    }

    pub fn with_push(mut self, fields: Document) -> Self {
        merge_group(&mut self.push, fields);
        self
    }

    pub fn with_pull(mut self, fields: Document) -> Self {
        merge_group(&mut self.pull, fields);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_none() && self.push.is_none() && self.pull.is_none()
    }

    pub fn build(self) -> UpdateDoc {
        let mut update = Document::new();
        if let Some(set) = self.set {
            update.insert("$set", set);
        }
        if let Some(push) = self.push {
            update.insert("$push", push);
        }
        if let Some(pull) = self.pull {
            update.insert("$pull", pull);
        }
        update.insert("$currentDate", doc! { "updatedAt": true });
        UpdateDoc(update)
    }
}

fn merge_group(group: &mut Option<Document>, fields: Document) {
    if fields.is_empty() {
        return;
    }
    match group {
        Some(existing) => existing.extend(fields),
        None => *group = Some(fields),
    }
}

/// Serializes a partial struct into `$set` fields, dropping unset values.
///
/// Pair with `#[serde(skip_serializing_if = "Option::is_none")]` on the
/// struct's optional fields.
pub fn set_fields<S: Serialize>(fields: &S) -> Result<Document, StoreError> {
    let mut document = bson::to_document(fields)?;
    let nulls: Vec<String> = document
        .iter()
        .filter(|(_, value)| matches!(value, Bson::Null))
        .map(|(key, _)| key.clone())
        .collect();
    for key in nulls {
        document.remove(&key);
    }
    Ok(document)
}
