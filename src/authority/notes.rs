use log::debug;

use super::{normalize_note, StateAuthority};
use crate::{error::CommandError, storage::RecordKey};

impl StateAuthority {
    /// Notes are stored trimmed; adding one that already exists is ignored.
    pub async fn add_note(&self, text: &str) -> Result<(), CommandError> {
        let note = normalize_note(text).ok_or(CommandError::EmptyNote)?;

        let mut records = self.inner.records.lock().await;
        if records.notes.contains(&note) {
            return Ok(());
        }

        debug!("Adding note ({} chars)", note.len());
        records.notes.push(note);
        self.inner.persist(RecordKey::Notes, &records.notes).await;
        Ok(())
    }

    /// A blank or unknown note has nothing to delete and succeeds unchanged.
    pub async fn delete_note(&self, text: &str) -> Result<(), CommandError> {
        let Some(note) = normalize_note(text) else {
            return Ok(());
        };

        let mut records = self.inner.records.lock().await;
        let before = records.notes.len();
        records.notes.retain(|existing| *existing != note);
        if records.notes.len() != before {
            self.inner.persist(RecordKey::Notes, &records.notes).await;
        }
        Ok(())
    }
}
