//! Coordinating layer between UI components and the command channel.
//!
//! # Responsibility
//! - Translate list/editor signals into channel calls.
//! - Push canonical results back into the list and editor displays.
//!
//! # Invariants
//! - Displays are only updated after the matching call succeeded; on failure
//!   UI state is left untouched and the error is returned.
//! - After a create, the editor holds the canonical record (with its id), so
//!   the next save of the same note is an update.

use crate::channel::{ChannelError, CommandChannel};
use crate::model::record::{Record, RecordId};
use log::warn;

/// List component contract.
pub trait ListDisplay {
    fn add_all(&mut self, records: &[Record]);
    fn insert_one(&mut self, record: &Record);
    fn replace_one(&mut self, record: &Record);
    fn remove_one(&mut self, id: RecordId);
    fn mark_selected(&mut self, id: RecordId);
}

/// Editor component contract.
pub trait EditorDisplay {
    /// Loads a record into the form, or clears it with `None`.
    fn load_into(&mut self, record: Option<&Record>);
}

/// Submit signal raised by the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorSubmit {
    Create(Record),
    Update(Record),
    Delete(RecordId),
    Cancel,
}

/// Drives the displays from channel results.
pub struct NotesController<L: ListDisplay, E: EditorDisplay> {
    channel: CommandChannel,
    list: L,
    editor: E,
}

impl<L: ListDisplay, E: EditorDisplay> NotesController<L, E> {
    pub fn new(channel: CommandChannel, list: L, editor: E) -> Self {
        Self {
            channel,
            list,
            editor,
        }
    }

    /// Initializes the store and fills the list.
    pub async fn start(&mut self) -> Result<(), ChannelError> {
        report("init", self.channel.init().await)?;
        self.refresh().await
    }

    /// Reloads the full list from storage.
    pub async fn refresh(&mut self) -> Result<(), ChannelError> {
        let records = report("list_all", self.channel.list_all().await)?;
        self.list.add_all(&records);
        Ok(())
    }

    /// Applies an editor submit signal.
    pub async fn on_submit(&mut self, submit: EditorSubmit) -> Result<(), ChannelError> {
        match submit {
            EditorSubmit::Create(record) => {
                let created = report("create", self.channel.create(record).await)?;
                self.list.insert_one(&created);
                if let Some(id) = created.id {
                    self.list.mark_selected(id);
                }
                self.editor.load_into(Some(&created));
            }
            EditorSubmit::Update(record) => {
                let updated = report("update", self.channel.update(record).await)?;
                self.list.replace_one(&updated);
            }
            EditorSubmit::Delete(id) => {
                let deleted = report("delete", self.channel.delete(id).await)?;
                self.list.remove_one(deleted);
                self.editor.load_into(None);
            }
            EditorSubmit::Cancel => {}
        }
        Ok(())
    }

    /// Loads the selected record into the editor.
    pub async fn on_selection_changed(&mut self, id: RecordId) -> Result<(), ChannelError> {
        let record = report("read", self.channel.read(id).await)?;
        if record.is_some() {
            self.list.mark_selected(id);
        }
        self.editor.load_into(record.as_ref());
        Ok(())
    }

    /// Replaces the list contents with records whose title contains `text`.
    pub async fn apply_filter(&mut self, text: &str) -> Result<(), ChannelError> {
        let records = report("filter", self.channel.filter(text).await)?;
        self.list.add_all(&records);
        Ok(())
    }

    pub fn list(&self) -> &L {
        &self.list
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Closes the channel and hands the displays back.
    pub fn dispose(mut self) -> (L, E) {
        self.channel.close();
        (self.list, self.editor)
    }
}

fn report<T>(action: &'static str, outcome: Result<T, ChannelError>) -> Result<T, ChannelError> {
    if let Err(err) = &outcome {
        warn!("event=ui_action module=coordinator status=error action={action} error={err}");
    }
    outcome
}
