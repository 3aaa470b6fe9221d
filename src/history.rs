use log::info;

use crate::command::CommandList;
use crate::data::{FeatureGraph, FeatureId};
use crate::errors::{Error, Result};

/// What the undo/redo affordances need after a history transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryState {
    pub position: usize,
    pub len: usize,
    pub can_undo: bool,
    pub can_redo: bool,
    /// Position differs from the one last marked as saved.
    pub modified: bool,
    pub undo_description: Option<String>,
    pub redo_description: Option<String>,
    /// Subject of the list that was just applied or undone.
    pub subject: Option<FeatureId>,
}

/// Undo/redo stack of command lists.
///
/// `position` counts the lists currently applied: 0 means none, `len` means
/// all. Lists past the position form the redo tail, which a new push drops.
#[derive(Debug, Default)]
pub struct History {
    lists: Vec<CommandList>,
    position: usize,
    saved: Option<usize>,
    limit: Option<usize>,
}

impl History {
    pub fn new(limit: Option<usize>) -> Self {
        History {
            lists: Vec::new(),
            position: 0,
            saved: Some(0),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn can_undo(&self) -> bool {
        self.position > 0
    }

    pub fn can_redo(&self) -> bool {
        self.position < self.lists.len()
    }

    pub fn lists(&self) -> &[CommandList] {
        &self.lists
    }

    /// Applies `list` and records it. Nothing is recorded if it fails.
    pub fn push(&mut self, mut list: CommandList, graph: &mut FeatureGraph) -> Result<HistoryState> {
        list.apply(graph)?;
        let (subject, commands) = (list.subject(), list.len());
        self.lists.truncate(self.position);
        if self.saved.map_or(false, |saved| saved > self.position) {
            self.saved = None;
        }
        self.lists.push(list);
        self.position += 1;

        if let Some(limit) = self.limit {
            if self.lists.len() > limit {
                let excess = self.lists.len() - limit;
                self.lists.drain(..excess);
                self.position -= excess;
                self.saved = self.saved.and_then(|saved| saved.checked_sub(excess));
            }
        }

        let state = self.state_with(subject);
        info!(
            list = state.undo_description.as_deref().unwrap_or(""),
            commands = commands,
            position = state.position,
            len = state.len;
            "Pushed onto history"
        );
        Ok(state)
    }

    pub fn undo(&mut self, graph: &mut FeatureGraph) -> Result<HistoryState> {
        if self.position == 0 {
            return Err(Error::NothingToUndo);
        }
        let list = &mut self.lists[self.position - 1];
        list.undo(graph)?;
        let subject = list.subject();
        self.position -= 1;

        let state = self.state_with(subject);
        info!(
            list = state.redo_description.as_deref().unwrap_or(""),
            position = state.position;
            "Undone"
        );
        Ok(state)
    }

    pub fn redo(&mut self, graph: &mut FeatureGraph) -> Result<HistoryState> {
        if self.position == self.lists.len() {
            return Err(Error::NothingToRedo);
        }
        let list = &mut self.lists[self.position];
        list.apply(graph)?;
        let subject = list.subject();
        self.position += 1;

        let state = self.state_with(subject);
        info!(
            list = state.undo_description.as_deref().unwrap_or(""),
            position = state.position;
            "Redone"
        );
        Ok(state)
    }

    pub fn mark_saved(&mut self) {
        self.saved = Some(self.position);
    }

    pub fn is_modified(&self) -> bool {
        self.saved != Some(self.position)
    }

    /// Forgets every list. The graph keeps its current state.
    pub fn clear(&mut self) {
        self.lists.clear();
        self.position = 0;
        self.saved = None;
    }

    pub fn state(&self) -> HistoryState {
        let subject = self.position.checked_sub(1).and_then(|i| self.lists[i].subject());
        self.state_with(subject)
    }

    fn state_with(&self, subject: Option<FeatureId>) -> HistoryState {
        HistoryState {
            position: self.position,
            len: self.lists.len(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            modified: self.is_modified(),
            undo_description: self
                .position
                .checked_sub(1)
                .map(|i| self.lists[i].description().to_string()),
            redo_description: self.lists.get(self.position).map(|l| l.description().to_string()),
            subject,
        }
    }
}
