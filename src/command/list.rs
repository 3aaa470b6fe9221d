use log::warn;

use crate::data::{FeatureGraph, FeatureId};
use crate::errors::Result;

use super::Command;

/// One undo step: commands applied in order and undone in reverse.
///
/// Application is all-or-nothing. When a command fails, the ones before it
/// are undone again before the error is returned, so a list is either fully
/// applied or not applied at all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandList {
    description: String,
    subject: Option<FeatureId>,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(description: impl Into<String>) -> Self {
        CommandList {
            description: description.into(),
            subject: None,
            commands: Vec::new(),
        }
    }

    pub fn with_subject(mut self, subject: FeatureId) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn set_subject(&mut self, subject: Option<FeatureId>) {
        self.subject = subject;
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Feature to reselect once this step is done, undone or redone.
    pub fn subject(&self) -> Option<FeatureId> {
        self.subject
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn apply(&mut self, graph: &mut FeatureGraph) -> Result<()> {
        for index in 0..self.commands.len() {
            if let Err(err) = self.commands[index].apply(graph) {
                let message = err.to_string();
                warn!(
                    list = self.description.as_str(),
                    command = self.commands[index].name(),
                    err = message.as_str();
                    "Command failed, rolling back"
                );
                for applied in self.commands[..index].iter_mut().rev() {
                    applied.undo(graph)?;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn undo(&mut self, graph: &mut FeatureGraph) -> Result<()> {
        let len = self.commands.len();
        for index in (0..len).rev() {
            if let Err(err) = self.commands[index].undo(graph) {
                let message = err.to_string();
                warn!(
                    list = self.description.as_str(),
                    command = self.commands[index].name(),
                    err = message.as_str();
                    "Undo failed, reapplying"
                );
                for undone in self.commands[index + 1..].iter_mut() {
                    undone.apply(graph)?;
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Coord, Feature, LayerId};
    use crate::errors::Error;

    fn sample() -> (FeatureGraph, LayerId) {
        let mut graph = FeatureGraph::new();
        let layer = graph.add_layer("dirty", true).unwrap();
        graph.insert(layer, None, Feature::node(1, Coord::default())).unwrap();
        (graph, layer)
    }

    #[test]
    fn test_apply_and_undo_in_order() {
        let (mut graph, layer) = sample();
        let before = graph.clone();
        let mut list = CommandList::new("Add road");
        list.push(Command::add_feature(layer, Feature::node(2, Coord::new(1.0, 1.0))));
        list.push(Command::add_feature(layer, Feature::road(1, vec![FeatureId::node(1), FeatureId::node(2)])));
        list.push(Command::set_tag(FeatureId::road(1), "highway", "residential"));
        list.apply(&mut graph).unwrap();
        assert_eq!(graph.road(FeatureId::road(1)).unwrap().nodes.len(), 2);
        list.undo(&mut graph).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn test_failed_command_rolls_back_earlier_ones() {
        let (mut graph, layer) = sample();
        let before = graph.clone();
        let mut list = CommandList::new("Broken");
        list.push(Command::set_tag(FeatureId::node(1), "name", "A"));
        list.push(Command::add_feature(layer, Feature::node(3, Coord::default())));
        list.push(Command::remove_feature(FeatureId::node(99)));
        let err = list.apply(&mut graph).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(graph, before);
        assert!(list.commands().iter().all(|c| !c.is_applied()));
        assert!(graph.check_index());
    }

    #[test]
    fn test_subject_and_description() {
        let mut list = CommandList::new("Merge Nodes").with_subject(FeatureId::node(4));
        assert_eq!(list.subject(), Some(FeatureId::node(4)));
        list.set_description("Merge Nodes into n4");
        assert_eq!(list.description(), "Merge Nodes into n4");
        assert!(list.is_empty());
    }
}
