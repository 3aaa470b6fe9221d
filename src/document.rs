use std::fmt;

use log::{info, warn};

use crate::command::CommandList;
use crate::config::EditorConfig;
use crate::data::{Feature, FeatureGraph, FeatureId, Layer, LayerId};
use crate::errors::{Error, Result};
use crate::history::{History, HistoryState};
use crate::manipulations::Manipulation;

/// Receives change notifications from a [`Document`], typically to refresh
/// undo/redo controls, layer lists and the map view.
pub trait DocumentObserver {
    fn history_changed(&mut self, _state: &HistoryState) {}
    fn layer_changed(&mut self, _layer: LayerId) {}
}

/// Owns the feature graph and its undo history. The graph is only ever
/// changed through [`Document::push`], [`Document::undo`] and
/// [`Document::redo`], apart from the loader API (`add_layer`,
/// `add_feature`, ...) used by importers to build the original data.
pub struct Document {
    config: EditorConfig,
    graph: FeatureGraph,
    history: History,
    dirty_layer: LayerId,
    observers: Vec<Box<dyn DocumentObserver>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("features", &self.graph.len())
            .field("layers", &self.graph.layers().len())
            .field("history", &self.history.state())
            .finish()
    }
}

impl Document {
    pub fn new(config: EditorConfig) -> Self {
        let (graph, dirty_layer) = FeatureGraph::with_dirty_layer(&config.dirty_layer_name);
        Document {
            history: History::new(config.history_limit),
            config,
            graph,
            dirty_layer,
            observers: Vec::new(),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn graph(&self) -> &FeatureGraph {
        &self.graph
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn subscribe(&mut self, observer: Box<dyn DocumentObserver>) {
        self.observers.push(observer);
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.graph.get(id)
    }

    pub fn features(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.graph.features()
    }

    pub fn visible_features(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.graph
            .layers()
            .iter()
            .filter(|layer| layer.visible)
            .flat_map(|layer| layer.features().iter())
            .filter_map(|id| self.graph.get(*id))
    }

    /// The selected features that exist, in selection order.
    pub fn selected<'a>(&'a self, selection: &'a [FeatureId]) -> impl Iterator<Item = &'a Feature> + 'a {
        selection.iter().filter_map(|id| self.graph.get(*id))
    }

    pub fn layer_features(&self, layer: LayerId) -> Result<impl Iterator<Item = &Feature> + '_> {
        let layer = self.graph.layer(layer).ok_or(Error::UnknownLayer(layer))?;
        Ok(layer.features().iter().filter_map(|id| self.graph.get(*id)))
    }
}

// Layers
impl Document {
    pub fn layers(&self) -> &[Layer] {
        self.graph.layers()
    }

    pub fn dirty_layer(&self) -> LayerId {
        self.dirty_layer
    }

    /// Where edits to a feature living in `layer` go: the layer itself when
    /// it is the dirty one, otherwise the document's dirty layer.
    pub fn dirty_or_origin_layer(&self, layer: Option<LayerId>) -> LayerId {
        match layer.and_then(|id| self.graph.layer(id)) {
            Some(layer) if layer.dirty => layer.id,
            _ => self.dirty_layer,
        }
    }

    /// Adds a non-dirty layer for imported or downloaded data.
    pub fn add_layer(&mut self, name: &str) -> Result<LayerId> {
        let layer = self.graph.add_layer(name, false)?;
        self.notify_layers();
        Ok(layer)
    }

    /// Drops a layer and its features. History is cleared since its lists
    /// may refer to the removed features.
    pub fn remove_layer(&mut self, layer: LayerId) -> Result<Layer> {
        if layer == self.dirty_layer {
            return Err(Error::invalid_state("the dirty layer cannot be removed"));
        }
        let removed = self.graph.remove_layer(layer)?;
        self.history.clear();
        info!(layer = removed.name.as_str(), features = removed.len(); "Removed layer");
        let state = self.history.state();
        self.notify(&state);
        Ok(removed)
    }

    pub fn set_layer_visible(&mut self, layer: LayerId, visible: bool) -> Result<()> {
        self.graph.set_layer_visible(layer, visible)?;
        self.notify_layers();
        Ok(())
    }

    /// Adds a feature without recording it, for loaders filling a layer with
    /// original data.
    pub fn add_feature(&mut self, layer: LayerId, feature: Feature) -> Result<()> {
        self.graph.insert(layer, None, feature)?;
        Ok(())
    }

    /// Removes an unreferenced feature without recording it.
    pub fn remove_feature(&mut self, id: FeatureId) -> Result<Feature> {
        if !self.graph.contains(id) {
            return Err(Error::UnknownFeature(id));
        }
        let (_, _, feature) = self.graph.take(id)?;
        Ok(feature)
    }

    /// Sends pending layer notifications, e.g. once a loader is done.
    pub fn notify_layers(&mut self) {
        for layer in self.graph.take_touched() {
            for observer in self.observers.iter_mut() {
                observer.layer_changed(layer);
            }
        }
    }
}

// Edits
impl Document {
    /// Applies a command list and records it as one undo step. An empty list
    /// is dropped and `None` returned; a failing list leaves the document as
    /// it was.
    pub fn push(&mut self, list: CommandList) -> Result<Option<HistoryState>> {
        if list.is_empty() {
            return Ok(None);
        }
        match self.history.push(list, &mut self.graph) {
            Ok(state) => {
                self.notify(&state);
                Ok(Some(state))
            }
            Err(err) => {
                let message = err.to_string();
                warn!(err = message.as_str(); "Edit rejected");
                self.graph.take_touched();
                Err(err)
            }
        }
    }

    pub fn undo(&mut self) -> Result<HistoryState> {
        let state = self.history.undo(&mut self.graph)?;
        self.notify(&state);
        Ok(state)
    }

    pub fn redo(&mut self) -> Result<HistoryState> {
        let state = self.history.redo(&mut self.graph)?;
        self.notify(&state);
        Ok(state)
    }

    /// Plans a manipulation against the current selection and pushes the
    /// result.
    pub fn perform(&mut self, manipulation: &dyn Manipulation, selection: &[FeatureId]) -> Result<Option<HistoryState>> {
        let list = manipulation.run(self, selection)?;
        self.push(list)
    }

    pub fn mark_saved(&mut self) {
        self.history.mark_saved();
        let state = self.history.state();
        for observer in self.observers.iter_mut() {
            observer.history_changed(&state);
        }
    }

    fn notify(&mut self, state: &HistoryState) {
        for observer in self.observers.iter_mut() {
            observer.history_changed(state);
        }
        self.notify_layers();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::command::Command;
    use crate::data::Coord;

    #[derive(Default)]
    struct Recorder {
        states: Rc<RefCell<Vec<HistoryState>>>,
        layers: Rc<RefCell<Vec<LayerId>>>,
    }

    impl DocumentObserver for Recorder {
        fn history_changed(&mut self, state: &HistoryState) {
            self.states.borrow_mut().push(state.clone());
        }

        fn layer_changed(&mut self, layer: LayerId) {
            self.layers.borrow_mut().push(layer);
        }
    }

    fn document() -> (Document, LayerId) {
        let mut doc = Document::new(EditorConfig::default());
        let data = doc.add_layer("download").unwrap();
        doc.add_feature(data, Feature::node(1, Coord::new(1.0, 2.0))).unwrap();
        doc.add_feature(data, Feature::node(2, Coord::new(1.5, 2.5))).unwrap();
        doc.add_feature(data, Feature::road(1, vec![FeatureId::node(1), FeatureId::node(2)])).unwrap();
        (doc, data)
    }

    #[test]
    fn test_new_document_has_dirty_layer() {
        let doc = Document::new(EditorConfig::default());
        assert_eq!(doc.layers().len(), 1);
        assert!(doc.layers()[0].dirty);
        assert_eq!(doc.layers()[0].name, "Dirty layer");
    }

    #[test]
    fn test_dirty_or_origin_layer() {
        let (doc, data) = document();
        assert_eq!(doc.dirty_or_origin_layer(Some(data)), doc.dirty_layer());
        assert_eq!(doc.dirty_or_origin_layer(Some(doc.dirty_layer())), doc.dirty_layer());
        assert_eq!(doc.dirty_or_origin_layer(None), doc.dirty_layer());
    }

    #[test]
    fn test_observers_see_history_and_layers() {
        let (mut doc, data) = document();
        let recorder = Recorder::default();
        let states = recorder.states.clone();
        let layers = recorder.layers.clone();
        doc.subscribe(Box::new(recorder));

        let mut list = CommandList::new("Name node");
        list.push(Command::set_tag(FeatureId::node(1), "name", "Corner"));
        doc.push(list).unwrap();
        doc.undo().unwrap();

        let states = states.borrow();
        assert_eq!(states.len(), 2);
        assert!(states[0].can_undo);
        assert!(states[1].can_redo);
        // The node moves into the dirty layer and back.
        let dirty = doc.dirty_layer();
        assert_eq!(*layers.borrow(), vec![dirty, data, dirty, data]);
    }

    #[test]
    fn test_empty_list_is_not_recorded() {
        let (mut doc, _) = document();
        assert_eq!(doc.push(CommandList::new("Nothing")).unwrap(), None);
        assert!(doc.history().is_empty());
    }

    #[test]
    fn test_remove_layer_rules() {
        let (mut doc, data) = document();
        assert!(doc.remove_layer(doc.dirty_layer()).is_err());
        let mut list = CommandList::new("Tag");
        list.push(Command::set_tag(FeatureId::road(1), "highway", "service"));
        doc.push(list).unwrap();
        // Edited w1 now lives in the dirty layer and uses nodes of `data`.
        assert!(doc.remove_layer(data).is_err());
        doc.undo().unwrap();

        let mut list = CommandList::new("Add");
        list.push(Command::add_feature(doc.dirty_layer(), Feature::node(-1, Coord::default())));
        doc.push(list).unwrap();
        let removed = doc.remove_layer(data).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(doc.history().is_empty());
        assert_eq!(doc.features().count(), 1);
    }

    #[test]
    fn test_visible_features_skip_hidden_layers() {
        let (mut doc, data) = document();
        assert_eq!(doc.visible_features().count(), 3);
        doc.set_layer_visible(data, false).unwrap();
        assert_eq!(doc.visible_features().count(), 0);
        assert_eq!(doc.features().count(), 3);
    }

    #[test]
    fn test_selected_skips_missing() {
        let (doc, _) = document();
        let selection = [FeatureId::node(2), FeatureId::node(9), FeatureId::road(1)];
        let ids: Vec<FeatureId> = doc.selected(&selection).map(|f| f.id).collect();
        assert_eq!(ids, vec![FeatureId::node(2), FeatureId::road(1)]);
    }

    #[test]
    fn test_remove_feature_unknown() {
        let (mut doc, _) = document();
        assert!(matches!(doc.remove_feature(FeatureId::node(9)), Err(Error::UnknownFeature(_))));
        assert!(doc.remove_feature(FeatureId::node(1)).is_err());
        doc.remove_feature(FeatureId::road(1)).unwrap();
        doc.remove_feature(FeatureId::node(1)).unwrap();
    }
}
