use crate::command::CommandList;
use crate::data::{FeatureId, Tags};
use crate::document::Document;
use crate::errors::{Error, Result};

use super::{selected_all, Draft, Manipulation};

/// Applies a copied tag set to every selected feature. With `overwrite` the
/// features end up with exactly `tags`; otherwise the tags are merged in with
/// the configured conflict policy.
pub struct PasteTags {
    pub tags: Tags,
    pub overwrite: bool,
}

impl Manipulation for PasteTags {
    fn name(&self) -> &str {
        "paste_tags"
    }

    fn label(&self) -> String {
        if self.overwrite {
            "Paste Tags (overwrite)".to_string()
        } else {
            "Paste Tags (merge)".to_string()
        }
    }

    fn plan(&self, doc: &Document, selection: &[FeatureId]) -> Result<CommandList> {
        let selected = selected_all(doc, selection);
        if selected.is_empty() {
            return Err(Error::precondition("nothing selected"));
        }
        let mut draft = Draft::new(doc, self.label());
        for id in selected {
            if !self.overwrite {
                draft.merge_tags(id, &self.tags)?;
            } else if draft.tags(id)? != self.tags {
                draft.clear_tags(id)?;
                for (key, value) in self.tags.iter() {
                    draft.set_tag(id, key, value)?;
                }
            }
        }
        if draft.is_empty() {
            return Err(Error::precondition("the selection already has these tags"));
        }
        Ok(draft.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LayerId;
    use crate::manipulations::fixtures::*;

    fn tagged(doc: &mut Document, data: LayerId) {
        add_nodes(doc, data, 2);
        add_road(doc, data, 1, &[1, 2], &[("highway", "residential"), ("name", "Old Street")]);
    }

    #[test]
    fn test_paste_merge_keeps_existing_values() {
        let (mut doc, data) = document();
        tagged(&mut doc, data);
        let paste = PasteTags {
            tags: Tags::from_pairs([("highway", "service"), ("surface", "gravel")]),
            overwrite: false,
        };
        doc.perform(&paste, &[w(1), n(1)]).unwrap().unwrap();
        let road = &doc.get(w(1)).unwrap().tags;
        assert_eq!(road.get("highway"), Some("residential"));
        assert_eq!(road.get("surface"), Some("gravel"));
        assert_eq!(road.get("name"), Some("Old Street"));
        assert_eq!(doc.get(n(1)).unwrap().tags.len(), 2);
    }

    #[test]
    fn test_paste_overwrite_replaces_tag_set() {
        let (mut doc, data) = document();
        tagged(&mut doc, data);
        let paste = PasteTags { tags: Tags::from_pairs([("highway", "service")]), overwrite: true };
        let before = doc.graph().clone();
        doc.perform(&paste, &[w(1)]).unwrap().unwrap();
        assert_eq!(doc.get(w(1)).unwrap().tags, Tags::from_pairs([("highway", "service")]));
        assert!(paste.run(&doc, &[w(1)]).unwrap().is_empty());
        doc.undo().unwrap();
        assert_eq!(doc.graph(), &before);
    }
}
