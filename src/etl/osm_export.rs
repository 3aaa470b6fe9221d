use std::fs;
use std::io::Write;
use std::path::PathBuf;

use log::info;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::writer::Writer;
use xz::write::XzEncoder;

use crate::data::{Feature, FeatureKind, FeatureType};
use crate::document::Document;
use crate::errors::Result;

use super::Etl;

pub const ETL_NAME: &str = "osm_export";

/// Writes every feature of a document as OSM XML, compressed when the path
/// ends in `.xz`. Edited features carry `action="modify"` and deleted
/// server features are kept with `action="delete"`.
pub struct OsmExport<'a> {
    document: &'a Document,
    path: PathBuf,
}

impl<'a> OsmExport<'a> {
    pub fn new(document: &'a Document, path: impl Into<PathBuf>) -> Self {
        OsmExport { document, path: path.into() }
    }
}

fn write_feature<W: Write>(writer: &mut Writer<W>, feature: &Feature, action: Option<&str>) -> Result<()> {
    let name = feature.id.kind.osm_name();
    let id = feature.id.number.to_string();
    let mut element = BytesStart::new(name);
    element.push_attribute(("id", id.as_str()));
    if let Some(action) = action {
        element.push_attribute(("action", action));
    }
    if let FeatureKind::Node(node) = &feature.kind {
        element.push_attribute(("lat", node.coord.lat.to_string().as_str()));
        element.push_attribute(("lon", node.coord.lon.to_string().as_str()));
    }

    let mut children = Vec::new();
    match &feature.kind {
        FeatureKind::Node(_) => (),
        FeatureKind::Road(road) => {
            for node in &road.nodes {
                let mut nd = BytesStart::new("nd");
                nd.push_attribute(("ref", node.number.to_string().as_str()));
                children.push(nd);
            }
        }
        FeatureKind::Relation(relation) => {
            for member in &relation.members {
                let mut el = BytesStart::new("member");
                el.push_attribute(("type", member.feature.kind.osm_name()));
                el.push_attribute(("ref", member.feature.number.to_string().as_str()));
                el.push_attribute(("role", member.role.as_str()));
                children.push(el);
            }
        }
    }
    for (key, value) in feature.tags.iter() {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", key));
        tag.push_attribute(("v", value));
        children.push(tag);
    }

    if children.is_empty() {
        writer.write_event(Event::Empty(element))?;
    } else {
        writer.write_event(Event::Start(element))?;
        for child in children {
            writer.write_event(Event::Empty(child))?;
        }
        writer.write_event(Event::End(BytesEnd::new(name)))?;
    }
    Ok(())
}

/// The document as an OSM XML file: nodes, then ways, then relations, each
/// followed by the deleted ones of its kind.
pub fn write_osm(document: &Document) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut osm = BytesStart::new("osm");
    osm.push_attribute(("version", "0.6"));
    osm.push_attribute(("generator", env!("CARGO_PKG_NAME")));
    writer.write_event(Event::Start(osm))?;

    let dirty = Some(document.dirty_layer());
    for kind in [FeatureType::Node, FeatureType::Road, FeatureType::Relation] {
        for feature in document.features().filter(|f| f.id.kind == kind) {
            // Edited and new features live in the dirty layer.
            let action = (document.graph().layer_of(feature.id) == dirty).then_some("modify");
            write_feature(&mut writer, feature, action)?;
        }
        for feature in document.graph().deleted().filter(|f| f.id.kind == kind) {
            write_feature(&mut writer, feature, Some("delete"))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("osm")))?;
    Ok(writer.into_inner())
}

impl Etl for OsmExport<'_> {
    type Input = ();
    type Output = Vec<u8>;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn extract(&mut self) -> Result<Self::Input> {
        Ok(())
    }

    fn transform(&mut self, _input: ()) -> Result<Self::Output> {
        write_osm(self.document)
    }

    fn load(&mut self, output: Self::Output) -> Result<()> {
        let file = fs::File::create(&self.path)?;
        if self.path.extension().map_or(false, |ext| ext == "xz") {
            let mut encoder = XzEncoder::new(file, 6);
            encoder.write_all(&output)?;
            encoder.finish()?;
        } else {
            let mut file = file;
            file.write_all(&output)?;
        }
        let path = self.path.display().to_string();
        info!(path = path.as_str(), bytes = output.len(); "Wrote OSM file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandList};
    use crate::config::EditorConfig;
    use crate::data::{Coord, FeatureId, Member};
    use crate::etl::osm_import::{parse_osm, OsmImport};
    use crate::manipulations::{AlignNodes, DeleteFeatures};

    fn sample() -> Document {
        let mut doc = Document::new(EditorConfig::default());
        let data = doc.add_layer("download").unwrap();
        doc.add_feature(data, Feature::node(1, Coord::new(51.5, -0.125))).unwrap();
        doc.add_feature(data, Feature::node(2, Coord::new(51.25, -0.5)).with_tag("name", "Bob's <Café>")).unwrap();
        doc.add_feature(data, Feature::road(3, vec![FeatureId::node(1), FeatureId::node(2)]).with_tag("highway", "path"))
            .unwrap();
        doc.add_feature(data, Feature::relation(4, vec![Member::new("outer", FeatureId::road(3))])).unwrap();

        let mut list = CommandList::new("Edit");
        list.push(Command::add_feature(doc.dirty_layer(), Feature::node(-1, Coord::new(51.0, 0.0))));
        list.push(Command::set_parent(FeatureId::node(2), doc.dirty_layer()));
        doc.push(list).unwrap();
        doc
    }

    #[test]
    fn test_written_file_marks_edits() {
        let doc = sample();
        let xml = String::from_utf8(write_osm(&doc).unwrap()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(r#"<node id="1" lat="51.5" lon="-0.125"/>"#));
        assert!(xml.contains(r#"<node id="-1" action="modify" lat="51" lon="0"/>"#));
        assert!(xml.contains(r#"<node id="2" action="modify""#));
        assert!(xml.contains("Bob&apos;s &lt;Café&gt;"));
        assert!(xml.find("<node id=\"1\"").unwrap() < xml.find("<way").unwrap());
        assert!(xml.find("<way").unwrap() < xml.find("<relation").unwrap());
    }

    #[test]
    fn test_in_place_edits_are_marked() {
        let mut doc = Document::new(EditorConfig::default());
        let data = doc.add_layer("download").unwrap();
        for (number, lat, lon) in [(1, 0.0, 0.0), (2, 2.0, 1.0), (3, 0.0, 2.0), (9, 5.0, 5.0)] {
            doc.add_feature(data, Feature::node(number, Coord::new(lat, lon))).unwrap();
        }
        let nodes = [FeatureId::node(1), FeatureId::node(2), FeatureId::node(3)];
        doc.perform(&AlignNodes, &nodes).unwrap().unwrap();
        doc.perform(&DeleteFeatures, &[FeatureId::node(9)]).unwrap().unwrap();

        let xml = String::from_utf8(write_osm(&doc).unwrap()).unwrap();
        for node in nodes {
            assert_eq!(doc.graph().layer_of(node), Some(doc.dirty_layer()));
            assert!(xml.contains(&format!("<node id=\"{}\" action=\"modify\"", node.number)), "{}", xml);
        }
        assert!(xml.contains(r#"<node id="9" action="delete" lat="5" lon="5"/>"#), "{}", xml);

        // Undo brings n9 back untouched and drops the delete record.
        doc.undo().unwrap();
        let xml = String::from_utf8(write_osm(&doc).unwrap()).unwrap();
        assert!(xml.contains(r#"<node id="9" lat="5" lon="5"/>"#), "{}", xml);
        assert!(!xml.contains("delete"));

        // A reader skips the deletion.
        doc.redo().unwrap();
        let parsed = parse_osm(&write_osm(&doc).unwrap()).unwrap();
        assert_eq!(parsed.nodes.len(), 3);
    }

    #[test]
    fn test_export_then_import_keeps_features() {
        let doc = sample();
        let parsed = parse_osm(&write_osm(&doc).unwrap()).unwrap();
        let mut copy = Document::new(EditorConfig::default());
        OsmImport::new(&mut copy, "unused.osm", "copy").load(parsed).unwrap();

        assert_eq!(copy.features().count(), doc.features().count());
        for feature in doc.features() {
            let loaded = copy.get(feature.id).unwrap();
            assert_eq!(loaded.tags, feature.tags);
            assert_eq!(loaded.kind, feature.kind);
        }
    }
}
