use std::collections::HashSet;
use std::fs;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use log::{info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::{Coord, Feature, FeatureId, FeatureKind, FeatureType, LayerId, Member};
use crate::document::Document;
use crate::errors::{Error, Result};

use super::Etl;

pub const ETL_NAME: &str = "osm_import";

/// Elements of one OSM XML file, in file order.
#[derive(Debug, Default)]
pub struct ParsedOsm {
    pub nodes: Vec<Feature>,
    pub roads: Vec<Feature>,
    pub relations: Vec<Feature>,
}

enum ParserState {
    Top,
    Element(Feature),
}

/// Reads an OSM XML file (plain or `.xz`) into a new layer of a document.
pub struct OsmImport<'a> {
    document: &'a mut Document,
    path: PathBuf,
    layer_name: String,
    layer: Option<LayerId>,
}

impl<'a> OsmImport<'a> {
    pub fn new(document: &'a mut Document, path: impl Into<PathBuf>, layer_name: impl Into<String>) -> Self {
        OsmImport {
            document,
            path: path.into(),
            layer_name: layer_name.into(),
            layer: None,
        }
    }

    /// The layer created by the last successful load.
    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }
}

fn attribute(el: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attribute in el.attributes() {
        let attribute = attribute?;
        if attribute.key.as_ref() == key {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn required(el: &BytesStart, key: &[u8]) -> Result<String> {
    attribute(el, key)?.ok_or_else(|| {
        Error::Other(format!(
            "<{}> is missing '{}'",
            String::from_utf8_lossy(el.name().as_ref()),
            String::from_utf8_lossy(key)
        ))
    })
}

/// Nodes marked deleted or invisible are skipped.
fn is_live(el: &BytesStart) -> Result<bool> {
    Ok(attribute(el, b"action")?.as_deref() != Some("delete") && attribute(el, b"visible")?.as_deref() != Some("false"))
}

fn parse_element(el: &BytesStart) -> Result<Option<Feature>> {
    if !is_live(el)? {
        return Ok(None);
    }
    let feature = match el.name().as_ref() {
        b"node" => {
            let lat = required(el, b"lat")?.parse()?;
            let lon = required(el, b"lon")?.parse()?;
            Feature::node(required(el, b"id")?.parse()?, Coord::new(lat, lon))
        }
        b"way" => Feature::road(required(el, b"id")?.parse()?, Vec::new()),
        b"relation" => Feature::relation(required(el, b"id")?.parse()?, Vec::new()),
        _ => return Ok(None),
    };
    Ok(Some(feature))
}

/// Adds a `<tag>`, `<nd>` or `<member>` child to the element being read.
fn parse_child(feature: &mut Feature, el: &BytesStart) -> Result<()> {
    match el.name().as_ref() {
        b"tag" => {
            feature.tags.insert(required(el, b"k")?, required(el, b"v")?);
        }
        b"nd" => {
            let node = FeatureId::node(required(el, b"ref")?.parse()?);
            if let Some(road) = feature.as_road_mut() {
                road.nodes.push(node);
            }
        }
        b"member" => {
            let kind_name = required(el, b"type")?;
            let kind = FeatureType::from_osm_name(&kind_name)
                .ok_or_else(|| Error::Other(format!("Unknown member type '{}'", kind_name)))?;
            let member = FeatureId::new(kind, required(el, b"ref")?.parse()?);
            let role = attribute(el, b"role")?.unwrap_or_default();
            if let Some(relation) = feature.as_relation_mut() {
                relation.members.push(Member::new(role, member));
            }
        }
        _ => (),
    }
    Ok(())
}

fn finish(parsed: &mut ParsedOsm, feature: Feature) {
    match feature.kind {
        FeatureKind::Node(_) => parsed.nodes.push(feature),
        FeatureKind::Road(_) => parsed.roads.push(feature),
        FeatureKind::Relation(_) => parsed.relations.push(feature),
    }
}

pub fn parse_osm(bytes: &[u8]) -> Result<ParsedOsm> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut parsed = ParsedOsm::default();
    let mut state = ParserState::Top;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(e.into()),
            Ok(Event::Eof) => break,
            Ok(Event::Text(_e)) => return Err("Didn't expect to see Text in OSM file.".into()),
            Ok(Event::Start(e)) => {
                if let ParserState::Top = state {
                    if let Some(feature) = parse_element(&e)? {
                        state = ParserState::Element(feature);
                    }
                }
            }
            Ok(Event::Empty(e)) => match &mut state {
                ParserState::Top => {
                    if let Some(feature) = parse_element(&e)? {
                        finish(&mut parsed, feature);
                    }
                }
                ParserState::Element(feature) => parse_child(feature, &e)?,
            },
            Ok(Event::End(e)) => {
                if matches!(e.name().as_ref(), b"node" | b"way" | b"relation") {
                    if let ParserState::Element(feature) = std::mem::replace(&mut state, ParserState::Top) {
                        finish(&mut parsed, feature);
                    }
                }
            }
            // Declarations, comments and the like carry no map data.
            Ok(_) => (),
        }
        buf.clear();
    }
    Ok(parsed)
}

impl Etl for OsmImport<'_> {
    type Input = Vec<u8>;
    type Output = ParsedOsm;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn extract(&mut self) -> Result<Self::Input> {
        let file = fs::File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        if self.path.extension().map_or(false, |ext| ext == "xz") {
            XzDecoder::new(reader).read_to_end(&mut bytes)?;
        } else {
            reader.read_to_end(&mut bytes)?;
        }
        Ok(bytes)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        parse_osm(&input)
    }

    fn load(&mut self, output: Self::Output) -> Result<()> {
        let layer = self.document.add_layer(&self.layer_name)?;
        let (node_count, road_count) = (output.nodes.len(), output.roads.len());

        for node in output.nodes {
            if self.is_duplicate(node.id) {
                continue;
            }
            self.document.add_feature(layer, node)?;
        }

        for mut road in output.roads {
            if self.is_duplicate(road.id) {
                continue;
            }
            let id = road.id.to_string();
            let graph = self.document.graph();
            if let Some(nodes) = road.as_road_mut().map(|r| &mut r.nodes) {
                let before = nodes.len();
                nodes.retain(|node| graph.contains(*node));
                if nodes.len() < before {
                    warn!(feature = id.as_str(), dropped = before - nodes.len(); "Dropping missing road nodes");
                }
            }
            self.document.add_feature(layer, road)?;
        }

        // Relations may refer to relations further down the file, so keep
        // adding whatever has become resolvable. When nothing resolves,
        // members that can never appear are dropped, then those forming
        // cycles.
        let mut pending = output.relations;
        let mut relations = 0;
        let mut lenient = false;
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for relation in pending {
                if self.is_duplicate(relation.id) {
                    continue;
                }
                if relation.children().iter().all(|member| self.document.graph().contains(*member)) {
                    self.document.add_feature(layer, relation)?;
                    relations += 1;
                } else {
                    waiting.push(relation);
                }
            }

            if waiting.len() == before {
                let waiting_ids: HashSet<FeatureId> = waiting.iter().map(|r| r.id).collect();
                let graph = self.document.graph();
                for relation in waiting.iter_mut() {
                    let id = relation.id.to_string();
                    if let Some(members) = relation.as_relation_mut().map(|r| &mut r.members) {
                        let count = members.len();
                        members.retain(|m| graph.contains(m.feature) || (!lenient && waiting_ids.contains(&m.feature)));
                        if members.len() < count {
                            warn!(feature = id.as_str(), dropped = count - members.len(); "Dropping unresolved relation members");
                        }
                    }
                }
                lenient = true;
            }
            pending = waiting;
        }

        self.document.notify_layers();
        self.layer = Some(layer);
        info!(layer = self.layer_name.as_str(), nodes = node_count, roads = road_count, relations = relations; "Imported OSM data");
        Ok(())
    }
}

impl OsmImport<'_> {
    fn is_duplicate(&self, id: FeatureId) -> bool {
        let duplicate = self.document.get(id).is_some();
        if duplicate {
            let id = id.to_string();
            warn!(feature = id.as_str(); "Skipping duplicate feature");
        }
        duplicate
    }
}
