use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::osm::{Element, ElementKind};
use crate::errors::{Error, Result};

/// Opens the .osm input for streaming. Files ending in .xz are decompressed
/// on the fly.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = fs::File::open(path)?;
    let file_reader = BufReader::new(file);
    if path.extension().and_then(|ext| ext.to_str()) == Some("xz") {
        let xz_reader = XzDecoder::new(file_reader);
        Ok(Box::new(BufReader::new(xz_reader)))
    } else {
        Ok(Box::new(file_reader))
    }
}

fn attribute_pairs(el: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for attribute_res in el.attributes() {
        let attribute = attribute_res?;
        let key = str::from_utf8(attribute.key.as_ref())?.to_string();
        let value = attribute.unescape_value()?.to_string();
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn attribute_value(el: &BytesStart, wanted: &[u8]) -> Result<Option<String>> {
    for attribute_res in el.attributes() {
        let attribute = attribute_res?;
        if attribute.key.as_ref() == wanted {
            return Ok(Some(attribute.unescape_value()?.to_string()));
        }
    }
    Ok(None)
}

fn add_child(current: &mut Option<Element>, el: &BytesStart) -> Result<()> {
    // Children of elements we do not track (relation members etc.) land here
    // with no current element and are dropped.
    let Some(element) = current.as_mut() else {
        return Ok(());
    };
    match el.name().as_ref() {
        b"tag" => {
            let key = attribute_value(el, b"k")?;
            let value = attribute_value(el, b"v")?;
            if let (Some(key), Some(value)) = (key, value) {
                element.tags.push((key, value));
            }
        },
        b"nd" => {
            if let Some(reference) = attribute_value(el, b"ref")? {
                element.node_refs.push(reference);
            }
        },
        _ => (),
    }
    Ok(())
}

/// Streams the input tree one element at a time. Each node/way is assembled
/// from its subtree, handed to `visit`, and dropped; the event buffer is
/// reused so memory stays bounded by one element's subtree.
pub fn for_each_element<R, F>(input: R, mut visit: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(Element) -> Result<()>,
{
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(e.into()),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                if let Some(kind) = ElementKind::from_name(e.name().as_ref()) {
                    if current.is_some() {
                        return Err(Error::from("Unexpected nested element in OSM file."));
                    }
                    current = Some(Element::new(kind, attribute_pairs(&e)?));
                } else {
                    add_child(&mut current, &e)?;
                }
            },
            Ok(Event::Empty(e)) => {
                if let Some(kind) = ElementKind::from_name(e.name().as_ref()) {
                    // Self-closing node/way with no children.
                    if current.is_some() {
                        return Err(Error::from("Unexpected nested element in OSM file."));
                    }
                    visit(Element::new(kind, attribute_pairs(&e)?))?;
                } else {
                    add_child(&mut current, &e)?;
                }
            },
            Ok(Event::End(e)) => {
                if ElementKind::from_name(e.name().as_ref()).is_some() {
                    if let Some(element) = current.take() {
                        visit(element)?;
                    }
                }
            },
            Ok(_) => (),
        }
        buf.clear();
    }
    Ok(())
}
