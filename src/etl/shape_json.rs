use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::data::osm::{Element, ElementKind};
use crate::errors::Result;
use crate::etl::{parse_osm, Etl};
use crate::vocab::VOCABULARY;
use crate::UserConfig;

pub const ETL_NAME: &str = "shape_json";
pub const OUTPUT_FILE_NAME: &str = "osm_documents.json";

/// Keys that never make it into a document.
static PROBLEM_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[=+/&<>;'"?%#$@,. \t\r\n]"#).unwrap()
});

/// Provenance attributes lifted into the `created` sub-document.
const CREATED: [&str; 5] = ["version", "changeset", "timestamp", "user", "uid"];

#[derive(Debug, PartialEq, Eq)]
pub enum TagClass<'a> {
    Ignored,
    Address(&'a str),
    Tiger(&'a str),
    Flat(&'a str),
}

/// Decides which bucket of the output document a nested tag key feeds.
pub fn classify(key: &str) -> TagClass<'_> {
    if PROBLEM_CHARS.is_match(key) {
        return TagClass::Ignored;
    }
    if key == "address" {
        // Reserved for the assembled sub-document, never a field itself.
        return TagClass::Ignored;
    }
    if let Some(subkey) = key.strip_prefix("addr:") {
        if subkey.contains(':') {
            // Compound sub-fields like addr:street:name would double-count
            // the address; they stay flat under their full key.
            return TagClass::Flat(key);
        }
        return TagClass::Address(subkey);
    }
    if let Some(subkey) = key.strip_prefix("tiger:") {
        return TagClass::Tiger(subkey);
    }
    TagClass::Flat(key)
}

/// Postal codes in this dataset start with 9 unless prefixed with "CA ".
/// Returns `None` for the one literal the source data leaves unfixable.
fn clean_postcode(value: &str) -> Option<String> {
    if value == "722A" {
        return None;
    }
    if value.starts_with("CA ") {
        return Some(value.get(4..).unwrap_or("").to_string());
    }
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first != '9' => Some(format!("9{}", chars.as_str())),
        _ => Some(value.to_string()),
    }
}

struct HousenumberFix {
    literal: &'static str,
    housenumber: &'static str,
    street: Option<&'static str>,
    city: Option<&'static str>,
    postcode: Option<&'static str>,
}

/// One-off records where the house number field holds a whole address.
/// Matched verbatim; each fix may force sibling address fields too.
const HOUSENUMBER_FIXES: [HousenumberFix; 4] = [
    HousenumberFix {
        literal: "2475 Adriatic Ave.",
        housenumber: "2475",
        street: Some("Adriatic Avenue"),
        city: None,
        postcode: None,
    },
    HousenumberFix {
        literal: "18744 Via Princessa",
        housenumber: "18744",
        street: Some("Via Princessa"),
        city: None,
        postcode: None,
    },
    HousenumberFix {
        literal: "1850 Sawtelle Boulevard, Suite 300, Los Angeles, CA 90025",
        housenumber: "1850 (Suite 300)",
        street: Some("Sawtelle Boulevard"),
        city: Some("Los Angeles"),
        postcode: Some("90025"),
    },
    HousenumberFix {
        literal: "39252 Winchester Rd Murrieta, CA 92563",
        housenumber: "39252",
        street: Some("Winchester Road"),
        city: Some("Murrieta"),
        postcode: Some("92563"),
    },
];

fn apply_housenumber(address: &mut Map<String, Value>, value: &str) {
    for fix in &HOUSENUMBER_FIXES {
        if value == fix.literal {
            address.insert("housenumber".to_string(), Value::from(fix.housenumber));
            if let Some(street) = fix.street {
                address.insert("street".to_string(), Value::from(street));
            }
            if let Some(city) = fix.city {
                address.insert("city".to_string(), Value::from(city));
            }
            if let Some(postcode) = fix.postcode {
                address.insert("postcode".to_string(), Value::from(postcode));
            }
            return;
        }
    }
    address.insert("housenumber".to_string(), Value::from(value));
}

/// Shapes one node/way into its output document. Tags are applied in
/// document order, so for a repeated key the last write wins.
pub fn shape_element(element: &Element) -> Result<Map<String, Value>> {
    let mut doc = Map::new();
    doc.insert("type".to_string(), Value::from(element.kind.as_str()));

    let mut created = Map::new();
    let mut pos: Option<[f64; 2]> = None;
    for (name, value) in &element.attributes {
        match name.as_str() {
            "lat" => pos.get_or_insert([0.0, 0.0])[0] = value.parse()?,
            "lon" => pos.get_or_insert([0.0, 0.0])[1] = value.parse()?,
            name if CREATED.contains(&name) => {
                created.insert(name.to_string(), Value::from(value.as_str()));
            },
            _ => (),
        }
    }
    if !created.is_empty() {
        doc.insert("created".to_string(), Value::Object(created));
    }
    if let Some([lat, lon]) = pos {
        doc.insert("pos".to_string(), Value::from(vec![lat, lon]));
    }

    let mut address = Map::new();
    let mut tiger = Map::new();
    // Direction prefixes may come before or after their street tag, so the
    // prefix is kept pending for the whole tag walk.
    let mut pending_direction: Option<String> = None;
    for (key, value) in &element.tags {
        match classify(key.trim()) {
            TagClass::Ignored => (),
            TagClass::Address("street") => {
                let fixed = VOCABULARY.normalize(value);
                let fixed = match &pending_direction {
                    Some(direction) => format!("{direction} {fixed}"),
                    None => fixed,
                };
                address.insert("street".to_string(), Value::from(fixed));
            },
            TagClass::Address("street_direction_prefix") => {
                let direction = value.trim().to_string();
                if let Some(Value::String(street)) = address.get("street") {
                    let prefixed = format!("{direction} {street}");
                    address.insert("street".to_string(), Value::from(prefixed));
                }
                pending_direction = Some(direction);
            },
            TagClass::Address("postcode") => {
                if let Some(fixed) = clean_postcode(value) {
                    address.insert("postcode".to_string(), Value::from(fixed));
                }
            },
            TagClass::Address("housenumber") => {
                apply_housenumber(&mut address, value);
            },
            TagClass::Address(subkey) => {
                address.insert(subkey.to_string(), Value::from(value.as_str()));
            },
            TagClass::Tiger(subkey) => {
                tiger.insert(subkey.to_string(), Value::from(value.as_str()));
            },
            TagClass::Flat("name") if element.kind == ElementKind::Way => {
                doc.insert("name".to_string(), Value::from(VOCABULARY.normalize(value)));
            },
            TagClass::Flat(key) => {
                doc.insert(key.to_string(), Value::from(value.as_str()));
            },
        }
    }
    if !address.is_empty() {
        doc.insert("address".to_string(), Value::Object(address));
    }
    if !tiger.is_empty() {
        doc.insert("tiger".to_string(), Value::Object(tiger));
    }

    if element.kind == ElementKind::Way && !element.node_refs.is_empty() {
        doc.insert("node_refs".to_string(), Value::from(element.node_refs.clone()));
    }

    Ok(doc)
}

pub struct ShapeJsonEtl<'a> {
    config: &'a UserConfig,
}

impl ShapeJsonEtl<'_> {
    pub fn new(config: &UserConfig) -> ShapeJsonEtl {
        ShapeJsonEtl { config }
    }

    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }
}

impl Etl for ShapeJsonEtl<'_> {
    type Input = Box<dyn BufRead>;
    type Output = Vec<Value>;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(Self::output_path(dir).try_exists()?)
    }

    fn extract(&mut self) -> Result<Self::Input> {
        parse_osm::open_reader(Path::new(&self.config.data_path))
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let mut documents: Vec<Value> = Vec::new();
        parse_osm::for_each_element(input, |element| {
            documents.push(Value::Object(shape_element(&element)?));
            Ok(())
        })?;
        info!(etl_name = ETL_NAME, documents = documents.len() as u64; "Shaped elements");
        Ok(documents)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let file = File::create(Self::output_path(dir))?;
        let mut writer = BufWriter::new(file);
        for document in &output {
            let line = if self.config.pretty {
                serde_json::to_string_pretty(document)?
            } else {
                serde_json::to_string(document)?
            };
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(attributes: &[(&str, &str)], tags: &[(&str, &str)]) -> Element {
        element(ElementKind::Node, attributes, tags, &[])
    }

    fn way(tags: &[(&str, &str)], refs: &[&str]) -> Element {
        element(ElementKind::Way, &[], tags, refs)
    }

    fn element(
        kind: ElementKind,
        attributes: &[(&str, &str)],
        tags: &[(&str, &str)],
        refs: &[&str],
    ) -> Element {
        let mut el = Element::new(
            kind,
            attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        el.tags = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        el.node_refs = refs.iter().map(|r| r.to_string()).collect();
        el
    }

    #[test]
    fn classify_rejects_problem_characters() {
        for key in ["addr street", "addr,street", "addr.street", "a=b", "k\tv"] {
            assert_eq!(classify(key), TagClass::Ignored, "key {key:?}");
            assert!(!matches!(classify(key), TagClass::Address(_)));
        }
    }

    #[test]
    fn classify_reserves_the_address_key() {
        assert_eq!(classify("address"), TagClass::Ignored);
    }

    #[test]
    fn classify_splits_namespaces() {
        assert_eq!(classify("addr:street"), TagClass::Address("street"));
        assert_eq!(classify("addr:housenumber"), TagClass::Address("housenumber"));
        assert_eq!(classify("tiger:county"), TagClass::Tiger("county"));
        assert_eq!(classify("tiger:name_base:1"), TagClass::Tiger("name_base:1"));
        assert_eq!(classify("amenity"), TagClass::Flat("amenity"));
        assert_eq!(classify("name:en"), TagClass::Flat("name:en"));
    }

    #[test]
    fn classify_keeps_compound_address_keys_flat() {
        assert_eq!(classify("addr:street:name"), TagClass::Flat("addr:street:name"));
        assert_eq!(classify("addr:street:prefix"), TagClass::Flat("addr:street:prefix"));
    }

    #[test]
    fn shapes_created_and_pos() {
        let el = node(
            &[
                ("id", "261114295"),
                ("visible", "true"),
                ("lat", "41.9730791"),
                ("lon", "-87.6866303"),
                ("version", "7"),
                ("changeset", "11129782"),
                ("timestamp", "2012-03-28T18:31:23Z"),
                ("user", "bbmiller"),
                ("uid", "451048"),
            ],
            &[],
        );
        let doc = shape_element(&el).unwrap();
        assert_eq!(doc["type"], "node");
        assert_eq!(doc["pos"], serde_json::json!([41.9730791, -87.6866303]));
        assert_eq!(doc["created"]["user"], "bbmiller");
        assert_eq!(doc["created"]["uid"], "451048");
        // id/visible are dropped, not lifted.
        assert!(doc.get("id").is_none());
        assert!(doc.get("visible").is_none());
    }

    #[test]
    fn pos_is_lat_lon_regardless_of_attribute_order() {
        let lat_first = node(&[("lat", "34.0"), ("lon", "-118.0")], &[]);
        let lon_first = node(&[("lon", "-118.0"), ("lat", "34.0")], &[]);
        let expected = serde_json::json!([34.0, -118.0]);
        assert_eq!(shape_element(&lat_first).unwrap()["pos"], expected);
        assert_eq!(shape_element(&lon_first).unwrap()["pos"], expected);
    }

    #[test]
    fn half_missing_coordinate_defaults_the_other_slot_to_zero() {
        // Known gap inherited from the source data contract: a lone lat/lon
        // still emits a pos with the missing slot zeroed.
        let el = node(&[("lat", "34.0")], &[]);
        assert_eq!(shape_element(&el).unwrap()["pos"], serde_json::json!([34.0, 0.0]));
        let el = node(&[], &[]);
        assert!(shape_element(&el).unwrap().get("pos").is_none());
    }

    #[test]
    fn way_collects_node_refs_in_order() {
        let el = way(&[], &["A", "B", "C"]);
        let doc = shape_element(&el).unwrap();
        assert_eq!(doc["node_refs"], serde_json::json!(["A", "B", "C"]));
    }

    #[test]
    fn assembles_address_with_normalized_street() {
        let el = node(
            &[],
            &[
                ("addr:street", "North Lincoln Ave"),
                ("addr:housenumber", "5158"),
            ],
        );
        let doc = shape_element(&el).unwrap();
        assert_eq!(
            doc["address"],
            serde_json::json!({"street": "North Lincoln Avenue", "housenumber": "5158"})
        );
    }

    #[test]
    fn compound_address_keys_stay_flat() {
        let el = node(
            &[],
            &[
                ("addr:street", "North Lincoln Ave"),
                ("addr:street:name", "Lincoln"),
            ],
        );
        let doc = shape_element(&el).unwrap();
        assert_eq!(doc["addr:street:name"], "Lincoln");
        assert_eq!(doc["address"], serde_json::json!({"street": "North Lincoln Avenue"}));
    }

    #[test]
    fn direction_prefix_applies_before_or_after_the_street_tag() {
        let prefix_first = node(
            &[],
            &[
                ("addr:street_direction_prefix", " West "),
                ("addr:street", "Olympic Blvd"),
            ],
        );
        let doc = shape_element(&prefix_first).unwrap();
        assert_eq!(doc["address"]["street"], "West Olympic Boulevard");

        let street_first = node(
            &[],
            &[
                ("addr:street", "Olympic Blvd"),
                ("addr:street_direction_prefix", "West"),
            ],
        );
        let doc = shape_element(&street_first).unwrap();
        assert_eq!(doc["address"]["street"], "West Olympic Boulevard");
    }

    #[test]
    fn postcode_cleanup() {
        assert_eq!(clean_postcode("90025"), Some("90025".to_string()));
        assert_eq!(clean_postcode("CA 90210"), Some("0210".to_string()));
        assert_eq!(clean_postcode("80210"), Some("90210".to_string()));
        assert_eq!(clean_postcode("722A"), None);

        let el = node(&[], &[("addr:postcode", "722A")]);
        let doc = shape_element(&el).unwrap();
        assert!(doc.get("address").is_none());
    }

    #[test]
    fn housenumber_literal_fix_overrides_sibling_fields() {
        let el = node(
            &[],
            &[
                ("addr:street", "Somewhere Else St"),
                ("addr:housenumber", "2475 Adriatic Ave."),
            ],
        );
        let doc = shape_element(&el).unwrap();
        assert_eq!(
            doc["address"],
            serde_json::json!({"street": "Adriatic Avenue", "housenumber": "2475"})
        );
    }

    #[test]
    fn later_street_tag_overwrites_a_housenumber_fix() {
        // Tags apply in document order, last write wins: a street tag that
        // arrives after the literal fix replaces the forced street value.
        let el = node(
            &[],
            &[
                ("addr:housenumber", "2475 Adriatic Ave."),
                ("addr:street", "Somewhere Else St"),
            ],
        );
        let doc = shape_element(&el).unwrap();
        assert_eq!(
            doc["address"],
            serde_json::json!({"street": "Somewhere Else Street", "housenumber": "2475"})
        );
    }

    #[test]
    fn housenumber_fix_can_force_city_and_postcode() {
        let el = node(
            &[],
            &[("addr:housenumber", "39252 Winchester Rd Murrieta, CA 92563")],
        );
        let doc = shape_element(&el).unwrap();
        assert_eq!(
            doc["address"],
            serde_json::json!({
                "housenumber": "39252",
                "street": "Winchester Road",
                "city": "Murrieta",
                "postcode": "92563",
            })
        );
    }

    #[test]
    fn ordinary_housenumbers_are_stored_verbatim() {
        let el = node(&[], &[("addr:housenumber", "2660 Park Center Drive")]);
        let doc = shape_element(&el).unwrap();
        assert_eq!(doc["address"]["housenumber"], "2660 Park Center Drive");
    }

    #[test]
    fn way_names_are_normalized_but_node_names_are_not() {
        let w = way(&[("name", "RAVENSWOOD PL")], &[]);
        assert_eq!(shape_element(&w).unwrap()["name"], "Ravenswood Place");

        let n = node(&[], &[("name", "RAVENSWOOD PL")]);
        assert_eq!(shape_element(&n).unwrap()["name"], "RAVENSWOOD PL");

        // The literal table is not scoped by element kind: the same value in
        // an addr:street tag on a node is corrected too.
        let n = node(&[], &[("addr:street", "RAVENSWOOD PL")]);
        assert_eq!(
            shape_element(&n).unwrap()["address"]["street"],
            "Ravenswood Place"
        );
    }

    #[test]
    fn tiger_tags_build_a_sub_document() {
        let el = way(
            &[
                ("tiger:county", "Los Angeles, CA"),
                ("tiger:name_base", "Olympic"),
            ],
            &[],
        );
        let doc = shape_element(&el).unwrap();
        assert_eq!(
            doc["tiger"],
            serde_json::json!({"county": "Los Angeles, CA", "name_base": "Olympic"})
        );
    }

    #[test]
    fn repeated_keys_keep_the_last_value() {
        let el = node(&[], &[("amenity", "cafe"), ("amenity", "restaurant")]);
        let doc = shape_element(&el).unwrap();
        assert_eq!(doc["amenity"], "restaurant");
    }
}
