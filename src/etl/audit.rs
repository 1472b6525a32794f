use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde_json::{Map, Value};

use crate::data::osm::{Element, ElementKind};
use crate::errors::Result;
use crate::etl::{parse_osm, Etl};
use crate::vocab::VOCABULARY;
use crate::UserConfig;

pub const ETL_NAME: &str = "audit";
pub const OUTPUT_FILE_NAME: &str = "audit_report.json";

/// Distinct street names grouped by the trailing token that is not yet a
/// canonical street-type word.
pub type StreetTypes = BTreeMap<String, BTreeSet<String>>;

fn record_street_type(street_types: &mut StreetTypes, name: &str) {
    let Some(street_type) = VOCABULARY.street_type(name) else {
        return;
    };
    if VOCABULARY.is_expected(street_type) {
        return;
    }
    street_types
        .entry(street_type.to_string())
        .or_default()
        .insert(name.trim().to_string());
}

/// Scans one element's tags for street names worth auditing: every
/// addr:street value, and the name of a way.
pub fn audit_element(street_types: &mut StreetTypes, element: &Element) {
    for (key, value) in &element.tags {
        if key == "addr:street" {
            record_street_type(street_types, value);
        }
        if key == "name" && element.kind == ElementKind::Way {
            record_street_type(street_types, value);
        }
    }
}

/// Read-only diagnostic over the same element stream as the shaping pass.
/// Reports which abbreviations the vocabulary does not cover yet, together
/// with the normalization each name would receive today. Produces nothing
/// the shaping pass consumes.
pub struct AuditEtl<'a> {
    config: &'a UserConfig,
}

impl AuditEtl<'_> {
    pub fn new(config: &UserConfig) -> AuditEtl {
        AuditEtl { config }
    }

    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }
}

impl Etl for AuditEtl<'_> {
    type Input = Box<dyn BufRead>;
    type Output = StreetTypes;

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
        let mut street_types = StreetTypes::new();
        parse_osm::for_each_element(input, |element| {
            audit_element(&mut street_types, &element);
            Ok(())
        })?;
        info!(etl_name = ETL_NAME, street_types = street_types.len() as u64; "Audited street types");
        Ok(street_types)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let mut report = Map::new();
        for (street_type, names) in &output {
            let mut suggestions = Map::new();
            for name in names {
                suggestions.insert(name.clone(), Value::from(VOCABULARY.normalize(name)));
            }
            report.insert(street_type.clone(), Value::Object(suggestions));
        }

        let file = File::create(Self::output_path(dir))?;
        let mut writer = BufWriter::new(file);
        let rendered = serde_json::to_string_pretty(&Value::Object(report))?;
        writer.write_all(rendered.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
