mod data;
mod errors;
mod etl;
mod vocab;

use std::env;
use std::fs::{create_dir_all, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::etl::audit::AuditEtl;
use crate::etl::shape_json::ShapeJsonEtl;
use crate::etl::Etl;
use crate::errors::Result;

#[derive(Deserialize)]
pub struct UserConfig {
    pub data_path: String,
    pub dest_path: String,
    #[serde(default)]
    pub pretty: bool,
    #[serde(default = "default_audit")]
    pub audit: bool,
}

fn default_audit() -> bool {
    true
}

fn load_user_config(path: &str) -> UserConfig {
    let file = File::open(path).expect("Could not open config file.");
    serde_json::from_reader(file).expect("Could not parse config.")
}

fn create_output_dir(config: &UserConfig) -> Result<PathBuf> {
    let input_fname = Path::new(&config.data_path)
        .file_name()
        .ok_or("Could not get input file name")?;
    let output_dir = Path::new(&config.dest_path).join(input_fname);
    create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    setup_logging();

    let config_path = env::args().nth(1).unwrap_or_else(|| String::from("config.json"));
    let user_config = load_user_config(&config_path);
    let output_dir = create_output_dir(&user_config)?;

    ShapeJsonEtl::new(&user_config).process(&output_dir)?;
    if user_config.audit {
        AuditEtl::new(&user_config).process(&output_dir)?;
    }

    Ok(())
}
