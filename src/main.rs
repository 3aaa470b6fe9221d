use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use log::info;
use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use map_edit::etl::osm_export::OsmExport;
use map_edit::etl::osm_import::OsmImport;
use map_edit::etl::Etl;
use map_edit::script::{load_script, run_script};
use map_edit::{Document, EditorConfig, Result};

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Deserialize)]
pub struct UserConfig {
    pub data_path: String,
    pub script_path: Option<String>,
    pub output_path: String,
    #[serde(default)]
    pub editor: EditorConfig,
}

fn load_user_config(path: &str) -> Result<UserConfig> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    setup_logging();

    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let user_config = load_user_config(&config_path)?;
    let mut document = Document::new(user_config.editor.clone());

    let layer_name = Path::new(&user_config.data_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or("Could not get input file name")?;
    OsmImport::new(&mut document, &user_config.data_path, layer_name).process()?;

    if let Some(script_path) = &user_config.script_path {
        let steps = load_script(Path::new(script_path))?;
        let summary = run_script(&mut document, &steps)?;
        info!(applied = summary.applied, skipped = summary.skipped; "Script finished");
    }

    OsmExport::new(&document, &user_config.output_path).process()?;
    Ok(())
}
