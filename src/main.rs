#[macro_use]
extern crate diesel;

mod config;
mod export;
mod models;
mod pivot;
mod registry;
mod web;

mod schema;

use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use env_logger::Env;
use structopt::StructOpt;

#[macro_use]
extern crate log;

#[macro_use]
extern crate rocket;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

fn export(
    db_url: &str,
    accession: i32,
    format: config::ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let conn = registry::establish_connection(db_url)?;

    let run = match registry::run(&conn, accession)? {
        Some(run) => run,
        None => return Err(Box::from(format!("Run {} does not exist.", accession))),
    };
    let samples = registry::run_samples(&conn, accession)?;
    let accessions: Vec<i32> = samples.iter().map(|s| s.sample_accession).collect();
    let annotations = registry::annotations_for_samples(&conn, &accessions)?;
    info!(
        "Exporting {} samples with {} annotations from run {}",
        samples.len(),
        annotations.len(),
        run.formatted_accession()
    );

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    match format {
        config::ExportFormat::Qiime => export::write_qiime(&mut out, &run, &samples, annotations)?,
        config::ExportFormat::Tsv => export::write_delim(&mut out, &samples, &annotations)?,
    }
    Ok(())
}

fn query(db_url: &str, prefix: &str) -> Result<()> {
    let conn = registry::establish_connection(db_url)?;

    let samples: Vec<models::Sample> = registry::sample_match(&conn, prefix)?
        .into_iter()
        .map(|detail| detail.into())
        .collect();
    info!("{} samples matched.", samples.len());

    let accessions: Vec<i32> = samples.iter().map(|s| s.sample_accession).collect();
    let annotations = registry::annotations_for_samples(&conn, &accessions)?;

    export::write_delim(&mut std::io::stdout(), &samples, &annotations)?;
    Ok(())
}

fn init(db_url: &str) -> Result<()> {
    let conn = registry::establish_connection(db_url)?;
    registry::initialize(&conn)?;
    info!("Created registry schema in {}", db_url);
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = config::Opt::from_args();

    // set up logging
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let db_url = config.database_url();

    match config.cmd {
        config::Command::Web => {
            web::serve(db_url);
            Ok(())
        }

        config::Command::Export {
            format,
            output,
            accession,
        } => export(&db_url, accession, format, output),

        config::Command::Query { prefix } => query(&db_url, &prefix),

        config::Command::Init => init(&db_url),
    }
}
