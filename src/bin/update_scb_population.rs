use std::{error::Error, path::Path};

use befolkning::db::prod_db::ProdDb;
use clap::Parser;
use jiff::Zoned;
use log::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,
}

/// Run this job at the beginning of every month, say on the 3rd day
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    // No secrets in this job, the env file only overrides the data path
    let _ = dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str()));

    let archive = ProdDb::scb_population();
    let added = archive.update(Zoned::now().date())?;
    info!("Done, {} new rows", added);

    Ok(())
}
