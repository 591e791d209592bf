
use clap::arg_enum;
use std::path::PathBuf;
use structopt::StructOpt;

arg_enum! {
    /// Mapping file flavors offered by the website and the CLI
    #[derive(Debug, Clone, Copy)]
    pub enum ExportFormat {
        Qiime,
        Tsv,
    }
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Start the web reporting interface
    Web,

    /// Write a run's sample metadata as a mapping file
    Export {
        /// Export format
        #[structopt(possible_values=&ExportFormat::variants(), default_value="Qiime", case_insensitive=true, short, long)]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,

        /// Run accession number
        accession: i32,
    },

    /// Dump a tab-delimited table of samples whose name starts with a prefix
    Query {
        /// A sample name prefix
        prefix: String,
    },

    /// Create the registry schema in an empty database
    Init,
}

#[derive(StructOpt, Debug)]
pub struct Opt {
    /// SQLite database file (falls back to $DATABASE_URL)
    #[structopt(long)]
    pub db: Option<String>,

    #[structopt(subcommand)]
    pub cmd: Command,
}

/// Database location used when neither --db nor DATABASE_URL is given
pub const DEFAULT_DB: &str = "/var/local/sample_registry/core.db";

impl Opt {
    pub fn database_url(&self) -> String {
        self.db
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| String::from(DEFAULT_DB))
    }
}
