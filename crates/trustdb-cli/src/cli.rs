use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use trustdb_types::{Isd, IA};

#[derive(Parser)]
#[command(
    name = "trustdb",
    about = "TrustDB -- versioned store for TRCs, certificate chains, and customer keys",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Commit log path; overrides the configuration file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a trust object
    Insert(InsertArgs),
    /// Fetch one trust object by exact or latest version
    Get(GetArgs),
    /// List every stored object of one kind
    List(ListArgs),
    /// Show connection pool and record counts
    Stats,
    /// Dump the batches in the commit log
    Log(LogArgs),
}

#[derive(Args)]
pub struct InsertArgs {
    #[command(subcommand)]
    pub object: InsertObject,
}

/// Object files hold JSON; `-` reads standard input.
#[derive(Subcommand)]
pub enum InsertObject {
    Trc { file: PathBuf },
    /// Stores the chain and both of its certificates
    Chain { file: PathBuf },
    IssCert { file: PathBuf },
    LeafCert { file: PathBuf },
    CustKey {
        ia: IA,
        #[arg(long)]
        version: u64,
        /// Raw key bytes, hex encoded
        #[arg(long)]
        key: String,
        #[arg(long)]
        trc_version: u64,
    },
}

#[derive(Args)]
pub struct GetArgs {
    #[command(subcommand)]
    pub object: GetObject,
}

/// Without `--version` the greatest stored version is returned.
#[derive(Subcommand)]
pub enum GetObject {
    Trc {
        isd: Isd,
        #[arg(long)]
        version: Option<u64>,
    },
    Chain {
        ia: IA,
        #[arg(long)]
        version: Option<u64>,
    },
    IssCert {
        ia: IA,
        #[arg(long)]
        version: Option<u64>,
    },
    LeafCert {
        ia: IA,
        #[arg(long)]
        version: Option<u64>,
    },
    CustKey {
        ia: IA,
        #[arg(long)]
        version: Option<u64>,
    },
}

#[derive(Args)]
pub struct ListArgs {
    pub kind: ListKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ListKind {
    Trcs,
    Chains,
    IssCerts,
    LeafCerts,
    CustKeys,
}

#[derive(Args)]
pub struct LogArgs {
    /// Print each record key, not just batch summaries
    #[arg(long)]
    pub records: bool,
}
