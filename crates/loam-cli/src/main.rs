//! LoamDB command-line front-end.
//!
//! Opens a store and performs a single operation against it, using only the
//! public store contract: `get`, `set`, `delete`.

use clap::{Parser, Subcommand};
use loam_common::{Result, StoreConfig};
use loam_storage::Store;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// LoamDB CLI
#[derive(Parser, Debug)]
#[command(name = "loam")]
#[command(about = "Key-value store backed by a crash-safe B+ tree")]
#[command(version)]
struct Args {
    /// Store file stem; `<stem>.db` and `<stem>.log` live next to it
    #[arg(short, long, default_value = "loam")]
    path: PathBuf,

    /// Buffer pool size in pages
    #[arg(long, default_value_t = 1024)]
    cache_pages: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get {
        /// The key to look up
        key: String,
    },

    /// Store a value under a key
    Set {
        /// The key to set
        key: String,

        /// The value to store (at most 8 bytes)
        value: String,
    },

    /// Remove a key
    Del {
        /// The key to remove
        key: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = StoreConfig {
        cache_pages: args.cache_pages,
        ..StoreConfig::default()
    };

    let store = match Store::open(&args.path, config) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to open {}: {}", args.path.display(), err);
            return ExitCode::FAILURE;
        }
    };

    match run(&store, &args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(store: &Store, command: &Command) -> Result<()> {
    match command {
        Command::Get { key } => {
            match store.get(key)? {
                Some(value) => println!("{}", value),
                None => println!("(nil)"),
            }
            Ok(())
        }
        Command::Set { key, value } => {
            store.set(key, value)?;
            println!("OK");
            Ok(())
        }
        Command::Del { key } => {
            store.delete(key)?;
            println!("OK");
            Ok(())
        }
    }
}
