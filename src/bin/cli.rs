//! ListVault CLI Client
//!
//! Administrative access to lists, either against an embedded data directory
//! or a remote `listvault-kv` server.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use listvault::pagination::PageRequest;
use listvault::records::parse_lines;
use listvault::{Config, DurableKv, KvStore, ListKind, ListService, RemoteKv, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// ListVault CLI
#[derive(Parser, Debug)]
#[command(name = "listvault-cli")]
#[command(about = "CLI for ListVault list storage")]
struct Args {
    /// Embedded data directory
    #[arg(short, long, default_value = "./listvault_data")]
    data_dir: String,

    /// Remote listvault-kv address (overrides --data-dir)
    #[arg(short, long)]
    kv_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show every list, newest first
    Lists,

    /// Print one page of a list
    Show {
        /// List id or name
        list: String,

        #[arg(short, long, default_value = "1")]
        page: u64,

        #[arg(short = 's', long, default_value = "1000")]
        page_size: u64,
    },

    /// Create a list from a text file (one `primary|secondary` per line)
    Import {
        /// Name of the new list
        name: String,

        /// Input file
        file: String,

        /// accounts or proxies
        #[arg(short, long, default_value = "accounts")]
        kind: ListKind,
    },

    /// Append the lines of a text file to a list
    Append {
        /// List id or name
        list: String,

        /// Input file
        file: String,
    },

    /// Write a list out as text
    Export {
        /// List id or name
        list: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<String>,

        /// Leave out the secondary field
        #[arg(long)]
        no_email: bool,
    },

    /// Rename a list
    Rename {
        /// List id or name
        list: String,

        /// New name
        name: String,
    },

    /// Delete a list
    Delete {
        /// List id or name
        list: String,
    },

    /// Rewrite the embedded WAL from live keys
    Compact,

    /// Ping the remote server
    Ping,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder().data_dir(&args.data_dir).build();
    let timeout = Duration::from_millis(config.read_timeout_ms);

    // Commands that talk to the backend directly
    match (&args.command, &args.kv_addr) {
        (Commands::Ping, Some(addr)) => {
            RemoteKv::connect(addr.as_str(), timeout)?.ping()?;
            println!("PONG");
            return Ok(());
        }
        (Commands::Ping, None) => {
            println!("nothing to ping without --kv-addr");
            return Ok(());
        }
        (Commands::Compact, None) => {
            let kv = DurableKv::open(&config)?;
            kv.compact()?;
            println!("compacted {} keys", kv.entry_count());
            return kv.close();
        }
        (Commands::Compact, Some(_)) => {
            println!("compaction runs on the server; restart listvault-kv with --compact");
            return Ok(());
        }
        _ => {}
    }

    let (store, durable): (Arc<dyn KvStore>, Option<Arc<DurableKv>>) = match &args.kv_addr {
        Some(addr) => {
            let kv: Arc<dyn KvStore> = Arc::new(RemoteKv::connect(addr.as_str(), timeout)?);
            (kv, None)
        }
        None => {
            let kv = Arc::new(DurableKv::open(&config)?);
            let store: Arc<dyn KvStore> = kv.clone();
            (store, Some(kv))
        }
    };
    let service = ListService::new(store, config)?;

    match args.command {
        Commands::Lists => {
            for entry in service.list_all()? {
                println!(
                    "{}  {:<9} {:>10}  {}  {}",
                    entry.id, entry.kind, entry.total, entry.created_at, entry.name
                );
            }
        }
        Commands::Show {
            list,
            page,
            page_size,
        } => {
            let (entry, page) = service.get_page(&list, PageRequest::new(page, page_size))?;
            println!("# {} ({}), {} records", entry.name, entry.id, page.total);
            for stored in &page.records {
                println!("{}\t{}", stored.index, stored.record.to_line(true));
            }
            if page.pagination.has_more {
                println!("# more on page {}", page.pagination.page + 1);
            }
        }
        Commands::Import { name, file, kind } => {
            let records = parse_lines(&fs::read_to_string(&file)?)?;
            let entry = service.create_list(&name, kind, records)?;
            println!("created {} ({}) with {} records", entry.name, entry.id, entry.total);
        }
        Commands::Append { list, file } => {
            let records = parse_lines(&fs::read_to_string(&file)?)?;
            let total = service.append(&list, records)?;
            println!("total {}", total);
        }
        Commands::Export {
            list,
            out,
            no_email,
        } => {
            let written = match out {
                Some(path) => {
                    let mut writer = BufWriter::new(File::create(&path)?);
                    let written = service.export(&list, !no_email, &mut writer)?;
                    writer.flush()?;
                    written
                }
                None => {
                    let stdout = io::stdout();
                    let mut writer = BufWriter::new(stdout.lock());
                    let written = service.export(&list, !no_email, &mut writer)?;
                    writer.flush()?;
                    written
                }
            };
            eprintln!("exported {} records", written);
        }
        Commands::Rename { list, name } => {
            let entry = service.rename(&list, &name)?;
            println!("renamed {} to {}", entry.id, entry.name);
        }
        Commands::Delete { list } => {
            if service.delete(&list)? {
                println!("deleted {}", list);
            } else {
                println!("{} did not exist", list);
            }
        }
        Commands::Compact | Commands::Ping => {}
    }

    drop(service);
    if let Some(kv) = durable {
        kv.sync()?;
    }
    Ok(())
}
