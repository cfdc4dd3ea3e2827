//! StripeIO CLI - Object Copy Tool
//!
//! Copies files in and out of a directory-backed object store and reports
//! object attributes. Object identifiers are given as `hi:lo` hex pairs,
//! e.g. `0x7300000000000123:0x42`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stripeio_common::{EngineConfig, ObjectId, PoolId, StoreConfig};
use stripeio_engine::{FsBackend, Session};
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stripeio-cli")]
#[command(about = "StripeIO object copy tool")]
#[command(version)]
struct Args {
    /// Store data directory
    #[arg(short, long, default_value = "./stripeio-data", env = "STRIPEIO_DATA_DIR")]
    data_dir: PathBuf,

    /// Number of concurrent block operations per transfer
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Pool to create objects in (hi:lo hex pair)
    #[arg(short, long)]
    pool: Option<String>,

    /// Copy buffer size in bytes
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    buffer_size: usize,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a local file into an object
    Put {
        /// Object ID (hi:lo)
        object: String,
        /// Source file
        file: PathBuf,
    },
    /// Copy an object into a local file
    Get {
        /// Object ID (hi:lo)
        object: String,
        /// Destination file
        file: PathBuf,
    },
    /// Show object attributes and layout
    Stat {
        /// Object ID (hi:lo)
        object: String,
    },
}

fn format_size(bytes: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;

    if bytes >= GIB && bytes.is_multiple_of(GIB) {
        format!("{} GiB", bytes / GIB)
    } else if bytes >= MIB && bytes.is_multiple_of(MIB) {
        format!("{} MiB", bytes / MIB)
    } else if bytes >= KIB && bytes.is_multiple_of(KIB) {
        format!("{} KiB", bytes / KIB)
    } else {
        format!("{bytes} B")
    }
}

async fn put(session: &Session, id: ObjectId, pool: Option<PoolId>, file: &PathBuf, buffer_size: usize) -> Result<()> {
    let size = tokio::fs::metadata(file)
        .await
        .with_context(|| format!("reading metadata of {}", file.display()))?
        .len();
    let mut src = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;

    let mut stream = session.create(id, size, pool).await?;
    let mut buf = vec![0u8; buffer_size];
    let mut copied: u64 = 0;
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write(&buf[..n]).await?;
        copied += n as u64;
    }
    stream.close().await?;

    println!("{} -> {id} ({})", file.display(), format_size(copied));
    Ok(())
}

async fn get(session: &Session, id: ObjectId, file: &PathBuf, buffer_size: usize) -> Result<()> {
    let mut stream = session.open(id, None).await?;
    let mut dst = tokio::fs::File::create(file)
        .await
        .with_context(|| format!("creating {}", file.display()))?;

    let mut buf = vec![0u8; buffer_size];
    let mut copied: u64 = 0;
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
        copied += n as u64;
    }
    dst.flush().await?;
    stream.close().await?;

    println!("{id} -> {} ({})", file.display(), format_size(copied));
    Ok(())
}

async fn stat(session: &Session, id: ObjectId) -> Result<()> {
    let mut stream = session.open(id, None).await?;
    let obj = stream.object();
    let geom = stream.geometry();

    println!("Object: {id}");
    println!("Pool:          {}", obj.pool);
    println!("Layout ID:     {}", obj.layout);
    println!("Size:          {}", format_size(stream.known_size()));
    println!("Unit Size:     {}", format_size(geom.unit_size));
    println!(
        "Striping:      {}+{}+{} over {} devices",
        geom.data_units, geom.parity_units, geom.spare_units, geom.pool_width
    );
    println!("Group Size:    {}", format_size(geom.group_size()));
    println!("Max Block:     {}", format_size(geom.max_block()));

    stream.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = args
        .pool
        .as_deref()
        .map(str::parse::<PoolId>)
        .transpose()
        .context("parsing pool id")?;

    let store = StoreConfig {
        data_dir: args.data_dir.clone(),
        ..StoreConfig::default()
    };
    let backend = std::sync::Arc::new(FsBackend::new(store).await?);
    let config = EngineConfig {
        threads: args.threads,
        pool,
        ..EngineConfig::default()
    };
    let session = Session::new(backend, config)?;

    match args.command {
        Commands::Put { object, file } => {
            let id: ObjectId = object.parse().context("parsing object id")?;
            put(&session, id, pool, &file, args.buffer_size).await?;
        }
        Commands::Get { object, file } => {
            let id: ObjectId = object.parse().context("parsing object id")?;
            get(&session, id, &file, args.buffer_size).await?;
        }
        Commands::Stat { object } => {
            let id: ObjectId = object.parse().context("parsing object id")?;
            stat(&session, id).await?;
        }
    }

    Ok(())
}
