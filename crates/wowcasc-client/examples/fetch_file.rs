//! Fetch one file by FileDataID or listfile name and write it to disk.
//!
//! Usage:
//!   cargo run --example fetch_file -p wowcasc-client -- --id 1375801 -o out.bin
//!   cargo run --example fetch_file -p wowcasc-client -- \
//!       --install /path/to/wow --name interface/framexml/uiparent.lua -o uiparent.lua
//!
//! Without `--install` the build is read from the CDN. Names need a
//! `listfile.csv` in the cache directory.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use wowcasc_client::{CascSource, ClientConfig, FileOptions, LocalCasc, RemoteCasc};
use wowcasc_crypto::FileDataId;

#[derive(Debug, Parser)]
#[command(about = "Fetch a file from a CASC build")]
struct Args {
    /// Local installation directory; the CDN is used when absent
    #[arg(long)]
    install: Option<PathBuf>,

    /// Product to discover on the CDN
    #[arg(long, default_value = "wow")]
    product: String,

    /// Index into the discovered builds
    #[arg(long, default_value_t = 0)]
    build: usize,

    /// JSON client configuration; `WOWCASC_*` variables are used otherwise
    #[arg(long, env = "WOWCASC_CONFIG")]
    config: Option<PathBuf>,

    /// TACT key file, one `<name> <key>` pair per line
    #[arg(long)]
    keys: Option<PathBuf>,

    /// FileDataID to fetch
    #[arg(long, conflicts_with = "name")]
    id: Option<u32>,

    /// Listfile name to fetch
    #[arg(long)]
    name: Option<String>,

    /// Zero-fill blocks whose key is unknown
    #[arg(long)]
    partial: bool,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,
}

async fn fetch<S: CascSource>(source: &S, args: &Args) -> Result<Vec<u8>> {
    let options = FileOptions {
        partial_decode: args.partial,
    };
    let data = match (&args.name, args.id) {
        (Some(name), _) => source.get_file_by_name(name, options).await?,
        (None, Some(id)) => source.get_file(FileDataId::new(id), options).await?,
        (None, None) => bail!("one of --id or --name is required"),
    };
    Ok(data)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wowcasc_client=info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::from_env(),
    };

    let data = if let Some(install) = &args.install {
        let mut client = LocalCasc::new(install, &config).await?;
        load_keys(&args, client.keys())?;
        client.load(args.build).await.context("loading local build")?;
        fetch(&client, &args).await?
    } else {
        let mut client = RemoteCasc::new(config)?.with_products([args.product.clone()]);
        load_keys(&args, client.keys())?;
        for (i, build) in client.init().await?.iter().enumerate() {
            println!("[{i}] {} {} {}", build.product, build.version_name, build.build_config);
        }
        client.load(args.build).await.context("loading CDN build")?;
        fetch(&client, &args).await?
    };

    std::fs::write(&args.output, &data)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("{} bytes written to {}", data.len(), args.output.display());
    Ok(())
}

fn load_keys(
    args: &Args,
    keys: &std::sync::Arc<parking_lot::RwLock<wowcasc_crypto::TactKeyStore>>,
) -> Result<()> {
    if let Some(path) = &args.keys {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let added = keys.write().load_from_txt(&text);
        println!("{added} TACT keys loaded");
    }
    Ok(())
}
