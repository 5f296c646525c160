//! Print the chunk listing of a CGF/CAF asset.
//!
//! Usage: `cgf_inspect <path> [--json]`

use std::path::PathBuf;
use std::process::ExitCode;

use log::error;
use serde::Serialize;

use cgf_import::{parse, AssetInfo, ImportOptions};

#[derive(Serialize)]
struct ChunkSummary {
    id: u32,
    kind: String,
    version: u32,
}

#[derive(Serialize)]
struct Summary {
    path: PathBuf,
    info: AssetInfo,
    chunks: Vec<ChunkSummary>,
}

fn run(path: PathBuf, json: bool) -> cgf_import::Result<()> {
    let graph = parse(&path, &ImportOptions::default())?;
    let info = graph.asset_info();

    let chunks = graph
        .chunks()
        .iter()
        .map(|c| ChunkSummary {
            id: c.chunk_id,
            kind: format!("{:?}", c.chunk_type),
            version: c.version,
        })
        .collect();
    let summary = Summary { path, info, chunks };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", summary.path.display());
    println!(
        "  {} {:?}, format {:#x}, user version {}",
        info.game_variant, info.file_type, info.format_version, info.user_version
    );
    for chunk in &summary.chunks {
        println!("  {:#06x}  {:<16} v{:#x}", chunk.id, chunk.kind, chunk.version);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let mut path = None;
    let mut json = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            _ if path.is_none() => path = Some(PathBuf::from(&arg)),
            _ => {
                eprintln!("usage: cgf_inspect <path> [--json]");
                return ExitCode::FAILURE;
            }
        }
    }
    let Some(path) = path else {
        eprintln!("usage: cgf_inspect <path> [--json]");
        return ExitCode::FAILURE;
    };

    match run(path, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
