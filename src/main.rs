use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Deserialize;

use irindex::browser::{BrowseType, Browser};
use irindex::compression::EncodeType;
use irindex::index::index::Index;
use irindex::index::indexer::{CorpusType, Indexer, IndexerStatus};
use irindex::index::posting_writer::EncodeChoice;

const USAGE: &str = "usage:
  irindex build <config.json>
  irindex build <dir_in> <dir_out> <chunk_size> <doc_encode> <freq_encode> <corpus_type>
  irindex browse <index_dir> [--chunks-in-memory]

encode arguments take a codec name (VariableByte, Unary, Gamma, BitPacking,
Simple16, PForDelta, EliasFano, ByteBlocks) or a comma-separated candidate
list for per-chunk multi-encode; corpus types are Text, Html and Trec.";

/// Build description, either from the JSON config file or assembled from
/// positional arguments.
#[derive(Deserialize)]
struct BuildConfig {
    dir_in: PathBuf,
    dir_out: PathBuf,
    corpus_type: CorpusType,
    #[serde(default)]
    chunk_size: u32,
    doc_encode: EncodeSpec,
    freq_encode: EncodeSpec,
    #[serde(default = "default_reuse_tmp")]
    reuse_tmp: bool,
    #[serde(default)]
    overwrite: bool,
    #[serde(default)]
    keep_tmp: bool,
    max_workers: Option<usize>,
    resources_factor: Option<f64>,
    max_trec_docs_in_memory: Option<usize>,
}

fn default_reuse_tmp() -> bool {
    true
}

/// A single codec name selects mono-encode; a list selects multi-encode. The
/// positional CLI form also accepts a comma-separated list in one argument.
#[derive(Deserialize)]
#[serde(untagged)]
enum EncodeSpec {
    One(String),
    Many(Vec<String>),
}

impl EncodeSpec {
    fn parse(&self) -> Result<EncodeChoice, String> {
        match self {
            EncodeSpec::One(arg) => {
                let names: Vec<String> =
                    arg.split(',').map(|name| name.trim().to_string()).collect();
                parse_encode_names(&names)
            }
            EncodeSpec::Many(names) => parse_encode_names(names),
        }
    }
}

fn parse_encode_names(names: &[String]) -> Result<EncodeChoice, String> {
    let mut etypes = Vec::with_capacity(names.len());
    for name in names {
        let etype = EncodeType::from_name(name.trim())
            .ok_or_else(|| format!("unknown encode type: {name}"))?;
        etypes.push(etype);
    }
    match etypes.len() {
        0 => Err("at least one encode type is required".to_string()),
        1 => Ok(EncodeChoice::Mono(etypes[0])),
        _ => Ok(EncodeChoice::Multi(etypes)),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("build") if args.len() == 3 => {
            let config = std::fs::read_to_string(&args[2])?;
            let config: BuildConfig = serde_json::from_str(&config)?;
            run_build(config)
        }
        Some("build") if args.len() == 8 => {
            let config = BuildConfig {
                dir_in: PathBuf::from(&args[2]),
                dir_out: PathBuf::from(&args[3]),
                chunk_size: args[4].parse()?,
                doc_encode: EncodeSpec::One(args[5].clone()),
                freq_encode: EncodeSpec::One(args[6].clone()),
                corpus_type: args[7].parse::<CorpusType>()?,
                reuse_tmp: true,
                overwrite: false,
                keep_tmp: false,
                max_workers: None,
                resources_factor: None,
                max_trec_docs_in_memory: None,
            };
            run_build(config)
        }
        Some("browse") if args.len() >= 3 => {
            let chunks_in_memory = args.iter().any(|arg| arg == "--chunks-in-memory");
            browse_loop(Path::new(&args[2]), chunks_in_memory)
        }
        _ => {
            eprintln!("{USAGE}");
            Err("invalid arguments".into())
        }
    }
}

fn run_build(config: BuildConfig) -> Result<(), Box<dyn Error>> {
    let mut indexer = Indexer::new(&config.dir_in, config.corpus_type, config.reuse_tmp);
    indexer.doc_encode = config.doc_encode.parse()?;
    indexer.freq_encode = config.freq_encode.parse()?;
    if let Some(max_workers) = config.max_workers {
        indexer.max_workers = max_workers;
    }
    if let Some(resources_factor) = config.resources_factor {
        indexer.resources_factor = resources_factor;
    }
    if let Some(max_docs) = config.max_trec_docs_in_memory {
        indexer.max_trec_docs_in_memory = max_docs;
    }

    let (_, status) = indexer.create_index(&config.dir_out, config.overwrite, config.chunk_size)?;
    if status == IndexerStatus::Ok && !config.keep_tmp {
        indexer.clear_temporary_indexes()?;
    }
    Ok(())
}

fn browse_loop(index_dir: &Path, chunks_info_in_memory: bool) -> Result<(), Box<dyn Error>> {
    let mut index = Index::new(index_dir);
    println!("loading index...");
    index.load(chunks_info_in_memory)?;
    println!(
        "loaded {} terms, {} docs",
        index.term_count(),
        index.get_collection().len()
    );

    let mut browser = Browser::new(&index, BrowseType::Boolean);
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("\nsearch: ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match browser.browse(&line) {
                    Ok(doc_ids) => {
                        println!("\nmatches (total {}):", doc_ids.len());
                        if doc_ids.is_empty() {
                            println!("no document matches the query");
                        }
                        for (i, doc_id) in doc_ids.iter().take(25).enumerate() {
                            let doc_name = index.get_doc_by_id(*doc_id).unwrap_or("?");
                            println!("{}. {} ({})", i + 1, doc_name, doc_id);
                        }
                        if let Some(benchmark) = browser.get_benchmark() {
                            println!("\nbenchmark: {:.6}s", benchmark.as_secs_f64());
                        }
                    }
                    // A corrupt chunk is fatal for the query, not the session.
                    Err(err) => eprintln!("query failed: {err}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
