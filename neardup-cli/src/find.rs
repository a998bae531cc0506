use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use neardup::{CancelFlag, DocId, Engine, EngineConfig, ShingleMode};

#[derive(Parser, Debug)]
#[clap(
    name = "neardup-find",
    about = "A program to find near-duplicate pairs of documents."
)]
struct Args {
    /// File path to a document file to be searched, one document per line.
    #[clap(short = 'i', long)]
    document_path: PathBuf,

    /// Minimum estimated Jaccard similarity in the range of [0,1].
    #[clap(short = 't', long)]
    min_similarity: f64,

    /// Recognizes whitespace-separated words as tokens in shingling.
    /// If unset, characters are used for tokens.
    #[clap(long)]
    words: bool,

    /// Shingle window size (must be more than 0).
    #[clap(short = 'w', long, default_value = "3")]
    window_size: usize,

    /// Number of bands the signature is split into. The product with
    /// --rows-per-band is the signature length; more bands catch more
    /// low-similarity pairs, longer rows suppress false positives.
    #[clap(short = 'b', long, default_value = "16")]
    num_bands: usize,

    /// Number of signature components per band.
    #[clap(short = 'r', long, default_value = "4")]
    rows_per_band: usize,

    /// Seed value for random values.
    #[clap(short = 's', long)]
    seed: Option<u64>,

    /// Also reports the exact Jaccard similarity of each pair.
    #[clap(long)]
    verify: bool,

    /// File path to which the engine state is exported after loading.
    #[clap(short = 'o', long)]
    export_path: Option<PathBuf>,

    /// Disables parallel construction.
    #[clap(short = 'p', long)]
    disable_parallel: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let config = EngineConfig {
        num_bands: args.num_bands,
        rows_per_band: args.rows_per_band,
        window: args.window_size,
        mode: if args.words {
            ShingleMode::Words
        } else {
            ShingleMode::Chars
        },
        seed: args.seed,
        retain_tokens: args.verify,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config)?.shows_progress(true);

    let documents: Vec<(DocId, String)> = texts_iter(File::open(&args.document_path)?)
        .enumerate()
        .map(|(i, text)| (i as DocId, text))
        .collect();
    eprintln!("#documents = {}", documents.len());

    {
        eprintln!("Indexing documents...");
        let start = Instant::now();
        if args.disable_parallel {
            engine.insert_batch(documents.iter().map(|(i, d)| (*i, d)))?;
        } else {
            engine.insert_batch_parallel(&documents, &CancelFlag::new())?;
        }
        let duration = start.elapsed();
        let memory_in_bytes = engine.memory_in_bytes() as f64;
        eprintln!(
            "Indexed {} documents in {} sec, consuming {} MiB",
            engine.len(),
            duration.as_secs_f64(),
            memory_in_bytes / (1024. * 1024.)
        );
    }

    if let Some(export_path) = args.export_path {
        let mut wtr = BufWriter::new(File::create(&export_path)?);
        engine.export(&mut wtr)?;
        eprintln!("Exported the engine state to {:?}", export_path);
    }

    eprintln!("Finding all near-duplicate pairs...");
    let start = Instant::now();
    let mut pairs = vec![];
    for (i, _) in &documents {
        for (j, est) in engine.query_id(*i, args.min_similarity)? {
            if *i < j {
                pairs.push((*i, j, est));
            }
        }
    }
    eprintln!("Done in {} sec", start.elapsed().as_secs_f64());

    if args.verify {
        println!("i,j,est,exact");
        for (i, j, est) in pairs {
            let exact = engine.verify_exact(i, j)?;
            println!("{i},{j},{est},{exact}");
        }
    } else {
        println!("i,j,est");
        for (i, j, est) in pairs {
            println!("{i},{j},{est}");
        }
    }

    Ok(())
}

fn texts_iter<R>(rdr: R) -> impl Iterator<Item = String>
where
    R: Read,
{
    BufReader::new(rdr).lines().map(|line| line.unwrap())
}
