use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use rand_xoshiro::rand_core::{RngCore, SeedableRng};
use rayon::prelude::*;

use minwise::{estimated_jaccard, jaccard_index, MinHasher};
use neardup::{ShingleConfig, ShingleMode, Shingler};

const SIGNATURE_LENS: [usize; 6] = [6, 16, 32, 64, 128, 256];

#[derive(Parser, Debug)]
#[clap(
    name = "neardup-acc",
    about = "A program to test accuracy of the MinHash similarity estimator."
)]
struct Args {
    /// File path to a document file, one document per line.
    /// Empty lines must not be included.
    #[clap(short = 'i', long)]
    document_path: PathBuf,

    /// Recognizes whitespace-separated words as tokens in shingling.
    /// If unset, characters are used for tokens.
    #[clap(long)]
    words: bool,

    /// Shingle window size (must be more than 0).
    #[clap(short = 'w', long, default_value = "3")]
    window_size: usize,

    /// Seed value for random values.
    #[clap(short = 's', long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mode = if args.words {
        ShingleMode::Words
    } else {
        ShingleMode::Chars
    };
    let mut seeder =
        rand_xoshiro::SplitMix64::seed_from_u64(args.seed.unwrap_or_else(rand::random::<u64>));
    let shingler = Shingler::new(ShingleConfig::new(
        args.window_size,
        mode,
        seeder.next_u64(),
    )?);

    let token_sets = {
        eprintln!("Loading documents and extracting token sets...");
        let start = Instant::now();
        let mut token_sets = vec![];
        for line in BufReader::new(File::open(&args.document_path)?).lines() {
            let line = line?;
            let tokens = shingler.tokens(&line);
            if tokens.is_empty() {
                return Err("Input document must not be empty.".into());
            }
            token_sets.push(tokens);
        }
        eprintln!(
            "Extracted {} token sets in {} sec",
            token_sets.len(),
            start.elapsed().as_secs_f64()
        );
        token_sets
    };
    if token_sets.len() < 2 {
        return Err("At least two documents are required.".into());
    }

    let exact = {
        let num_pairs = token_sets.len() * (token_sets.len() - 1) / 2;
        eprintln!("Computing exact Jaccard similarities for {num_pairs} pairs...");
        let start = Instant::now();
        let exact: Vec<Vec<f64>> = (0..token_sets.len())
            .into_par_iter()
            .map(|i| {
                let x = &token_sets[i];
                token_sets[i + 1..]
                    .iter()
                    .map(|y| jaccard_index(x.iter(), y.iter()))
                    .collect()
            })
            .collect();
        eprintln!("Computed in {} sec", start.elapsed().as_secs_f64());
        exact
    };

    println!("signature_len,mean_absolute_error");
    for len in SIGNATURE_LENS {
        let start = Instant::now();
        let hasher = MinHasher::new(len, seeder.next_u64());
        let signatures: Vec<Vec<u64>> = token_sets
            .par_iter()
            .map(|tokens| hasher.signature(tokens).unwrap())
            .collect();

        let mut sum_error = 0.;
        let mut num_pairs = 0usize;
        for i in 0..signatures.len() {
            for j in i + 1..signatures.len() {
                let est = estimated_jaccard(&signatures[i], &signatures[j]);
                sum_error += (est - exact[i][j - i - 1]).abs();
                num_pairs += 1;
            }
        }
        let mae = sum_error / num_pairs as f64;
        println!("{len},{mae}");
        eprintln!(
            "Processed signature_len={len} in {} sec",
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
