//! Score sentences with a recurrent language model.
//!
//! Each sentence is scored from the zero state, starting with the configured
//! start label and closing with the end-of-sentence label.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use lm_scorer::{LmScorer, ScorerConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lm-score")]
#[command(about = "Score sentences with a recurrent language model")]
struct Args {
    /// Path to the GGUF model file (overrides the configuration)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Path to a TOML scorer configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compute threads (overrides the configuration)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Sentences are whitespace-separated integer labels instead of words
    #[arg(long)]
    ids: bool,

    /// Sentence to score; may be repeated. Reads stdin lines when absent.
    #[arg(short, long)]
    sentence: Vec<String>,
}

fn to_labels(scorer: &LmScorer, sentence: &str, ids: bool) -> Result<Vec<u32>> {
    if ids {
        return sentence
            .split_whitespace()
            .map(|t| {
                t.parse::<u32>()
                    .with_context(|| format!("invalid label {:?}", t))
            })
            .collect();
    }
    let vocab = match scorer.vocab()? {
        Some(v) => v,
        None => bail!("model has no word list; pass --ids to score raw labels"),
    };
    Ok(vocab.encode(sentence.split_whitespace())?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lm_scorer=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ScorerConfig::load_from_path(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ScorerConfig::from_env()?,
    };
    if let Some(model) = args.model {
        config.model_path = Some(model);
    }
    if let Some(threads) = args.threads {
        config.num_threads = threads;
    }

    let scorer = LmScorer::from_config(&config)?;
    info!(
        vocab = scorer.vocab_size()?,
        threads = scorer.num_threads()?,
        "model loaded"
    );

    let sentences: Vec<String> = if args.sentence.is_empty() {
        std::io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<_>>()
            .context("failed to read stdin")?
    } else {
        args.sentence
    };

    for sentence in sentences.iter().filter(|s| !s.trim().is_empty()) {
        let labels = to_labels(&scorer, sentence, args.ids)?;
        let scores = scorer
            .score_sequence(&labels)
            .with_context(|| format!("failed to score {:?}", sentence))?;
        let per_label: Vec<String> = scores
            .per_label
            .iter()
            .map(|s| format!("{:.4}", s))
            .collect();
        println!("{:.4}\t{}\t{}", scores.total, sentence, per_label.join(" "));
    }

    Ok(())
}
