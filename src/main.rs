use alphaminer::config::AppConfig;
use alphaminer::data::{FeatureSet, PanelCsvConnector, SyntheticMarket};
use alphaminer::engines::training::{CancellationToken, LogSink};
use alphaminer::functions::OperatorRegistry;
use alphaminer::{AlphaMiner, TrainOptions};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Formula alpha mining with a grammar-constrained policy", long_about = None)]
struct Cli {
    /// TOML or JSON configuration; ALPHAMINER__SECTION__KEY variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the policy and stream one JSON record per step
    Train {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long)]
        steps: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Add SENTIMENT and NEWS_COUNT to the vocabulary
        #[arg(long)]
        sentiment: bool,

        #[arg(long)]
        seed: Option<u64>,

        /// Write records here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Backtest a single formula such as "ADD(RET, MA5(VOL))"
    Evaluate {
        formula: String,

        #[command(flatten)]
        data: DataArgs,
    },
    /// List the operator vocabulary
    Operators {
        #[arg(long)]
        sentiment: bool,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Long-format panel CSV (date, instrument, features...). Synthetic data when omitted
    #[arg(long)]
    data: Option<PathBuf>,

    #[arg(long, default_value_t = 50)]
    instruments: usize,

    #[arg(long, default_value_t = 252)]
    periods: usize,

    #[arg(long, default_value_t = 42)]
    data_seed: u64,
}

impl DataArgs {
    fn load(&self) -> anyhow::Result<FeatureSet> {
        match &self.data {
            Some(path) => PanelCsvConnector::load_feature_set(path)
                .with_context(|| format!("loading {}", path.display())),
            None => {
                log::info!(
                    "Using synthetic market: {} instruments x {} periods",
                    self.instruments,
                    self.periods
                );
                Ok(SyntheticMarket::new(self.instruments, 6, self.periods, self.data_seed)
                    .generate()?)
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Train {
            data,
            steps,
            batch_size,
            sentiment,
            seed,
            output,
        } => {
            let miner = AlphaMiner::new(config, data.load()?)?;
            let options = TrainOptions {
                num_steps: steps,
                batch_size,
                use_sentiment: sentiment.then_some(true),
                seed,
            };

            let mut out: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(io::stdout().lock()),
            };

            let mut run = miner.train(options)?;
            run.add_sink(Box::new(LogSink));
            let cancel = CancellationToken::new();
            for record in run.steps(&cancel) {
                let record = record?;
                serde_json::to_writer(&mut out, &record)?;
                writeln!(out)?;
            }
            out.flush()?;

            let summary = run.summary();
            eprintln!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Evaluate { formula, data } => {
            let miner = AlphaMiner::new(config, data.load()?)?;
            let outcome = miner.evaluate(formula.as_str())?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Operators { sentiment } => {
            let registry = OperatorRegistry::new(sentiment || config.features.enable_sentiment);
            for op in registry.operators() {
                println!(
                    "{:>3}  {:<12} arity {}  {:?}",
                    op.token.0,
                    op.name,
                    op.arity(),
                    op.category()
                );
            }
        }
    }

    Ok(())
}
