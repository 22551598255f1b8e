use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde_json::json;
use topic_sweep::config::{LdaConfig, LoadConfig, PathsConfig, SweepConfig};
use topic_sweep::padding::LARGE_NEGATIVE;
use topic_sweep::preprocess::{english_stopwords, normalize, stem, SnowballStemmer};
use topic_sweep::store::{read_metrics, write_atomic, ResultStore};
use topic_sweep::{
    build_corpus, load_documents, reconcile, CancellationToken, Coherence, ExclusivityReduction,
    LdaTrainer, MetricsTable, NpmiCoherence, Padder, Side, Sweep, UMassCoherence,
};

const DEFAULT_INPUT_NAME: &str = "communications_preprocessed.csv";

#[derive(Parser, Debug)]
#[command(author, version, about = "LDA topic-count sweep toolkit", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train and score one LDA model per topic count
    Sweep(SweepArgs),
    /// Reconcile two topic-distribution tables by padding missing columns
    Pad(PadArgs),
    /// Render a coherence vs exclusivity scatter plot from a metrics CSV
    Plot(PlotArgs),
    /// Summarise a metrics CSV
    Info(InfoArgs),
    /// Normalize a raw text column into `clean_text` and `stemmed_text`
    Preprocess(PreprocessArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CoherenceArg {
    /// Document co-occurrence (UMass)
    Umass,
    /// Sliding-window normalized PMI
    Npmi,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ExclusivityArg {
    /// Mean over every topic-word entry
    Mean,
    /// Sum over every topic-word entry
    Sum,
    /// Mean over each topic's most probable words
    TopWords,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// CSV, text file, or directory of documents
    /// (defaults to $DATA_DIR/communications_preprocessed.csv)
    input: Option<PathBuf>,

    /// CSV column holding the tokenized text
    #[arg(long, value_name = "NAME", default_value = "stemmed_text")]
    column: String,

    /// Normalize raw text before tokenizing
    #[arg(long)]
    normalize: bool,

    /// Snowball-stem tokens after normalizing
    #[arg(long, requires = "normalize")]
    stem: bool,

    /// Worker threads per model
    #[arg(long, value_name = "N", default_value_t = 4)]
    workers: usize,

    /// Smallest topic count
    #[arg(long, value_name = "N", default_value_t = 5)]
    min_topics: usize,

    /// Largest topic count
    #[arg(long, value_name = "N", default_value_t = 30)]
    max_topics: usize,

    /// Words per topic written to each topic table
    #[arg(long, value_name = "N", default_value_t = 10)]
    topic_words: usize,

    /// Gibbs sampling passes per model
    #[arg(long, value_name = "COUNT")]
    iterations: Option<usize>,

    /// Document-topic prior (defaults to 1 / n_topics)
    #[arg(long, value_name = "VALUE")]
    alpha: Option<f64>,

    /// Topic-word prior (defaults to 1 / n_topics)
    #[arg(long, value_name = "VALUE")]
    beta: Option<f64>,

    /// Seed for reproducible sampling
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Coherence measure
    #[arg(long, value_enum, default_value_t = CoherenceArg::Npmi)]
    coherence: CoherenceArg,

    /// Words per topic considered by the coherence measure
    #[arg(long, value_name = "N", default_value_t = 20)]
    coherence_words: usize,

    /// Sliding window length for NPMI
    #[arg(long, value_name = "TOKENS", default_value_t = 10)]
    window: usize,

    /// Exclusivity reduction
    #[arg(long, value_enum, default_value_t = ExclusivityArg::Mean)]
    exclusivity: ExclusivityArg,

    /// Words per topic for the top-words exclusivity reduction
    #[arg(long, value_name = "N", default_value_t = 10)]
    exclusivity_words: usize,

    /// Prefix for artifact names
    #[arg(long, value_name = "NAME", default_value = "lda")]
    model_name: String,

    /// Base directory for timestamped run outputs (defaults to $OUTPUT_DIR)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Base directory for figures (defaults to $FIGURE_DIR)
    #[arg(long, value_name = "DIR")]
    figure_dir: Option<PathBuf>,

    /// Skip rendering the scatter plot
    #[arg(long)]
    no_plot: bool,

    /// Disable the progress bar and per-model logging
    #[arg(long)]
    no_progress: bool,

    /// Disable recursive directory traversal
    #[arg(long)]
    no_recursive: bool,

    /// Follow symlinks during traversal
    #[arg(long)]
    follow_symlinks: bool,
}

#[derive(Args, Debug)]
struct PadArgs {
    /// Run directory of the left table
    #[arg(long, value_name = "DIR")]
    left_dir: PathBuf,

    /// Run directory of the right table
    #[arg(long, value_name = "DIR")]
    right_dir: PathBuf,

    /// File label of the left side
    #[arg(long, value_name = "LABEL", default_value = "fed")]
    left_label: String,

    /// File label of the right side
    #[arg(long, value_name = "LABEL", default_value = "news")]
    right_label: String,

    /// Fill value for padded columns
    #[arg(
        long,
        value_name = "VALUE",
        default_value_t = LARGE_NEGATIVE,
        allow_hyphen_values = true
    )]
    sentinel: f64,
}

#[derive(Args, Debug)]
struct PlotArgs {
    /// Metrics CSV (`n_topics,exclusivity,coherence`)
    metrics: PathBuf,

    /// Output PNG
    #[arg(short, long, value_name = "PATH", default_value = "metrics.png")]
    output: PathBuf,

    /// Model family named in the figure title
    #[arg(long, value_name = "TEXT", default_value = "LDA")]
    title: String,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Metrics CSV to inspect
    metrics: PathBuf,

    /// Emit machine-readable JSON summary
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PreprocessArgs {
    /// Raw CSV (defaults to $DATA_DIR/communications.csv)
    input: Option<PathBuf>,

    /// Column holding raw text
    #[arg(long, value_name = "NAME", default_value = "Text")]
    column: String,

    /// Output CSV (defaults to $DATA_DIR/communications_preprocessed.csv)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Sweep(args) => run_sweep(args),
        Commands::Pad(args) => run_pad(args),
        Commands::Plot(args) => run_plot(args),
        Commands::Info(args) => run_info(args),
        Commands::Preprocess(args) => run_preprocess(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

/// Exit status used when a second interrupt forces the process down.
const INTERRUPTED_EXIT_CODE: i32 = 130;

fn install_interrupt_handler() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let handle = token.clone();
    ctrlc::set_handler(move || {
        if request_stop(&handle) {
            warn!("second interrupt received; exiting immediately");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        warn!("interrupt received; stopping at the next checkpoint (again to force quit)");
    })
    .context("unable to install Ctrl-C handler")?;
    Ok(token)
}

/// Cancels `token`, returning `true` when it was already cancelled.
fn request_stop(token: &CancellationToken) -> bool {
    let repeated = token.is_cancelled();
    token.cancel();
    repeated
}

fn run_sweep(args: SweepArgs) -> Result<()> {
    let exclusivity = match args.exclusivity {
        ExclusivityArg::Mean => ExclusivityReduction::Mean,
        ExclusivityArg::Sum => ExclusivityReduction::Sum,
        ExclusivityArg::TopWords => ExclusivityReduction::TopWords(args.exclusivity_words),
    };
    // Range and worker checks run before any data is read.
    let sweep_cfg = SweepConfig::builder()
        .topic_range(args.min_topics, args.max_topics)
        .workers(args.workers)
        .topic_words(args.topic_words)
        .exclusivity(exclusivity)
        .model_name(args.model_name.clone())
        .show_progress(!args.no_progress)
        .build()?;
    let mut lda = LdaConfig::builder()
        .alpha(args.alpha)
        .beta(args.beta)
        .seed(args.seed)
        .show_progress(!args.no_progress);
    if let Some(iterations) = args.iterations {
        lda = lda.iterations(iterations);
    }
    let trainer = LdaTrainer::new(lda.build()?);
    let coherence = match args.coherence {
        CoherenceArg::Umass => Coherence::UMass(UMassCoherence {
            top_n: args.coherence_words,
        }),
        CoherenceArg::Npmi => Coherence::Npmi(NpmiCoherence {
            top_n: args.coherence_words,
            window: args.window,
        }),
    };

    let paths = PathsConfig::from_env();
    let input = args
        .input
        .clone()
        .unwrap_or_else(|| paths.data_dir.join(DEFAULT_INPUT_NAME));
    let load_cfg = LoadConfig::builder()
        .column(args.column.clone())
        .normalize(args.normalize)
        .stem(args.stem)
        .recursive(!args.no_recursive)
        .follow_symlinks(args.follow_symlinks)
        .build();
    let documents = load_documents(&input, &load_cfg)
        .with_context(|| format!("failed to load documents from {}", input.display()))?;
    let (vocabulary, corpus) = build_corpus(&documents)?;
    let vocabulary = Arc::new(vocabulary);
    info!(
        "loaded {} documents, {} tokens, {} terms",
        corpus.len(),
        corpus.num_tokens(),
        vocabulary.len()
    );

    let output_base = args.output_dir.clone().unwrap_or(paths.output_dir);
    let store = ResultStore::timestamped(&output_base).with_context(|| {
        format!(
            "failed to create run directory under {}",
            output_base.display()
        )
    })?;
    let token = install_interrupt_handler()?;

    let progress = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new(sweep_cfg.model_count() as u64);
        let style = ProgressStyle::with_template(
            "{spinner} training LDA models [{bar:30}] {pos}/{len} {msg} {elapsed}",
        )
        .context("invalid progress template")?
        .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let start = Instant::now();
    let outcome = {
        let bar = progress.clone();
        let mut sweep = Sweep::new(sweep_cfg, trainer, coherence, &store)
            .with_cancellation(token)
            .on_model_scored(move |row| {
                if let Some(pb) = &bar {
                    pb.set_message(format!("n={}", row.n_topics));
                    pb.inc(1);
                }
            });
        sweep.run(&corpus, &vocabulary, &documents)
    };
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let artifacts = outcome.with_context(|| {
        format!(
            "sweep stopped; completed artifacts remain in {}",
            store.root().display()
        )
    })?;

    if !args.no_plot {
        let figure_base = args.figure_dir.clone().unwrap_or(paths.figure_dir);
        let stamp = store
            .root()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();
        let figure = figure_base
            .join(stamp)
            .join(format!("{}.png", args.model_name));
        match render_figure(&artifacts.metrics, &args.model_name.to_uppercase(), &figure) {
            Ok(()) => info!("figure written to {}", figure.display()),
            Err(err) => warn!("skipping figure: {err:#}"),
        }
    }

    println!(
        "wrote {} topic tables and {} to {} in {:.2?}",
        artifacts.topic_tables.len(),
        artifacts.metrics_path.display(),
        store.root().display(),
        start.elapsed()
    );
    if let Some(best) = artifacts.metrics.best_by_coherence() {
        println!(
            "   best coherence: n_topics={} coherence={:.4} exclusivity={:.4}",
            best.n_topics, best.coherence, best.exclusivity
        );
    }
    Ok(())
}

fn run_pad(args: PadArgs) -> Result<()> {
    let left = Side::new(&args.left_dir, &args.left_label);
    let right = Side::new(&args.right_dir, &args.right_label);
    let token = install_interrupt_handler()?;
    let padder = Padder::new(args.sentinel).with_cancellation(token);
    let outcome = reconcile(&left, &right, &padder).with_context(|| {
        format!(
            "failed to reconcile {} with {}",
            left.dir().display(),
            right.dir().display()
        )
    })?;
    println!(
        "padded both sides to {} columns: {} and {}",
        outcome.columns.len(),
        outcome.left_path.display(),
        outcome.right_path.display()
    );
    Ok(())
}

fn run_plot(args: PlotArgs) -> Result<()> {
    let table = read_metrics(&args.metrics)
        .with_context(|| format!("failed to read {}", args.metrics.display()))?;
    render_figure(&table, &args.title, &args.output)?;
    println!("wrote {}", args.output.display());
    Ok(())
}

#[cfg(feature = "plot")]
fn render_figure(table: &MetricsTable, model: &str, path: &Path) -> Result<()> {
    topic_sweep::plot::render_scatter(table, model, path)
        .with_context(|| format!("failed to render {}", path.display()))
}

#[cfg(not(feature = "plot"))]
fn render_figure(_table: &MetricsTable, _model: &str, path: &Path) -> Result<()> {
    Err(anyhow!(
        "cannot render {}: built without the `plot` feature",
        path.display()
    ))
}

fn run_info(args: InfoArgs) -> Result<()> {
    let table = read_metrics(&args.metrics)
        .with_context(|| format!("failed to read {}", args.metrics.display()))?;
    if table.is_empty() {
        bail!("{} holds no metrics rows", args.metrics.display());
    }
    let best_coherence = table.best_by_coherence();
    let best_exclusivity = table.best_by_exclusivity();
    let front: Vec<usize> = table.pareto_front().iter().map(|row| row.n_topics).collect();
    let summary = json!({
        "path": args.metrics.display().to_string(),
        "models": table.len(),
        "topic_counts": table.topic_counts(),
        "best_coherence": best_coherence,
        "best_exclusivity": best_exclusivity,
        "pareto_front": front,
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let counts = table.topic_counts();
        let first = counts.first().copied().unwrap_or_default();
        let last = counts.last().copied().unwrap_or_default();
        println!("Models          : {} (n_topics {first}..={last})", table.len());
        if let Some(row) = best_coherence {
            println!(
                "Best coherence  : n_topics={} ({:.4})",
                row.n_topics, row.coherence
            );
        }
        if let Some(row) = best_exclusivity {
            println!(
                "Best exclusivity: n_topics={} ({:.4})",
                row.n_topics, row.exclusivity
            );
        }
        let front = front
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        println!("Pareto front    : {front}");
    }
    Ok(())
}

fn run_preprocess(args: PreprocessArgs) -> Result<()> {
    let paths = PathsConfig::from_env();
    let input = args
        .input
        .unwrap_or_else(|| paths.data_dir.join("communications.csv"));
    let output = args
        .output
        .unwrap_or_else(|| paths.data_dir.join(DEFAULT_INPUT_NAME));

    let file = File::open(&input).with_context(|| format!("failed to open {}", input.display()))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    let headers = reader.headers()?.clone();
    let index = headers
        .iter()
        .position(|name| name == args.column)
        .ok_or_else(|| anyhow!("column {:?} not found in {}", args.column, input.display()))?;

    let stopwords = english_stopwords();
    let stemmer = SnowballStemmer::english();
    let mut rows = 0usize;
    write_atomic(&output, |sink| {
        let mut writer = csv::Writer::from_writer(sink);
        let mut out_headers = headers.clone();
        out_headers.push_field("clean_text");
        out_headers.push_field("stemmed_text");
        writer.write_record(&out_headers)?;
        for record in reader.records() {
            let mut record = record?;
            let clean = normalize(record.get(index).unwrap_or_default(), &stopwords);
            let stemmed = stem(&clean, &stemmer);
            record.push_field(&clean);
            record.push_field(&stemmed);
            writer.write_record(&record)?;
            rows += 1;
        }
        writer
            .flush()
            .map_err(|err| topic_sweep::SweepError::io(err, Some(output.clone())))
    })
    .with_context(|| format!("failed to write {}", output.display()))?;

    info!("normalized {rows} rows");
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "Saved preprocessed data to {}", output.display())?;
    Ok(())
}
