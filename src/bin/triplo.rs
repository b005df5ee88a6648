use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::ThreadPoolBuilder;
use serde_json::json;
use triplo::serialization::{
    alias_snapshot_json, catalog_snapshot_json, load_alias_snapshot, load_catalog_snapshot,
};
use triplo::{AliasId, PipelineConfig, Session, SubsetLimitPolicy, Token, WordId};

const DEFAULT_ALIASES: &str = "aliases.json";
const DEFAULT_CATALOG: &str = "catalog.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "Token-set training catalog toolkit", long_about = None)]
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
    /// Print the token stream of every record
    Tokenize(TokenizeArgs),
    /// List dictionary words by frequency
    Words(WordsArgs),
    /// Edit an alias table
    Alias(AliasArgs),
    /// Generate a training catalog
    Generate(GenerateArgs),
    /// Summarise a training catalog
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Tab-separated table whose first column is the record text
    input: PathBuf,

    /// Records tokenized per batch
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Disable the tokenization progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct TokenizeArgs {
    #[command(flatten)]
    load: LoadArgs,

    /// Emit JSON lines instead of human-readable output
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct WordsArgs {
    #[command(flatten)]
    load: LoadArgs,

    /// Alias table applied before listing
    #[arg(long, value_name = "PATH")]
    aliases: Option<PathBuf>,

    /// Only list the N most frequent words
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct AliasArgs {
    #[command(flatten)]
    load: LoadArgs,

    /// Alias table to start from
    #[arg(long, value_name = "PATH")]
    aliases: Option<PathBuf>,

    /// Label of a new alias grouping the --word arguments
    #[arg(long, value_name = "LABEL", requires = "words")]
    merge: Option<String>,

    /// Word to group (repeat flag)
    #[arg(long = "word", value_name = "WORD")]
    words: Vec<String>,

    /// Detach a word from its alias (repeat flag)
    #[arg(long = "split", value_name = "WORD")]
    split: Vec<String>,

    /// Disable the alias containing a word, or the alias with this id (repeat flag)
    #[arg(long = "disable", value_name = "WORD")]
    disable: Vec<String>,

    /// Flag the alias containing a word, or the alias with this id, as primary (repeat flag)
    #[arg(long = "primary", value_name = "WORD")]
    primary: Vec<String>,

    /// Output path for the alias table
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_ALIASES)]
    output: PathBuf,

    /// Emit pretty JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    load: LoadArgs,

    /// Alias table applied before generation
    #[arg(long, value_name = "PATH")]
    aliases: Option<PathBuf>,

    /// Flag a word (or its alias) as primary (repeat flag)
    #[arg(long = "primary", value_name = "WORD")]
    primary: Vec<String>,

    /// Flag every word and alias as primary
    #[arg(long)]
    all_primary: bool,

    /// Maximum distinct tokens enumerated per record
    #[arg(long, value_name = "N")]
    max_tokens: Option<usize>,

    /// Abort instead of skipping records above --max-tokens
    #[arg(long)]
    fail_over_limit: bool,

    /// Output path for the training catalog
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CATALOG)]
    output: PathBuf,

    /// Emit pretty JSON
    #[arg(long)]
    pretty: bool,

    /// Limit Rayon worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Training catalog to inspect
    catalog: PathBuf,

    /// Emit JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Tokenize(args) => run_tokenize(args),
        Commands::Words(args) => run_words(args),
        Commands::Alias(args) => run_alias(args),
        Commands::Generate(args) => run_generate(args),
        Commands::Info(args) => run_info(args),
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

fn load_session(args: &LoadArgs, cfg: PipelineConfig) -> Result<Session> {
    let mut session = Session::new(cfg).context("invalid pipeline configuration")?;
    let records = triplo::record::load_records(&args.input, session.ingest_config())
        .with_context(|| format!("failed to read records from {}", args.input.display()))?;
    let total = records.len() as u64;

    let progress = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::with_template("{bar:40} {pos}/{len} records tokenized")
            .context("invalid progress template")?;
        pb.set_style(style);
        Some(pb)
    };

    let mut pass = session.begin_tokenization(records)?;
    while let Some(step) = pass.step()? {
        if let Some(pb) = &progress {
            pb.set_position(step.processed as u64);
        }
    }
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    session.install(pass.finish()?)?;
    Ok(session)
}

fn pipeline_config(args: &LoadArgs) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder().show_progress(!args.no_progress);
    if let Some(batch_size) = args.batch_size {
        builder = builder.batch_size(batch_size);
    }
    Ok(builder.build()?)
}

fn apply_aliases(session: &mut Session, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let snapshot = load_alias_snapshot(path)
        .with_context(|| format!("failed to load aliases from {}", path.display()))?;
    let report = session.apply_aliases(&snapshot);
    info!(
        "applied {} aliases covering {} words ({} warnings)",
        report.aliases,
        report.words,
        report.warnings.len()
    );
    Ok(())
}

fn word_ids(session: &Session, words: &[String]) -> Vec<WordId> {
    words
        .iter()
        .filter_map(|word| {
            let word = word.to_lowercase();
            let id = session.dictionary().word_id(&word);
            if id.is_none() {
                warn!("unknown word {word:?}");
            }
            id
        })
        .collect()
}

/// The alias named by `target`, either directly by id or through one of its member words.
fn alias_target(session: &Session, target: &str) -> Option<AliasId> {
    let direct = AliasId::new(target);
    if session.dictionary().alias(&direct).is_some() {
        return Some(direct);
    }
    session
        .dictionary()
        .alias_of(&target.to_lowercase())
        .map(|info| info.alias_id.clone())
}

fn run_tokenize(args: TokenizeArgs) -> Result<()> {
    let cfg = pipeline_config(&args.load)?;
    let session = load_session(&args.load, cfg)?;

    for (id, record) in session.records().iter().enumerate() {
        if args.json {
            let line = json!({
                "record": record.label(id),
                "group": record.group(),
                "tokens": record.tokens(),
                "words": record.words(),
            });
            println!("{}", serde_json::to_string(&line)?);
        } else {
            let words = record.words().join(" ");
            println!("{}\t{}", record.label(id), words);
        }
    }
    Ok(())
}

fn run_words(args: WordsArgs) -> Result<()> {
    let cfg = pipeline_config(&args.load)?;
    let mut session = load_session(&args.load, cfg)?;
    apply_aliases(&mut session, args.aliases.as_deref())?;

    let rows = session.dictionary().rows_by_count();
    let limit = args.top.unwrap_or(rows.len());
    let rows = &rows[..limit.min(rows.len())];

    if args.json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        for row in rows {
            let alias = row
                .alias_id
                .as_ref()
                .map_or_else(String::new, ToString::to_string);
            let flags = match (row.enabled, row.is_primary) {
                (true, true) => "primary",
                (true, false) => "",
                (false, _) => "disabled",
            };
            println!("{:>8}  {:<24} {:<10} {alias}", row.count, row.word, flags);
        }
    }
    Ok(())
}

fn run_alias(args: AliasArgs) -> Result<()> {
    let cfg = pipeline_config(&args.load)?;
    let mut session = load_session(&args.load, cfg)?;
    apply_aliases(&mut session, args.aliases.as_deref())?;

    if !args.split.is_empty() {
        let ids = word_ids(&session, &args.split);
        let detached = session.split_from_alias(&ids);
        info!("detached {detached} words from their aliases");
    }

    if let Some(label) = &args.merge {
        let ids = word_ids(&session, &args.words);
        match session.merge_into_alias(&ids, label) {
            Some(alias) => info!("created {alias}"),
            None => bail!("no eligible words to merge into {label:?}"),
        }
    }

    for target in &args.disable {
        match alias_target(&session, target) {
            Some(alias) => {
                session.set_alias_enabled(&alias, false);
            }
            None => warn!("{target:?} is not an alias or alias member; skipped"),
        }
    }
    for target in &args.primary {
        match alias_target(&session, target) {
            Some(alias) => {
                session.set_alias_primary(&alias, true);
            }
            None => warn!("{target:?} is not an alias or alias member; skipped"),
        }
    }

    let json = alias_snapshot_json(&session.export_aliases(), args.pretty)?;
    fs::write(&args.output, json)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        "wrote {} aliases to {}",
        session.dictionary().aliases().count(),
        args.output.display()
    );
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("unable to configure Rayon thread pool")?;
    }

    let mut cfg = pipeline_config(&args.load)?;
    if let Some(max_tokens) = args.max_tokens {
        cfg.max_subset_tokens = max_tokens;
    }
    if args.fail_over_limit {
        cfg.subset_limit_policy = SubsetLimitPolicy::Fail;
    }
    cfg.validate()?;

    let mut session = load_session(&args.load, cfg)?;
    apply_aliases(&mut session, args.aliases.as_deref())?;

    if args.all_primary {
        let words: Vec<WordId> = session.dictionary().rows().iter().map(|row| row.id).collect();
        let aliases: Vec<AliasId> = session
            .dictionary()
            .aliases()
            .map(|info| info.alias_id.clone())
            .collect();
        for id in words {
            session.set_primary(id, true);
        }
        for alias in &aliases {
            session.set_alias_primary(alias, true);
        }
    }
    for target in &args.primary {
        if let Some(alias) = alias_target(&session, target) {
            if session.dictionary().alias(&alias).is_some_and(|info| info.enabled) {
                session.set_alias_primary(&alias, true);
                continue;
            }
        }
        for id in word_ids(&session, std::slice::from_ref(target)) {
            session.set_primary(id, true);
        }
    }

    let sets = session
        .generate_training_sets()
        .context("training set generation failed")?
        .len();
    let json = catalog_snapshot_json(&session.export_training_sets(), args.pretty)?;
    fs::write(&args.output, json)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    if let Some(counters) = &session.metrics().generation {
        info!(
            "records: {} (without primary: {}, over limit: {})",
            counters.records, counters.records_without_primary, counters.records_over_limit
        );
        info!(
            "subsets: {} enumerated, {} kept, {} redundant",
            counters.candidate_subsets, counters.kept_subsets, counters.redundant_sets
        );
        if let Some(rss) = counters.rss_kb {
            info!("resident memory: {rss} kB");
        }
    }
    info!("wrote {sets} token sets to {}", args.output.display());
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<()> {
    let snapshot = load_catalog_snapshot(&args.catalog)
        .with_context(|| format!("failed to load {}", args.catalog.display()))?;

    let leaves = snapshot.values().filter(|entry| entry.is_leaf).count();
    let labelled = snapshot
        .values()
        .filter(|entry| !entry.query.is_empty())
        .count();
    let redundant: usize = snapshot
        .values()
        .map(|entry| entry.redundant_keys.len())
        .sum();
    let max_tokens = snapshot
        .values()
        .map(|entry| entry.tokens.len())
        .max()
        .unwrap_or(0);
    let aliases = snapshot
        .values()
        .flat_map(|entry| entry.tokens.iter())
        .filter(|token| matches!(token, Token::Alias(_)))
        .count();
    let summary = json!({
        "path": args.catalog.display().to_string(),
        "token_sets": snapshot.len(),
        "leaves": leaves,
        "labelled": labelled,
        "redundant_keys": redundant,
        "max_tokens": max_tokens,
        "alias_tokens": aliases,
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Token sets    : {}", snapshot.len());
        println!("Leaves        : {leaves}");
        println!("Labelled      : {labelled}");
        println!("Redundant keys: {redundant}");
        println!("Max tokens    : {max_tokens}");
        println!("Alias tokens  : {aliases}");
    }
    Ok(())
}
