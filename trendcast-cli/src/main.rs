//! Trendcast CLI: fetch, stitch, transform, split and predict commands.
//!
//! Commands:
//! - `fetch`: fetch prices and the stitched trend into raw CSVs
//! - `stitch`: stitch a trend series alone and write it
//! - `transform`: raw CSVs to the processed (aligned) and windowed CSVs
//! - `split`: window the processed CSV, split it, print the shapes
//! - `predict`: build the inference row and print the baseline forecast
//!
//! Every command reads `--config <toml>` when given; command flags override it.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trendcast_core::data::{
    CircuitBreaker, CsvPriceSource, CsvTrendSource, DataSource, PriceSource,
    SyntheticPriceSource, SyntheticTrendSource, TrendSource, YahooPriceSource,
};
use trendcast_core::TrendStitcher;
use trendcast_runner::artifact::{
    read_prices, read_processed, read_trend, write_prices, write_processed, write_trend,
    write_windowed,
};
use trendcast_runner::{
    build_features, build_inference_row, build_training_set, fetch_raw, fetch_recent,
    Forecaster, PipelineConfig, RawData,
};

const PRICES_FILE: &str = "prices.csv";
const TREND_FILE: &str = "trend.csv";
const FEATURES_FILE: &str = "features.csv";
const WINDOWED_FILE: &str = "windowed.csv";

#[derive(Parser)]
#[command(
    name = "trendcast",
    about = "Trendcast CLI: price and search-interest pipeline for next-day forecasts"
)]
struct Cli {
    /// Path to a TOML pipeline config. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch prices and the stitched trend series into raw CSVs.
    Fetch {
        /// Price source: yahoo, synthetic or csv:<path>.
        #[arg(long, default_value = "yahoo")]
        price_source: String,

        /// Trend source: synthetic or csv:<path>.
        #[arg(long, default_value = "synthetic")]
        trend_source: String,

        /// Re-normalise every replayed trend query to a maximum of 100.
        #[arg(long, default_value_t = false)]
        renormalize: bool,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        to: Option<String>,

        /// Price symbol.
        #[arg(long)]
        symbol: Option<String>,

        /// Trend keyword; repeat for up to five.
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Directory for the raw CSVs.
        #[arg(long)]
        raw_dir: Option<PathBuf>,
    },
    /// Stitch one trend series and write it to a CSV.
    Stitch {
        /// Keywords to stitch (up to five).
        #[arg(required = true)]
        keywords: Vec<String>,

        /// Trend source: synthetic or csv:<path>.
        #[arg(long, default_value = "synthetic")]
        trend_source: String,

        /// Re-normalise every replayed trend query to a maximum of 100.
        #[arg(long, default_value_t = false)]
        renormalize: bool,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        to: Option<String>,

        /// Days per sub-window query.
        #[arg(long)]
        trdays: Option<u32>,

        /// Days shared by consecutive sub-windows.
        #[arg(long)]
        overlap: Option<u32>,

        /// Query oldest-first.
        #[arg(long, default_value_t = false)]
        forward: bool,

        /// Keep the is_partial column.
        #[arg(long, default_value_t = false)]
        keep_partial: bool,

        /// Skip the final rescale to a maximum of 100.
        #[arg(long, default_value_t = false)]
        no_scale: bool,

        /// Output CSV.
        #[arg(long, default_value = "trend.csv")]
        output: PathBuf,
    },
    /// Align the raw CSVs and write the processed and windowed CSVs.
    Transform {
        #[arg(long)]
        raw_dir: Option<PathBuf>,

        #[arg(long)]
        processed_dir: Option<PathBuf>,

        /// Trend column to align with prices.
        #[arg(long)]
        keyword: Option<String>,

        #[arg(long)]
        look_back: Option<usize>,
    },
    /// Window the processed CSV, split it and print the shapes.
    Split {
        #[arg(long)]
        processed_dir: Option<PathBuf>,

        #[arg(long)]
        look_back: Option<usize>,

        /// Fraction of rows used for training.
        #[arg(long)]
        ratio: Option<f64>,
    },
    /// Print the baseline forecast for the day after the latest aligned date.
    Predict {
        /// Fetch recent data from this price source instead of reading raw CSVs.
        #[arg(long)]
        price_source: Option<String>,

        /// Trend source for the recent fetch.
        #[arg(long, default_value = "synthetic")]
        trend_source: String,

        #[arg(long)]
        raw_dir: Option<PathBuf>,

        #[arg(long)]
        processed_dir: Option<PathBuf>,

        #[arg(long)]
        look_back: Option<usize>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch {
            price_source,
            trend_source,
            renormalize,
            from,
            to,
            symbol,
            keywords,
            raw_dir,
        } => {
            let mut config = config;
            override_range(&mut config, from, to);
            if let Some(symbol) = symbol {
                config.data.symbol = symbol;
            }
            if !keywords.is_empty() {
                config.data.keywords = keywords;
                config.data.target_keyword = None;
            }
            if let Some(dir) = raw_dir {
                config.data.raw_dir = dir;
            }
            config.validate()?;
            run_fetch(&config, &price_source, &trend_source, renormalize)
        }
        Commands::Stitch {
            keywords,
            trend_source,
            renormalize,
            from,
            to,
            trdays,
            overlap,
            forward,
            keep_partial,
            no_scale,
            output,
        } => {
            let mut config = config;
            override_range(&mut config, from, to);
            config.data.keywords = keywords;
            config.data.target_keyword = None;
            if let Some(trdays) = trdays {
                config.trend.trdays = trdays;
            }
            if let Some(overlap) = overlap {
                config.trend.overlap = overlap;
            }
            config.trend.stitch_forward |= forward;
            config.trend.keep_partial |= keep_partial;
            config.trend.scale &= !no_scale;
            config.validate()?;
            run_stitch(&config, &trend_source, renormalize, &output)
        }
        Commands::Transform {
            raw_dir,
            processed_dir,
            keyword,
            look_back,
        } => {
            let mut config = config;
            if let Some(dir) = raw_dir {
                config.data.raw_dir = dir;
            }
            if let Some(dir) = processed_dir {
                config.data.processed_dir = dir;
            }
            if let Some(look_back) = look_back {
                config.features.look_back = look_back;
            }
            config.validate()?;
            run_transform(&config, keyword)
        }
        Commands::Split {
            processed_dir,
            look_back,
            ratio,
        } => {
            let mut config = config;
            if let Some(dir) = processed_dir {
                config.data.processed_dir = dir;
            }
            if let Some(look_back) = look_back {
                config.features.look_back = look_back;
            }
            if let Some(ratio) = ratio {
                config.features.split_ratio = ratio;
            }
            config.validate()?;
            run_split(&config)
        }
        Commands::Predict {
            price_source,
            trend_source,
            raw_dir,
            processed_dir,
            look_back,
        } => {
            let mut config = config;
            if let Some(dir) = raw_dir {
                config.data.raw_dir = dir;
            }
            if let Some(dir) = processed_dir {
                config.data.processed_dir = dir;
            }
            if let Some(look_back) = look_back {
                config.features.look_back = look_back;
            }
            config.validate()?;
            run_predict(&config, price_source.as_deref(), &trend_source)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn override_range(config: &mut PipelineConfig, from: Option<String>, to: Option<String>) {
    if let Some(from) = from {
        config.data.from_date = from;
    }
    if to.is_some() {
        config.data.to_date = to;
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// `yahoo`, `synthetic` or `csv:<path>`.
fn parse_source_spec(spec: &str) -> Result<(DataSource, Option<PathBuf>)> {
    match spec {
        "yahoo" => Ok((DataSource::YahooFinance, None)),
        "synthetic" => Ok((DataSource::Synthetic, None)),
        _ => match spec.strip_prefix("csv:") {
            Some(path) if !path.is_empty() => Ok((DataSource::CsvReplay, Some(PathBuf::from(path)))),
            _ => bail!("unknown source '{spec}'. Valid: yahoo, synthetic, csv:<path>"),
        },
    }
}

fn open_price_source(spec: &str, symbol: &str) -> Result<Box<dyn PriceSource>> {
    let source: Box<dyn PriceSource> = match parse_source_spec(spec)? {
        (DataSource::YahooFinance, _) => {
            let breaker = Arc::new(CircuitBreaker::default_provider());
            Box::new(YahooPriceSource::new(symbol, breaker)?)
        }
        (DataSource::Synthetic, _) => Box::new(SyntheticPriceSource::new(symbol)),
        (DataSource::CsvReplay, Some(path)) => Box::new(
            CsvPriceSource::from_path(&path)
                .with_context(|| format!("reading price file {}", path.display()))?,
        ),
        (DataSource::CsvReplay, None) => bail!("csv price source needs a path"),
    };
    Ok(source)
}

fn open_trend_source(spec: &str, renormalize: bool) -> Result<Box<dyn TrendSource>> {
    let source: Box<dyn TrendSource> = match parse_source_spec(spec)? {
        (DataSource::YahooFinance, _) => {
            bail!("yahoo only serves prices. Valid trend sources: synthetic, csv:<path>")
        }
        (DataSource::Synthetic, _) => Box::new(SyntheticTrendSource::new()),
        (DataSource::CsvReplay, Some(path)) => Box::new(
            CsvTrendSource::from_path(&path)
                .with_context(|| format!("reading trend file {}", path.display()))?
                .normalize_per_query(renormalize),
        ),
        (DataSource::CsvReplay, None) => bail!("csv trend source needs a path"),
    };
    Ok(source)
}

fn run_fetch(config: &PipelineConfig, price_spec: &str, trend_spec: &str, renormalize: bool) -> Result<()> {
    let prices = open_price_source(price_spec, &config.data.symbol)?;
    let trend = open_trend_source(trend_spec, renormalize)?;
    let raw = fetch_raw(config, prices.as_ref(), trend.as_ref(), today())?;

    let dir = &config.data.raw_dir;
    write_prices(&dir.join(PRICES_FILE), &raw.prices)?;
    write_trend(&dir.join(TREND_FILE), &raw.trend)?;

    println!("Range:        {} to {}", raw.from, raw.to);
    println!("Price bars:   {} ({})", raw.prices.len(), prices.name());
    println!("Trend rows:   {} ({})", raw.trend.len(), trend.name());
    println!("Raw CSVs in:  {}", dir.display());
    Ok(())
}

fn run_stitch(config: &PipelineConfig, trend_spec: &str, renormalize: bool, output: &Path) -> Result<()> {
    let trend = open_trend_source(trend_spec, renormalize)?;
    let from = config.from_date()?;
    let to = config.to_date_or(today())?;

    let stitcher = TrendStitcher::new(trend.as_ref(), config.stitch_options());
    let frame = stitcher.stitch(&config.data.keywords, from, to)?;
    write_trend(output, &frame)?;

    println!("Stitched {} rows of {:?} into {}", frame.len(), frame.keywords, output.display());
    Ok(())
}

fn load_raw(dir: &Path) -> Result<RawData> {
    let prices_path = dir.join(PRICES_FILE);
    let trend_path = dir.join(TREND_FILE);
    let prices = read_prices(&prices_path)
        .with_context(|| format!("reading {}", prices_path.display()))?;
    let trend = read_trend(&trend_path)
        .with_context(|| format!("reading {}", trend_path.display()))?;

    let dates = prices.iter().map(|b| b.date);
    let (Some(from), Some(to)) = (dates.clone().min(), dates.max()) else {
        bail!("{} has no rows", prices_path.display());
    };
    Ok(RawData {
        from,
        to,
        prices,
        trend,
    })
}

fn run_transform(config: &PipelineConfig, keyword: Option<String>) -> Result<()> {
    let raw = load_raw(&config.data.raw_dir)?;
    let keyword = keyword.unwrap_or_else(|| config.target_keyword().to_string());
    let aligned = build_features(&raw, &keyword)?;

    let dir = &config.data.processed_dir;
    write_processed(&dir.join(FEATURES_FILE), &aligned)?;

    let f = &config.features;
    let training = build_training_set(&aligned, f.look_back, f.n_out, f.split_ratio)?;
    write_windowed(&dir.join(WINDOWED_FILE), &training.table, &training.dates)?;

    println!("Aligned rows:   {}", aligned.len());
    println!(
        "Windowed:       {} rows x {} columns",
        training.table.n_rows(),
        training.table.n_cols()
    );
    println!("Processed CSVs: {}", dir.display());
    Ok(())
}

fn run_split(config: &PipelineConfig) -> Result<()> {
    let path = config.data.processed_dir.join(FEATURES_FILE);
    let aligned = read_processed(&path).with_context(|| format!("reading {}", path.display()))?;
    let f = &config.features;
    let training = build_training_set(&aligned, f.look_back, f.n_out, f.split_ratio)?;
    let split = &training.split;

    println!("Ratio:    {}", f.split_ratio);
    println!("x_train:  {} x {}", split.n_train(), split.n_features);
    println!("y_train:  {}", split.y_train.len());
    println!("x_test:   {} x {}", split.n_test(), split.n_features);
    println!("y_test:   {}", split.y_test.len());
    let dates = training.row_dates();
    if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
        println!("Rows:     {first} to {last}");
    }
    Ok(())
}

fn run_predict(config: &PipelineConfig, price_spec: Option<&str>, trend_spec: &str) -> Result<()> {
    let f = &config.features;
    if f.n_out != 1 {
        bail!("predict needs features.n_out = 1, got {}", f.n_out);
    }

    let features_path = config.data.processed_dir.join(FEATURES_FILE);
    let history = read_processed(&features_path)
        .with_context(|| format!("reading {}", features_path.display()))?;
    let training = build_training_set(&history, f.look_back, f.n_out, f.split_ratio)?;
    let forecaster = Forecaster::persistence_baseline(&training.split)?;

    let raw = match price_spec {
        Some(spec) => {
            let prices = open_price_source(spec, &config.data.symbol)?;
            let trend = open_trend_source(trend_spec, false)?;
            fetch_recent(config, prices.as_ref(), trend.as_ref(), today())?
        }
        None => load_raw(&config.data.raw_dir)?,
    };
    let aligned = build_features(&raw, config.target_keyword())?;
    let row = build_inference_row(&aligned, f.look_back)?;

    let Some(last_close) = raw.prices.iter().find(|b| b.date == row.date).map(|b| b.close) else {
        bail!("no close price on {}", row.date);
    };
    let log_return = forecaster.predict_log_return(&row.features)?;
    let close = forecaster.predict_close(last_close, &row.features)?;

    println!();
    println!("=== Forecast ===");
    println!("Symbol:       {}", config.data.symbol);
    println!("Model:        {}", forecaster.model_name());
    println!("As of:        {}", row.date);
    println!("Last close:   {last_close:.2}");
    println!("Log return:   {log_return:+.6}");
    println!("Next close:   {close:.2}");
    println!();
    Ok(())
}
