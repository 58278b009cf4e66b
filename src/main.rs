//! rusket-mf CLI: batch gradient-descent matrix factorization.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;
use rusket_mf::{
    Config, DataConfig, FactorizationModel, FileBackend, Init, ParameterStore, Parameters,
    RatingData, StorageConfig, TrainConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "rusket-mf")]
#[command(about = "Train a latent-factor recommender with batch gradient descent")]
#[command(version)]
struct Cli {
    /// TOML configuration file (flags override its values)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `rusket_mf=trace` (defaults to RUST_LOG, then `info`)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, persist the parameters, print elapsed time and final cost
    Train {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        storage: StorageArgs,
        #[command(flatten)]
        train: TrainArgs,
    },

    /// Delete persisted parameters
    Reset {
        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Print the cost of the persisted parameters without training
    Cost {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        storage: StorageArgs,
        /// Feature count; read from the persisted vectors when omitted
        #[arg(short = 'k', long)]
        features: Option<usize>,
        /// Regularization strength
        #[arg(long)]
        lambda: Option<f32>,
    },

    /// Predict one rating from persisted parameters
    Predict {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        storage: StorageArgs,
        /// Feature count; read from the persisted vectors when omitted
        #[arg(short = 'k', long)]
        features: Option<usize>,
        /// User row (0-based)
        #[arg(long)]
        user: usize,
        /// Item column (0-based)
        #[arg(long)]
        item: usize,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Ratings file (Y)
    #[arg(long)]
    ratings: Option<PathBuf>,

    /// Observation mask file (R)
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Values per record; records may span lines
    #[arg(long, conflicts_with = "line_records")]
    width: Option<usize>,

    /// Treat every line as one record
    #[arg(long)]
    line_records: bool,
}

impl DataArgs {
    fn apply(self, data: &mut DataConfig) {
        if let Some(p) = self.ratings {
            data.ratings = p;
        }
        if let Some(p) = self.mask {
            data.mask = p;
        }
        if self.line_records {
            data.width = None;
        } else if let Some(w) = self.width {
            data.width = Some(w);
        }
    }
}

#[derive(Args)]
struct StorageArgs {
    /// Directory holding w.param, x.param and b.param
    #[arg(long)]
    params_dir: Option<PathBuf>,
}

impl StorageArgs {
    fn apply(self, storage: &mut StorageConfig) {
        if let Some(dir) = self.params_dir {
            storage.dir = dir;
        }
    }
}

#[derive(Args)]
struct TrainArgs {
    /// Feature count k (including the pinned bias coordinate)
    #[arg(short = 'k', long)]
    features: Option<usize>,

    /// Maximum number of iterations
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Regularization strength
    #[arg(long)]
    lambda: Option<f32>,

    /// Fixed gradient step size
    #[arg(long)]
    learning_rate: Option<f32>,

    /// Stop once |cost| falls below this value
    #[arg(long)]
    tolerance: Option<f64>,

    /// Ignore persisted parameters and start from the initial values
    #[arg(long)]
    fresh: bool,

    /// Uniform random init in [-scale, scale] instead of zeros
    #[arg(long)]
    init_scale: Option<f32>,

    /// Seed for --init-scale
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Print a per-iteration table
    #[arg(short, long)]
    verbose: bool,
}

impl TrainArgs {
    fn apply(self, train: &mut TrainConfig) {
        if let Some(k) = self.features {
            train.features = k;
        }
        if let Some(n) = self.iterations {
            train.max_iterations = n;
        }
        if let Some(l) = self.lambda {
            train.lambda = l;
        }
        if let Some(lr) = self.learning_rate {
            train.learning_rate = lr;
        }
        if let Some(t) = self.tolerance {
            train.tolerance = t;
        }
        if self.fresh {
            train.resume = false;
        }
        if self.init_scale.is_some() {
            train.init = Init::from_scale(self.init_scale, self.seed);
        }
        train.verbose |= self.verbose;
    }
}

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(l) => EnvFilter::try_new(l).with_context(|| format!("invalid log filter {l:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Train {
            data,
            storage,
            train,
        } => {
            data.apply(&mut config.data);
            storage.apply(&mut config.storage);
            train.apply(&mut config.train);
            cmd_train(&config)
        }
        Commands::Reset { storage } => {
            storage.apply(&mut config.storage);
            cmd_reset(&config)
        }
        Commands::Cost {
            data,
            storage,
            features,
            lambda,
        } => {
            data.apply(&mut config.data);
            storage.apply(&mut config.storage);
            config.train.features = match features {
                Some(k) => k,
                None => persisted_features(&config)?.unwrap_or(config.train.features),
            };
            if let Some(l) = lambda {
                config.train.lambda = l;
            }
            cmd_cost(&config)
        }
        Commands::Predict {
            data,
            storage,
            features,
            user,
            item,
        } => {
            data.apply(&mut config.data);
            storage.apply(&mut config.storage);
            config.train.features = match features {
                Some(k) => k,
                None => persisted_features(&config)?.unwrap_or(config.train.features),
            };
            cmd_predict(&config, user, item)
        }
    }
}

fn build_model(config: &Config) -> anyhow::Result<FactorizationModel> {
    let data = RatingData::load(&config.data).context("failed to load rating data")?;
    let backend = FileBackend::new(&config.storage.dir);
    let model = FactorizationModel::new(data, config.train.clone(), Box::new(backend))?;
    Ok(model)
}

/// Feature count of the persisted parameters, if any were saved.
fn persisted_features(config: &Config) -> anyhow::Result<Option<usize>> {
    let backend = FileBackend::new(&config.storage.dir);
    let store = ParameterStore::new(Parameters::zeros(0, 0, 0), Box::new(backend));
    let saved = store
        .read()
        .with_context(|| format!("failed to read parameters from {}", config.storage.dir.display()))?;
    Ok(saved.map(|p| p.features()))
}

/// Load the persisted state into `model`, warning when there is none.
fn resume(model: &mut FactorizationModel, config: &Config) -> anyhow::Result<()> {
    let found = model
        .load()
        .with_context(|| format!("failed to load parameters from {}", config.storage.dir.display()))?;
    if !found {
        warn!(
            dir = %config.storage.dir.display(),
            "no persisted parameters, using initial values"
        );
    }
    Ok(())
}

fn cmd_train(config: &Config) -> anyhow::Result<()> {
    let mut model = build_model(config)?;
    let report = model.train().context("training failed")?;
    info!(
        iterations = report.iterations,
        stop = ?report.stop,
        resumed = report.resumed,
        "done"
    );
    println!("{}", report.elapsed_hms());
    println!("{}", report.final_cost);
    Ok(())
}

fn cmd_reset(config: &Config) -> anyhow::Result<()> {
    let backend = FileBackend::new(&config.storage.dir);
    let mut store = ParameterStore::new(Parameters::zeros(0, 0, 0), Box::new(backend));
    store.reset()?;
    Ok(())
}

fn cmd_cost(config: &Config) -> anyhow::Result<()> {
    let mut model = build_model(config)?;
    resume(&mut model, config)?;
    println!("{}", model.cost());
    Ok(())
}

fn cmd_predict(config: &Config, user: usize, item: usize) -> anyhow::Result<()> {
    let mut model = build_model(config)?;
    let (n_users, n_items) = (model.data().n_users(), model.data().n_items());
    if user >= n_users {
        bail!("user {user} out of range (0..{n_users})");
    }
    if item >= n_items {
        bail!("item {item} out of range (0..{n_items})");
    }
    resume(&mut model, config)?;
    println!("{}", model.predict(user, item));
    Ok(())
}
