//! CLI parser and dispatch.

mod lookup;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tokio_util::sync::CancellationToken;

use metafetch::challenge::DEFAULT_DIFFICULTY;
use metafetch::{LiveSettings, Settings};

#[derive(Parser)]
#[command(name = "metafetch")]
#[command(about = "Rate-limited, challenge-aware Douban metadata lookups")]
#[command(version)]
pub struct Cli {
    /// Config file path (discovered as `metafetch.toml` when omitted)
    #[arg(short, long, global = true, env = "METAFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Douban cookie string, `k1=v1; k2=v2` (overrides config)
    #[arg(long, global = true)]
    cookies: Option<String>,

    /// Use the light request budget even without cookies
    #[arg(long, global = true)]
    no_anti_block: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Search movies and series by keyword
    Search {
        /// Search keyword
        keyword: String,
    },

    /// Show subject detail
    Subject {
        /// Douban subject ID
        sid: String,
    },

    /// List directors and cast of a subject
    Celebrities {
        /// Douban subject ID
        sid: String,
    },

    /// Show person detail
    Celebrity {
        /// Douban celebrity ID
        id: String,
    },

    /// Search people by keyword
    SearchCelebrity {
        /// Search keyword
        keyword: String,
    },

    /// List wallpaper photos of a subject
    Photos {
        /// Douban subject ID
        sid: String,
    },

    /// Solve a proof-of-work challenge offline
    Solve {
        /// Challenge seed
        seed: String,
        /// Required leading zero hex digits
        #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: u32,
    },

    /// Print the effective configuration
    Config,
}

/// Command-line values that win over the config file, including after reloads.
struct Overrides {
    cookies: Option<String>,
    no_anti_block: bool,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(cookies) = &self.cookies {
            settings.douban.cookies = cookies.clone();
        }
        if self.no_anti_block {
            settings.douban.anti_block = false;
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = Settings::locate(cli.config.as_deref()).await;
    let mut settings = Settings::load(path.as_deref())?;
    let overrides = Overrides {
        cookies: cli.cookies,
        no_anti_block: cli.no_anti_block,
    };
    overrides.apply(&mut settings);
    let settings = LiveSettings::new(settings);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Interrupted, cancelling", style("!").yellow());
            on_interrupt.cancel();
        }
    });

    // Only a discovered file is the one `prefer` watches.
    if let (None, Some(path)) = (&cli.config, path) {
        let live = settings.clone();
        let stop = cancel.clone();
        tokio::spawn(async move {
            live.watch(path, stop, move |s| overrides.apply(s)).await;
        });
    }

    match cli.command {
        Commands::Search { keyword } => lookup::cmd_search(&settings, &keyword, &cancel).await,
        Commands::Subject { sid } => lookup::cmd_subject(&settings, &sid, &cancel).await,
        Commands::Celebrities { sid } => lookup::cmd_celebrities(&settings, &sid, &cancel).await,
        Commands::Celebrity { id } => lookup::cmd_celebrity(&settings, &id, &cancel).await,
        Commands::SearchCelebrity { keyword } => {
            lookup::cmd_search_celebrity(&settings, &keyword, &cancel).await
        }
        Commands::Photos { sid } => lookup::cmd_photos(&settings, &sid, &cancel).await,
        Commands::Solve { seed, difficulty } => lookup::cmd_solve(&seed, difficulty, &cancel).await,
        Commands::Config => lookup::cmd_config(&settings),
    }
}
