use std::{error::Error, process, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};
use url::Url;

use playheat::{
    aggregate::Bucketing,
    config::{self, Config, Settings},
    credential::{FileStore, RedirectUrl},
    heatmap, http,
    session::{Options, Outcome, Session},
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Args {
    /// Settings file
    ///
    /// Optional TOML file overriding the client id, redirect URI, scope,
    /// start date and UTC offset.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("playheat.toml"))]
    settings: String,

    /// Credentials file
    ///
    /// Ensure that this file is kept secure and not shared publicly, as it
    /// contains a token that grants access to your listening history.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("credentials.toml"))]
    credentials: String,

    /// Address the login page redirected you to
    ///
    /// The access token is taken from its fragment and stored in the
    /// credentials file.
    #[arg(short, long, value_name = "URL", value_hint = ValueHint::Url)]
    redirect_url: Option<Url>,

    /// Bucket the trailing 24 hours by hour of day instead of by date
    #[arg(long, default_value_t = false)]
    hourly: bool,

    /// Page through the whole trailing day in hourly mode
    ///
    /// By default only the 50 most recent plays are considered, which
    /// undercounts busy days.
    #[arg(long, default_value_t = false, requires = "hourly")]
    full_history: bool,

    /// First day of the daily heatmap (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    since: Option<String>,

    /// UTC offset to bucket in, e.g. "+02:00", or "local"
    #[arg(long, value_name = "OFFSET", allow_hyphen_values = true)]
    utc_offset: Option<String>,

    /// Print the tooltip of every cell below the heatmap
    #[arg(short, long, default_value_t = false)]
    details: bool,

    /// Refresh the heatmap every SECONDS until interrupted
    #[arg(short, long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(30..))]
    watch: Option<u64>,

    /// Forget the stored credential and exit
    #[arg(long, default_value_t = false)]
    logout: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive, and `verbose` is 0 by
            // default. So this arm means: quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Builds the configuration from the settings file and the command line.
fn load_config(args: &Args) -> playheat::error::Result<Config> {
    let mut config = Config::new();
    config.apply(Settings::load(&args.settings)?)?;

    if let Some(ref since) = args.since {
        config.since = config::parse_date(since)?;
    }
    if let Some(ref offset) = args.utc_offset {
        config.utc_offset = config::parse_offset(offset)?;
    }

    Ok(config)
}

/// Runs one cycle and prints its outcome.
///
/// Returns `false` when the user has to log in first.
async fn cycle(
    session: &mut Session<FileStore, http::Client>,
    location: &mut RedirectUrl,
    details: bool,
) -> playheat::error::Result<bool> {
    match session.run(location).await? {
        Outcome::Unauthenticated { authorize_url } => {
            info!("open the address below to log in, then pass the address you were redirected to with --redirect-url");
            println!("{authorize_url}");
            Ok(false)
        }
        Outcome::Heatmap(units) => {
            print!("{}", heatmap::render(&units));
            if details {
                println!();
                for unit in &units {
                    println!("{}", unit.tooltip);
                }
            }
            Ok(true)
        }
    }
}

/// Main application loop.
///
/// Runs a single cycle, or with `--watch` keeps refreshing until interrupted
/// or until the credential is rejected.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;

    let options = Options {
        bucketing: if args.hourly {
            Bucketing::Hourly
        } else {
            Bucketing::Daily
        },
        full_history: args.full_history,
    };

    let store = FileStore::new(&args.credentials);
    let transport = http::Client::new(&config)?;
    let mut session = Session::new(config, options, store, transport);

    if args.logout {
        session.logout()?;
        return Ok(());
    }

    let mut location = args
        .redirect_url
        .map_or_else(RedirectUrl::none, RedirectUrl::new);

    let Some(interval) = args.watch.map(Duration::from_secs) else {
        cycle(&mut session, &mut location, args.details).await?;
        return Ok(());
    };

    // The first cycle happens immediately.
    let refresh_timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(refresh_timer);

    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down gracefully");
                break Ok(());
            }

            result = cycle(&mut session, &mut location, args.details), if refresh_timer.is_elapsed() => {
                match result {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => error!("{e}"),
                }

                info!("refreshing in {}s", interval.as_secs());
                refresh_timer.as_mut().reset(tokio::time::Instant::now() + interval);
            }

            () = &mut refresh_timer, if !refresh_timer.is_elapsed() => {}
        }
    }
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    debug!("Command {args:#?}");

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
