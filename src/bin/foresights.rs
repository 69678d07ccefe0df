//! Terminal front end: watch the live sensor stream, inspect or mark the
//! practice streak, and ask for a coaching comment.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::trace;
use thiserror::Error;

use foresights::coach::CoachingState;
use foresights::streak::{Clock, DayStatus};
use foresights::{
    ClientConfig, CoachError, CoachingDesk, ConfigError, Dashboard, HttpCoach, Inbound, Session,
    SessionError, Store, StoreError, StreakLedger,
};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Coach(#[from] CoachError),
    #[error("no coaching response within {0:?}")]
    CoachTimeout(Duration),
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Config file (default: <config dir>/foresights/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the sensor backend and print each snapshot.
    Watch {
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Per-receive timeout in milliseconds.
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Stop after this many snapshots.
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Request a coaching comment when a new reading arrives and no
        /// request is in flight.
        #[arg(long)]
        coach: bool,
    },
    /// Show the last seven days and the current streak.
    Streak,
    /// Record today's simulator launch.
    Launch,
    /// Ask for a coaching comment for one swing.
    Coach {
        /// Club-head speed (m/s).
        #[arg(short, long)]
        speed: f64,

        /// Launch angle (deg).
        #[arg(short, long, allow_negative_numbers = true)]
        angle: f64,

        #[arg(short, long)]
        endpoint: Option<String>,
    },
    /// Print the effective configuration, optionally writing it back.
    Config {
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    colog::init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = ClientConfig::load(args.config.as_deref())?;
    match args.command {
        Commands::Watch { endpoint, timeout_ms, count, coach } => {
            let mut config = config;
            if let Some(endpoint) = endpoint {
                config.telemetry_endpoint = endpoint;
            }
            if let Some(ms) = timeout_ms {
                config.recv_timeout_ms = ms;
            }
            watch(&config, count, coach)
        }
        Commands::Streak => streak(&config),
        Commands::Launch => launch(&config),
        Commands::Coach { speed, angle, endpoint } => {
            let mut config = config;
            if let Some(endpoint) = endpoint {
                config.coaching_endpoint = endpoint;
            }
            coach_once(&config, speed, angle)
        }
        Commands::Config { save } => {
            if save {
                let path = config.save(args.config.as_deref())?;
                println!("wrote {}", path.display());
            }
            match serde_json::to_string_pretty(&config) {
                Ok(text) => println!("{text}"),
                Err(e) => return Err(ConfigError::Encode(e).into()),
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn watch(config: &ClientConfig, count: Option<u64>, coach: bool) -> Result<(), CliError> {
    let ledger = StreakLedger::load(config.ledger_store()?);
    let mut desk = coaching_desk(config)?;

    println!("Connecting to {}...", config.telemetry_endpoint);
    let mut session = Session::open_timeout(&config.telemetry_endpoint, config.recv_timeout())?;
    println!("Connected.");

    session.set_on_message(|msg| match msg {
        Inbound::Text(text) => trace!("<< text ({} bytes)", text.len()),
        Inbound::Binary(data) => trace!("<< binary ({} bytes)", data.len()),
    });

    let mut received = 0u64;
    let mut last_coached = None;
    loop {
        let fault = match session.recv_timeout(config.recv_timeout()) {
            Ok(_) => {
                received += 1;
                None
            }
            Err(e) if !e.is_terminal() => Some(e),
            Err(e) => return Err(e.into()),
        };
        if let Some(e) = fault {
            eprintln!("... {e}");
            // A coaching result may land while the stream is idle.
            if desk.is_loading() && !desk.poll().is_loading() {
                println!("\n{}", Dashboard::collect(session.latest(), &ledger, desk.state()));
            }
            continue;
        }
        let Some(snapshot) = session.latest() else {
            continue;
        };

        if coach
            && let (Some(speed), Some(angle)) = (snapshot.speed, snapshot.launch_angle)
            && last_coached != Some((speed, angle))
            && desk.request_if_idle(speed, angle).is_some()
        {
            last_coached = Some((speed, angle));
        }
        let state = desk.poll();

        println!("\n{}", Dashboard::collect(Some(snapshot), &ledger, state));
        if count.is_some_and(|n| received >= n) {
            break;
        }
    }
    session.close();
    Ok(())
}

fn streak(config: &ClientConfig) -> Result<(), CliError> {
    let ledger = StreakLedger::load(config.ledger_store()?);
    print_week(&ledger);
    Ok(())
}

fn launch(config: &ClientConfig) -> Result<(), CliError> {
    let mut ledger = StreakLedger::load(config.ledger_store()?);
    ledger.mark_today()?;
    println!("Marked {} completed.", ledger.today());
    print_week(&ledger);
    Ok(())
}

fn coach_once(config: &ClientConfig, speed: f64, angle: f64) -> Result<(), CliError> {
    let mut desk = coaching_desk(config)?;
    let token = desk.next_token();
    desk.request(speed, angle, token);

    // The transport times out on its own; allow a little slack past it.
    let limit = config.coaching_timeout() + Duration::from_secs(1);
    desk.wait(limit);
    match desk.into_state() {
        CoachingState::Ready { text, .. } => {
            println!("{text}");
            Ok(())
        }
        CoachingState::Failed { error, .. } => Err(error.into()),
        CoachingState::Loading { .. } | CoachingState::Idle => Err(CliError::CoachTimeout(limit)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn coaching_desk(config: &ClientConfig) -> Result<CoachingDesk, CliError> {
    let transport = HttpCoach::new(&config.coaching_endpoint, config.coaching_timeout())?;
    Ok(CoachingDesk::new(transport).with_strip_quotes(config.strip_quotes))
}

fn print_week<S: Store, C: Clock>(ledger: &StreakLedger<S, C>) {
    for day in ledger.week() {
        let mark = match day.status {
            DayStatus::Completed => "done",
            DayStatus::Active => "today",
            DayStatus::Inactive => "",
        };
        println!("  {} {}  {mark}", day.label, day.date);
    }
    println!("Current streak: {} day(s)", ledger.current_streak());
}
