use std::path::PathBuf;

use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::Serialize;
use structopt::StructOpt;
use tracing::{debug, error, info};

use arbiter::config::{OutputFormat, Tournament};
use arbiter::opening_book::OpeningBook;
use arbiter::output::{ConsoleOutput, JsonLinesOutput, TournamentOutput};
use arbiter::scheduler::Scheduler;
use arbiter::stats::PairStats;
use arbiter::stop::StopFlag;

/// CLI surface (spec §6): only the tournament config path is required to
/// run; everything else (engine list, time controls, SPRT, adjudication,
/// concurrency) lives in the config file per spec §9 ambient
/// "Configuration".
#[derive(Debug, StructOpt)]
#[structopt(name = "arbiter", about = "Engine-vs-engine tournament runner")]
struct Opt {
    /// Tournament configuration file (TOML)
    #[structopt(short, long, default_value = "tournament.toml")]
    config: PathBuf,
}

/// The JSON document persisted on completion (spec §6 "Persisted state").
#[derive(Serialize)]
struct Summary<'a> {
    config: &'a Tournament,
    stats: &'a [PairStats],
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();
    debug!(?opt, "arbiter started");

    let contents = std::fs::read_to_string(&opt.config)
        .wrap_err_with(|| format!("reading tournament config {}", opt.config.display()))?;
    let cfg: Tournament =
        toml::from_str(&contents).wrap_err("parsing tournament config")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("building async runtime")?;

    match runtime.block_on(run(cfg)) {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(%err, "tournament ended with an error");
            std::process::exit(1);
        }
    }
}

/// Loads the opening book, wires the signal handler into the global stop
/// flag, runs the tournament, and persists the summary (spec §6, §9
/// "Global stop flag"). Configuration errors have already propagated out
/// of `main` by the time this runs; only scheduler-level errors can
/// surface here (spec §7 "Propagation").
async fn run(cfg: Tournament) -> Result<()> {
    let book = match &cfg.book {
        Some(path) => OpeningBook::load(path)?,
        None => OpeningBook::empty(),
    };

    let stop = StopFlag::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing in-flight matches then stopping");
                stop.set();
            }
        });
    }

    let console_output = ConsoleOutput;
    let json_output = JsonLinesOutput;
    let output: &dyn TournamentOutput = match cfg.output_format {
        OutputFormat::Console => &console_output,
        OutputFormat::JsonLines => &json_output,
    };

    let scheduler = Scheduler::new(&cfg, book, output);
    let run_result = scheduler.run(&stop).await;

    let stats = scheduler.stats().snapshot_json();
    output.on_tournament_completed(&stats);
    write_summary(&cfg, &stats).await;

    run_result
}

/// Writes the tournament JSON summary to `cfg.output_path`, best-effort
/// on interrupt (spec §6 "Persisted state", §9 Open Question: the path
/// is configurable rather than the original's hardcoded `config.json`).
async fn write_summary(cfg: &Tournament, stats: &[PairStats]) {
    let summary = Summary { config: cfg, stats };
    let json = match serde_json::to_string_pretty(&summary) {
        Ok(json) => json,
        Err(err) => {
            error!(%err, "failed to serialize tournament summary");
            return;
        }
    };
    if let Err(err) = tokio::fs::write(&cfg.output_path, json).await {
        error!(%err, path = %cfg.output_path.display(), "failed to write tournament summary");
    }
}
