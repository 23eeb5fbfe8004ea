use playtrack::config::TrackerConfig;
use playtrack::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Sync,
    Quick,
    SessionsOnly,
    Stats,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Sync;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--quick" => mode = CliMode::Quick,
            "--sessions-only" => mode = CliMode::SessionsOnly,
            "--stats" => mode = CliMode::Stats,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: playtrack [--quick | --sessions-only | --stats]");
        println!("  (no flag)         Full sync including achievements");
        println!("  --quick           Sync without achievement data");
        println!("  --sessions-only   Update session counts without touching Notion");
        println!("  --stats           Show session statistics");
        return Ok(());
    }

    let config = TrackerConfig::from_env()?;
    logging::init(&config.log_level, config.log_file.as_deref())?;
    let engine = config.build_engine()?;

    match mode {
        CliMode::Sync | CliMode::Quick => {
            let include_achievements = mode == CliMode::Sync && config.include_achievements;
            let report = engine.run(include_achievements).await?;
            println!(
                "created {}, updated {}, errors {}, skipped {} in {:.1}s ({:.2} games/s)",
                report.created,
                report.updated,
                report.errors,
                report.skipped,
                report.elapsed.as_secs_f64(),
                report.throughput
            );
        }
        CliMode::SessionsOnly => {
            let observed = engine.refresh_sessions().await?;
            println!("updated session counts for {observed} games");
        }
        CliMode::Stats => {
            let summary = engine.session_stats().await?;
            println!("total sessions: {}", summary.total_sessions);
            println!("games with sessions: {}", summary.tracked_games);
            println!("average sessions per game: {:.1}", summary.average_sessions);
            for game in &summary.top {
                println!(
                    "  {}: {} sessions ({:.1} h/session)",
                    game.name, game.sessions, game.hours_per_session
                );
            }
        }
        CliMode::Help => {}
    }
    Ok(())
}
