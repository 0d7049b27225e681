mod args;
mod voting;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{debug, info, warn};
use rand::Rng;
use snafu::{prelude::*, ErrorCompat};
use vote_budget::builder::Builder;
use vote_budget::*;

use crate::args::{Args, Command, SessionCommand};
use crate::voting::config_reader::*;
use crate::voting::credentials::*;
use crate::voting::leaderboard::*;
use crate::voting::local_cache::*;
use crate::voting::names::*;
use crate::voting::store_common::*;
use crate::voting::store_json::JsonFileBackend;
use crate::voting::store_memory::MemoryBackend;
use crate::voting::*;

const DEFAULT_WATCH_INTERVAL_SECS: u64 = 2;
const DEFAULT_DEMO_VOTERS: usize = 3;

fn print_update(update: &VoteUpdate) {
    println!(
        "{}: {} votes ({} remaining)",
        update.candidate, update.applied, update.votes_remaining
    );
    if update.budget_exhausted() {
        println!("You've used all your votes!");
    }
}

fn print_status<S, C>(session: &VotingSession<S, C>)
where
    S: ProfileStore + RemoteVoteStore,
    C: LocalCache,
{
    let (active, allocation) = match (session.active(), session.allocation()) {
        (Some(active), Ok(allocation)) => (active, allocation),
        _ => {
            println!("Not logged in. Use `register` or `login` first.");
            return;
        }
    };
    println!("{}  {}", active.identity.name, active.avatar_url);
    for c in session.engine().candidates() {
        println!(
            "  {:<6} {:<24} {:>5}",
            c.id.as_str(),
            c.name,
            allocation.votes_for(&c.id)
        );
    }
    println!(
        "{} of {} votes remaining",
        allocation.votes_remaining(),
        allocation.total_votes()
    );
}

fn print_standings(entries: &[LeaderboardEntry], candidates: &[Candidate]) {
    let rows = standings(entries, candidates);
    if rows.is_empty() {
        println!("No votes submitted yet.");
        return;
    }
    for s in rows.iter() {
        let bar = "#".repeat((s.percentage / 5.0).round() as usize);
        println!(
            "{:>3}. {:<6} {:<24} {:>6}  {}",
            s.rank,
            s.candidate.as_str(),
            s.name,
            s.total_votes,
            bar
        );
    }
}

fn welcome(outcome: AuthOutcome) -> VoteResult<()> {
    match outcome {
        AuthOutcome::Welcome {
            identity,
            returning: false,
            ..
        } => println!("Welcome, {}!", identity.name),
        AuthOutcome::Welcome {
            identity,
            returning: true,
            reconciled,
        } => {
            println!("Welcome back, {}!", identity.name);
            if let Some(report) = reconciled {
                println!("Picked up {} submitted entries.", report.adopted);
            }
        }
        AuthOutcome::Rejected(CredentialError::NameNotFound { name }) => {
            whatever!("No profile named {}. Use `register` to create it.", name)
        }
        AuthOutcome::Rejected(CredentialError::InvalidPin { name }) => {
            whatever!("Wrong PIN for {}.", name)
        }
    }
    Ok(())
}

async fn show_leaderboard<S: RemoteVoteStore>(
    store: &S,
    candidates: &[Candidate],
    watch: bool,
    interval: Option<u64>,
) -> VoteResult<()> {
    let poll = if watch {
        let secs = interval.unwrap_or(DEFAULT_WATCH_INTERVAL_SECS).max(1);
        Some(Duration::from_secs(secs))
    } else {
        None
    };
    let mut feed = LeaderboardFeed::new(store, poll);
    let mut last = feed.current().await.context(StorageSnafu)?;
    print_standings(&last, candidates);
    if !watch {
        return Ok(());
    }
    loop {
        tokio::select! {
            update = feed.next_update() => match update {
                None => break,
                Some(Err(e)) => warn!("Could not read the leaderboard: {}", e),
                Some(Ok(entries)) => {
                    if entries != last {
                        println!();
                        print_standings(&entries, candidates);
                        last = entries;
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("show_leaderboard: interrupted");
                break;
            }
        }
    }
    Ok(())
}

// A whole round in memory: every profile spreads its budget at random and
// submits, and the leaderboard follows the notifications of the store.
async fn run_demo(engine: AllocationEngine, voters: usize) -> VoteResult<()> {
    let store = Arc::new(MemoryBackend::new());
    let candidates = engine.candidates().to_vec();
    let mut feed = LeaderboardFeed::new(store.as_ref(), None);
    let mut rng = rand::thread_rng();

    for _ in 0..voters {
        let mut session = VotingSession::new(engine.clone(), store.clone(), MemoryCache::new());
        let name = ProfileName::parse(&random_profile_name(&mut rng)).context(ValidationSnafu)?;
        let pin = Pin::parse(&format!("{:04}", rng.gen_range(0..10000u32)))
            .context(ValidationSnafu)?;
        if let AuthOutcome::Rejected(e) = session
            .authenticate(&name, Some(&pin), Mode::Register)
            .await?
        {
            warn!("run_demo: {:?}", e);
            continue;
        }
        for c in candidates.iter() {
            let remaining = session.allocation()?.votes_remaining();
            let request = i64::try_from(rng.gen_range(0..=remaining)).unwrap_or(i64::MAX);
            session.set_candidate_votes(&c.id, request)?;
        }
        let report = session.submit().await?;
        println!(
            "\n{} submitted {} entries:",
            name.as_str(),
            report.records_sent
        );
        if let Some(update) = feed.next_update().await {
            print_standings(&update.context(StorageSnafu)?, &candidates);
        }
    }
    let tables = store.snapshot().await;
    println!(
        "\n{} profiles, {} vote rows",
        tables.profiles.len(),
        tables.votes.len()
    );
    Ok(())
}

async fn run_command(
    engine: AllocationEngine,
    paths: StoragePaths,
    command: SessionCommand,
) -> VoteResult<()> {
    let store = Arc::new(
        JsonFileBackend::open(&paths.store)
            .await
            .context(StorageSnafu)?,
    );
    let mut session = VotingSession::new(engine, store, JsonFileCache::new(&paths.cache));
    if let Some(active) = session.resume()? {
        debug!("run_command: resumed as {}", active.identity.name);
    }

    match command {
        SessionCommand::Register { name, pin } => {
            let name = name.unwrap_or_else(|| random_profile_name(&mut rand::thread_rng()));
            let name = ProfileName::parse(&name).context(ValidationSnafu)?;
            let pin = pin
                .map(|p| Pin::parse(&p))
                .transpose()
                .context(ValidationSnafu)?;
            let outcome = session
                .authenticate(&name, pin.as_ref(), Mode::Register)
                .await?;
            welcome(outcome)?;
        }
        SessionCommand::Login { name, pin } => {
            let name = ProfileName::parse(&name).context(ValidationSnafu)?;
            let pin = Pin::parse(&pin).context(ValidationSnafu)?;
            let outcome = session
                .authenticate(&name, Some(&pin), Mode::Login)
                .await?;
            welcome(outcome)?;
        }
        SessionCommand::Logout => match session.logout()? {
            Some(identity) => println!("Goodbye, {}.", identity.name),
            None => println!("Nobody was logged in."),
        },
        SessionCommand::Status => print_status(&session),
        SessionCommand::Incr { candidate } => {
            print_update(&session.increment(&CandidateId(candidate))?);
        }
        SessionCommand::Decr { candidate } => {
            print_update(&session.decrement(&CandidateId(candidate))?);
        }
        SessionCommand::Set { candidate, count } => {
            print_update(&session.set_candidate_votes(&CandidateId(candidate), count)?);
        }
        SessionCommand::Reset => {
            let remaining = session.reset_all()?;
            println!("All votes cleared, {} remaining.", remaining);
        }
        SessionCommand::Submit => {
            let report = session.submit().await?;
            println!(
                "Submitted {} entries to {}.",
                report.records_sent,
                session.store().path().display()
            );
            if !report.refreshed {
                println!("The store could not be read back, keeping the local copy.");
            }
        }
        SessionCommand::Refresh => {
            let report = session.refresh().await?;
            println!("Picked up {} submitted entries.", report.adopted);
            print_status(&session);
        }
        SessionCommand::Leaderboard { watch, interval } => {
            let candidates = session.engine().candidates().to_vec();
            show_leaderboard(session.store().as_ref(), &candidates, watch, interval).await?;
        }
    }
    Ok(())
}

async fn run(args: Args) -> VoteResult<()> {
    let (config, config_dir): (VoteConfig, Option<PathBuf>) = match &args.config {
        Some(p) => {
            let path = Path::new(p);
            (read_config(path)?, path.parent().map(|d| d.to_path_buf()))
        }
        None => (VoteConfig::default(), None),
    };
    let (rules, candidates) = validate_config(&config)?;
    let mut builder = Builder::new(&rules).context(BudgetSnafu)?;
    for c in candidates.iter() {
        builder.add_candidate(c).context(BudgetSnafu)?;
    }
    let engine = builder.build().context(BudgetSnafu)?;

    match args.command {
        Command::Name => {
            println!("{}", random_profile_name(&mut rand::thread_rng()));
            Ok(())
        }
        Command::Demo { voters } => {
            run_demo(engine, voters.unwrap_or(DEFAULT_DEMO_VOTERS)).await
        }
        Command::Session(command) => {
            let paths = resolve_storage(
                &config,
                config_dir.as_deref(),
                args.store.as_deref(),
                args.cache.as_deref(),
            );
            run_command(engine, paths, command).await
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();
    debug!("args: {:?}", args);

    if let Err(e) = run(args).await {
        warn!("Error occured {:?}", e);
        eprintln!("{}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
