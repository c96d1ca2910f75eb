//! Headless skirmish driver
//!
//! Joins a set of participants to an in-process host, runs seeded rounds of
//! combat (resolved in parallel), upgrades and dashes through the
//! progression service, then flushes every record on shutdown.

use catsmp_progression::core::config::ProgressionConfig;
use catsmp_progression::core::error::Result;
use catsmp_progression::core::{Clock, ManualClock, ParticipantId, SystemClock};
use catsmp_progression::host::{DamageCause, InMemoryHost};
use catsmp_progression::progression::{
    DurableBackend, JsonDirBackend, MemoryBackend, ProgressionService, ProgressionStore,
};
use catsmp_progression::ProgressionError;
use clap::Parser;
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Headless skirmish over the progression engine
#[derive(Parser, Debug)]
#[command(name = "catsmp-progression")]
#[command(about = "Run a seeded skirmish and persist participant progression")]
struct Args {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the record directory from the config
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep records in memory only
    #[arg(long)]
    in_memory: bool,

    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Number of participants in the skirmish
    #[arg(long, default_value_t = 8)]
    participants: usize,

    /// Number of rounds to simulate
    #[arg(long, default_value_t = 50)]
    rounds: u32,

    /// Simulated milliseconds per round
    #[arg(long, default_value_t = 1_000)]
    round_ms: u64,

    /// Chance that a hit is lethal
    #[arg(long, default_value_t = 0.15)]
    kill_chance: f64,

    /// Print the final summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy)]
struct Fight {
    attacker: ParticipantId,
    defender: ParticipantId,
    damage: f64,
    lethal: bool,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
struct Tally {
    fights: usize,
    kills: usize,
    transfers: usize,
    damage_dealt: f64,
    damage_taken: f64,
    upgrades: usize,
    dashes: usize,
    dashes_on_cooldown: usize,
}

#[derive(Debug, Serialize)]
struct ParticipantSummary {
    id: String,
    role: String,
    currency: u8,
    abilities: Vec<(String, u8)>,
}

#[derive(Debug, Serialize)]
struct Summary {
    seed: u64,
    rounds: u32,
    records_written: usize,
    wall_ms: u64,
    tally: Tally,
    participants: Vec<ParticipantSummary>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("catsmp_progression=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ProgressionConfig::load(path)?,
        None => ProgressionConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    let seed = args.seed.or(config.seed).unwrap_or(42);
    config.seed = Some(seed);
    config.validate()?;

    if args.participants < 2 {
        return Err(ProgressionError::Config(
            "a skirmish needs at least 2 participants".into(),
        ));
    }
    if !(0.0..=1.0).contains(&args.kill_chance) {
        return Err(ProgressionError::Config(format!(
            "kill_chance ({}) must be within 0..=1",
            args.kill_chance
        )));
    }

    let backend: Arc<dyn DurableBackend> = if args.in_memory {
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(JsonDirBackend::open(&config.data_dir)?)
    };
    let store = Arc::new(ProgressionStore::new(backend, config.seed));
    store.load_all()?;

    let host = Arc::new(InMemoryHost::new());
    let clock = Arc::new(ManualClock::new(0));
    let service = ProgressionService::new(config, store.clone(), host.clone(), clock.clone())?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let ids = roster(&store, args.participants, &mut rng);
    for id in &ids {
        host.connect(*id);
        service.on_join(*id)?;
    }
    tracing::info!(participants = ids.len(), seed, "Skirmish starting");

    let wall = SystemClock::new();
    let mut tally = Tally::default();
    for round in 0..args.rounds {
        clock.advance(args.round_ms);

        let fights: Vec<Fight> = (0..ids.len())
            .map(|_| {
                let a = rng.gen_range(0..ids.len());
                let b = (a + rng.gen_range(1..ids.len())) % ids.len();
                Fight {
                    attacker: ids[a],
                    defender: ids[b],
                    damage: rng.gen_range(1.0..8.0),
                    lethal: rng.gen_bool(args.kill_chance),
                }
            })
            .collect();

        // Pairs overlap, so this exercises per-record locking across threads
        let results: Vec<Result<Tally>> =
            fights.par_iter().map(|fight| resolve_fight(&service, fight)).collect();
        for result in results {
            match result {
                Ok(t) => merge(&mut tally, &t),
                Err(e) => tracing::warn!(round, "Fight failed: {}", e),
            }
        }

        for id in &ids {
            spend_on_upgrade(&service, *id, &mut tally);
            if rng.gen_bool(0.3) {
                let facing = Vec3::new(rng.gen_range(-1.0..1.0), 0.0, rng.gen_range(-1.0..1.0));
                match service.trigger_dash(*id, facing) {
                    Ok(_) => tally.dashes += 1,
                    Err(ProgressionError::OnCooldown { .. }) => tally.dashes_on_cooldown += 1,
                    Err(_) => {}
                }
            }
        }
    }

    let records_written = service.shutdown()?;
    let wall_ms = wall.now_ms();
    let participants = ids
        .iter()
        .filter_map(|id| service.participant(*id).ok())
        .map(|p| ParticipantSummary {
            id: p.id.to_string(),
            role: p.role.to_string(),
            currency: p.currency,
            abilities: p
                .abilities
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        })
        .collect();

    let summary = Summary {
        seed,
        rounds: args.rounds,
        records_written,
        wall_ms,
        tally,
        participants,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Reuse stored participants first, then mint deterministic new ids
fn roster(store: &ProgressionStore, count: usize, rng: &mut ChaCha8Rng) -> Vec<ParticipantId> {
    let mut ids: Vec<ParticipantId> = store.ids().into_iter().take(count).collect();
    while ids.len() < count {
        let uuid = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        ids.push(ParticipantId(uuid));
    }
    ids
}

fn resolve_fight(service: &ProgressionService, fight: &Fight) -> Result<Tally> {
    let mut tally = Tally {
        fights: 1,
        ..Default::default()
    };
    let dealt = service.on_damage_dealt(fight.attacker, fight.defender, fight.damage)?;
    let taken = service.on_damage_taken(fight.defender, dealt, DamageCause::Attack);
    tally.damage_dealt = dealt;
    tally.damage_taken = taken;

    if fight.lethal {
        let credit = service.on_kill_credit(fight.attacker, fight.defender)?;
        tally.kills = 1;
        tally.transfers = usize::from(credit.transferred);
    }
    Ok(tally)
}

/// Buy the lowest-level unlock still available, if affordable
fn spend_on_upgrade(service: &ProgressionService, id: ParticipantId, tally: &mut Tally) {
    let Ok(options) = service.upgrade_options(id) else {
        return;
    };
    let Some(choice) = options
        .iter()
        .filter(|o| !o.is_maxed())
        .min_by_key(|o| o.level)
    else {
        return;
    };
    match service.request_upgrade(id, choice.key) {
        Ok(_) => tally.upgrades += 1,
        Err(ProgressionError::InsufficientCurrency { .. }) => {}
        Err(e) => tracing::debug!(participant = %id, "Upgrade refused: {}", e),
    }
}

fn merge(total: &mut Tally, t: &Tally) {
    total.fights += t.fights;
    total.kills += t.kills;
    total.transfers += t.transfers;
    total.damage_dealt += t.damage_dealt;
    total.damage_taken += t.damage_taken;
}

fn print_summary(summary: &Summary) {
    let t = &summary.tally;
    println!();
    println!("=== SKIRMISH COMPLETE (seed {}) ===", summary.seed);
    println!(
        "Rounds: {} | Fights: {} | Kills: {} ({} transfers)",
        summary.rounds, t.fights, t.kills, t.transfers
    );
    println!(
        "Damage dealt: {:.1} | taken after mitigation: {:.1}",
        t.damage_dealt, t.damage_taken
    );
    println!(
        "Upgrades: {} | Dashes: {} ({} on cooldown)",
        t.upgrades, t.dashes, t.dashes_on_cooldown
    );
    println!(
        "Records written: {} | Wall time: {} ms",
        summary.records_written, summary.wall_ms
    );
    println!();
    for p in &summary.participants {
        let abilities: Vec<String> = p
            .abilities
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();
        println!(
            "  {} {:<10} BP {}/5  {}",
            &p.id[..8],
            p.role,
            p.currency,
            abilities.join(" ")
        );
    }
}
