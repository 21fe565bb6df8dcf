use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use everlog_core::watcher::{self, WatchEvent};
use everlog_core::GameSession;
use everlog_types::formatting::{format_compact, format_duration, format_rate};
use tokio::sync::{RwLock, mpsc};
use tracing::info;

use crate::state::AppState;

pub async fn characters(state: Arc<RwLock<AppState>>) {
    let (dir, server) = {
        let s = state.read().await;
        (s.config.log_directory.clone(), s.config.server.clone())
    };
    let server_filter = (!server.is_empty()).then_some(server.as_str());
    match watcher::discover_characters(Path::new(&dir), server_filter) {
        Ok(found) if found.is_empty() => println!("No character logs found in {dir}"),
        Ok(found) => {
            for log in found {
                println!("{} ({})", log.character, log.server);
            }
        }
        Err(e) => println!("Failed to scan {dir}: {e}"),
    }
}

pub async fn watch(name: &str, state: Arc<RwLock<AppState>>) {
    let (dir, server) = {
        let s = state.read().await;
        (s.config.log_directory.clone(), s.config.server.clone())
    };
    let server_filter = (!server.is_empty()).then_some(server.as_str());
    let found = match watcher::discover_characters(Path::new(&dir), server_filter) {
        Ok(found) => found,
        Err(e) => {
            println!("Failed to scan {dir}: {e}");
            return;
        }
    };
    match found
        .iter()
        .find(|log| log.character.eq_ignore_ascii_case(name))
    {
        Some(log) => {
            let path = log.path.clone();
            watch_path(&path, state).await;
        }
        None => println!("No log for character '{name}' in {dir}"),
    }
}

/// Preload history from `path`, then start tailing it.
pub async fn watch_path(path: &Path, state: Arc<RwLock<AppState>>) {
    let (catalog, config) = {
        let s = state.read().await;
        (Arc::clone(&s.catalog), s.config.clone())
    };
    let Some((character, _)) = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(watcher::parse_log_filename)
    else {
        println!("Not a character log: {}", path.display());
        return;
    };

    let now = Local::now().naive_local();
    let cutoff = now - chrono::Duration::seconds((config.timers.history_hours * 3600.0) as i64);
    let (entries, offset) = match watcher::read_history(path, cutoff) {
        Ok(result) => result,
        Err(e) => {
            println!("Failed to read {}: {e}", path.display());
            return;
        }
    };

    let mut session = GameSession::new(
        catalog,
        &character,
        config.default_level,
        &config.timers,
        &config.meter,
    );
    if let Some(learned) = config.learned_items_path() {
        session = session.with_learned_items(&learned);
    }
    session.preload(&entries, now);
    println!("Watching {character} ({} lines replayed)", entries.len());

    let (tx, mut rx) = mpsc::channel(1024);
    let tail = watcher::spawn_tail(path.to_path_buf(), offset, tx);

    // Single consumer: new entries and the 1 s expiry tick, entries first.
    let consumer_state = Arc::clone(&state);
    let consumer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(WatchEvent::Entry(entry)) => {
                        let mut s = consumer_state.write().await;
                        if let Some(session) = &mut s.session {
                            session.process(&entry);
                        }
                    }
                    Some(WatchEvent::Rotated) => info!("log file restarted"),
                    Some(WatchEvent::Failed(e)) => {
                        println!("Log watch failed: {e}");
                        break;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let now = Local::now().naive_local();
                    let mut s = consumer_state.write().await;
                    if let Some(session) = &mut s.session {
                        session.tick(now);
                    }
                }
            }
        }
    });

    let mut s = state.write().await;
    s.stop_watch_tasks();
    s.session = Some(session);
    s.active_file = Some(path.to_path_buf());
    s.tail_task = Some(tail);
    s.consumer_task = Some(consumer);
}

pub async fn timers(state: Arc<RwLock<AppState>>) {
    let now = Local::now().naive_local();
    let mut s = state.write().await;
    let Some(session) = &mut s.session else {
        println!("Not watching a character (use: watch --name <name>)");
        return;
    };
    let snap = session.snapshot(now);

    if let Some(casting) = &snap.casting {
        println!(
            "Casting {} ({}%)",
            casting.name,
            (casting.progress * 100.0).round() as u32
        );
    }

    let sections = [
        ("Self buffs", &snap.timers.self_buffs),
        ("Received buffs", &snap.timers.received_buffs),
        ("Debuffs", &snap.timers.debuffs),
    ];
    for (title, views) in sections {
        if views.is_empty() {
            continue;
        }
        println!("{title}:");
        for view in views {
            let mut flags = String::new();
            if view.expiring {
                flags.push_str(" (expiring)");
            }
            if view.low_confidence {
                flags.push_str(" (?)");
            }
            println!(
                "  {:<28} {}{}",
                view.spell_name,
                format_duration(view.remaining_secs as f64),
                flags
            );
        }
    }
    for group in &snap.timers.cast_on_others {
        println!("{}:", group.spell_name);
        for (target, remaining) in &group.targets {
            println!("  {:<28} {}", target, format_duration(*remaining as f64));
        }
    }
    if snap.timers == everlog_core::TimerSnapshot::default() {
        println!("No active timers");
    }
}

pub async fn dps(state: Arc<RwLock<AppState>>) {
    let now = Local::now().naive_local();
    let mut s = state.write().await;
    let Some(session) = &mut s.session else {
        println!("Not watching a character (use: watch --name <name>)");
        return;
    };
    let snap = session.snapshot(now);
    if !snap.meter.visible {
        println!("No recent combat");
        return;
    }
    println!("DPS: {}", format_rate(snap.meter.rate));
    for attacker in &snap.meter.attackers {
        println!(
            "  {:<28} {}",
            attacker.attacker,
            format_compact(attacker.total)
        );
    }
    if !snap.meter.targets.is_empty() {
        println!("Targets: {}", snap.meter.targets.join(", "));
    }
}

pub async fn rolls(state: Arc<RwLock<AppState>>) {
    let now = Local::now().naive_local();
    let mut s = state.write().await;
    let Some(session) = &mut s.session else {
        println!("Not watching a character (use: watch --name <name>)");
        return;
    };
    let snap = session.snapshot(now);
    if snap.rolls.is_empty() {
        println!("No rolls this session");
        return;
    }
    for tracked in &snap.rolls {
        let dup = if tracked.duplicate { " (repeat)" } else { "" };
        println!(
            "{:<16} {:>4}  [{}-{}]{}",
            tracked.roll.player, tracked.roll.value, tracked.roll.low, tracked.roll.high, dup
        );
    }
}

pub async fn pick(low: i64, high: i64, state: Arc<RwLock<AppState>>) {
    let s = state.read().await;
    let Some(session) = &s.session else {
        println!("Not watching a character (use: watch --name <name>)");
        return;
    };
    match session.pick_roll_winner(low, high) {
        Ok(winner) => println!("Winner: {} (rolled {})", winner.player, winner.value),
        Err(e) => println!("{e}"),
    }
}

pub async fn level(level: u8, state: Arc<RwLock<AppState>>) {
    let mut s = state.write().await;
    s.config.default_level = level;
    if let Err(e) = s.config.store() {
        println!("Failed to save config: {e}");
    }
    if let Some(session) = &mut s.session {
        session.set_level(level);
    }
    println!("Level set to {level}");
}

pub async fn show_settings(state: Arc<RwLock<AppState>>) {
    let s = state.read().await;
    let c = &s.config;
    println!("log_directory  = {}", c.log_directory);
    println!("server         = {}", c.server);
    println!("spells_file    = {}", c.spells_file);
    println!(
        "whitelist_file = {}",
        c.whitelist_file.as_deref().unwrap_or("(none)")
    );
    println!("default_level  = {}", c.default_level);
    println!("spells loaded  = {}", s.catalog.len());
}

pub async fn set_directory(path: &str, state: Arc<RwLock<AppState>>) {
    let mut s = state.write().await;
    s.config.log_directory = path.to_string();
    match s.config.store() {
        Ok(()) => println!("Log directory set to {path}"),
        Err(e) => println!("Failed to save config: {e}"),
    }
}

pub fn exit() {
    println!("Exiting...");
}
