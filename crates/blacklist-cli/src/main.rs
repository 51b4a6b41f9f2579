use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use blacklist_api::{serve, SessionApi};
use contracts::BlacklistConfig;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    println!("blacklist-cli [--config <path>] <command>");
    println!("commands:");
    println!("  status");
    println!("  demo");
    println!("    blacklists AK47 for Pawn1 at tick 100 and runs to expiry");
    println!("  simulate <session_id> [ticks] [sqlite_path]");
    println!("    drives a scripted session, saves it to sqlite and reloads it");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Splits `--config <path>` out of the argument list.
fn take_config_flag(args: Vec<String>) -> Result<(Vec<String>, Option<PathBuf>), String> {
    let mut rest = Vec::with_capacity(args.len());
    let mut config_path = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter
                .next()
                .ok_or_else(|| "missing value for --config".to_string())?;
            config_path = Some(PathBuf::from(path));
        } else {
            rest.push(arg);
        }
    }
    Ok((rest, config_path))
}

fn load_config(path: Option<&PathBuf>) -> Result<BlacklistConfig, String> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
            serde_json::from_str::<BlacklistConfig>(&raw)
                .map_err(|err| format!("invalid config {}: {err}", path.display()))?
        }
        None => BlacklistConfig::default(),
    };

    if let Ok(value) = env::var("BLACKLIST_DEBUG") {
        config.debug_logging = matches!(value.trim(), "1" | "true" | "TRUE" | "yes");
    }

    blacklist_api::validate_config(&config).map_err(|err| err.to_string())?;
    Ok(config)
}

fn sqlite_path_from_env() -> Option<PathBuf> {
    env::var("BLACKLIST_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_sqlite_path(value: Option<&String>) -> PathBuf {
    value
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .or_else(sqlite_path_from_env)
        .unwrap_or_else(|| PathBuf::from("blacklist_sessions.sqlite"))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn run_demo(mut config: BlacklistConfig) {
    config.debug_logging = true;
    config.starting_tick = 100;
    let mut api = SessionApi::from_config(config);

    let pawn = api.spawn_entity("Pawn1");
    let ak47 = api.define_resource("AK47");
    if let Err(err) = api.blacklist(pawn.id, ak47.hash, "unreachable") {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    println!("{}", api.debug_info());
    for line in api.flush_logs() {
        println!("{line}");
    }

    let expires_at = api
        .store()
        .expires_at(pawn.id, ak47.hash)
        .unwrap_or_default();
    let report = api.run_to_tick(expires_at.saturating_sub(1));
    println!(
        "tick={} blacklisted={}",
        report.current_tick,
        api.is_blacklisted(pawn.id, ak47.hash)
    );
    let report = api.step(1);
    println!(
        "tick={} blacklisted={} expired={}",
        report.current_tick,
        api.is_blacklisted(pawn.id, ak47.hash),
        report.expired.len()
    );
    println!("{}", api.status());
}

fn run_simulation(args: &[String], mut config: BlacklistConfig) -> Result<(), String> {
    let session_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing session_id".to_string())?;
    let target_tick = args
        .get(3)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid ticks: {value}"))
        })
        .transpose()?
        .unwrap_or(1_000);
    let sqlite_path = parse_sqlite_path(args.get(4));

    config.session_id = session_id.clone();
    let mut api = SessionApi::from_config(config);
    api.attach_sqlite_store(&sqlite_path)
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;

    let pawns = (1..=3)
        .map(|index| api.spawn_entity(format!("Pawn{index}")))
        .collect::<Vec<_>>();
    let weapons = ["AK47", "M16", "Shotgun"]
        .into_iter()
        .map(|label| api.define_resource(label))
        .collect::<Vec<_>>();

    let half = target_tick / 2;
    for (pawn, weapon) in pawns.iter().zip(weapons.iter()) {
        api.blacklist(pawn.id, weapon.hash, "unreachable")
            .map_err(|err| err.to_string())?;
    }
    api.run_to_tick(half);
    if let Some(last) = pawns.last() {
        api.kill_entity(last.id).map_err(|err| err.to_string())?;
    }
    if let Some(first) = weapons.first() {
        api.blacklist(pawns[0].id, first.hash, "forbidden")
            .map_err(|err| err.to_string())?;
    }
    api.run_to_tick(target_tick);
    api.save()
        .map_err(|err| format!("failed to save session: {err}"))?;

    let before = api.status();
    let (reloaded, summary) = SessionApi::load_from_sqlite(&sqlite_path, &session_id)
        .map_err(|err| format!("failed to reload session: {err}"))?;

    println!(
        "simulated {} sqlite={} restored={} dropped_stale={} dropped_dead={}",
        before,
        sqlite_path.display(),
        summary.restored,
        summary.dropped_stale,
        summary.dropped_dead
    );
    println!("reloaded {}", reloaded.status());
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let (args, config_path) = match take_config_flag(env::args().collect()) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("error: {err}");
            print_usage();
            std::process::exit(2);
        }
    };
    let config = match load_config(config_path.as_ref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    tracing::debug!(
        session_id = config.session_id.as_str(),
        duration_ticks = config.duration_ticks,
        debug_logging = config.debug_logging,
        "config loaded"
    );
    let command = args.get(1).map(String::as_str);

    match command {
        Some("status") => {
            let api = SessionApi::from_config(config);
            println!("{}", api.status());
        }
        Some("demo") => run_demo(config),
        Some("simulate") => {
            if let Err(err) = run_simulation(&args, config) {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                if let Err(err) = serve(addr, config, sqlite_path_from_env()).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        _ => print_usage(),
    }
}
