//! twin-gizmo - replay recorded gizmo sessions against a scene backend
//!
//! Usage: `twin-gizmo <config.json> <script.json> [--write-snapshot <out.json>]`
//!
//! Each drag release prints the reconcile report as one JSON line on stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use twin_gizmo::backend::{HttpBackend, MemoryBackend, SceneBackend};
use twin_gizmo::config::{load_config, BackendConfig, TwinConfig};
use twin_gizmo::geo::SceneOrigin;
use twin_gizmo::replay::{load_script, CommandOutcome, Replay, ReplayEvent};
use twin_gizmo::scene::serialization::{load_snapshot_from_file, save_snapshot_to_file};

struct Args {
    config: PathBuf,
    script: PathBuf,
    write_snapshot: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut positional = Vec::new();
    let mut write_snapshot = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--write-snapshot" {
            write_snapshot = Some(PathBuf::from(args.next()?));
        } else {
            positional.push(PathBuf::from(arg));
        }
    }
    let [config, script]: [PathBuf; 2] = positional.try_into().ok()?;
    Some(Args {
        config,
        script,
        write_snapshot,
    })
}

async fn replay<B: SceneBackend>(
    backend: B,
    config: &TwinConfig,
    origin: Option<SceneOrigin>,
    events: &[ReplayEvent],
) -> Replay<B> {
    let mut replay = Replay::new(
        backend,
        &config.scene_id,
        origin,
        config.render.stagger_delays(),
    )
    .await;
    for (index, outcome) in replay.run(events).await.into_iter().enumerate() {
        match outcome {
            CommandOutcome::None => {}
            CommandOutcome::Mode(mode) => log::info!("#{} mode {:?}", index, mode),
            CommandOutcome::Message(message) => log::warn!("#{} {}", index, message),
            CommandOutcome::Reconciled(report) => match serde_json::to_string(&report) {
                Ok(line) => println!("{}", line),
                Err(err) => log::error!("#{} failed to encode report: {}", index, err),
            },
        }
    }
    replay
}

fn run(args: Args) -> Result<(), String> {
    let config = load_config(&args.config).map_err(|err| err.to_string())?;
    let events = load_script(&args.script).map_err(|err| err.to_string())?;
    log::info!("Replaying {} events on scene {}", events.len(), config.scene_id);

    match &config.backend {
        BackendConfig::Http {
            base_url,
            token,
            paths,
        } => {
            if args.write_snapshot.is_some() {
                log::warn!("--write-snapshot only applies to snapshot backends");
            }
            let backend = HttpBackend::new(base_url, token.clone(), paths.clone());
            futures::executor::block_on(replay(backend, &config, config.origin, &events));
        }
        BackendConfig::Snapshot { path } => {
            let snapshot = load_snapshot_from_file(path).map_err(|err| err.to_string())?;
            let origin = config.origin_or(snapshot.origin);
            let backend = MemoryBackend::from_snapshot(snapshot);
            let replay = futures::executor::block_on(replay(backend, &config, origin, &events));
            if let Some(out) = &args.write_snapshot {
                save_snapshot_to_file(&replay.editor().backend().snapshot(), out)
                    .map_err(|err| err.to_string())?;
                log::info!("Wrote snapshot to {}", out.display());
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let Some(args) = parse_args() else {
        eprintln!("usage: twin-gizmo <config.json> <script.json> [--write-snapshot <out.json>]");
        return ExitCode::from(2);
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
