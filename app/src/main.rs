//! The wallplayer binary: configuration loading, stream probing and the
//! scheduler tick loop.
//!
//! Actions arrive as plain-text commands on stdin (one per line), which
//! keeps the binary driveable from a remote-control daemon, an ssh
//! session or a FIFO alike.

use std::env;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use crossbeam_channel::Sender;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallplayer_config::WallConfig;
use wallplayer_engine::ScreenManager;
use wallplayer_ipc::{Action, EngineEvent};
use wallplayer_overlay::{NullOverlay, OverlayService, ShellOverlay};
use wallplayer_player::ShellLauncher;
use wallplayer_probe::{ProbeCache, Prober, StreamDescriptor};

/// Scheduler pass interval. Every per-state recheck inside the engine is
/// far coarser, so the tick itself is cheap.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

const USAGE: &str = "\
Usage: wallplayer [OPTIONS] <config.json>

Options:
  -r, --resources <DIR>   Overlay image directory [default: /usr/share/wallplayer]
      --rebuild-cache     Discard cached stream metadata and re-probe
  -h, --help              Print help
  -V, --version           Print version

Commands on stdin:
  next | prev             Switch screen (or window in single view)
  single [WINDOW]         Zoom one window to fullscreen
  grid                    Back to the grid layout
  up | down               Stream quality
  pause                   Pause/resume rotation
  display                 Move control focus to the next display
  quit                    Stop playback and exit
";

struct CliArgs {
    config: PathBuf,
    resources: PathBuf,
    rebuild_cache: bool,
}

/// Returns `None` when a help/version flag already handled the run.
fn parse_args() -> anyhow::Result<Option<CliArgs>> {
    let mut config = None;
    let mut resources = PathBuf::from("/usr/share/wallplayer");
    let mut rebuild_cache = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{}", USAGE);
                return Ok(None);
            }
            "-V" | "--version" => {
                println!("wallplayer {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "-r" | "--resources" => {
                let dir = args.next().context("--resources needs a directory")?;
                resources = PathBuf::from(dir);
            }
            "--rebuild-cache" => rebuild_cache = true,
            other if !other.starts_with('-') && config.is_none() => {
                config = Some(PathBuf::from(other));
            }
            other => bail!("unexpected argument '{}'\n{}", other, USAGE),
        }
    }

    let Some(config) = config else {
        bail!("missing config file argument\n{}", USAGE);
    };

    Ok(Some(CliArgs {
        config,
        resources,
        rebuild_cache,
    }))
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wallplayer=info,wallplayer_engine=info,wallplayer_player=info,\
                 wallplayer_probe=info,wallplayer_overlay=info,wallplayer_config=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn parse_action(line: &str) -> Option<Action> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "next" | "n" => Some(Action::SwitchNext),
        "prev" | "p" => Some(Action::SwitchPrev),
        "single" | "s" => {
            let window = parts.next().and_then(|w| w.parse().ok());
            Some(Action::SwitchSingle { window })
        }
        "grid" | "g" => Some(Action::SwitchGrid),
        "up" | "+" => Some(Action::QualityUp),
        "down" | "-" => Some(Action::QualityDown),
        "pause" => Some(Action::PauseToggle),
        "display" | "d" => Some(Action::NextDisplay),
        _ => None,
    }
}

fn spawn_input_thread(actions: Sender<Action>, quit: Sender<()>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line == "quit" || line == "q" {
                let _ = quit.send(());
                break;
            }

            match parse_action(line) {
                Some(action) => {
                    if actions.send(action).is_err() {
                        break;
                    }
                }
                None => warn!(input = line, "unknown command"),
            }
        }
    });
}

/// Probe every configured URL, mirroring the config's screen/window
/// nesting.
fn probe_candidates(config: &WallConfig, prober: &mut Prober) -> Vec<Vec<Vec<StreamDescriptor>>> {
    config
        .screens
        .iter()
        .map(|screen| {
            screen
                .windows
                .iter()
                .map(|window| window.urls.iter().map(|url| prober.probe(url)).collect())
                .collect()
        })
        .collect()
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Ready => info!("engine ready"),
        EngineEvent::ScreenActivated {
            display: dindex,
            screen,
        } => {
            info!(display = dindex, screen, "screen activated");
        }
        EngineEvent::RotationCompleted {
            display: dindex,
            from,
            to,
            active_ms,
        } => {
            info!(display = dindex, from, to, active_ms, "rotation completed");
        }
        EngineEvent::StreamRecovered {
            display: dindex,
            screen,
            window,
        } => {
            info!(display = dindex, screen, window, "stream recovered");
        }
        EngineEvent::OrphanKilled { pid } => warn!(pid, "orphaned player killed"),
        EngineEvent::ActionRejected => warn!("action rejected, another action is pending"),
        EngineEvent::Shutdown => info!("engine shut down"),
    }
}

fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    init_logging();
    info!(version = env!("CARGO_PKG_VERSION"), "wallplayer starting");

    let config = WallConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if Command::new("ffprobe").arg("-version").output().is_err() {
        bail!("ffprobe not found; install ffmpeg");
    }

    let cache_path = env::temp_dir().join("wallplayer_probe_cache.json");
    let mut prober = Prober::new(ProbeCache::open(&cache_path), config.settings.hevc_mode);
    if args.rebuild_cache {
        info!("discarding probe cache");
        prober.rebuild_cache();
    }
    let candidates = probe_candidates(&config, &mut prober);

    let overlay: Box<dyn OverlayService> = if config.settings.icons_enabled {
        Box::new(ShellOverlay::new(args.resources))
    } else {
        Box::new(NullOverlay)
    };

    let (action_tx, action_rx) = wallplayer_ipc::action_channel();
    let (event_tx, event_rx) = wallplayer_ipc::event_channel();
    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    spawn_input_thread(action_tx, quit_tx);

    let mut manager = ScreenManager::new(
        &config,
        candidates,
        Box::new(ShellLauncher::new()),
        overlay,
        event_tx,
    )?;

    loop {
        if quit_rx.try_recv().is_ok() {
            break;
        }

        for action in action_rx.try_iter() {
            manager.submit(action);
        }

        manager.tick(Instant::now());

        for event in event_rx.try_iter() {
            log_event(&event);
        }

        thread::sleep(TICK_INTERVAL);
    }

    manager.shutdown();
    for event in event_rx.try_iter() {
        log_event(&event);
    }
    info!("wallplayer stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_commands() {
        assert_eq!(parse_action("next"), Some(Action::SwitchNext));
        assert_eq!(parse_action("prev"), Some(Action::SwitchPrev));
        assert_eq!(
            parse_action("single 3"),
            Some(Action::SwitchSingle { window: Some(3) })
        );
        assert_eq!(
            parse_action("single"),
            Some(Action::SwitchSingle { window: None })
        );
        assert_eq!(parse_action("grid"), Some(Action::SwitchGrid));
        assert_eq!(parse_action("pause"), Some(Action::PauseToggle));
        assert_eq!(parse_action("bogus"), None);
    }
}
