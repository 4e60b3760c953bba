mod audio;
mod persist;
mod screenshot;

use anyhow::{bail, Context, Result};
use badge_core::clock::TickScheduler;
use badge_core::logging::{LogCategory, LogConfig, LogLevel};
use badge_core::memory_map::Controls;
use badge_system::{Runtime, RuntimeConfig};
use clap::Parser;
use std::fs::{self, File};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "badge", about = "Headless badge console runner")]
struct Args {
    /// Cartridge (.wasm) to run
    cart: PathBuf,

    /// Number of ticks to run
    #[arg(long, default_value_t = 60)]
    ticks: u32,

    /// Pace ticks at 60 Hz instead of running flat out
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Buttons held for the whole run, e.g. "a,up"
    #[arg(long, value_delimiter = ',')]
    hold: Vec<String>,

    /// Light sensor register value
    #[arg(long, default_value_t = 0)]
    light_level: u16,

    /// Battery register value
    #[arg(long, default_value_t = 0)]
    battery_level: u16,

    /// Flash image to load and persist (defaults to saves/<cart hash>.flash)
    #[arg(long)]
    flash: Option<PathBuf>,

    /// Do not write flash back on exit
    #[arg(long, default_value_t = false)]
    no_persist: bool,

    /// Restore this snapshot after loading instead of calling `start`
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Write a snapshot here on exit
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the final frame as a PNG
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Write drained audio as raw interleaved s16le stereo at 44.1 kHz
    #[arg(long)]
    audio_out: Option<PathBuf>,

    /// Runtime config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Comma separated core log categories to enable (default: all)
    #[arg(long, value_delimiter = ',')]
    log_category: Vec<String>,

    /// Send core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print debug_state as JSON on exit
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn parse_controls(names: &[String]) -> Result<Controls> {
    let mut controls = Controls::empty();
    for name in names {
        let flag = match name.trim().to_ascii_lowercase().as_str() {
            "start" => Controls::START,
            "select" => Controls::SELECT,
            "a" => Controls::A,
            "b" => Controls::B,
            "click" => Controls::CLICK,
            "up" => Controls::UP,
            "down" => Controls::DOWN,
            "left" => Controls::LEFT,
            "right" => Controls::RIGHT,
            other => bail!("unknown button: {}", other),
        };
        controls |= flag;
    }
    Ok(controls)
}

fn configure_logging(args: &Args) -> Result<()> {
    let Some(level) = LogLevel::from_str(&args.log_level) else {
        bail!("unknown log level: {}", args.log_level);
    };
    let config = LogConfig::global();
    if args.log_category.is_empty() {
        config.set_global_level(level);
    } else {
        for name in &args.log_category {
            let Some(category) = LogCategory::from_str(name) else {
                bail!("unknown log category: {}", name);
            };
            config.set_level(category, level);
        }
    }
    if let Some(path) = &args.log_file {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let config = match &args.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    let controls = parse_controls(&args.hold)?;

    let cart = fs::read(&args.cart).with_context(|| format!("reading {}", args.cart.display()))?;
    let flash_path = args
        .flash
        .clone()
        .unwrap_or_else(|| persist::default_flash_path(&cart));

    let mut runtime = Runtime::with_config(config)?;
    if persist::load_flash(&mut runtime, &flash_path)? {
        log::info!("loaded flash from {}", flash_path.display());
    }

    let sink = args.audio_out.as_ref().map(File::create).transpose()?;
    let drain = audio::AudioDrain::spawn(runtime.audio_consumer(), sink)?;

    let run = run_cart(&mut runtime, &cart, &args, controls);
    let stats = drain.finish()?;
    log::info!(
        "audio: {} frames drained, {} short pulls",
        stats.frames,
        stats.underruns
    );

    if let Some(path) = &args.screenshot {
        screenshot::write_png(&runtime.composite().frame, path)?;
    }
    if let Some(path) = &args.snapshot {
        persist::write_snapshot(&runtime, path)?;
    }
    if !args.no_persist {
        persist::save_flash(&runtime, &flash_path)?;
    }
    if args.debug {
        println!("{}", serde_json::to_string_pretty(&runtime.debug_state())?);
    }

    run
}

fn run_cart(runtime: &mut Runtime, cart: &[u8], args: &Args, controls: Controls) -> Result<()> {
    log::info!("cart {}", persist::cart_hash(cart));
    runtime.load(cart)?;
    match &args.restore {
        Some(path) => persist::read_snapshot(path)?.restore(runtime)?,
        None => runtime.start()?,
    }

    runtime.set_light_level(args.light_level);
    runtime.set_battery_level(args.battery_level);

    let mut clock = TickScheduler::new(Instant::now());
    let mut ran = 0;
    while ran < args.ticks {
        let due = if args.realtime {
            thread::sleep(clock.time_until_next(Instant::now()));
            clock.ticks_due(Instant::now()).min(args.ticks - ran)
        } else {
            1
        };
        for _ in 0..due {
            runtime.set_controls(controls);
            runtime.update()?;
            ran += 1;
        }
        let composite = runtime.composite();
        if composite.pixels_changed > 0 {
            log::debug!(
                "tick {}: {} pixels changed, {:.1} ms panel update",
                ran,
                composite.pixels_changed,
                composite.update_ms
            );
        }
    }

    if clock.resyncs() > 0 {
        log::warn!("fell behind {} time(s) and skipped ahead", clock.resyncs());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_parse_case_insensitively() {
        let names = vec!["A".to_string(), " up".to_string()];
        assert_eq!(parse_controls(&names).unwrap(), Controls::A | Controls::UP);
        assert!(parse_controls(&["jump".to_string()]).is_err());
        assert_eq!(parse_controls(&[]).unwrap(), Controls::empty());
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from([
            "badge",
            "cart.wasm",
            "--ticks",
            "10",
            "--hold",
            "a,b",
            "--log-category",
            "runtime,trace",
        ])
        .unwrap();
        assert_eq!(args.ticks, 10);
        assert_eq!(args.hold, vec!["a", "b"]);
        assert_eq!(args.log_category.len(), 2);
        assert!(!args.realtime);
    }
}
