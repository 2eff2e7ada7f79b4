//! Command-line frontend: configuration, ROM loading, and the frame loop.
//!
//! Exit codes: 0 clean exit, 1 configuration error, 2 ROM load failure,
//! 3 video initialization failure, 4 CPU feature check failure.

mod config;
mod music;
mod video;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;

use m3_boards::model3::{DsbKind, Model3, Model3Config, RomBundle};
use m3_boards::rom_loader::RomSet;
use m3_core::core::machine::Machine;
use m3_core::logger::{LogOutput, MultiLogger, parse_level};

const EXIT_CONFIG: u8 = 1;
const EXIT_ROM: u8 = 2;
const EXIT_VIDEO: u8 = 3;
const EXIT_CPU: u8 = 4;

#[derive(Parser)]
#[command(name = "m3emu", about = "Sega Model 3 arcade emulator")]
struct Args {
    /// ROM-set identifier (8-character uppercase, e.g. SCUD)
    game: String,

    #[arg(long)]
    fullscreen: bool,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Disable Digital Sound Board emulation
    #[arg(long = "no-dsb")]
    no_dsb: bool,

    /// Disable drive-board force feedback
    #[arg(long = "no-force-feedback")]
    no_force_feedback: bool,

    /// debug, info, error, or all
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Comma-separated: stdout, stderr, syslog, or file names
    #[arg(long = "log-output")]
    log_output: Option<String>,

    /// Music volume percentage (0-200)
    #[arg(long = "music-volume")]
    music_volume: Option<u32>,

    /// Configuration file path
    #[arg(long, default_value = "m3emu.toml")]
    config: PathBuf,

    /// Custom-music table path
    #[arg(long, default_value = "music.toml")]
    music: PathBuf,
}

/// Per-game hardware facts the frontend needs to build a machine. The
/// full game catalog lives outside this core; these entries cover the
/// sets the emulator is exercised with.
struct GameInfo {
    id: &'static str,
    step_id: u8,
    dsb: u8, // 0 = none, 1 = DSB1, 2 = DSB2
    drive_board: bool,
}

const GAMES: &[GameInfo] = &[
    GameInfo { id: "VF3_____", step_id: 0x10, dsb: 0, drive_board: false },
    GameInfo { id: "SCUD____", step_id: 0x15, dsb: 1, drive_board: true },
    GameInfo { id: "LOSTWSGA", step_id: 0x15, dsb: 0, drive_board: false },
    GameInfo { id: "DAYTONA2", step_id: 0x21, dsb: 2, drive_board: true },
    GameInfo { id: "SRALLY2_", step_id: 0x20, dsb: 2, drive_board: true },
];

fn check_cpu_features() -> Result<(), String> {
    #[cfg(target_arch = "x86_64")]
    {
        if !is_x86_feature_detected!("sse2") {
            return Err("SSE2 support is required".into());
        }
    }
    Ok(())
}

/// Assemble ROM images using the conventional per-region file names of an
/// extracted set directory. Archive ingestion and per-game manifests are
/// handled by external tooling.
fn load_roms(set: &RomSet, info: &GameInfo) -> Result<RomBundle, String> {
    let need = |name: &str| -> Result<Vec<u8>, String> {
        set.get(name)
            .map(|d| d.to_vec())
            .ok_or_else(|| format!("missing ROM image '{name}'"))
    };
    let optional = |name: &str| set.get(name).map(|d| d.to_vec()).unwrap_or_default();

    let dsb = match info.dsb {
        1 => DsbKind::Dsb1 { prog: need("dsb_prog.bin")?, mpeg: need("dsb_mpeg.bin")? },
        2 => DsbKind::Dsb2 { prog: need("dsb_prog.bin")?, mpeg: need("dsb_mpeg.bin")? },
        _ => DsbKind::None,
    };

    Ok(RomBundle {
        crom_fixed: need("crom.bin")?,
        crom_banked: optional("crom_banked.bin"),
        vrom: need("vrom.bin")?,
        sound_prog: optional("sound_prog.bin"),
        sound_samples: optional("samples.bin"),
        dsb,
        drive_rom: set.get("drive.bin").map(|d| d.to_vec()),
    })
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Resolve configuration: file first, CLI flags win.
    let mut settings = match config::load(&args.config, &args.game) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if args.fullscreen {
        settings.full_screen = true;
    }
    if let Some(v) = args.width {
        settings.width = v;
    }
    if let Some(v) = args.height {
        settings.height = v;
    }
    if args.no_dsb {
        settings.emulate_dsb = false;
    }
    if args.no_force_feedback {
        settings.force_feedback = false;
    }
    if let Some(v) = args.music_volume {
        if v > 200 {
            eprintln!("error: --music-volume {v} out of range (0-200)");
            return ExitCode::from(EXIT_CONFIG);
        }
        settings.music_volume = v;
    }
    if let Some(v) = &args.log_level {
        settings.log_level = v.clone();
    }
    if let Some(v) = &args.log_output {
        settings.log_output = v.clone();
    }

    // Install the logger before anything that can log.
    let level = match parse_level(&settings.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let outputs: Vec<LogOutput> = settings
        .log_output
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(LogOutput::parse)
        .collect();
    let logger = match MultiLogger::new(level, &outputs) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Err(e) = logger.install() {
        eprintln!("error: {e}");
        return ExitCode::from(EXIT_CONFIG);
    }

    if let Err(e) = check_cpu_features() {
        log::error!("{e}");
        return ExitCode::from(EXIT_CPU);
    }

    let Some(info) = GAMES.iter().find(|g| g.id == args.game) else {
        log::error!("unknown ROM set '{}'", args.game);
        return ExitCode::from(EXIT_ROM);
    };

    let set_dir = PathBuf::from(&settings.rom_path).join(&args.game);
    let rom_set = match RomSet::from_directory(&set_dir) {
        Ok(set) => set,
        Err(e) => {
            log::error!("cannot load ROM set from {}: {e}", set_dir.display());
            return ExitCode::from(EXIT_ROM);
        }
    };
    let roms = match load_roms(&rom_set, info) {
        Ok(roms) => roms,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(EXIT_ROM);
        }
    };

    let machine_config = Model3Config {
        step_id: info.step_id,
        emulate_dsb: settings.emulate_dsb,
        force_feedback: settings.force_feedback && info.drive_board,
        simulate_drive_board: settings.simulate_drive_board,
        steering_strength: settings.steering_strength,
        music_volume: settings.music_volume,
    };
    let mut machine = Model3::new(machine_config, roms);
    machine.set_custom_tracks(music::load_tracks_from(&args.music, &args.game));

    let mut presenter = match video::Presenter::new(settings.width, settings.height) {
        Ok(presenter) => presenter,
        Err(e) => {
            log::error!("video initialization failed: {e}");
            return ExitCode::from(EXIT_VIDEO);
        }
    };

    machine.reset();
    log::info!("starting {}", args.game);

    // Frame loop: emulate, hand the frame's buffers to the presenter, and
    // pace to 60 Hz when the limiter is on.
    let frame_duration = Duration::from_nanos(1_000_000_000 / 60);
    let stop = machine.stop_flag();
    while !stop.is_raised() {
        let frame_start = Instant::now();
        machine.run_frame();
        presenter.present(&machine);
        if settings.fps_limit {
            let elapsed = frame_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }

    ExitCode::SUCCESS
}
