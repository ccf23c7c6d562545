//! `fluidview` demo binary: drives the compositor headlessly on the software
//! device and writes the final frame as a PNG.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fluidview::assets::{AssetSource, DirectoryAssets, EmbeddedAssets, Image};
use fluidview::gpu::SoftwareDevice;
use fluidview::sim::{spawn_sensor_thread, DisplayRotation, ReferenceEngine};
use fluidview::util::frame_timing::FrameTiming;
use fluidview::{FluidError, FrameCompositor, Options};

/// Headless fluid demo: runs the compositor on the software device, tilts
/// gravity through the sensor thread and writes the last frame as a PNG.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML options file; defaults apply to anything it omits.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Frames to render.
    #[arg(long, default_value_t = 240)]
    frames: u32,

    /// Screen size as WIDTHxHEIGHT.
    #[arg(long, default_value = "270x480", value_parser = parse_size)]
    size: (u32, u32),

    /// Add a circle of water every N frames (0 = never).
    #[arg(long, default_value_t = 60)]
    add_water_every: u32,

    /// Load shaders and textures from this directory instead of the
    /// bundled copies.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Where to write the final frame.
    #[arg(long, default_value = "fluid.png")]
    out: PathBuf,

    /// Render as fast as possible instead of pacing frames to the
    /// simulation time step.
    #[arg(long)]
    unpaced: bool,

    /// Write the effective options to this TOML file and exit.
    #[arg(long)]
    save_options: Option<PathBuf>,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s}"))?;
    let w = w.trim().parse().map_err(|e| format!("width: {e}"))?;
    let h = h.trim().parse().map_err(|e| format!("height: {e}"))?;
    Ok((w, h))
}

fn run(args: &Args) -> Result<(), FluidError> {
    let options = match &args.options {
        Some(path) => Options::load(path)?,
        None => Options::default(),
    };
    if let Some(path) = &args.save_options {
        options.save(path)?;
        log::info!("wrote {}", path.display());
        return Ok(());
    }
    let assets: Box<dyn AssetSource> = match &args.assets {
        Some(dir) => Box::new(DirectoryAssets::open(dir)?),
        None => Box::new(EmbeddedAssets),
    };
    let (width, height) = args.size;
    let mut timing = FrameTiming::for_time_step(options.simulation.time_step);

    let mut compositor = FrameCompositor::new(
        SoftwareDevice::new(width, height),
        ReferenceEngine::default(),
        options,
    );
    let mut sensor = spawn_sensor_thread(
        std::sync::Arc::clone(compositor.gateway()),
        DisplayRotation::Deg0,
    )?;

    compositor.on_surface_created(assets.as_ref());
    compositor.on_surface_changed(width, height);
    compositor.start();

    for frame in 0..args.frames {
        if !args.unpaced {
            timing.wait_for_next();
        }
        // Slow side-to-side tilt, as if the device were rocked by hand.
        let phase = frame as f32 / 90.0;
        sensor.submit(-3.0 * phase.sin(), 9.0);

        if args.add_water_every > 0 && frame % args.add_water_every == 0 {
            let added = compositor.add_water();
            log::debug!("frame {frame}: added {added} particles");
        }
        compositor.on_draw_frame();
        timing.end_frame();
        if frame % 60 == 59 {
            log::info!(
                "frame {}: {} particles, {:.1} fps",
                frame + 1,
                compositor.particle_count(),
                timing.fps()
            );
        }
    }
    sensor.shutdown();
    log::info!("rendered {} frames", timing.frames());

    let pixels = compositor.device().read_screen();
    let image = Image::from_rgba(width, height, pixels)
        .ok_or_else(|| FluidError::Image("screen size mismatch".to_owned()))?
        .flipped_vertically();
    let file = File::create(&args.out).map_err(FluidError::Io)?;
    image.write_png(BufWriter::new(file))?;
    log::info!("wrote {}", args.out.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
