//! Frame trace - records pipeline frames and prints what they contain.
//!
//! Usage: cargo run --bin frame_trace -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Pipeline config JSON (default: built-in defaults)
//!   --aa <MODE>       none, fxaa, smaa, taa, fsr1, fsr3, dlss, xess
//!   --frames <N>      Frames to record (default: 3)
//!   --width <W>       Display width (default: 1920)
//!   --height <H>      Display height (default: 1080)
//!   --stereo <MODE>   mono, multipass, instanced, doublewide (default: mono)
//!   --save <PATH>     Write the effective config back out
//!   --dump            Print every command of the last frame
//!   --gpu             Back the frames with a headless wgpu device

use postfx::core::logging;
use postfx::render::{CommandSequence, GpuCaps, GpuContext, SurfaceCache};
use postfx::{Antialiasing, PipelineConfig, PostProcessPipeline, StereoMode, View};

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> postfx::core::Result<()> {
    let mut config = match parse_str_arg(args, "--config") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(mode) = parse_str_arg(args, "--aa") {
        config.antialiasing = parse_antialiasing(&mode)
            .ok_or_else(|| postfx::Error::Config(format!("unknown antialiasing mode '{}'", mode)))?;
    }
    if let Some(path) = parse_str_arg(args, "--save") {
        config.save(&path)?;
        println!("Config written to {}", path);
    }

    let frames = parse_u32_arg(args, "--frames").unwrap_or(3).max(1);
    let width = parse_u32_arg(args, "--width").unwrap_or(1920);
    let height = parse_u32_arg(args, "--height").unwrap_or(1080);
    let stereo = match parse_str_arg(args, "--stereo").as_deref() {
        None | Some("mono") => StereoMode::Mono,
        Some("multipass") => StereoMode::MultiPass,
        Some("instanced") => StereoMode::SinglePassInstanced,
        Some("doublewide") => StereoMode::SinglePassDoubleWide,
        Some(other) => return Err(postfx::Error::Config(format!("unknown stereo mode '{}'", other))),
    };

    let gpu = if has_flag(args, "--gpu") { Some(GpuContext::headless_blocking()?) } else { None };
    let caps = gpu.as_ref().map_or_else(GpuCaps::default, |g| g.caps);
    let mut cache = SurfaceCache::new();

    println!("=== Postfx Frame Trace ===");
    println!("Display: {}x{} ({:?})", width, height, stereo);
    println!("Antialiasing: {}", config.antialiasing.name());
    println!("Caps: {:?}", caps);
    println!();

    let mut pipeline = PostProcessPipeline::new(config, caps);
    let mut view = View::stereo(width, height, 60.0, stereo);
    let mut last = CommandSequence::new();

    for frame in 0..frames {
        let cmd = pipeline.render_frame(&mut view, frame as f64 / 60.0);
        if let Err(e) = cmd.validate() {
            log::error!("frame {} failed validation: {}", frame, e);
        }
        if let Some(gpu) = &gpu {
            cache.execute(gpu, &cmd);
        }
        println!(
            "frame {:>3}: {:>4} commands, {:>2} temporaries, blits {:?}, dispatches {:?}",
            frame,
            cmd.len(),
            cmd.temporaries_requested(),
            cmd.blit_shaders(),
            cmd.dispatch_kernels(),
        );
        last = cmd;
    }

    if let Some(selection) = pipeline.selection() {
        println!();
        println!("Requested {} -> running {}", selection.requested.name(), selection.effective.name());
    }
    println!("Mip bias: {:.3}", pipeline.mip_bias().current());

    if has_flag(args, "--dump") {
        println!();
        for (i, command) in last.commands().iter().enumerate() {
            println!("{:>4} {:?}", i, command);
        }
    }

    let teardown = pipeline.release();
    if let Some(gpu) = &gpu {
        cache.execute(gpu, &teardown);
        println!("GPU textures created: {}", cache.textures_created());
        cache.clear();
    }
    Ok(())
}

fn parse_antialiasing(name: &str) -> Option<Antialiasing> {
    let mode = match name.to_ascii_lowercase().as_str() {
        "none" => Antialiasing::None,
        "fxaa" => Antialiasing::Fxaa,
        "smaa" => Antialiasing::Smaa,
        "taa" => Antialiasing::Taa,
        "fsr1" => Antialiasing::Fsr1,
        "fsr3" => Antialiasing::Fsr3,
        "dlss" => Antialiasing::Dlss,
        "xess" => Antialiasing::Xess,
        _ => return None,
    };
    Some(mode)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
