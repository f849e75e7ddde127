use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use layerfx::{FilterContext, Frame, Scene};

#[derive(Parser, Debug)]
#[command(name = "layerfx", version)]
struct Cli {
    /// Log filter decisions to stderr (`-v` debug, `-vv` trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Print each layer's filter bounds at a frame.
    Bounds(BoundsArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Composition frame.
    #[arg(long, allow_hyphen_values = true)]
    frame: i64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Device to render on.
    #[arg(long, value_enum, default_value_t = BackendChoice::Soft)]
    backend: BackendChoice,
}

#[derive(Parser, Debug)]
struct BoundsArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Composition frame.
    #[arg(long, allow_hyphen_values = true)]
    frame: i64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Soft,
    Gpu,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Bounds(args) => cmd_bounds(args),
    }
}

fn make_context(choice: BackendChoice, scene: &Scene) -> anyhow::Result<FilterContext> {
    let gpu: Box<dyn layerfx::Gpu> = match choice {
        BackendChoice::Soft => Box::new(layerfx::SoftGpu::new()),
        #[cfg(feature = "gpu")]
        BackendChoice::Gpu => Box::new(layerfx::gpu::wgpu_device::WgpuGpu::new()?),
        #[cfg(not(feature = "gpu"))]
        BackendChoice::Gpu => anyhow::bail!("layerfx was built without the `gpu` feature"),
    };
    Ok(FilterContext::with_settings(gpu, scene.settings.clone()))
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let scene = Scene::load(&args.in_path)
        .with_context(|| format!("load scene '{}'", args.in_path.display()))?;
    let mut ctx = make_context(args.backend, &scene)?;

    let frame = layerfx::render_scene(&scene, Frame(args.frame), &mut ctx)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.to_straight_alpha(),
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    let stats = ctx.gpu_stats();
    eprintln!(
        "wrote {} ({} draws, {} programs)",
        args.out.display(),
        stats.draws,
        stats.programs_compiled
    );
    Ok(())
}

fn cmd_bounds(args: BoundsArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read scene '{}'", args.in_path.display()))?;
    let scene = Scene::from_json(&text).with_context(|| "parse scene JSON")?;

    for (name, r) in layerfx::measure_scene(&scene, Frame(args.frame)) {
        println!("{name}\t{} {} {} {}", r.x0, r.y0, r.x1, r.y1);
    }
    Ok(())
}
