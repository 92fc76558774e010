use anyhow::{bail, Context};
use cafescene_common::SceneConfig;
use cafescene_kernel::{FrameLoop, Stage};
use cafescene_render::{DebugTextRenderer, DrawList, Renderer};
use cafescene_scene::{LabelPainter, LabelSpec, NodeId};
use cafescene_tools::SceneInspector;
use clap::{Parser, Subcommand};
use std::fmt::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cafescene-cli", about = "Headless tools for the coffee shop scene")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Run the frame loop headless and check the animation invariants
    Simulate {
        /// Number of frames to run
        #[arg(short, long, default_value = "600")]
        frames: u64,
        /// Seconds per frame, before clamping
        #[arg(long, default_value = "0.016666668")]
        dt: f32,
        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rasterize a label texture to a PNG file
    Label {
        #[arg(short, long)]
        text: String,
        #[arg(short, long)]
        subtitle: Option<String>,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long, default_value = "1024")]
        width: u32,
        #[arg(long, default_value = "256")]
        height: u32,
    },
    /// Print the debug text rendering of the initial scene
    Inspect {
        /// Show one node and its direct children instead
        #[arg(short, long)]
        node: Option<String>,
    },
}

/// Invariants a running stage must hold, as human-readable violations.
fn check_invariants(stage: &Stage, config: &SceneConfig) -> Vec<String> {
    let mut violations = Vec::new();

    let out_of_band = stage.out_of_band();
    if out_of_band > 0 {
        violations.push(format!("{out_of_band} entities outside their vertical band"));
    }

    for light in stage.lights.lights() {
        let (lo, hi) = light.intensity_range();
        let v = light.intensity();
        if v < lo - 1e-4 || v > hi + 1e-4 {
            violations.push(format!(
                "light {} intensity {v} outside [{lo}, {hi}]",
                light.name
            ));
        }
    }

    let distance = stage.camera.distance();
    let (min, max) = (config.camera.min_distance, config.camera.max_distance);
    if distance < min - 1e-4 || distance > max + 1e-4 {
        violations.push(format!("camera distance {distance} outside [{min}, {max}]"));
    }

    violations
}

/// Banner-style layout for one or two lines.
fn label_spec(config: &SceneConfig, text: &str, subtitle: Option<&str>, width: u32, height: u32) -> LabelSpec {
    let signage = &config.signage;
    match subtitle {
        None => LabelSpec::single(
            text,
            signage.title_size,
            signage.title_color,
            signage.background,
            width,
            height,
        ),
        Some(subtitle) => {
            let mut signage = signage.clone();
            signage.title = text.to_owned();
            signage.subtitle = subtitle.to_owned();
            signage.banner_width = width;
            signage.banner_height = height;
            LabelSpec::banner(&signage)
        }
    }
}

/// Debug text for the whole stage, or one node followed by its children.
fn inspect(stage: &Stage, node: Option<&str>) -> anyhow::Result<String> {
    let Some(name) = node else {
        let frame = DrawList::collect(stage);
        return Ok(DebugTextRenderer::verbose().render(stage, &frame));
    };
    let Some(info) = SceneInspector::inspect_node(stage, name) else {
        bail!("no node named {name:?}");
    };
    let mut out = format!("{info}\n");
    for &child in &info.children {
        if let Some(child) = SceneInspector::node_info(stage, NodeId(child)) {
            let _ = writeln!(out, "  {child}");
        }
    }
    Ok(out)
}

fn simulate(config: &SceneConfig, frames: u64, dt: f32) -> (Stage, Vec<String>) {
    let mut stage = Stage::from_config(config);
    let mut frame_loop = FrameLoop::new(config.max_frame_delta);
    let mut violations = Vec::new();
    for _ in 0..frames {
        if frame_loop.tick_by(&mut stage, dt).is_none() {
            break;
        }
        for v in check_invariants(&stage, config) {
            violations.push(format!("frame {}: {v}", stage.clock.frame()));
        }
    }
    frame_loop.stop();
    (stage, violations)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = match &cli.config {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            let stage = Stage::from_config(&config);
            println!("cafescene-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("{}", SceneInspector::summary(&stage));
            println!("roots: {}", SceneInspector::roots(&stage).join(", "));
            println!("model: {}", config.model.path.display());
        }
        Commands::Simulate { frames, dt, json } => {
            let (stage, violations) = simulate(&config, frames, dt);
            let summary = SceneInspector::summary(&stage);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
            }
            if !violations.is_empty() {
                for v in violations.iter().take(20) {
                    eprintln!("{v}");
                }
                bail!("{} invariant violations over {frames} frames", violations.len());
            }
            tracing::info!(frames, "all invariants held");
        }
        Commands::Label {
            text,
            subtitle,
            out,
            width,
            height,
        } => {
            let painter = LabelPainter::from_config(&config.signage);
            let spec = label_spec(&config, &text, subtitle.as_deref(), width, height);
            let image = painter.paint(&spec);
            image
                .save(&out)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {}x{} label to {}", image.width(), image.height(), out.display());
        }
        Commands::Inspect { node } => {
            let stage = Stage::from_config(&config);
            print!("{}", inspect(&stage, node.as_deref())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SceneConfig {
        let mut config = SceneConfig::default();
        config.snow.count = 200;
        config
    }

    #[test]
    fn default_simulation_holds_invariants() {
        let (stage, violations) = simulate(&config(), 300, 1.0 / 60.0);
        assert!(violations.is_empty(), "{violations:?}");
        assert_eq!(stage.clock.frame(), 300);
    }

    #[test]
    fn huge_steps_are_clamped_and_stay_in_band() {
        let (stage, violations) = simulate(&config(), 50, 1000.0);
        assert!(violations.is_empty(), "{violations:?}");
        assert!((stage.clock.elapsed() - 50_000.0).abs() < 1e-1);
    }

    #[test]
    fn zoomed_out_camera_is_reported() {
        let config = config();
        let mut stage = Stage::from_config(&config);
        assert!(check_invariants(&stage, &config).is_empty());
        let mut tighter = config.clone();
        tighter.camera.max_distance = stage.camera.distance() - 1.0;
        stage.advance(0.1);
        let violations = check_invariants(&stage, &tighter);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("camera distance"));
    }

    #[test]
    fn inspect_lists_a_node_and_its_children() {
        let stage = Stage::new(&config(), &LabelPainter::bitmap());
        let out = inspect(&stage, Some("counter")).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("\"counter\" group children=3"));
        assert!(lines[1].trim_start().contains("\"counter_top\" mesh"));

        let out = inspect(&stage, None).unwrap();
        assert!(out.contains("mesh counter_top"));
        assert!(inspect(&stage, Some("jukebox")).is_err());
    }

    #[test]
    fn label_layouts() {
        let config = SceneConfig::default();
        let single = label_spec(&config, "OPEN", None, 256, 64);
        assert_eq!(single.lines.len(), 1);
        assert_eq!((single.width, single.height), (256, 64));

        let banner = label_spec(&config, "COFFEE", Some("since 1998"), 512, 128);
        assert_eq!(banner.lines.len(), 2);
        assert_eq!(banner.lines[1].text, "since 1998");
        assert!(banner.lines[0].baseline < banner.lines[1].baseline);
    }
}
