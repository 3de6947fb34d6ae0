//! CarXplain CLI
//!
//! Vehicle classification with Grad-CAM explanations, live sessions and PDF
//! reports, built on the Burn framework.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use carxplain::backend::{backend_name, default_device, ExplainBackend};
use carxplain::config::AppConfig;
use carxplain::explain::compositor::check_blend_strength;
use carxplain::inference::{analyze_image, compare_models, load_image, HeatmapOutcome, Predictor};
use carxplain::model::cnn::DEFAULT_NUM_CLASSES;
use carxplain::model::registry::init_model_files;
use carxplain::model::{ClassLabels, ModelCache, ModelRegistry};
use carxplain::report::{
    analysis_report, analysis_report_file_name, comparison_report, comparison_report_file_name,
    session_report, session_report_file_name, write_report,
};
use carxplain::session::{
    run_live_session, DirectoryFrameSource, FrameSource, LiveSession, SessionHistory,
};
use carxplain::utils::charts::{
    confidence_comparison_chart, detections_by_model_chart, probability_distribution_chart,
    write_svg,
};
use carxplain::utils::logging::{init_logging, LogConfig, StageTimer};
use carxplain::utils::{format_confidence_bar, format_duration};

/// Vehicle classification with visual explanations
#[derive(Parser, Debug)]
#[command(name = "carxplain")]
#[command(version)]
#[command(about = "Vehicle classification with Grad-CAM explanations", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, default_value = "false")]
    quiet: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify one image and explain the prediction with a heatmap
    Analyze {
        /// Path to the input image
        #[arg(short, long)]
        input: PathBuf,

        /// Model name from the catalog
        #[arg(short, long, default_value = "EfficientNet-B4")]
        model: String,

        /// Heatmap opacity in (0, 1); overrides the configuration
        #[arg(short, long)]
        blend: Option<f32>,

        /// Skip the PDF report
        #[arg(long, default_value = "false")]
        no_report: bool,

        /// Also write the result summary as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run every catalogued model on one image
    Compare {
        /// Path to the input image
        #[arg(short, long)]
        input: PathBuf,

        /// Skip the PDF report
        #[arg(long, default_value = "false")]
        no_report: bool,
    },

    /// Run a live session over a directory of frames
    Live {
        /// Directory of frames, read in file-name order
        #[arg(short, long)]
        frames: PathBuf,

        /// Model name from the catalog
        #[arg(short, long, default_value = "EfficientNet-B4")]
        model: String,

        /// Detection confidence threshold (0.0-1.0)
        #[arg(long)]
        threshold: Option<f32>,

        /// Classify one frame out of every N
        #[arg(long)]
        skip_frames: Option<usize>,

        /// Session time limit in seconds
        #[arg(long)]
        limit: Option<u64>,
    },

    /// List a model's layers and the layer used for explanations
    Layers {
        /// Model name from the catalog
        #[arg(short, long, default_value = "EfficientNet-B4")]
        model: String,
    },

    /// Write randomly initialised weights for every catalogued model
    InitModels {
        /// Number of output classes
        #[arg(short, long, default_value_t = DEFAULT_NUM_CLASSES)]
        num_classes: usize,

        /// Overwrite existing weight files
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_flags(cli.verbose, cli.quiet);
    let _ = init_logging(&log_config);

    print_banner();

    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Analyze {
            input,
            model,
            blend,
            no_report,
            json,
        } => {
            cmd_analyze(&config, &input, &model, blend, !no_report, json)?;
        }

        Commands::Compare { input, no_report } => {
            cmd_compare(&config, &input, !no_report)?;
        }

        Commands::Live {
            frames,
            model,
            threshold,
            skip_frames,
            limit,
        } => {
            let mut config = config;
            if let Some(threshold) = threshold {
                config.live.confidence_threshold = threshold;
            }
            if let Some(skip_frames) = skip_frames {
                config.live.skip_frames = skip_frames;
            }
            if let Some(limit) = limit {
                config.live.session_limit_secs = limit;
            }
            config.validate()?;
            cmd_live(&config, &frames, &model)?;
        }

        Commands::Layers { model } => {
            cmd_layers(&config, &model)?;
        }

        Commands::InitModels { num_classes, force } => {
            cmd_init_models(&config, num_classes, force)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   CarXplain                                                      ║
 ║   Vehicle Classification with Grad-CAM Explanations              ║
 ║   Burn + Rust                                                    ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .cyan()
    );
}

fn registry(config: &AppConfig) -> ModelRegistry<ExplainBackend> {
    ModelRegistry::new(
        config.models_dir.clone(),
        config.models.clone(),
        Arc::new(ModelCache::new()),
        default_device(),
    )
}

fn predictor(config: &AppConfig) -> Predictor {
    Predictor::new(ClassLabels::load_or_generic(&config.labels_path)).with_top_k(config.top_k)
}

fn input_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

fn cmd_analyze(
    config: &AppConfig,
    input: &Path,
    model: &str,
    blend: Option<f32>,
    with_report: bool,
    json: bool,
) -> Result<()> {
    let blend = blend.unwrap_or(config.blend_strength);
    check_blend_strength(blend)?;

    println!("{}", "Analysis Configuration:".cyan().bold());
    println!("  Input:   {}", input.display());
    println!("  Model:   {}", model);
    println!("  Blend:   {:.2}", blend);
    println!("  Backend: {}", backend_name());
    println!();

    let image = load_image(input)?;
    let registry = registry(config);
    let loaded = {
        let timer = StageTimer::start("model load");
        let loaded = registry.get(model)?;
        timer.finish();
        loaded
    };
    let predictor = predictor(config);

    let timer = StageTimer::start("analysis");
    let result = analyze_image(&*loaded, &predictor, &image, blend)?;
    let elapsed = timer.finish();

    println!("{}", "Prediction:".cyan().bold());
    println!("  {}", result.prediction.display());
    for ranked in &result.prediction.top_k {
        println!(
            "  {:<32} {}",
            ranked.class_name,
            format_confidence_bar(ranked.confidence, 20)
        );
    }
    println!();
    println!("{}", result.explanation_text());
    println!("  Completed in {}", format_duration(elapsed.as_secs_f64()));
    println!();

    let stem = input_stem(input);
    std::fs::create_dir_all(&config.output_dir)?;

    match &result.heatmap {
        HeatmapOutcome::Rendered { png, .. } => {
            let path = config.output_dir.join(format!("{}_gradcam.png", stem));
            std::fs::write(&path, png)?;
            println!("{} {}", "Heatmap:".green(), path.display());
        }
        HeatmapOutcome::Unavailable { reason } => {
            println!("{} {}", "Heatmap unavailable:".yellow(), reason);
        }
    }

    let chart = config.output_dir.join(format!("{}_probabilities.svg", stem));
    write_svg(&probability_distribution_chart(&result.prediction), &chart)?;
    println!("{} {}", "Chart:".green(), chart.display());

    if json {
        let path = config.output_dir.join(format!("{}_analysis.json", stem));
        std::fs::write(&path, serde_json::to_string_pretty(&result.summary())?)?;
        println!("{} {}", "Summary:".green(), path.display());
    }

    if with_report {
        let bytes = analysis_report(&result)?;
        let path = write_report(&config.output_dir, &analysis_report_file_name(Local::now()), &bytes)?;
        println!("{} {}", "Report:".green(), path.display());
    }

    Ok(())
}

fn cmd_compare(config: &AppConfig, input: &Path, with_report: bool) -> Result<()> {
    println!("{}", "Model Comparison:".cyan().bold());
    println!("  Input:   {}", input.display());
    println!("  Models:  {}", config.models.len());
    println!("  Backend: {}", backend_name());
    println!();

    let image = load_image(input)?;
    let registry = registry(config);
    let predictor = predictor(config);

    let result = compare_models(&registry, &predictor, &image)?;

    println!(
        "  {:<20} {:<32} {:>10} {:>10}",
        "MODEL".bold(),
        "PREDICTED CLASS".bold(),
        "CONFIDENCE".bold(),
        "TIME".bold()
    );
    for entry in &result.entries {
        let p = &entry.prediction;
        println!(
            "  {:<20} {:<32} {:>10} {:>8.1}ms",
            p.model_name,
            p.class_name,
            p.confidence_label(),
            p.inference_time_ms
        );
    }
    for skipped in &result.skipped {
        println!(
            "  {:<20} {}",
            skipped.model_name,
            format!("skipped: {}", skipped.reason).yellow()
        );
    }
    println!();

    if let Some(winner) = result.winner() {
        println!(
            "{} {} ({})",
            "Most confident:".green().bold(),
            winner.prediction.model_name,
            winner.prediction.confidence_label()
        );
    }
    if result.entries.len() > 1 {
        let verdict = if result.is_unanimous() {
            "all models agree".green()
        } else {
            "models disagree".yellow()
        };
        println!("  {}", verdict);
    }

    let chart = config
        .output_dir
        .join(format!("{}_comparison.svg", input_stem(input)));
    write_svg(&confidence_comparison_chart(&result), &chart)?;
    println!("{} {}", "Chart:".green(), chart.display());

    if with_report {
        let bytes = comparison_report(&image, &result)?;
        let path = write_report(&config.output_dir, &comparison_report_file_name(Local::now()), &bytes)?;
        println!("{} {}", "Report:".green(), path.display());
    }

    Ok(())
}

fn cmd_live(config: &AppConfig, frames: &Path, model: &str) -> Result<()> {
    let mut source = DirectoryFrameSource::open(frames)?;
    if source.is_empty() {
        bail!("no frames found in {}", frames.display());
    }

    println!("{}", "Live Session:".cyan().bold());
    println!("  Source:    {} ({} frames)", source.name(), source.len());
    println!("  Model:     {}", model);
    println!("  Threshold: {:.2}", config.live.confidence_threshold);
    println!("  Skip:      every {} frames", config.live.skip_frames);
    println!("  Limit:     {}s", config.live.session_limit_secs);
    println!();

    let registry = registry(config);
    let loaded = registry.get(model)?;
    let predictor = predictor(config);

    let mut session = LiveSession::new(loaded.name.clone(), config.live.clone())?;
    session.start(Instant::now())?;
    run_live_session(&mut source, &mut session, |frame| {
        predictor.predict(&*loaded, frame)
    })?;

    let history_path = config.output_dir.join("session_history.json");
    let mut history = if history_path.exists() {
        let json = std::fs::read_to_string(&history_path)?;
        SessionHistory::from_json(&json)
            .with_context(|| format!("corrupt session history {}", history_path.display()))?
    } else {
        SessionHistory::new()
    };

    let record = session.end_and_save(Instant::now(), &mut history).clone();
    std::fs::create_dir_all(&config.output_dir)?;
    std::fs::write(&history_path, history.to_json()?)?;

    println!("{}", "Session Summary:".cyan().bold());
    println!("  Duration:   {}", format_duration(record.duration_secs));
    println!("  Frames:     {}", record.frames_count);
    println!("  Avg FPS:    {:.1}", record.avg_fps());
    println!("  Detections: {}", record.detection_count());
    match &record.best_detection {
        Some(best) => println!(
            "  Best:       {} ({:.2}%) at {}",
            best.class_name,
            best.confidence * 100.0,
            best.time
        ),
        None => println!("  Best:       {}", "no confident detection".yellow()),
    }
    println!();

    let chart = config
        .output_dir
        .join(format!("session_{}_detections.svg", record.id));
    write_svg(&detections_by_model_chart(&record), &chart)?;

    let bytes = session_report(&record)?;
    let path = write_report(&config.output_dir, &session_report_file_name(Local::now()), &bytes)?;
    info!("Session #{} saved to {:?}", record.id, history_path);
    println!("{} {}", "Report:".green(), path.display());
    println!("{} {}", "History:".green(), history_path.display());

    Ok(())
}

fn cmd_layers(config: &AppConfig, model: &str) -> Result<()> {
    let registry = registry(config);
    let loaded = registry.get(model)?;

    println!(
        "{} {} ({})",
        "Model:".cyan().bold(),
        loaded.name,
        loaded.profile.architecture
    );
    println!(
        "  Input: {}x{}  Classes: {}",
        loaded.profile.input_size,
        loaded.profile.input_size,
        loaded.classifier.num_classes()
    );
    println!();

    for (index, layer) in loaded.classifier.layers().iter().enumerate() {
        let marker = match &loaded.spatial_layer {
            Some(handle) if handle.index == index => "<- Grad-CAM".green().to_string(),
            _ => String::new(),
        };
        println!(
            "  {:>3}  {:<16} {:<20} {}",
            index,
            layer.name,
            format!("{:?}", layer.output_shape),
            marker
        );
    }
    println!();

    match loaded.spatial_layer() {
        Ok(handle) => println!("{} {}", "Explained layer:".green(), handle),
        Err(e) => println!("{} {}", "Not explainable:".yellow(), e),
    }

    Ok(())
}

fn cmd_init_models(config: &AppConfig, num_classes: usize, force: bool) -> Result<()> {
    std::fs::create_dir_all(&config.models_dir)?;
    let device = default_device();

    println!("{}", "Initialising model files:".cyan().bold());
    for entry in &config.models {
        let target = config.models_dir.join(&entry.file);
        if target.exists() && !force {
            println!("  {:<20} {}", entry.name, "exists, skipped".yellow());
            continue;
        }
        let path = init_model_files::<ExplainBackend>(entry, &config.models_dir, num_classes, &device)?;
        println!("  {:<20} {}", entry.name, path.display());
    }

    Ok(())
}
