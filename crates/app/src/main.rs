use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use jujube_core::{
    AppConfig, AudioBackend, Chart, GameplayLoop, JujubeError, MusicTime, PanelLayout, Presenter,
    RenderFrame, ScoreSnapshot, ScriptedInput, SimulatedBackend, TimeSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> jujube_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            chart,
            audio,
            config,
            autoplay_offset_ms,
            fps,
        } => run_play(&chart, audio.as_deref(), &config, autoplay_offset_ms, fps),
        Commands::DefaultConfig { output } => run_default_config(&output),
    }
}

fn run_play(
    chart_path: &Path,
    audio: Option<&Path>,
    config_path: &Path,
    autoplay_offset_ms: f64,
    fps: u32,
) -> jujube_core::Result<()> {
    let config = AppConfig::load_or_default(config_path);
    let chart = Chart::load(chart_path)?;
    tracing::info!(
        chart = %chart_path.display(),
        level = chart.level,
        notes = chart.notes.len(),
        "loaded chart"
    );

    let mut session = match audio {
        Some(path) => {
            let length = chart.time_bounds().end
                + config.timing.windows.miss_window()
                + MusicTime::from_millis(1_000);
            let backend = SimulatedBackend::new(
                length.to_duration(),
                config.audio.simulated_buffer.to_duration(),
            );
            let audio = Some((&backend as &dyn AudioBackend, path));
            match GameplayLoop::with_audio(&chart, audio, &config) {
                Ok(session) => session,
                Err(err @ JujubeError::MediaOpen { .. }) => {
                    tracing::warn!(%err, "playing without audio");
                    let clock = TimeSource::from(GameplayLoop::silent_clock(&chart, &config));
                    GameplayLoop::new(&chart, clock, &config)?
                }
                Err(err) => return Err(err),
            }
        }
        None => GameplayLoop::with_audio(&chart, None, &config)?,
    };

    let mut input = ScriptedInput::autoplay(
        chart.notes.iter().map(|note| (note.timing, note.position)),
        &config.key_mapping,
        MusicTime::from_millis_f64(autoplay_offset_ms),
    );
    let mut presenter = LogPresenter::new(fps, config.layout.clone());
    let score = session.run(&mut input, &mut presenter)?;
    tracing::debug!(frames = presenter.frames, "render activity stopped");

    print_score(&score);
    Ok(())
}

fn run_default_config(output: &Path) -> jujube_core::Result<()> {
    tracing::info!(?output, "writing default preferences");
    AppConfig::default().save(output)
}

fn print_score(score: &ScoreSnapshot) {
    println!("PERFECT {:>5}", score.perfect);
    println!("GREAT   {:>5}", score.great);
    println!("GOOD    {:>5}", score.good);
    println!("POOR    {:>5}", score.poor);
    println!("MISS    {:>5}", score.miss);
    println!("judged {}/{}", score.judged(), score.total_notes);
    if let Some(mean) = score.mean_error {
        println!("mean error {mean}");
    }
}

/// Headless presenter: paces the render activity and logs what it would draw.
struct LogPresenter {
    frame_time: Duration,
    layout: PanelLayout,
    frames: u64,
}

impl LogPresenter {
    fn new(fps: u32, layout: PanelLayout) -> Self {
        Self {
            frame_time: Duration::from_secs(1) / fps.max(1),
            layout,
            frames: 0,
        }
    }
}

impl Presenter for LogPresenter {
    fn present(&mut self, frame: &RenderFrame<'_>) {
        self.frames += 1;
        for event in frame.judgments {
            let (x, y) = self.layout.panel_origin(event.position);
            tracing::debug!(
                index = event.index,
                position = %event.position,
                x,
                y,
                judgment = ?event.result.judgment,
                error = %event.result.error,
                "judged"
            );
        }
        tracing::trace!(
            music_time = %frame.music_time,
            sprites = frame.sprites.len(),
            highlights = frame.highlights.len(),
            "frame"
        );
        std::thread::sleep(self.frame_time);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless jubeat-style rhythm game", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a chart with autoplay input and print the final score.
    Play {
        /// Path to the chart JSON file.
        chart: PathBuf,
        /// Audio track to time the session against.
        #[arg(short, long)]
        audio: Option<PathBuf>,
        /// Preferences file; defaults are used when it is missing.
        #[arg(short, long, default_value = "preferences.json")]
        config: PathBuf,
        /// Delay applied to every autoplay press, in milliseconds.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        autoplay_offset_ms: f64,
        /// Frame rate of the headless presenter.
        #[arg(long, default_value_t = 60)]
        fps: u32,
    },
    /// Write the default preferences to a file.
    DefaultConfig {
        /// Output path for the preferences JSON.
        output: PathBuf,
    },
}
