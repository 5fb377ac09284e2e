#![deny(warnings)]

use anyhow::Context;
use bedtime_core::config::{
    resolve_api_key, resolve_string_with_default, ApiKeys, AppConfig, Endpoints, Env, StdEnv,
    SyncTuning, WeightTuning, DEFAULT_CHARS_PER_WEIGHT_UNIT, DEFAULT_CLAUSE_PAUSE,
    DEFAULT_ELEVENLABS_BASE_URL, DEFAULT_MIN_WORD_WEIGHT, DEFAULT_OPENAI_BASE_URL,
    DEFAULT_QUOTE_PAUSE, DEFAULT_SENTENCE_PAUSE, DEFAULT_SPEECH_START_OFFSET_SECS,
    ENV_ELEVENLABS_API_KEY, ENV_ELEVENLABS_BASE_URL, ENV_OPENAI_API_KEY, ENV_OPENAI_BASE_URL,
};
use bedtime_core::decode::probe_duration;
use bedtime_core::karaoke::{KaraokeSession, WordState};
use bedtime_core::library::{audio_file_name, InMemoryStore, StoryStore};
use bedtime_core::playback::{PlaybackControl, PlaybackEvent, PlaybackSink, SimulatedPlaybackSink};
use bedtime_core::service::StoryService;
use bedtime_core::story::{
    AgeGroup, GeneratedStory, OpenAiStoryGenerator, StoryGenerator, StoryRequest, DEFAULT_TITLE,
};
use bedtime_core::tts::{
    default_voice, ElevenLabsClient, TtsAudio, TtsClient, TtsRequest, VoiceCloner, VoiceId,
    VoiceSample, VoiceSettings,
};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bedtime")]
#[command(about = "Bedtime stories with narrated, word-by-word highlighted playback")]
struct Cli {
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true)]
    openai_api_key: Option<String>,

    #[arg(long, global = true)]
    elevenlabs_api_key: Option<String>,

    /// Seconds of leading silence before the narrator's first word.
    #[arg(long, global = true, default_value_t = DEFAULT_SPEECH_START_OFFSET_SECS)]
    speech_start_offset: f64,

    /// Weight of any word shorter than one weight unit.
    #[arg(long, global = true, default_value_t = DEFAULT_MIN_WORD_WEIGHT)]
    min_word_weight: f64,

    #[arg(long, global = true, default_value_t = DEFAULT_CHARS_PER_WEIGHT_UNIT)]
    chars_per_weight_unit: f64,

    /// Extra weight after `.`, `!` or `?`.
    #[arg(long, global = true, default_value_t = DEFAULT_SENTENCE_PAUSE)]
    sentence_pause: f64,

    /// Extra weight after `,`, `;` or `:`.
    #[arg(long, global = true, default_value_t = DEFAULT_CLAUSE_PAUSE)]
    clause_pause: f64,

    #[arg(long, global = true, default_value_t = DEFAULT_QUOTE_PAUSE)]
    quote_pause: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a new story from a prompt.
    Generate {
        #[arg(long)]
        prompt: String,

        #[arg(long)]
        child_name: Option<String>,

        #[arg(long, default_value_t = AgeGroup::Preschool)]
        age_group: AgeGroup,

        /// Story JSON output; printed to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also narrate the story with the stock voice and write the audio here.
        #[arg(long)]
        audio_out: Option<PathBuf>,
    },

    /// Render a story to speech.
    Narrate {
        #[arg(long)]
        story_file: PathBuf,

        #[arg(long)]
        voice_id: Option<String>,

        /// Defaults to a file named after the story title.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Play narration and highlight each word as it is spoken.
    Karaoke {
        #[arg(long)]
        story_file: PathBuf,

        #[arg(long)]
        audio_file: PathBuf,

        /// Drive the highlight from a wall clock instead of an audio device.
        #[arg(long, default_value_t = false)]
        no_audio: bool,

        #[arg(long)]
        output_device: Option<String>,
    },

    /// Print the estimated word timeline of a story as JSON.
    Timeline {
        #[arg(long)]
        story_file: PathBuf,
    },

    /// Manage cloned narrator voices.
    Voices {
        #[command(subcommand)]
        command: VoicesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum VoicesCommand {
    List,
    Clone {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long = "sample", required = true)]
        samples: Vec<PathBuf>,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let env = StdEnv;
    let cfg = build_config(&cli, &env)?;

    tracing::debug!(
        speech_start_offset_secs = cfg.sync.speech_start_offset_secs,
        openai = cfg.api_keys.openai.is_some(),
        elevenlabs = cfg.api_keys.elevenlabs.is_some(),
        "config loaded"
    );

    match cli.command {
        Command::Generate {
            prompt,
            child_name,
            age_group,
            out,
            audio_out,
        } => {
            let request = StoryRequest::new(prompt, child_name, age_group)?;
            run_generate(&cfg, request, out, audio_out).await
        }
        Command::Narrate {
            story_file,
            voice_id,
            out,
        } => run_narrate(&cfg, &story_file, voice_id, out).await,
        Command::Karaoke {
            story_file,
            audio_file,
            no_audio,
            output_device,
        } => run_karaoke(&cfg, &story_file, &audio_file, no_audio, output_device).await,
        Command::Timeline { story_file } => {
            let story = read_story(&story_file).await?;
            let session = KaraokeSession::new(&story.content, cfg.sync)?;
            println!("{}", serde_json::to_string_pretty(session.timeline())?);
            Ok(())
        }
        Command::Voices { command } => run_voices(&cfg, command).await,
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(cli: &Cli, env: &impl Env) -> anyhow::Result<AppConfig> {
    let openai = resolve_api_key(cli.openai_api_key.clone(), ENV_OPENAI_API_KEY, env)?;
    let elevenlabs = resolve_api_key(cli.elevenlabs_api_key.clone(), ENV_ELEVENLABS_API_KEY, env)?;

    let endpoints = Endpoints {
        openai_base_url: resolve_string_with_default(
            None,
            ENV_OPENAI_BASE_URL,
            env,
            DEFAULT_OPENAI_BASE_URL,
        ),
        elevenlabs_base_url: resolve_string_with_default(
            None,
            ENV_ELEVENLABS_BASE_URL,
            env,
            DEFAULT_ELEVENLABS_BASE_URL,
        ),
    };

    let weights = WeightTuning {
        min_weight: cli.min_word_weight,
        chars_per_unit: cli.chars_per_weight_unit,
        sentence_pause: cli.sentence_pause,
        clause_pause: cli.clause_pause,
        quote_pause: cli.quote_pause,
    };
    let sync = SyncTuning::new(weights, cli.speech_start_offset)?;

    Ok(AppConfig {
        api_keys: ApiKeys { openai, elevenlabs },
        endpoints,
        sync,
    })
}

fn story_generator(cfg: &AppConfig) -> anyhow::Result<OpenAiStoryGenerator> {
    let key = cfg.require_openai()?;
    Ok(OpenAiStoryGenerator::new(key.expose().to_owned())
        .with_base_url(cfg.endpoints.openai_base_url.clone()))
}

fn elevenlabs_client(cfg: &AppConfig) -> anyhow::Result<ElevenLabsClient> {
    let key = cfg.require_elevenlabs()?;
    Ok(ElevenLabsClient::new(key.expose().to_owned())
        .with_base_url(cfg.endpoints.elevenlabs_base_url.clone()))
}

async fn run_generate(
    cfg: &AppConfig,
    request: StoryRequest,
    out: Option<PathBuf>,
    audio_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let generator = story_generator(cfg)?;

    let story = match audio_out {
        None => generator.generate(request).await?,
        Some(audio_path) => {
            let service = StoryService::new(generator, elevenlabs_client(cfg)?, InMemoryStore::new());
            let record = service.create_story(request, None).await?;
            let audio = service.narrate_story(record.id).await?;
            write_file(&audio_path, &audio.bytes).await?;
            tracing::info!(path = %audio_path.display(), bytes = audio.bytes.len(), "narration written");
            let record = service.store().get_story(record.id).await?;
            GeneratedStory {
                title: record.title,
                content: record.content,
            }
        }
    };

    let json = serde_json::to_string_pretty(&story)?;
    match out {
        Some(path) => {
            write_file(&path, json.as_bytes()).await?;
            tracing::info!(
                path = %path.display(),
                title = %story.title,
                est_secs = story.estimated_narration_secs(),
                "story written"
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn run_narrate(
    cfg: &AppConfig,
    story_file: &Path,
    voice_id: Option<String>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let story = read_story(story_file).await?;
    let client = elevenlabs_client(cfg)?;
    let voice = voice_id.map(VoiceId::new).unwrap_or_else(default_voice);

    tracing::info!(title = %story.title, voice = voice.as_str(), "narrating");
    let audio = client
        .synthesize(TtsRequest {
            text: story.content,
            voice: Some(voice),
            settings: Some(VoiceSettings::narration()),
        })
        .await?;

    let path = out.unwrap_or_else(|| PathBuf::from(audio_file_name(&story.title)));
    write_file(&path, &audio.bytes).await?;
    tracing::info!(path = %path.display(), bytes = audio.bytes.len(), "narration written");
    Ok(())
}

async fn run_karaoke(
    cfg: &AppConfig,
    story_file: &Path,
    audio_file: &Path,
    no_audio: bool,
    output_device: Option<String>,
) -> anyhow::Result<()> {
    let story = read_story(story_file).await?;
    let bytes = tokio::fs::read(audio_file)
        .await
        .with_context(|| format!("failed to read {}", audio_file.display()))?;
    let audio = audio_from_file(audio_file, Bytes::from(bytes));

    let duration = probe_duration(&audio.bytes, audio.extension())
        .with_context(|| format!("failed to read duration of {}", audio_file.display()))?;
    tracing::info!(
        title = %story.title,
        duration_secs = duration.as_secs_f64(),
        "starting karaoke"
    );

    let mut session = KaraokeSession::new(&story.content, cfg.sync)?;
    let on_event = Box::new(move |event: PlaybackEvent| {
        if session.on_event(event).is_some() {
            draw(&session);
        }
        if matches!(event, PlaybackEvent::Ended { .. }) {
            println!();
        }
    });

    let control = PlaybackControl::new();
    let sink = playback_sink(no_audio, output_device)?;
    sink.play(audio, duration, control, on_event).await?;
    Ok(())
}

#[cfg(feature = "rodio")]
fn playback_sink(
    no_audio: bool,
    output_device: Option<String>,
) -> anyhow::Result<Box<dyn PlaybackSink>> {
    use bedtime_core::playback::AudioPlaybackSink;

    if no_audio {
        return Ok(Box::new(SimulatedPlaybackSink::realtime()));
    }
    let sink = match output_device {
        Some(name) => AudioPlaybackSink::new().with_output_device_name(name),
        None => AudioPlaybackSink::new(),
    };
    Ok(Box::new(sink))
}

#[cfg(not(feature = "rodio"))]
fn playback_sink(
    no_audio: bool,
    output_device: Option<String>,
) -> anyhow::Result<Box<dyn PlaybackSink>> {
    if !no_audio || output_device.is_some() {
        tracing::warn!("built without audio output; highlighting on a wall clock");
    }
    Ok(Box::new(SimulatedPlaybackSink::realtime()))
}

fn draw(session: &KaraokeSession) {
    let text = session.render(|word, state| match state {
        WordState::Spoken => format!("\x1b[2m{word}\x1b[0m"),
        WordState::Current => format!("\x1b[1;7m{word}\x1b[0m"),
        WordState::Unspoken => word.to_owned(),
    });
    let mut stdout = std::io::stdout().lock();
    // Clear and home, then redraw the whole page.
    let _ = writeln!(stdout, "\x1b[2J\x1b[H{text}");
    let _ = stdout.flush();
}

async fn run_voices(cfg: &AppConfig, command: VoicesCommand) -> anyhow::Result<()> {
    let client = elevenlabs_client(cfg)?;
    match command {
        VoicesCommand::List => {
            for voice in client.list_voices().await? {
                println!("{}\t{}", voice.voice_id.as_str(), voice.name);
            }
        }
        VoicesCommand::Clone {
            name,
            description,
            samples,
        } => {
            let mut loaded = Vec::with_capacity(samples.len());
            for path in &samples {
                loaded.push(VoiceSample::from_path(path).await?);
            }
            let voice = voice_service(client)
                .clone_voice(name, description, loaded)
                .await?;
            println!("{}\t{}", voice.provider_voice_id.as_str(), voice.name);
        }
        VoicesCommand::Delete { id } => {
            voice_service(client)
                .delete_provider_voice(VoiceId::new(id))
                .await?;
        }
    }
    Ok(())
}

/// Voice records only live for this process.
fn voice_service<T: VoiceCloner>(client: T) -> StoryService<(), T, InMemoryStore> {
    StoryService::new((), client, InMemoryStore::new())
}

/// Accepts either story JSON as written by `generate` or plain text.
async fn read_story(path: &Path) -> anyhow::Result<GeneratedStory> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_story_file(&raw))
}

fn parse_story_file(raw: &str) -> GeneratedStory {
    serde_json::from_str::<GeneratedStory>(raw).unwrap_or_else(|_| GeneratedStory {
        title: DEFAULT_TITLE.to_owned(),
        content: raw.trim().to_owned(),
    })
}

fn audio_from_file(path: &Path, bytes: Bytes) -> TtsAudio {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    let mime_type = match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "audio/mpeg",
    };
    TtsAudio {
        mime_type: mime_type.to_owned(),
        bytes,
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
