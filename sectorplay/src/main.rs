//! sectorplay - chunk-dump playback driver
//!
//! Plays back a demuxed chunk dump (one JSON chunk per line, in sector
//! order): scans the dump to discover the video track and the parallel
//! audio streams, selects and combines the audio, then runs a playback
//! session to the configured outputs.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use sectorplay::audio::{AudioSinkFactory, DeviceAudioSinkFactory, NullAudioSinkFactory};
use sectorplay::codec::{AudioDecoder, GrayscaleVideoDecoder, Pcm16DecoderFactory, VideoDecoder};
use sectorplay::config::PlayerTuning;
use sectorplay::demux::{
    AudioCodecKind, AudioStreamDescriptor, Chunk, ParallelAudioSelector, StreamCombiner,
};
use sectorplay::events::{PlaybackListener, PlayerEvent};
use sectorplay::playback::{
    AudioTrack, ChunkSource, MediaDescriptor, PixelBuffer, VideoSurface, VideoTrack,
};
use sectorplay::{new_session, SessionConfig};

/// Command-line arguments for sectorplay
#[derive(Parser, Debug)]
#[command(name = "sectorplay")]
#[command(about = "Sector chunk-dump playback driver")]
#[command(version)]
struct Args {
    /// Chunk dump to play (one JSON chunk per line, sector order)
    dump: PathBuf,

    /// Tuning file (TOML); defaults apply when absent
    #[arg(short, long, env = "SECTORPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Video frame rate of the dump
    #[arg(long, default_value = "15.0")]
    fps: f64,

    /// Audio sector cadence; 0 times blocks back to back
    #[arg(long, default_value = "0.0")]
    sectors_per_second: f64,

    /// Discard audio instead of opening an output device
    #[arg(long)]
    null_audio: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sectorplay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let tuning = match &args.config {
        Some(path) => PlayerTuning::load(path)
            .with_context(|| format!("failed to load tuning from {}", path.display()))?,
        None => PlayerTuning::default(),
    };

    info!("Scanning {}", args.dump.display());
    let scan = scan_dump(&args.dump)?;

    let video = scan.video.map(|(width, height)| VideoTrack {
        width,
        height,
        frame_rate: args.fps,
    });

    // Pick the parallel audio set with the greatest sector coverage, then
    // fold the winners into one combined decode target.
    let mut audio_decoder: Option<Box<dyn AudioDecoder>> = None;
    let mut audio_track = None;
    if !scan.audio_streams.is_empty() {
        let selection = ParallelAudioSelector::select(scan.audio_streams);
        info!(
            "Selected {} parallel audio stream(s) covering {} sectors",
            selection.streams.len(),
            selection.total_sector_length
        );
        let mut decoders = Vec::with_capacity(selection.streams.len());
        for stream in selection.streams {
            decoders.push(stream.factory.open().context("failed to open audio decoder")?);
        }
        let combiner = StreamCombiner::new(decoders).context("failed to combine audio streams")?;
        audio_track = Some(AudioTrack {
            format: combiner.output_format(),
            start_sector: combiner.start_sector(),
            sectors_per_second: args.sectors_per_second,
        });
        audio_decoder = Some(Box::new(combiner));
    }

    if video.is_none() && audio_track.is_none() {
        anyhow::bail!("dump contains no playable video or PCM16 audio");
    }

    let sink_factory: Option<Box<dyn AudioSinkFactory>> = audio_track.as_ref().map(|_| {
        if args.null_audio {
            Box::new(NullAudioSinkFactory) as Box<dyn AudioSinkFactory>
        } else {
            Box::new(DeviceAudioSinkFactory {
                ring_capacity: tuning.audio_ring_capacity,
            }) as Box<dyn AudioSinkFactory>
        }
    });

    let source = JsonChunkSource::open(&args.dump)?;
    let pipeline = new_session(SessionConfig {
        descriptor: MediaDescriptor {
            session_id: Uuid::new_v4(),
            video: video.clone(),
            audio: audio_track,
        },
        source: Box::new(source),
        video_decoder: video
            .as_ref()
            .map(|_| Box::new(GrayscaleVideoDecoder) as Box<dyn VideoDecoder>),
        surface: video
            .as_ref()
            .map(|_| Box::new(TraceVideoSurface::default()) as Box<dyn VideoSurface>),
        audio_decoder,
        sink_factory,
        tuning,
    })
    .context("failed to create playback session")?;

    pipeline.add_listener(Box::new(LogListener));
    pipeline.activate().context("failed to activate session")?;
    pipeline.go();

    pipeline.join();
    info!("Playback finished");
    Ok(())
}

/// What one pass over the dump discovered
struct DumpScan {
    video: Option<(u16, u16)>,
    audio_streams: Vec<AudioStreamDescriptor>,
}

/// Scan the dump once: video dimensions from the first video chunk, audio
/// stream extents per (channel, format) bucket
fn scan_dump(path: &PathBuf) -> Result<DumpScan> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut video = None;
    let mut extents: HashMap<u8, (u32, u32, sectorplay::demux::AudioFormat)> = HashMap::new();
    let mut channel_order = Vec::new();

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(&line)
            .with_context(|| format!("bad chunk on line {}", line_no + 1))?;
        match chunk {
            Chunk::Video(chunk) => {
                if video.is_none() {
                    video = Some((chunk.width, chunk.height));
                }
            }
            Chunk::Audio(chunk) => match extents.entry(chunk.channel) {
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    let (_, end, _) = slot.get_mut();
                    *end = (*end).max(chunk.sector);
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert((chunk.sector, chunk.sector, chunk.format));
                    channel_order.push(chunk.channel);
                }
            },
        }
    }

    // Stream discovery order is the channel's first appearance; the selector
    // breaks ties on it.
    let mut audio_streams = Vec::new();
    for channel in channel_order {
        let (start, end, format) = extents[&channel];
        if format.codec != AudioCodecKind::Pcm16 {
            warn!(
                "Skipping channel {}: no decoder for {:?}",
                channel, format.codec
            );
            continue;
        }
        audio_streams.push(AudioStreamDescriptor {
            start_sector: start,
            end_sector: end,
            format,
            factory: Box::new(Pcm16DecoderFactory {
                start_sector: start,
                end_sector: end,
                format,
            }),
        });
    }

    Ok(DumpScan {
        video,
        audio_streams,
    })
}

/// Chunk source over a JSON-lines dump
struct JsonChunkSource {
    lines: Lines<BufReader<File>>,
}

impl JsonChunkSource {
    fn open(path: &PathBuf) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }
}

impl ChunkSource for JsonChunkSource {
    fn next_chunk(&mut self) -> sectorplay::Result<Option<Chunk>> {
        for line in self.lines.by_ref() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk: Chunk = serde_json::from_str(&line)
                .map_err(|e| sectorplay::Error::Demux(format!("bad chunk: {}", e)))?;
            return Ok(Some(chunk));
        }
        Ok(None)
    }
}

/// Surface that logs presentations instead of blitting
#[derive(Default)]
struct TraceVideoSurface {
    presented: u64,
}

impl VideoSurface for TraceVideoSurface {
    fn present(&mut self, frame: &PixelBuffer) -> sectorplay::Result<()> {
        self.presented += 1;
        debug!(
            "Presented frame {} ({}x{})",
            self.presented, frame.width, frame.height
        );
        Ok(())
    }
}

/// Listener that mirrors session events into the log
struct LogListener;

impl PlaybackListener for LogListener {
    fn on_event(&self, event: &PlayerEvent) {
        info!("Event: {:?}", event);
    }
}
