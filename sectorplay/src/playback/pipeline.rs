//! Playback session orchestration
//!
//! A [`PlaybackPipeline`] owns one media session end to end: a reader thread
//! that pulls chunks from the [`ChunkSource`] and demuxes them, a video
//! decode thread, a video presentation thread, and an audio feed thread.
//! Stages hand off through [`BoundedHandoffQueue`]s and pace themselves
//! against the session's [`Timeline`].
//!
//! Sessions are created paused. `activate()` spawns the stage threads,
//! `go()`/`pause()` gate the clock, and `terminate()` tears the whole
//! session down without ever joining a pipeline thread from the caller.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{AudioSinkFactory, SinkShared};
use crate::codec::{AudioDecoder, VideoDecoder};
use crate::config::PlayerTuning;
use crate::demux::{AcceptOutcome, Chunk, DemuxedFrame, FrameAssembler};
use crate::error::{Error, Result};
use crate::events::{EndReason, ListenerHub, PlaybackListener, PlayerEvent};
use crate::playback::handoff::{BoundedHandoffQueue, PeerHandle};
use crate::playback::pool::PixelBufferPool;
use crate::playback::timeline::{AudioTimeline, PresentOutcome, SystemTimeline, Timeline};
use crate::playback::types::{
    AudioTrack, ChunkSource, MediaDescriptor, PixelBuffer, PresentationUnit, RawFrame,
    UnitPayload, VideoSurface, VideoTrack,
};

/// Everything a new session needs: the media description plus the
/// collaborators that do the actual decoding and output
pub struct SessionConfig {
    /// Track layout and session identity
    pub descriptor: MediaDescriptor,

    /// Sector-ordered chunk stream
    pub source: Box<dyn ChunkSource>,

    /// Video frame decoder; required when the descriptor carries video
    pub video_decoder: Option<Box<dyn VideoDecoder>>,

    /// Where decoded frames are blitted; required with video
    pub surface: Option<Box<dyn VideoSurface>>,

    /// Audio decoder (usually a combiner over the selected parallel
    /// streams); required when the descriptor carries audio
    pub audio_decoder: Option<Box<dyn AudioDecoder>>,

    /// Opens the audio sink on the feed thread; required with audio
    pub sink_factory: Option<Box<dyn AudioSinkFactory>>,

    /// Queue sizes, lookahead, and pacing knobs
    pub tuning: PlayerTuning,
}

/// State shared by every stage thread of one session
struct PipelineShared {
    session_id: Uuid,
    timeline: Arc<dyn Timeline>,
    frame_queue: Option<Arc<BoundedHandoffQueue<RawFrame>>>,
    present_queue: Option<Arc<BoundedHandoffQueue<PresentationUnit>>>,
    audio_queue: Option<Arc<BoundedHandoffQueue<PresentationUnit>>>,
    listeners: ListenerHub,

    /// Flipped exactly once, by whichever path ends the session first
    closed: AtomicBool,

    /// Output streams still draining; the session ends naturally when the
    /// last one reaches end-of-stream
    streams_remaining: AtomicUsize,

    /// Present when the session has audio; lets teardown release a sink
    /// blocked on device backpressure
    sink_shared: Option<SinkShared>,
}

impl PipelineShared {
    /// Close the session exactly once: stop the clock, unblock every stage,
    /// and fire the End event
    fn finish(&self, reason: EndReason) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Session {} closing ({:?})", self.session_id, reason);
        if let Some(sink) = &self.sink_shared {
            sink.terminated.store(true, Ordering::Release);
        }
        if let Some(q) = &self.frame_queue {
            q.close_now();
        }
        if let Some(q) = &self.present_queue {
            q.close_now();
        }
        if let Some(q) = &self.audio_queue {
            q.close_now();
        }
        self.timeline.terminate();
        self.listeners.emit(PlayerEvent::End {
            session_id: self.session_id,
            reason,
            timestamp: Utc::now(),
        });
    }

    /// One output stream drained to natural end-of-stream
    fn stream_finished(&self) {
        if self.streams_remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            info!("Session {}: all streams played out", self.session_id);
            self.finish(EndReason::Finished);
        }
    }

    /// A stage hit an unrecoverable error; tear the session down
    fn fatal(&self, stage: &str, err: &Error) {
        error!("Session {}: fatal error in {}: {}", self.session_id, stage, err);
        self.finish(EndReason::Terminated);
    }
}

/// Stage collaborators staged between `new_session()` and `activate()`
struct StagedStages {
    source: Box<dyn ChunkSource>,
    video_decoder: Option<Box<dyn VideoDecoder>>,
    surface: Option<Box<dyn VideoSurface>>,
    audio_decoder: Option<Box<dyn AudioDecoder>>,
    sink_factory: Option<Box<dyn AudioSinkFactory>>,
    video_track: Option<VideoTrack>,
    audio_track: Option<AudioTrack>,
    sector_lookahead: u32,
}

/// One playback session
pub struct PlaybackPipeline {
    shared: Arc<PipelineShared>,
    staged: Mutex<Option<StagedStages>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// Validate a session config and build its (still inert) pipeline
///
/// The returned pipeline is paused and has no threads until `activate()`.
pub fn new_session(config: SessionConfig) -> Result<PlaybackPipeline> {
    let SessionConfig {
        descriptor,
        source,
        video_decoder,
        surface,
        audio_decoder,
        sink_factory,
        tuning,
    } = config;

    if descriptor.video.is_none() && descriptor.audio.is_none() {
        return Err(Error::Config(
            "session has neither a video nor an audio track".into(),
        ));
    }
    if let Some(track) = &descriptor.video {
        if video_decoder.is_none() {
            return Err(Error::Config("video track without a video decoder".into()));
        }
        if surface.is_none() {
            return Err(Error::Config("video track without a video surface".into()));
        }
        if !(track.frame_rate > 0.0) {
            return Err(Error::Config(format!(
                "invalid frame rate {}",
                track.frame_rate
            )));
        }
    }
    if let Some(track) = &descriptor.audio {
        if audio_decoder.is_none() {
            return Err(Error::Config("audio track without an audio decoder".into()));
        }
        if sink_factory.is_none() {
            return Err(Error::Config("audio track without a sink factory".into()));
        }
        // The audio clock divides by this; a corrupt header must fail here,
        // not at the first position() call
        if track.format.sample_rate == 0 {
            return Err(Error::Config("invalid audio sample rate 0".into()));
        }
    }

    let poll = tuning.wait_poll();
    let sink_shared = descriptor.audio.as_ref().map(|_| SinkShared::new());

    // The audio clock drives the session whenever there is audio; video-only
    // sessions pace against the wall clock.
    let timeline: Arc<dyn Timeline> = match (&descriptor.audio, &sink_shared) {
        (Some(track), Some(shared)) => Arc::new(AudioTimeline::new(
            &tuning,
            track.format.sample_rate,
            Arc::clone(&shared.consumed_frames),
            Arc::clone(&shared.running),
        )),
        _ => Arc::new(SystemTimeline::new(&tuning)),
    };

    let frame_queue = descriptor.video.as_ref().map(|_| {
        Arc::new(BoundedHandoffQueue::new(
            "frame",
            tuning.frame_queue_capacity,
            poll,
        ))
    });
    let present_queue = descriptor.video.as_ref().map(|_| {
        Arc::new(BoundedHandoffQueue::new(
            "present",
            tuning.present_queue_capacity,
            poll,
        ))
    });
    let audio_queue = descriptor.audio.as_ref().map(|_| {
        Arc::new(BoundedHandoffQueue::new(
            "audio",
            tuning.audio_queue_capacity,
            poll,
        ))
    });

    let streams = descriptor.video.is_some() as usize + descriptor.audio.is_some() as usize;

    info!(
        "Session {}: video={} audio={}",
        descriptor.session_id,
        descriptor.video.is_some(),
        descriptor.audio.is_some()
    );

    Ok(PlaybackPipeline {
        shared: Arc::new(PipelineShared {
            session_id: descriptor.session_id,
            timeline,
            frame_queue,
            present_queue,
            audio_queue,
            listeners: ListenerHub::new()?,
            closed: AtomicBool::new(false),
            streams_remaining: AtomicUsize::new(streams),
            sink_shared,
        }),
        staged: Mutex::new(Some(StagedStages {
            source,
            video_decoder,
            surface,
            audio_decoder,
            sink_factory,
            video_track: descriptor.video,
            audio_track: descriptor.audio,
            sector_lookahead: tuning.sector_lookahead,
        })),
        threads: Mutex::new(Vec::new()),
    })
}

impl PlaybackPipeline {
    /// Session identifier carried by this session's events
    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    /// Register an event listener; callbacks run on the dispatch thread
    pub fn add_listener(&self, listener: Box<dyn PlaybackListener>) {
        self.shared.listeners.register(listener);
    }

    /// Spawn the stage threads. The session stays paused until `go()`.
    pub fn activate(&self) -> Result<()> {
        let staged = self
            .staged
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::InvalidState("session already activated".into()))?;
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::InvalidState("session already closed".into()));
        }

        let mut threads = self.threads.lock().unwrap();

        let reader_handle = PeerHandle::new();
        if let Some(q) = &self.shared.frame_queue {
            q.register_producer(reader_handle.clone());
        }
        if let Some(q) = &self.shared.audio_queue {
            q.register_producer(reader_handle.clone());
        }

        {
            let shared = Arc::clone(&self.shared);
            let source = staged.source;
            let video = staged
                .video_track
                .clone()
                .zip(self.shared.frame_queue.clone());
            let audio = match (staged.audio_decoder, staged.audio_track.clone()) {
                (Some(decoder), Some(track)) => {
                    let queue = self
                        .shared
                        .audio_queue
                        .clone()
                        .ok_or_else(|| Error::Internal("audio track without a queue".into()))?;
                    Some((decoder, track, queue))
                }
                _ => None,
            };
            let lookahead = staged.sector_lookahead;
            threads.push(spawn_stage("reader", move || {
                let _guard = reader_handle.guard();
                reader_loop(&shared, source, video, audio, lookahead);
            })?);
        }

        if let (Some(frame_queue), Some(present_queue)) = (
            self.shared.frame_queue.clone(),
            self.shared.present_queue.clone(),
        ) {
            let decode_handle = PeerHandle::new();
            frame_queue.register_consumer(decode_handle.clone());
            present_queue.register_producer(decode_handle.clone());

            // Pixel buffers cycle between the decode and present stages
            // through a shared free-list instead of being reallocated per
            // frame.
            let pool = Arc::new(PixelBufferPool::new());

            let shared = Arc::clone(&self.shared);
            let decoder = staged
                .video_decoder
                .ok_or_else(|| Error::Internal("video track without a decoder".into()))?;
            let decode_present_queue = Arc::clone(&present_queue);
            let decode_pool = Arc::clone(&pool);
            threads.push(spawn_stage("video-decode", move || {
                let _guard = decode_handle.guard();
                video_decode_loop(
                    &shared,
                    decoder,
                    &decode_pool,
                    &frame_queue,
                    &decode_present_queue,
                );
            })?);

            let present_handle = PeerHandle::new();
            present_queue.register_consumer(present_handle.clone());

            let shared = Arc::clone(&self.shared);
            let surface = staged
                .surface
                .ok_or_else(|| Error::Internal("video track without a surface".into()))?;
            threads.push(spawn_stage("video-present", move || {
                let _guard = present_handle.guard();
                video_present_loop(&shared, surface, &pool, &present_queue);
            })?);
        }

        if let Some(audio_queue) = self.shared.audio_queue.clone() {
            let feed_handle = PeerHandle::new();
            audio_queue.register_consumer(feed_handle.clone());

            let shared = Arc::clone(&self.shared);
            let factory = staged
                .sink_factory
                .ok_or_else(|| Error::Internal("audio track without a sink factory".into()))?;
            let sink_shared = self
                .shared
                .sink_shared
                .clone()
                .ok_or_else(|| Error::Internal("audio track without sink state".into()))?;
            let sample_rate = staged
                .audio_track
                .as_ref()
                .map(|t| t.format.sample_rate)
                .ok_or_else(|| Error::Internal("audio queue without a track".into()))?;
            threads.push(spawn_stage("audio-feed", move || {
                let _guard = feed_handle.guard();
                audio_feed_loop(&shared, factory, sample_rate, sink_shared, &audio_queue);
            })?);
        }

        info!(
            "Session {}: activated with {} stage threads",
            self.shared.session_id,
            threads.len()
        );
        Ok(())
    }

    /// Start or resume the clock
    ///
    /// Emits one Play event per actual transition; the transition is decided
    /// under the timeline's lock, so concurrent callers cannot double-emit
    /// or emit out of order with the state changes.
    pub fn go(&self) {
        if self.shared.timeline.go() {
            self.shared.listeners.emit(PlayerEvent::Play {
                session_id: self.shared.session_id,
                timestamp: Utc::now(),
            });
        }
    }

    /// Freeze the clock; presentation stalls until `go()`
    pub fn pause(&self) {
        if self.shared.timeline.pause() {
            self.shared.listeners.emit(PlayerEvent::Pause {
                session_id: self.shared.session_id,
                timestamp: Utc::now(),
            });
        }
    }

    /// Tear the session down. Idempotent; never joins pipeline threads, so
    /// it is safe to call from an event listener.
    pub fn terminate(&self) {
        self.shared.finish(EndReason::Terminated);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.timeline.is_paused()
    }

    /// True once the session has ended, naturally or by termination
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst) || self.shared.timeline.is_terminated()
    }

    /// Current presentation position in nanoseconds
    pub fn position_ns(&self) -> i64 {
        self.shared.timeline.position()
    }

    /// Block until every stage thread has exited
    pub fn join(&self) {
        let handles: Vec<_> = self.threads.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for PlaybackPipeline {
    fn drop(&mut self) {
        self.shared.finish(EndReason::Terminated);
        self.join();
        self.shared.listeners.shutdown();
    }
}

fn spawn_stage<F>(name: &str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| Error::Playback(format!("failed to spawn {} thread: {}", name, e)))
}

/// Pull chunks from the source, assemble video frames, and decode audio
/// inline, handing both off downstream
fn reader_loop(
    shared: &PipelineShared,
    mut source: Box<dyn ChunkSource>,
    video: Option<(VideoTrack, Arc<BoundedHandoffQueue<RawFrame>>)>,
    mut audio: Option<(
        Box<dyn AudioDecoder>,
        AudioTrack,
        Arc<BoundedHandoffQueue<PresentationUnit>>,
    )>,
    sector_lookahead: u32,
) {
    let mut assembler = FrameAssembler::new(sector_lookahead);
    let mut first_frame: Option<u32> = None;
    let mut audio_frames_out: u64 = 0;

    loop {
        let chunk = match source.next_chunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                // Whatever is still open at end-of-stream goes out as-is
                if let (Some(frame), Some((track, queue))) = (assembler.finish(), video.as_ref()) {
                    forward_frame(shared, track, queue, &mut first_frame, frame);
                }
                if let Some((_, queue)) = video.as_ref() {
                    queue.close_when_empty();
                }
                if let Some((_, _, queue)) = audio.as_ref() {
                    queue.close_when_empty();
                }
                debug!("Reader: end of stream");
                return;
            }
            Err(e) => {
                shared.fatal("reader", &e);
                return;
            }
        };

        match chunk {
            Chunk::Video(chunk) => {
                let Some((track, queue)) = video.as_ref() else {
                    continue;
                };
                if !assembler.is_open() {
                    assembler.begin(chunk);
                } else if let AcceptOutcome::Rejected(offender) = assembler.accept(chunk) {
                    if let Some(frame) = assembler.finish() {
                        if !forward_frame(shared, track, queue, &mut first_frame, frame) {
                            return;
                        }
                    }
                    assembler.begin(offender);
                }
                if assembler.is_complete() {
                    if let Some(frame) = assembler.finish() {
                        if !forward_frame(shared, track, queue, &mut first_frame, frame) {
                            return;
                        }
                    }
                }
            }
            Chunk::Audio(chunk) => {
                let Some((decoder, track, queue)) = audio.as_mut() else {
                    continue;
                };
                let sector = chunk.sector;
                match decoder.decode(&chunk) {
                    Ok(Some(block)) => {
                        let presentation_ns = if track.sectors_per_second > 0.0 {
                            let offset = sector.saturating_sub(track.start_sector) as f64;
                            (offset / track.sectors_per_second * 1_000_000_000.0).round() as i64
                        } else {
                            (audio_frames_out as i128 * 1_000_000_000
                                / block.sample_rate as i128) as i64
                        };
                        audio_frames_out += block.frames.len() as u64;
                        match queue.add(PresentationUnit {
                            presentation_ns,
                            payload: UnitPayload::Audio(block),
                        }) {
                            Ok(true) => {}
                            Ok(false) => return,
                            Err(e) => {
                                shared.fatal("reader", &e);
                                return;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            "Audio decode failed at sector {}: {}; block dropped",
                            sector, e
                        );
                    }
                }
            }
        }
    }
}

/// Hand one assembled frame downstream; false means stop reading
fn forward_frame(
    shared: &PipelineShared,
    track: &VideoTrack,
    queue: &BoundedHandoffQueue<RawFrame>,
    first_frame: &mut Option<u32>,
    frame: DemuxedFrame,
) -> bool {
    if frame.has_gaps() {
        warn!(
            "Frame {} assembled with {} missing chunks",
            frame.frame_number, frame.missing_chunks
        );
    }
    let first = *first_frame.get_or_insert(frame.frame_number);
    let presentation_ns = (frame.frame_number.saturating_sub(first) as f64 * 1_000_000_000.0
        / track.frame_rate)
        .round() as i64;

    match queue.add(RawFrame {
        presentation_ns,
        frame,
    }) {
        Ok(true) => true,
        Ok(false) => false,
        Err(e) => {
            shared.fatal("reader", &e);
            false
        }
    }
}

/// Decode raw frames into pooled pixel buffers, skipping frames already
/// behind the clock
fn video_decode_loop(
    shared: &PipelineShared,
    mut decoder: Box<dyn VideoDecoder>,
    pool: &PixelBufferPool,
    frame_queue: &BoundedHandoffQueue<RawFrame>,
    present_queue: &BoundedHandoffQueue<PresentationUnit>,
) {
    loop {
        match frame_queue.take() {
            Ok(Some(raw)) => {
                if !shared.timeline.should_decode(raw.presentation_ns) {
                    debug!(
                        "Skipping frame {}: {}ns already past",
                        raw.frame.frame_number, raw.presentation_ns
                    );
                    continue;
                }
                let pixel_count = raw.frame.width as usize * raw.frame.height as usize;
                let mut pixels = pool.acquire(pixel_count);
                match decoder.decode(&raw.frame, &mut pixels) {
                    Ok(()) => {
                        let buffer = PixelBuffer {
                            width: raw.frame.width,
                            height: raw.frame.height,
                            pixels,
                        };
                        match present_queue.add(PresentationUnit {
                            presentation_ns: raw.presentation_ns,
                            payload: UnitPayload::Video(buffer),
                        }) {
                            Ok(true) => {}
                            Ok(false) => return,
                            Err(e) => {
                                shared.fatal("video decode", &e);
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        pool.release(pixels);
                        warn!(
                            "Video decode failed on frame {}: {}; frame dropped",
                            raw.frame.frame_number, e
                        );
                    }
                }
            }
            Ok(None) => {
                present_queue.close_when_empty();
                debug!("Video decode: upstream drained");
                return;
            }
            Err(e) => {
                shared.fatal("video decode", &e);
                return;
            }
        }
    }
}

/// Wait out each frame's presentation time, blit it, and hand the pixel
/// buffer back to the pool
fn video_present_loop(
    shared: &PipelineShared,
    mut surface: Box<dyn VideoSurface>,
    pool: &PixelBufferPool,
    present_queue: &BoundedHandoffQueue<PresentationUnit>,
) {
    loop {
        match present_queue.take() {
            Ok(Some(unit)) => match shared.timeline.wait_to_present(unit.presentation_ns) {
                PresentOutcome::Present => {
                    if let UnitPayload::Video(buffer) = unit.payload {
                        if let Err(e) = surface.present(&buffer) {
                            warn!(
                                "Surface rejected frame at {}ns: {}",
                                unit.presentation_ns, e
                            );
                        }
                        pool.release(buffer.pixels);
                    }
                }
                PresentOutcome::Closed => return,
            },
            Ok(None) => {
                debug!("Video present: stream drained");
                shared.stream_finished();
                return;
            }
            Err(e) => {
                shared.fatal("video present", &e);
                return;
            }
        }
    }
}

/// Open the sink on this thread (device streams are not `Send`) and keep it
/// fed, padding silence over gaps between combined audio segments
fn audio_feed_loop(
    shared: &PipelineShared,
    factory: Box<dyn AudioSinkFactory>,
    sample_rate: u32,
    sink_shared: SinkShared,
    audio_queue: &BoundedHandoffQueue<PresentationUnit>,
) {
    let mut sink = match factory.open(sample_rate, sink_shared) {
        Ok(sink) => sink,
        Err(e) => {
            shared.fatal("audio feed", &e);
            return;
        }
    };

    loop {
        match audio_queue.take() {
            Ok(Some(unit)) => {
                let UnitPayload::Audio(block) = unit.payload else {
                    continue;
                };
                let due_frame =
                    (unit.presentation_ns as i128 * sample_rate as i128 / 1_000_000_000) as u64;
                let written = sink.frames_written();
                if due_frame > written {
                    let gap = due_frame - written;
                    debug!(
                        "Padding {} frames of silence before {}ns",
                        gap, unit.presentation_ns
                    );
                    if let Err(e) = sink.write_silence(gap) {
                        shared.fatal("audio feed", &e);
                        return;
                    }
                }
                if let Err(e) = sink.write(&block) {
                    shared.fatal("audio feed", &e);
                    return;
                }
            }
            Ok(None) => {
                debug!("Audio feed: stream drained");
                shared.stream_finished();
                return;
            }
            Err(e) => {
                shared.fatal("audio feed", &e);
                return;
            }
        }
    }
}
