//! `rodio` output on a dedicated audio thread.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so the stream and its
//! sink live on one OS thread and [`RodioOutput`] proxies every operation to
//! it over an `mpsc` channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};

use super::output::{AudioOutput, EndedCallback, OutputClock};
use crate::error::PlaybackError;
use crate::framing::DecodedAudio;

// ── Commands ───────────────────────────────────────────────────────

enum OutputCommand {
    /// Replace the sink with a fresh one playing `samples`.
    Start {
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        speed: f32,
        on_ended: EndedCallback,
        reply: mpsc::Sender<Result<(), PlaybackError>>,
    },
    Stop,
    Pause,
    Play,
    SetSpeed(f32),
    SetVolume(f32),
    Shutdown,
}

// ── Handle ─────────────────────────────────────────────────────────

/// `Send` handle to the audio thread. Keeps the output clock on the caller's
/// side so time queries never cross the channel.
pub struct RodioOutput {
    cmd_tx: mpsc::Sender<OutputCommand>,
    thread: Option<thread::JoinHandle<()>>,
    clock: OutputClock,
}

impl RodioOutput {
    /// Open the default output device on a new `narrator-audio` thread.
    pub fn spawn() -> Result<Self, PlaybackError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<OutputCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), PlaybackError>>();

        let thread = thread::Builder::new()
            .name("narrator-audio".into())
            .spawn(move || run(&cmd_rx, &init_tx))
            .map_err(|e| {
                PlaybackError::OutputStream(format!("failed to spawn audio thread: {e}"))
            })?;

        init_rx.recv().map_err(|_| PlaybackError::AudioThreadDied)??;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
            clock: OutputClock::new(),
        })
    }

    /// Boxed factory for the playback engine.
    pub fn factory() -> super::output::OutputFactory {
        Box::new(|| Ok(Box::new(Self::spawn()?) as Box<dyn AudioOutput>))
    }

    fn send(&self, command: OutputCommand) {
        let _ = self.cmd_tx.send(command);
    }
}

impl AudioOutput for RodioOutput {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn start(
        &mut self,
        audio: Arc<DecodedAudio>,
        offset: f64,
        rate: f32,
        on_ended: EndedCallback,
    ) -> Result<(), PlaybackError> {
        let channels = usize::from(audio.channels.max(1));
        let first_frame = ((offset.max(0.0) * f64::from(audio.sample_rate)) as usize)
            .min(audio.frames());
        let samples = audio.samples[first_frame * channels..].to_vec();

        let (reply, rx) = mpsc::channel();
        self.cmd_tx
            .send(OutputCommand::Start {
                samples,
                channels: audio.channels,
                sample_rate: audio.sample_rate,
                speed: rate,
                on_ended,
                reply,
            })
            .map_err(|_| PlaybackError::AudioThreadDied)?;
        rx.recv().map_err(|_| PlaybackError::AudioThreadDied)??;

        self.clock.resume();
        Ok(())
    }

    fn stop(&mut self) {
        self.send(OutputCommand::Stop);
    }

    fn suspend(&mut self) {
        self.send(OutputCommand::Pause);
        self.clock.suspend();
    }

    fn resume(&mut self) {
        self.send(OutputCommand::Play);
        self.clock.resume();
    }

    fn set_rate(&mut self, rate: f32) {
        self.send(OutputCommand::SetSpeed(rate));
    }

    fn set_volume(&mut self, volume: f32) {
        self.send(OutputCommand::SetVolume(volume));
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        // Best-effort; the thread may already be dead.
        let _ = self.cmd_tx.send(OutputCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

// ── Audio thread ───────────────────────────────────────────────────

struct Device {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Arc<Sink>>,
    /// Bumped on every start/stop; a watcher only fires for its own value.
    generation: Arc<AtomicU64>,
    volume: f32,
}

impl Device {
    fn start(
        &mut self,
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        speed: f32,
        on_ended: EndedCallback,
    ) -> Result<(), PlaybackError> {
        self.stop();

        let sink = Sink::try_new(&self.handle)
            .map_err(|e| PlaybackError::OutputStream(e.to_string()))?;
        sink.set_volume(self.volume);
        sink.set_speed(speed);
        sink.append(SamplesBuffer::new(channels, sample_rate, samples));

        let sink = Arc::new(sink);
        let token = self.generation.load(Ordering::SeqCst);
        spawn_completion_watcher(Arc::clone(&sink), Arc::clone(&self.generation), token, on_ended);
        self.sink = Some(sink);

        tracing::debug!(sample_rate, channels, speed, "Audio source started");
        Ok(())
    }

    fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn with_sink(&self, f: impl FnOnce(&Sink)) {
        if let Some(sink) = &self.sink {
            f(sink);
        }
    }
}

/// Block until the sink drains, then fire `on_ended` unless the source was
/// replaced or stopped in the meantime.
fn spawn_completion_watcher(
    sink: Arc<Sink>,
    generation: Arc<AtomicU64>,
    token: u64,
    on_ended: EndedCallback,
) {
    // `Sink` is Send in rodio 0.20+. `sleep_until_end()` returns when the
    // queue drains or when `stop()` clears it.
    thread::spawn(move || {
        sink.sleep_until_end();
        if generation.load(Ordering::SeqCst) != token {
            return;
        }
        tracing::debug!("Audio source finished naturally");
        on_ended();
    });
}

fn run(cmd_rx: &mpsc::Receiver<OutputCommand>, init_tx: &mpsc::Sender<Result<(), PlaybackError>>) {
    let (stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = init_tx.send(Err(PlaybackError::OutputStream(e.to_string())));
            return;
        }
    };
    tracing::info!("Audio output initialized on default device");

    let mut device = Device {
        _stream: stream,
        handle,
        sink: None,
        generation: Arc::new(AtomicU64::new(0)),
        volume: 1.0,
    };

    if init_tx.send(Ok(())).is_err() {
        return;
    }

    while let Ok(command) = cmd_rx.recv() {
        match command {
            OutputCommand::Start {
                samples,
                channels,
                sample_rate,
                speed,
                on_ended,
                reply,
            } => {
                let _ = reply.send(device.start(samples, channels, sample_rate, speed, on_ended));
            }
            OutputCommand::Stop => device.stop(),
            OutputCommand::Pause => device.with_sink(Sink::pause),
            OutputCommand::Play => device.with_sink(Sink::play),
            OutputCommand::SetSpeed(speed) => device.with_sink(|s| s.set_speed(speed)),
            OutputCommand::SetVolume(volume) => {
                device.volume = volume;
                device.with_sink(|s| s.set_volume(volume));
            }
            OutputCommand::Shutdown => break,
        }
    }

    device.stop();
    tracing::debug!("Audio thread shutting down");
}
