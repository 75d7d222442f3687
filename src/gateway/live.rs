//! Bidirectional live audio session.
//!
//! Microphone audio goes up as chunks, synthesized audio comes down as
//! chunks. An `Interrupted` signal from the service means the user spoke
//! over the reply: anything still queued for playback must be discarded.
use std::collections::VecDeque;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};

use crate::{DeskError, Result};

/// Sample rate of 16-bit mono microphone audio sent to the service
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of 16-bit mono audio the service replies with
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Playing time of `bytes` of 16-bit mono PCM.
pub fn pcm_duration(bytes: usize, sample_rate: u32) -> Duration {
    let samples = bytes as u64 / 2;
    Duration::from_micros(samples * 1_000_000 / u64::from(sample_rate.max(1)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Event received from the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Audio(Vec<u8>),
    Interrupted,
    TurnComplete,
    /// The service ended the session
    Closed,
}

/// Instruction for the audio output consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play(Vec<u8>),
    /// Drop everything queued but not yet played
    Flush,
}

/// Connection to a live session endpoint.
///
/// `next_event` must be cancel safe: it is raced against outgoing audio
/// and cancellation.
#[async_trait]
pub trait LiveTransport: Send + 'static {
    async fn connect(&mut self) -> Result<()>;
    async fn send_audio(&mut self, chunk: Vec<u8>) -> Result<()>;
    async fn next_event(&mut self) -> Result<LiveEvent>;
    /// Releases the connection and any device handles. Called exactly once.
    async fn close(&mut self) -> Result<()>;
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub chunks_sent: usize,
    pub chunks_received: usize,
    pub interruptions: usize,
    pub cancelled: bool,
}

/// Handle to a running live session.
///
/// Dropping the handle cancels the session; [`LiveSession::dispose`] does
/// the same and waits for the transport to be closed.
pub struct LiveSession {
    audio_tx: mpsc::Sender<Vec<u8>>,
    cancel_tx: Option<oneshot::Sender<()>>,
    state_rx: watch::Receiver<SessionState>,
    task: Option<JoinHandle<Result<SessionSummary>>>,
}

impl LiveSession {
    /// Connects `transport` in the background and starts relaying audio.
    /// Received audio and flush requests go to `playback`.
    pub fn spawn<T: LiveTransport>(
        transport: T,
        playback: mpsc::Sender<PlaybackCommand>,
    ) -> Self {
        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let task = tokio::spawn(run_session(
            transport, audio_rx, cancel_rx, playback, state_tx,
        ));

        Self {
            audio_tx,
            cancel_tx: Some(cancel_tx),
            state_rx,
            task: Some(task),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Waits until the session leaves `Connecting`.
    pub async fn wait_until_ready(&mut self) -> SessionState {
        let _ = self
            .state_rx
            .wait_for(|s| *s != SessionState::Connecting)
            .await;
        self.state()
    }

    /// Waits until the session has closed, for whatever reason.
    pub async fn closed(&mut self) {
        let _ = self
            .state_rx
            .wait_for(|s| *s == SessionState::Closed)
            .await;
    }

    /// Queues one chunk of microphone audio.
    pub async fn send_audio(&self, chunk: Vec<u8>) -> Result<()> {
        self.audio_tx
            .send(chunk)
            .await
            .map_err(|_| DeskError::SessionError {
                message: "session is closed".to_string(),
            })
    }

    /// Cancels the session and waits until the transport has been closed.
    pub async fn dispose(mut self) -> Result<SessionSummary> {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
        let Some(task) = self.task.take() else {
            return Err(DeskError::SessionError {
                message: "session already disposed".to_string(),
            });
        };
        task.await.map_err(|e| DeskError::SessionError {
            message: format!("session task failed: {}", e),
        })?
    }
}

async fn run_session<T: LiveTransport>(
    mut transport: T,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    mut cancel_rx: oneshot::Receiver<()>,
    playback: mpsc::Sender<PlaybackCommand>,
    state_tx: watch::Sender<SessionState>,
) -> Result<SessionSummary> {
    let result = drive(
        &mut transport,
        &mut audio_rx,
        &mut cancel_rx,
        &playback,
        &state_tx,
    )
    .await;

    // Release on every exit path, including errors
    audio_rx.close();
    if let Err(e) = transport.close().await {
        warn!("Failed to close live transport: {}", e);
    }
    let _ = state_tx.send(SessionState::Closed);

    match &result {
        Ok(summary) => info!(
            "Live session closed: sent {}, received {}, interruptions {}",
            summary.chunks_sent, summary.chunks_received, summary.interruptions
        ),
        Err(e) => warn!("Live session ended with error: {}", e),
    }
    result
}

async fn drive<T: LiveTransport>(
    transport: &mut T,
    audio_rx: &mut mpsc::Receiver<Vec<u8>>,
    cancel_rx: &mut oneshot::Receiver<()>,
    playback: &mpsc::Sender<PlaybackCommand>,
    state_tx: &watch::Sender<SessionState>,
) -> Result<SessionSummary> {
    let mut summary = SessionSummary::default();

    tokio::select! {
        connected = transport.connect() => connected?,
        // A dropped handle counts as cancellation
        _ = &mut *cancel_rx => {
            summary.cancelled = true;
            return Ok(summary);
        }
    }
    let _ = state_tx.send(SessionState::Open);
    info!("Live session open");

    loop {
        tokio::select! {
            // Cancellation first, then outgoing audio, then service events
            biased;

            _ = &mut *cancel_rx => {
                debug!("Live session cancelled");
                summary.cancelled = true;
                break;
            }
            chunk = audio_rx.recv() => match chunk {
                Some(chunk) => {
                    transport.send_audio(chunk).await?;
                    summary.chunks_sent += 1;
                }
                None => {
                    debug!("Audio input ended");
                    break;
                }
            },
            event = transport.next_event() => match event? {
                LiveEvent::Audio(data) => {
                    summary.chunks_received += 1;
                    if playback.send(PlaybackCommand::Play(data)).await.is_err() {
                        debug!("Playback consumer dropped");
                        break;
                    }
                }
                LiveEvent::Interrupted => {
                    summary.interruptions += 1;
                    debug!("Reply interrupted, flushing playback");
                    if playback.send(PlaybackCommand::Flush).await.is_err() {
                        break;
                    }
                }
                LiveEvent::TurnComplete => debug!("Turn complete"),
                LiveEvent::Closed => {
                    info!("Live session closed by the service");
                    break;
                }
            },
        }
    }
    Ok(summary)
}

/// Feeds PCM from `input` into the session in `chunk_bytes` pieces until
/// the input ends. With `realtime` set each chunk is followed by a pause
/// as long as its playing time, the pace a live microphone would produce.
///
/// # Returns
///
/// The number of chunks sent.
pub async fn stream_pcm<R: AsyncRead + Unpin>(
    session: &LiveSession,
    mut input: R,
    chunk_bytes: usize,
    realtime: bool,
) -> Result<usize> {
    let mut buf = vec![0u8; chunk_bytes.max(2)];
    let mut sent = 0;
    loop {
        let read = input.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        session.send_audio(buf[..read].to_vec()).await?;
        sent += 1;
        if realtime {
            time::sleep(pcm_duration(read, INPUT_SAMPLE_RATE)).await;
        }
    }
    debug!("Streamed {} audio chunks", sent);
    Ok(sent)
}

/// What [`play_into`] did with the session's audio
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub bytes_played: usize,
    pub chunks_flushed: usize,
}

/// Plays session audio into `out` at the pace of a `sample_rate` device
/// until the session drops its end of the channel. Chunks still queued when
/// a flush arrives are never written.
pub async fn play_into<W: AsyncWrite + Unpin>(
    mut playback_rx: mpsc::Receiver<PlaybackCommand>,
    mut out: W,
    sample_rate: u32,
) -> Result<PlaybackSummary> {
    let mut queue = PlaybackQueue::new();
    let mut summary = PlaybackSummary::default();
    let mut device_free_at = Instant::now();

    loop {
        tokio::select! {
            biased;

            command = playback_rx.recv() => match command {
                Some(command) => queue.apply(command),
                None => break,
            },
            _ = time::sleep_until(device_free_at), if !queue.is_empty() => {
                if let Some(chunk) = queue.next_chunk() {
                    out.write_all(&chunk).await?;
                    summary.bytes_played += chunk.len();
                    device_free_at = Instant::now() + pcm_duration(chunk.len(), sample_rate);
                }
            }
        }
    }

    while let Some(chunk) = queue.next_chunk() {
        out.write_all(&chunk).await?;
        summary.bytes_played += chunk.len();
    }
    out.flush().await?;
    summary.chunks_flushed = queue.flushed();
    Ok(summary)
}

/// Consumer-side queue of audio waiting to be played.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    chunks: VecDeque<Vec<u8>>,
    flushed: usize,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Play(chunk) => self.chunks.push_back(chunk),
            PlaybackCommand::Flush => {
                self.flushed += self.chunks.len();
                self.chunks.clear();
            }
        }
    }

    /// Next chunk to hand to the audio device
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks discarded by flushes so far
    pub fn flushed(&self) -> usize {
        self.flushed
    }
}
