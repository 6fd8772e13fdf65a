//! Background thread that turns a stream of pinch samples into flap edges.
//!
//! The worker runs at whatever rate its source delivers samples; it never waits on the
//! frame loop. The only thing the two share is the [`EdgeFlag`].

use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use aero_engine::shared::EdgeFlag;

use crate::gesture::GestureSignalProcessor;

const IDLE_BACKOFF: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourcePoll {
    /// One capture result. `None` means no hand was visible.
    Sample(Option<f32>),
    /// Nothing new yet.
    Idle,
    /// The source is finished; the worker exits.
    Exhausted,
}

pub trait GestureSource: Send + 'static {
    fn next_sample(&mut self) -> SourcePoll;
}

/// In-memory samples, delivered back to back.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    samples: VecDeque<Option<f32>>,
}

impl ScriptedSource {
    pub fn new<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = Option<f32>>,
    {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl GestureSource for ScriptedSource {
    fn next_sample(&mut self) -> SourcePoll {
        match self.samples.pop_front() {
            Some(sample) => SourcePoll::Sample(sample),
            None => SourcePoll::Exhausted,
        }
    }
}

/// Reads a recorded trace: one sample per line.
///
/// A line is a distance, or `-` / blank for "no hand". Lines starting with `#` are
/// comments.
#[derive(Debug)]
pub struct LineSource<R> {
    reader: R,
    interval: Option<Duration>,
    line: usize,
    buf: String,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            interval: None,
            line: 0,
            buf: String::new(),
        }
    }

    /// Sleeps `interval` before each sample, emulating a camera running at that rate.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = (!interval.is_zero()).then_some(interval);
        self
    }

    fn read_line(&mut self) -> io::Result<Option<&str>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(self.buf.trim()))
    }
}

impl<R: BufRead + Send + 'static> GestureSource for LineSource<R> {
    fn next_sample(&mut self) -> SourcePoll {
        loop {
            let line_no = self.line + 1;
            let text = match self.read_line() {
                Ok(Some(text)) => text,
                Ok(None) => return SourcePoll::Exhausted,
                Err(err) => {
                    log::warn!("gesture trace read failed at line {line_no}: {err}");
                    return SourcePoll::Exhausted;
                }
            };
            if text.starts_with('#') {
                continue;
            }
            let sample = parse_sample(text, line_no);
            if let Some(interval) = self.interval {
                thread::sleep(interval);
            }
            return SourcePoll::Sample(sample);
        }
    }
}

fn parse_sample(text: &str, line_no: usize) -> Option<f32> {
    if text.is_empty() || text == "-" {
        return None;
    }
    match text.parse::<f32>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value),
        Ok(value) => {
            log::warn!("gesture trace line {line_no}: ignoring out-of-range sample {value}");
            None
        }
        Err(err) => {
            log::warn!("gesture trace line {line_no}: {err} ({text:?})");
            None
        }
    }
}

/// Handle to a running gesture thread.
#[derive(Debug)]
pub struct GestureWorker {
    stop: Arc<AtomicBool>,
    flaps: Arc<AtomicUsize>,
    handle: Option<JoinHandle<GestureSignalProcessor>>,
}

impl GestureWorker {
    /// Flap edges emitted so far. The frame loop may see fewer flaps than this when
    /// several edges land between two frames.
    pub fn flaps(&self) -> usize {
        self.flaps.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signals the thread and waits for it. Returns the processor as the worker left it,
    /// or `None` if the thread panicked.
    pub fn stop(self) -> Option<GestureSignalProcessor> {
        self.stop.store(true, Ordering::Relaxed);
        self.join()
    }

    /// Waits for the source to run dry without asking the thread to stop.
    pub fn join(mut self) -> Option<GestureSignalProcessor> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(processor) => Some(processor),
            Err(_) => {
                log::warn!("gesture worker panicked");
                None
            }
        }
    }
}

impl Drop for GestureWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn spawn_gesture_worker<S: GestureSource>(
    mut source: S,
    mut processor: GestureSignalProcessor,
    flag: Arc<EdgeFlag>,
) -> io::Result<GestureWorker> {
    let stop = Arc::new(AtomicBool::new(false));
    let flaps = Arc::new(AtomicUsize::new(0));
    let thread_stop = Arc::clone(&stop);
    let thread_flaps = Arc::clone(&flaps);

    let handle = thread::Builder::new()
        .name("gesture-worker".to_string())
        .spawn(move || {
            log::debug!("gesture worker started");
            while !thread_stop.load(Ordering::Relaxed) {
                match source.next_sample() {
                    SourcePoll::Sample(sample) => {
                        if processor.process(sample) {
                            thread_flaps.fetch_add(1, Ordering::Relaxed);
                            flag.raise();
                        }
                    }
                    SourcePoll::Idle => thread::sleep(IDLE_BACKOFF),
                    SourcePoll::Exhausted => break,
                }
            }
            log::debug!(
                "gesture worker exiting after {} flaps",
                thread_flaps.load(Ordering::Relaxed)
            );
            processor
        })?;

    Ok(GestureWorker {
        stop,
        flaps,
        handle: Some(handle),
    })
}
