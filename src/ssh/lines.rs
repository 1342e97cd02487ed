//! Incremental line reading from a remote command channel
//!
//! A command channel has no message boundaries: stdout arrives in arbitrary
//! chunks and completion is only known when the channel closes. `LineReader`
//! is the pure state machine (buffer, queued lines, exit flag);
//! `read_lines` drives it from any `ChannelSource` under a bounded poll.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant};
use tracing::debug;

/// One message from a remote command channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit(u32),
    Closed,
}

/// Producer of channel events
#[async_trait]
pub trait ChannelSource: Send {
    /// Next event, `None` once the channel is gone
    async fn next_event(&mut self) -> Option<ChannelEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Longest single wait before re-checking the deadlines
    pub poll: Duration,
    /// Give up after this long without any event
    pub idle: Duration,
    /// Give up after this long regardless of activity
    pub total: Duration,
}

#[derive(Debug, Default)]
pub struct LineReader {
    pending: Vec<u8>,
    lines: VecDeque<String>,
    stderr: Vec<u8>,
    exit_status: Option<u32>,
    closed: bool,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Stdout(bytes) => {
                self.pending.extend_from_slice(&bytes);
                let consumed = split_lines(&self.pending, &mut self.lines);
                self.pending.drain(..consumed);
            }
            ChannelEvent::Stderr(bytes) => self.stderr.extend_from_slice(&bytes),
            ChannelEvent::Exit(status) => self.exit_status = Some(status),
            ChannelEvent::Closed => self.closed = true,
        }
    }

    /// Next complete stdout line
    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    /// Drain queued lines plus any unterminated tail
    pub fn finish(&mut self) -> Vec<String> {
        let mut rest: Vec<String> = self.lines.drain(..).collect();
        if !self.pending.is_empty() {
            rest.push(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
        }
        rest
    }

    /// Drain buffered stderr as lines
    pub fn take_stderr(&mut self) -> Vec<String> {
        let mut lines = VecDeque::new();
        let consumed = split_lines(&self.stderr, &mut lines);
        if consumed < self.stderr.len() {
            lines.push_back(String::from_utf8_lossy(&self.stderr[consumed..]).into_owned());
        }
        self.stderr.clear();
        lines.into()
    }
}

/// Queue every terminated line of `buffer`, returning the bytes consumed.
/// `\r` and `\n` both terminate; runs of terminators yield no empty lines.
fn split_lines(buffer: &[u8], lines: &mut VecDeque<String>) -> usize {
    let mut start = 0;
    for (i, &byte) in buffer.iter().enumerate() {
        if byte == b'\n' || byte == b'\r' {
            if i > start {
                lines.push_back(String::from_utf8_lossy(&buffer[start..i]).into_owned());
            }
            start = i + 1;
        }
    }
    start
}

/// How a channel read ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub stderr: Vec<String>,
    pub exit_status: Option<u32>,
    pub timed_out: bool,
}

/// Feed stdout lines to `on_line` until the channel closes, a limit
/// elapses, or `on_line` breaks. Trailing output and stderr are flushed
/// into the result either way.
pub async fn read_lines<S, F>(source: &mut S, limits: ReadLimits, mut on_line: F) -> Completion
where
    S: ChannelSource + ?Sized,
    F: FnMut(&str) -> ControlFlow<()>,
{
    let started = Instant::now();
    let mut last_event = started;
    let mut reader = LineReader::new();
    let mut timed_out = false;

    'poll: loop {
        while let Some(line) = reader.next_line() {
            if on_line(&line).is_break() {
                break 'poll;
            }
        }
        if reader.is_closed() {
            for line in reader.finish() {
                if on_line(&line).is_break() {
                    break;
                }
            }
            break;
        }

        let now = Instant::now();
        let total_left = limits.total.saturating_sub(now - started);
        let idle_left = limits.idle.saturating_sub(now - last_event);
        if total_left.is_zero() || idle_left.is_zero() {
            debug!("channel read timed out after {:?}", now - started);
            timed_out = true;
            for line in reader.finish() {
                if on_line(&line).is_break() {
                    break;
                }
            }
            break;
        }

        let slice = limits.poll.min(total_left).min(idle_left);
        match time::timeout(slice, source.next_event()).await {
            Ok(Some(event)) => {
                last_event = Instant::now();
                reader.push(event);
            }
            Ok(None) => reader.push(ChannelEvent::Closed),
            Err(_) => {}
        }
    }

    Completion {
        stderr: reader.take_stderr(),
        exit_status: reader.exit_status(),
        timed_out,
    }
}
