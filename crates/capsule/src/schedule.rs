// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Cooperative loading of large sections
//!
//! A [`Scheduler`] pulls a section in fixed size chunks and yields back to
//! the tokio runtime between chunks. Progress is published through a
//! [`Progress`] reporter which reaches a terminal [`Status`] exactly once.

use std::io::{self, Read};

use tokio::sync::watch;

/// Default chunk size between suspension points
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    chunk_size: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Scheduler {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Read exactly `len` bytes, yielding after every chunk
    pub async fn read<R: Read + ?Sized>(&self, reader: &mut R, len: u64, progress: &Progress) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(len.min(16 * 1024 * 1024) as usize);
        let mut chunk = vec![0u8; self.chunk_size];
        let mut remaining = len;

        while remaining > 0 {
            let want = remaining.min(self.chunk_size as u64) as usize;
            let read = reader.read(&mut chunk[..want])?;
            if read == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }

            buffer.extend_from_slice(&chunk[..read]);
            remaining -= read as u64;
            progress.set((len - remaining) as f32 / len as f32);

            tokio::task::yield_now().await;
        }

        progress.set(1.0);

        Ok(buffer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Running(f32),
    Succeeded,
    Failed(String),
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Running(_))
    }
}

/// Create a linked reporter / observer pair
pub fn progress() -> (Progress, ProgressHandle) {
    let (sender, receiver) = watch::channel(Status::Running(0.0));
    (Progress { sender: Some(sender) }, ProgressHandle { receiver })
}

/// Producer side of a load. Consumed by [`Progress::finish`] so
/// completion can only ever be reported once. Dropping an unfinished
/// reporter marks the load as failed.
#[derive(Debug)]
pub struct Progress {
    sender: Option<watch::Sender<Status>>,
}

impl Progress {
    pub fn set(&self, fraction: f32) {
        let Some(sender) = &self.sender else {
            return;
        };

        sender.send_if_modified(|status| match status {
            Status::Running(current) => {
                *current = fraction.clamp(0.0, 1.0);
                true
            }
            _ => false,
        });
    }

    pub fn finish<E: ToString>(mut self, result: Result<(), E>) {
        if let Some(sender) = self.sender.take() {
            sender.send_replace(match result {
                Ok(()) => Status::Succeeded,
                Err(error) => Status::Failed(error.to_string()),
            });
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.send_replace(Status::Failed("load abandoned before completion".to_owned()));
        }
    }
}

/// Observer side of a load
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    receiver: watch::Receiver<Status>,
}

impl ProgressHandle {
    pub fn status(&self) -> Status {
        self.receiver.borrow().clone()
    }

    pub fn progress(&self) -> f32 {
        match &*self.receiver.borrow() {
            Status::Running(fraction) => *fraction,
            Status::Succeeded => 1.0,
            Status::Failed(_) => 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.receiver.borrow().is_terminal()
    }

    /// Wait for the terminal status
    pub async fn finished(&mut self) -> Status {
        let status = match self.receiver.wait_for(Status::is_terminal).await {
            Ok(status) => Some(status.clone()),
            Err(_) => None,
        };
        status.unwrap_or_else(|| self.status())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn chunked_read() {
        let data = (0..=255u8).cycle().take(1000).collect::<Vec<_>>();
        let (reporter, handle) = progress();

        let read = Scheduler::new(64)
            .read(&mut Cursor::new(&data), 1000, &reporter)
            .await
            .unwrap();

        assert_eq!(read, data);
        assert_eq!(handle.progress(), 1.0);
        assert!(!handle.is_finished());

        reporter.finish::<String>(Ok(()));
        assert_eq!(handle.status(), Status::Succeeded);
    }

    #[tokio::test]
    async fn short_read_fails() {
        let (reporter, _handle) = progress();
        let result = Scheduler::new(4).read(&mut Cursor::new([1, 2, 3]), 10, &reporter).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn terminal_once() {
        let (reporter, mut handle) = progress();
        reporter.set(0.5);
        assert_eq!(handle.status(), Status::Running(0.5));

        reporter.finish(Err("broken"));
        assert_eq!(handle.finished().await, Status::Failed("broken".to_owned()));
    }

    #[tokio::test]
    async fn dropped_reporter_fails() {
        let (reporter, mut handle) = progress();
        drop(reporter);
        assert!(matches!(handle.finished().await, Status::Failed(_)));
    }

    #[tokio::test]
    async fn finished_waits_for_reporter() {
        let (reporter, mut handle) = progress();

        let waiter = tokio::spawn(async move { handle.finished().await });
        tokio::task::yield_now().await;

        reporter.set(0.25);
        reporter.finish::<String>(Ok(()));

        assert_eq!(waiter.await.unwrap(), Status::Succeeded);
    }
}
