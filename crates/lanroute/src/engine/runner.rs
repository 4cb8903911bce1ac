// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background polling thread for a [`Node`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::Node;
use crate::transport::Transport;
use crate::Result;

/// Longest single sleep, bounds shutdown latency.
const STOP_CHECK_PERIOD: Duration = Duration::from_millis(50);

/// Drives [`Node::poll`] at a fixed period on a named thread.
///
/// The node stays shared so the application can call
/// [`Node::send_data`] or inspect routes between polls.
pub struct NodeRunner {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    polls: Arc<AtomicU64>,
}

impl NodeRunner {
    pub fn spawn<T: Transport + 'static>(node: Arc<Mutex<Node<T>>>, poll_period: Duration) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let polls = Arc::new(AtomicU64::new(0));

        let handle = {
            let running = Arc::clone(&running);
            let polls = Arc::clone(&polls);
            thread::Builder::new()
                .name("lanroute-poll".to_string())
                .spawn(move || run_loop(&node, poll_period, &running, &polls))?
        };
        log::debug!("[node] poll thread started (period {:?})", poll_period);

        Ok(Self {
            handle: Some(handle),
            running,
            polls,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Completed poll cycles.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("[node] poll thread panicked");
            }
            log::debug!("[node] poll thread stopped");
        }
    }
}

impl Drop for NodeRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<T: Transport>(
    node: &Mutex<Node<T>>,
    poll_period: Duration,
    running: &AtomicBool,
    polls: &AtomicU64,
) {
    let mut next = Instant::now();
    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= next {
            node.lock().poll(now);
            polls.fetch_add(1, Ordering::Relaxed);
            next = now + poll_period;
        }
        let wait = next.saturating_duration_since(Instant::now());
        thread::sleep(wait.min(STOP_CHECK_PERIOD));
    }
}
