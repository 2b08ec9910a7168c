// src/threads/request_thread.rs
//! Background worker owning a request queue and the latest-request snapshot.

use crate::error::Result;
use crate::request::IntervalRequest;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Most recently submitted request, replaced as a whole on every submission.
#[derive(Default)]
pub struct LatestRequest {
    current: RwLock<Option<Arc<IntervalRequest>>>,
}

impl LatestRequest {
    pub fn publish(&self, request: Arc<IntervalRequest>) {
        match self.current.write() {
            Ok(mut current) => *current = Some(request),
            Err(poisoned) => *poisoned.into_inner() = Some(request),
        }
    }

    pub fn snapshot(&self) -> Option<Arc<IntervalRequest>> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether `request` still matches the latest request. Without a latest
    /// request every request matches.
    pub fn matches(&self, request: &IntervalRequest) -> bool {
        self.snapshot()
            .map_or(true, |latest| request.is_near(&latest))
    }
}

/// Data fetching part of a worker.
pub trait RequestHandler: Send + 'static {
    /// Execute one request and deliver its result to the request's sender.
    /// Handlers that honor staleness consult `latest` before fetching.
    fn handle(&mut self, request: &IntervalRequest, latest: &LatestRequest) -> Result<()>;
}

/// Handle of a running worker thread. Dropping it interrupts and joins the worker.
pub struct RequestThread {
    name: String,
    queue: Sender<Arc<IntervalRequest>>,
    latest: Arc<LatestRequest>,
    interrupted: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RequestThread {
    pub fn spawn<H: RequestHandler>(name: &str, handler: H, poll_interval: Duration) -> Result<Self> {
        let (queue, receiver) = unbounded();
        let latest = Arc::new(LatestRequest::default());
        let interrupted = Arc::new(AtomicBool::new(false));

        let handle = {
            let latest = Arc::clone(&latest);
            let interrupted = Arc::clone(&interrupted);
            let thread_name = name.to_string();
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || {
                    run(handler, receiver, &latest, &interrupted, poll_interval);
                    debug!("Worker '{}' stopped", thread_name);
                })?
        };

        Ok(Self {
            name: name.to_string(),
            queue,
            latest,
            interrupted,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish `request` as the latest request and queue it.
    pub fn add_request(&self, request: IntervalRequest) {
        let request = Arc::new(request);
        self.latest.publish(Arc::clone(&request));
        if self.queue.send(request).is_err() {
            warn!("Worker '{}' has stopped, request dropped", self.name);
        }
    }

    pub fn latest_request(&self) -> Option<Arc<IntervalRequest>> {
        self.latest.snapshot()
    }

    /// Ask the worker to stop after its current request.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Interrupt the worker and wait for it to stop.
    pub fn join(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.interrupt();
        if let Some(handle) = self.handle.take() {
            // the last owner may be dropped on the worker thread itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Worker '{}' panicked", self.name);
            }
        }
    }
}

impl Drop for RequestThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<H: RequestHandler>(
    mut handler: H,
    receiver: Receiver<Arc<IntervalRequest>>,
    latest: &LatestRequest,
    interrupted: &AtomicBool,
    poll_interval: Duration,
) {
    while !interrupted.load(Ordering::Acquire) {
        let request = match receiver.recv_timeout(poll_interval) {
            Ok(request) => request,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Err(e) = handler.handle(&request, latest) {
            if e.is_terminal() {
                error!("{}; stopping worker ({:?})", e, request);
                interrupted.store(true, Ordering::Release);
            } else {
                warn!("Request {:?} failed: {}", request, e);
            }
            request.sender().receive_failure(&e);
        }
    }
}
