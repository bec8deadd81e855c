//! Cloud anchor hosting and resolving
//!
//! The cloud service runs its requests elsewhere and reports back through a
//! [`CompletionSender`]. [`CloudAnchorManager`] owns the receiving side,
//! bounds the number of resolves in flight and allows one host at a time.
//! Applying a completion to the anchor sets is the caller's job.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::{AnchorError, AnchorResult};
use crate::geometry::Pose;
use crate::tracking::AnchorHandle;

/// Terminal state reported by the cloud service for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudAnchorState {
    Success,
    ErrorInternal,
    ErrorNotAuthorized,
    ErrorResourceExhausted,
    ErrorHostingDatasetProcessingFailed,
    ErrorCloudIdNotFound,
    ErrorResolvingSdkVersionTooOld,
    ErrorResolvingSdkVersionTooNew,
    ErrorHostingServiceUnavailable,
}

impl CloudAnchorState {
    pub fn is_error(self) -> bool {
        self != CloudAnchorState::Success
    }
}

pub struct HostCompletion {
    pub anchor_id: Option<String>,
    pub state: CloudAnchorState,
}

pub struct ResolveCompletion {
    pub anchor_id: String,
    pub state: CloudAnchorState,
    /// Tracked anchor, present on success
    pub anchor: Option<Arc<dyn AnchorHandle>>,
}

pub enum CloudCompletion {
    Hosted(HostCompletion),
    Resolved(ResolveCompletion),
}

/// Handed to the service with every request; completes it from any thread
#[derive(Clone)]
pub struct CompletionSender {
    tx: Sender<CloudCompletion>,
}

impl CompletionSender {
    pub fn hosted(&self, anchor_id: Option<String>, state: CloudAnchorState) {
        self.send(CloudCompletion::Hosted(HostCompletion { anchor_id, state }));
    }

    pub fn resolved(
        &self,
        anchor_id: impl Into<String>,
        state: CloudAnchorState,
        anchor: Option<Arc<dyn AnchorHandle>>,
    ) {
        self.send(CloudCompletion::Resolved(ResolveCompletion {
            anchor_id: anchor_id.into(),
            state,
            anchor,
        }));
    }

    fn send(&self, completion: CloudCompletion) {
        // the manager is gone after teardown; late completions are dropped
        if self.tx.send(completion).is_err() {
            debug!("Dropping cloud completion after shutdown");
        }
    }
}

/// Remote anchor hosting service
pub trait CloudAnchorService: Send {
    fn host(&mut self, pose: Pose, done: CompletionSender);
    fn resolve(&mut self, anchor_id: &str, done: CompletionSender);
    /// Give a polling service the chance to deliver completions
    fn poll(&mut self) {}
}

pub struct CloudAnchorManager {
    service: Box<dyn CloudAnchorService>,
    tx: Sender<CloudCompletion>,
    rx: Receiver<CloudCompletion>,
    max_in_flight: usize,
    in_flight: HashSet<String>,
    queued: VecDeque<String>,
    host_in_flight: bool,
}

impl CloudAnchorManager {
    pub fn new(service: Box<dyn CloudAnchorService>, max_in_flight: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            service,
            tx,
            rx,
            max_in_flight: max_in_flight.max(1),
            in_flight: HashSet::new(),
            queued: VecDeque::new(),
            host_in_flight: false,
        }
    }

    fn sender(&self) -> CompletionSender {
        CompletionSender {
            tx: self.tx.clone(),
        }
    }

    pub fn is_host_in_flight(&self) -> bool {
        self.host_in_flight
    }

    pub fn in_flight_resolves(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued_resolves(&self) -> usize {
        self.queued.len()
    }

    pub fn host(&mut self, pose: Pose) -> AnchorResult<()> {
        if self.host_in_flight {
            return Err(AnchorError::HostInFlight);
        }
        self.host_in_flight = true;
        info!("Hosting anchor at {:?}", pose.translation);
        let done = self.sender();
        self.service.host(pose, done);
        Ok(())
    }

    /// Issue resolves for every id, queueing beyond the in-flight bound
    pub fn resolve_all<I>(&mut self, anchor_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        for anchor_id in anchor_ids {
            if self.in_flight.contains(&anchor_id) || self.queued.contains(&anchor_id) {
                continue;
            }
            self.queued.push_back(anchor_id);
        }
        self.launch_queued();
    }

    fn launch_queued(&mut self) {
        while self.in_flight.len() < self.max_in_flight {
            let Some(anchor_id) = self.queued.pop_front() else {
                break;
            };
            debug!("Resolving anchor {}", anchor_id);
            self.in_flight.insert(anchor_id.clone());
            let done = self.sender();
            self.service.resolve(&anchor_id, done);
        }
    }

    /// Non-blocking: poll the service and return every completion received
    pub fn on_update(&mut self) -> Vec<CloudCompletion> {
        self.service.poll();
        let completions: Vec<CloudCompletion> = self.rx.try_iter().collect();
        for completion in &completions {
            match completion {
                CloudCompletion::Hosted(_) => self.host_in_flight = false,
                CloudCompletion::Resolved(resolved) => {
                    if !self.in_flight.remove(&resolved.anchor_id) {
                        warn!("Completion for unknown resolve {}", resolved.anchor_id);
                    }
                }
            }
        }
        if !completions.is_empty() {
            self.launch_queued();
        }
        completions
    }

    /// Forget pending work; completions that still arrive are ignored by the
    /// anchor sets.
    pub fn cancel_all(&mut self) {
        self.queued.clear();
        self.in_flight.clear();
        self.host_in_flight = false;
    }
}
