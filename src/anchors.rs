//! Unresolved and resolved anchor sets for the resolving screen
//!
//! Both sets sit behind one lock so that moving an id from one to the other is
//! atomic. Resolve completions may be applied from any thread. Callers never
//! get the lock itself: iteration goes through [`SharedAnchors::snapshot`],
//! and decoders or anchors are only touched after it is released.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cloud::{CloudAnchorState, ResolveCompletion};
use crate::error::AnchorError;
use crate::records::AnchorId;
use crate::tracking::SpatialAnchor;
use crate::video::{DecoderFactory, OverlayPlayer};

/// A resolved anchor and its overlay
#[derive(Clone)]
pub struct ResolvedAnchor {
    pub anchor: SpatialAnchor,
    pub player: Arc<OverlayPlayer>,
}

impl ResolvedAnchor {
    pub fn anchor_id(&self) -> &str {
        self.player.anchor_id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved {
        anchor_id: AnchorId,
        remaining: usize,
    },
    Failed {
        anchor_id: AnchorId,
        state: CloudAnchorState,
        remaining: usize,
    },
    /// Id no longer pending: duplicate, late or after teardown
    Stale { anchor_id: AnchorId },
}

#[derive(Default)]
struct AnchorSets {
    unresolved: Vec<AnchorId>,
    resolved: Vec<ResolvedAnchor>,
}

#[derive(Clone, Default)]
pub struct SharedAnchors {
    sets: Arc<Mutex<AnchorSets>>,
}

impl SharedAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids to resolve this session; duplicates and already resolved ids are skipped
    pub fn add_unresolved<I>(&self, anchor_ids: I) -> Vec<AnchorId>
    where
        I: IntoIterator<Item = AnchorId>,
    {
        let mut sets = self.sets.lock();
        let mut added = Vec::new();
        for anchor_id in anchor_ids {
            let known = sets.unresolved.contains(&anchor_id)
                || sets.resolved.iter().any(|r| r.anchor_id() == anchor_id);
            if known {
                continue;
            }
            sets.unresolved.push(anchor_id.clone());
            added.push(anchor_id);
        }
        added
    }

    pub fn unresolved_count(&self) -> usize {
        self.sets.lock().unresolved.len()
    }

    pub fn resolved_count(&self) -> usize {
        self.sets.lock().resolved.len()
    }

    pub fn is_unresolved(&self, anchor_id: &str) -> bool {
        self.sets.lock().unresolved.iter().any(|id| id == anchor_id)
    }

    pub fn resolved_ids(&self) -> Vec<AnchorId> {
        self.sets
            .lock()
            .resolved
            .iter()
            .map(|r| r.anchor_id().to_string())
            .collect()
    }

    pub fn player(&self, anchor_id: &str) -> Option<Arc<OverlayPlayer>> {
        self.sets
            .lock()
            .resolved
            .iter()
            .find(|r| r.anchor_id() == anchor_id)
            .map(|r| Arc::clone(&r.player))
    }

    /// Resolved anchors in resolution order
    pub fn snapshot(&self) -> Vec<ResolvedAnchor> {
        self.sets.lock().resolved.clone()
    }

    pub fn complete_resolve(
        &self,
        completion: ResolveCompletion,
        decoders: &dyn DecoderFactory,
    ) -> ResolveOutcome {
        let ResolveCompletion {
            anchor_id,
            state,
            anchor,
        } = completion;

        let handle = match (state, anchor) {
            (CloudAnchorState::Success, Some(handle)) => handle,
            (state, anchor) => {
                let state = if state.is_error() {
                    state
                } else {
                    CloudAnchorState::ErrorInternal
                };
                if let Some(anchor) = anchor {
                    anchor.detach();
                }
                return self.fail_resolve(anchor_id, state);
            }
        };

        // stale completions must not allocate decoders
        if !self.is_unresolved(&anchor_id) {
            debug!("Ignoring stale resolve for {}", anchor_id);
            handle.detach();
            return ResolveOutcome::Stale { anchor_id };
        }

        let player = Arc::new(OverlayPlayer::new(anchor_id.clone(), decoders));
        let resolved = ResolvedAnchor {
            anchor: SpatialAnchor::with_id(anchor_id.clone(), Arc::clone(&handle)),
            player: Arc::clone(&player),
        };

        // checked again: teardown may have run while the player was built
        let remaining = {
            let mut sets = self.sets.lock();
            match sets.unresolved.iter().position(|id| *id == anchor_id) {
                Some(index) => {
                    sets.unresolved.remove(index);
                    sets.resolved.push(resolved);
                    Some(sets.unresolved.len())
                }
                None => None,
            }
        };

        match remaining {
            Some(remaining) => {
                info!("Resolved anchor {}, {} remaining", anchor_id, remaining);
                ResolveOutcome::Resolved {
                    anchor_id,
                    remaining,
                }
            }
            None => {
                debug!("Resolve for {} went stale while binding", anchor_id);
                handle.detach();
                player.release();
                ResolveOutcome::Stale { anchor_id }
            }
        }
    }

    fn fail_resolve(&self, anchor_id: AnchorId, state: CloudAnchorState) -> ResolveOutcome {
        let remaining = {
            let mut sets = self.sets.lock();
            let before = sets.unresolved.len();
            sets.unresolved.retain(|id| *id != anchor_id);
            (sets.unresolved.len() != before).then_some(sets.unresolved.len())
        };
        match remaining {
            Some(remaining) => {
                warn!(
                    "{}",
                    AnchorError::ResolveFailed {
                        anchor_id: anchor_id.clone(),
                        state
                    }
                );
                ResolveOutcome::Failed {
                    anchor_id,
                    state,
                    remaining,
                }
            }
            None => ResolveOutcome::Stale { anchor_id },
        }
    }

    /// Empty both sets and hand back what was resolved so the caller can
    /// release it outside the lock.
    pub fn teardown(&self) -> Vec<ResolvedAnchor> {
        let mut sets = self.sets.lock();
        sets.unresolved.clear();
        std::mem::take(&mut sets.resolved)
    }
}
