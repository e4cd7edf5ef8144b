//! Frame dispatcher: filters frames against the tracked entities and
//! forwards them to the fog node.
//!
//! Every approved frame gets its own task. Tasks run concurrently, are never
//! retried and carry no ordering guarantee between each other; a failure is
//! logged and the frame is dropped.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::EdgeError;
use crate::extractor::{DelimitedExtractor, EntityExtractor, ExtractError};
use crate::frame::{ForwardEnvelope, RawFrame};
use crate::identity::DeviceId;
use crate::tracked::TrackedEntities;
use crate::transport::{FogTransport, TransportError};

/// Forward timeout applied when none is configured.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Entity name could not be read from the payload
    #[error("Entity extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// Fog node transport failed
    #[error("Forward failed: {0}")]
    Forward(#[from] TransportError),

    /// Fog node did not accept the envelope in time
    #[error("Forward timed out after {0:?}")]
    Timeout(Duration),
}

/// What happens to frames whose entity is not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedPolicy {
    /// Only tracked entities are forwarded.
    #[default]
    Drop,
    /// Every frame is forwarded; the envelope still names the entity.
    Forward,
}

impl FromStr for UnmatchedPolicy {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(UnmatchedPolicy::Drop),
            "forward" => Ok(UnmatchedPolicy::Forward),
            other => Err(EdgeError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for UnmatchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedPolicy::Drop => f.write_str("drop"),
            UnmatchedPolicy::Forward => f.write_str("forward"),
        }
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Frame was handed to the fog transport
    Forwarded {
        /// Extracted entity name
        entity: Option<String>,
        /// Whether the entity was in the tracked snapshot
        matched: bool,
    },
    /// Frame was dropped by the unmatched policy
    Filtered {
        /// Extracted entity name
        entity: Option<String>,
    },
}

impl DispatchOutcome {
    /// Check if the frame reached the transport
    pub fn is_forwarded(&self) -> bool {
        matches!(self, DispatchOutcome::Forwarded { .. })
    }
}

/// Decides per frame whether to forward, and forwards.
pub struct FrameDispatcher {
    device_id: DeviceId,
    extractor: Arc<dyn EntityExtractor>,
    transport: Arc<dyn FogTransport>,
    policy: UnmatchedPolicy,
    forward_timeout: Duration,
    /// Optional bound on concurrently running dispatch tasks
    in_flight: Option<Arc<Semaphore>>,
}

impl fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDispatcher")
            .field("device_id", &self.device_id)
            .field("extractor", &self.extractor)
            .field("policy", &self.policy)
            .field("forward_timeout", &self.forward_timeout)
            .field(
                "max_in_flight",
                &self.in_flight.as_ref().map(|s| s.available_permits()),
            )
            .finish()
    }
}

impl FrameDispatcher {
    /// Create a dispatcher with the default extractor, `Drop` policy,
    /// default timeout and unbounded concurrency.
    pub fn new(device_id: DeviceId, transport: Arc<dyn FogTransport>) -> Self {
        Self {
            device_id,
            extractor: Arc::new(DelimitedExtractor::default()),
            transport,
            policy: UnmatchedPolicy::default(),
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
            in_flight: None,
        }
    }

    /// Use a different entity extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Set the unmatched-frame policy.
    pub fn with_unmatched_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound each forward call.
    pub fn with_forward_timeout(mut self, forward_timeout: Duration) -> Self {
        self.forward_timeout = forward_timeout;
        self
    }

    /// Limit concurrently running dispatch tasks; frames beyond the limit
    /// are dropped.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.in_flight = Some(Arc::new(Semaphore::new(max_in_flight)));
        self
    }

    /// Identity attached to forwarded frames.
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Configured unmatched policy.
    pub fn unmatched_policy(&self) -> UnmatchedPolicy {
        self.policy
    }

    /// Filter and forward one frame against `entities`.
    pub async fn handle(
        &self,
        frame: RawFrame,
        entities: TrackedEntities,
    ) -> Result<DispatchOutcome, DispatchError> {
        let entity = self.extractor.extract(frame.payload())?;
        let matched = entity.as_deref().is_some_and(|name| entities.contains(name));

        if !matched && self.policy == UnmatchedPolicy::Drop {
            return Ok(DispatchOutcome::Filtered { entity });
        }

        let envelope = ForwardEnvelope::new(self.device_id, entity.clone(), frame);
        match timeout(self.forward_timeout, self.transport.forward(&envelope)).await {
            Ok(Ok(())) => Ok(DispatchOutcome::Forwarded { entity, matched }),
            Ok(Err(e)) => Err(DispatchError::Forward(e)),
            Err(_) => Err(DispatchError::Timeout(self.forward_timeout)),
        }
    }

    /// Run [`handle`](Self::handle) on a new task.
    ///
    /// Returns `None` when the in-flight bound is exhausted and the frame was
    /// dropped. The task logs its own outcome and never propagates errors.
    pub fn spawn(
        self: &Arc<Self>,
        frame: RawFrame,
        entities: TrackedEntities,
    ) -> Option<JoinHandle<()>> {
        let permit = match &self.in_flight {
            Some(limit) => match Arc::clone(limit).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(source = %frame.source(), "Dispatch capacity exhausted, dropping frame");
                    return None;
                }
            },
            None => None,
        };

        let dispatcher = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _permit = permit;
            let source = frame.source();
            match dispatcher.handle(frame, entities).await {
                Ok(DispatchOutcome::Forwarded { entity, matched }) => {
                    info!(
                        %source,
                        entity = entity.as_deref().unwrap_or("-"),
                        matched,
                        device_id = %dispatcher.device_id,
                        "Frame forwarded"
                    );
                }
                Ok(DispatchOutcome::Filtered { entity }) => {
                    debug!(
                        %source,
                        entity = entity.as_deref().unwrap_or("-"),
                        "Frame filtered out"
                    );
                }
                Err(e) => {
                    warn!(%source, error = %e, "Dropping frame");
                }
            }
        }))
    }
}
