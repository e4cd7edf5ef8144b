//! ClientHog Edge - sensor frame relay for edge nodes
//!
//! Receives camera/sensor frames over UDP from approved local sources,
//! filters them against an operator-controlled list of tracked entities and
//! forwards matches to the fog node.
//!
//! # Core Components
//!
//! - **Source Allow-List**: static address patterns permitted to send frames
//! - **Tracked-Entity Store**: the shared, atomically replaced entity list
//! - **Frame Dispatcher**: per-frame filtering and best-effort forwarding
//! - **Ingest Loop**: UDP receive loop spawning one dispatch task per frame
//! - **Control Endpoint**: HTTP route replacing the tracked entities
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clienthog_edge::{
//!     DeviceId, FrameDispatcher, IngestLoop, SourceAllowList, TrackedEntityStore,
//!     UdpFogTransport,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(TrackedEntityStore::new(vec!["Bear".into()]));
//! let transport = Arc::new(UdpFogTransport::connect("localhost:3444").await?);
//! let dispatcher = Arc::new(FrameDispatcher::new(DeviceId::new(352), transport));
//! let ingest = IngestLoop::bind(
//!     "localhost:3333",
//!     Arc::new(SourceAllowList::default()),
//!     store,
//!     dispatcher,
//! )
//! .await?;
//! ingest.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod allow_list;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod identity;
pub mod ingest;
pub mod resolve;
pub mod tracked;
pub mod transport;

pub use allow_list::{SourceAllowList, DEFAULT_APPROVED_SOURCES};
pub use dispatcher::{
    DispatchError, DispatchOutcome, FrameDispatcher, UnmatchedPolicy, DEFAULT_FORWARD_TIMEOUT,
};
pub use error::EdgeError;
pub use extractor::{
    DelimitedExtractor, EntityExtractor, ExtractError, ExtractorSpec, JsonFieldExtractor,
    NoExtractor,
};
pub use frame::{ForwardEnvelope, RawFrame, MAX_FRAME_SIZE};
pub use identity::DeviceId;
pub use ingest::{IngestError, IngestLoop};
pub use tracked::{TrackedEntities, TrackedEntityStore};
pub use transport::{FogTransport, TransportError, UdpFogTransport};
