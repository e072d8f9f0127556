//! # BluePic Session
//!
//! Network session wrapper used by the BluePic client to talk to its
//! protected backend.
//!
//! ## Features
//!
//! - **Request Decoration**: Cached authorization, a fresh tracking id per
//!   attempt and an optional analytics metadata header
//! - **Auto Retry**: Timeouts, lost connections and gateway timeouts are
//!   resent while the retry budget lasts
//! - **Reauthorization**: Bearer challenges from the backend trigger one
//!   credential refresh and a single resend
//! - **Network Metadata**: Per-request timing and byte counters for analytics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bluepic_session::{RequestDescriptor, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder()
//!         .app_route("https://bluepic.example.com")
//!         .auto_retries(2)
//!         .build();
//!     let session = Session::with_reqwest(config)?;
//!
//!     let response = session
//!         .fetch(RequestDescriptor::get("/api/images").query("limit", "20"))
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Completion Callbacks
//!
//! ```rust,no_run
//! use bluepic_session::{RequestDescriptor, Session, SessionConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::with_reqwest(SessionConfig::from_env("BLUEPIC")?)?;
//!
//! let handle = session.upload(
//!     RequestDescriptor::post("/api/images").header("content-type", "image/png"),
//!     vec![0u8; 64],
//!     1,
//!     |outcome| match outcome {
//!         Ok(response) => println!("uploaded: {}", response.status()),
//!         Err(e) => eprintln!("upload failed: {}", e),
//!     },
//! );
//! handle.await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod challenge;
mod config;
mod connectivity;
mod decorator;
mod delegate;
mod error;
mod metadata;
mod request;
mod response;
mod retry;
mod session;
mod transport;

pub use auth::{AuthorizationProvider, AuthorizationState, TokenEndpointAuthorizer};
pub use challenge::{BEARER_SCHEME, DEFAULT_AUTH_REALM, is_authorization_required, is_challenge};
pub use config::{SessionConfig, SessionConfigBuilder};
pub use connectivity::{Connectivity, ConnectivityMonitor, FixedConnectivity};
pub use decorator::{ANALYTICS_METADATA_HEADER, RequestDecorator, TRACKING_ID_HEADER};
pub use delegate::{DelegateChain, SessionDelegate};
pub use error::{Result, SessionError, TransportErrorKind};
pub use metadata::{MetadataRecorder, RequestMetadata, TelemetrySink, TracingTelemetrySink};
pub use request::{CachePolicy, RequestDescriptor};
pub use response::Response;
pub use retry::{BackoffStrategy, DefaultRetryPolicy, RetryBudget, RetryPolicy};
pub use session::{CompletionHandler, Outcome, Session, SessionBuilder, TaskKind};
pub use transport::{PreparedRequest, ReqwestTransport, Transport};

// Re-export commonly used types
pub use bytes::Bytes;
pub use http::{HeaderMap, Method, StatusCode};
pub use url::Url;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        AuthorizationProvider, AuthorizationState, Outcome, RequestDescriptor, Response,
        RetryBudget, Session, SessionConfig, SessionError, Transport,
    };
}
