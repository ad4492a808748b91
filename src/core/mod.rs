//! Request pipeline, response cache and session management.

pub mod cache;
pub mod client;
pub mod interceptor;
pub mod logging;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod request;
pub mod token;
pub mod transport;

pub use cache::{CacheConfig, CacheEntry, CacheManager, CacheStats};
pub use client::{AuthRoutes, ClientBuilder, StorefrontClient, unwrap_envelope};
pub use interceptor::{InterceptorChain, InterceptorId, Interceptors};
pub use models::{ApiEnvelope, SessionPhase, SessionStatus, TokenInfo, TokenState};
pub use notify::{AuthRedirect, Notifier, SilentNotifier, TracingNotifier};
pub use pipeline::{PipelineConfig, RequestPipeline};
pub use request::{CachePolicy, Method, RequestDescriptor, cache_key};
pub use token::{HttpTokenRefresher, TokenConfig, TokenManager, TokenRefresher};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse};
