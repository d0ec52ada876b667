//! Cross-cutting runtime infrastructure: the breaker registry, security
//! middleware stack, and metrics exposition.

pub mod circuit_breaker;
pub mod metrics;
pub mod security_middleware;

pub use circuit_breaker::{CircuitBreakerRegistry, CircuitState};
pub use security_middleware::SecurityState;
