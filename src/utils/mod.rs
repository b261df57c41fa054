// ============================================================================
// Utils Module
// ============================================================================
//
// Cross-cutting infrastructure helpers with no domain knowledge.
// ============================================================================

mod circuit_breaker;

pub use circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
