pub mod rate_limit;
pub mod timeout;
pub mod trace;
pub mod validation;

pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use timeout::{QueryTimeoutError, TimeoutManager};
pub use trace::TraceContext;
pub use validation::{InputValidator, ValidationError};
