//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod key;
mod limiter;
pub mod rules;
mod sweeper;
mod throttle;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{RateLimitConfig, RequestRecord};
pub use key::RateLimitKey;
pub use limiter::{LimiterOptions, RateLimiter};
pub use rules::ActionRules;
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use throttle::Throttle;
