pub mod clock;
pub mod error;
pub mod types;

pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use error::{AuthError, Result};
pub use types::{Claims, Principal};
