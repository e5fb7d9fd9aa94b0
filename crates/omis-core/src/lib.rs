pub mod clock;
pub mod error;
pub mod record;
pub mod status;
pub mod store;
pub mod test_support;

pub use clock::{truncate_to_seconds, Clock, SystemClock};
pub use error::CoreError;
pub use record::{NewRequest, RequestRecord, UpdateOutcome};
pub use status::RequestStatus;
pub use store::{RequestStore, SqliteRequestStore};
