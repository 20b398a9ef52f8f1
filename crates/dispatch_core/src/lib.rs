pub mod active;
pub mod assignments;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod geo;
pub mod locks;
pub mod presence;
pub mod queue;
pub mod sweep;
#[cfg(feature = "test-helpers")]
pub mod test_helpers;
pub mod types;

pub use config::DispatchConfig;
pub use dispatcher::{DispatchOutcome, DispatchPorts, DispatchState, Dispatcher, SweepReport};
pub use error::{DispatchError, StoreError};
pub use types::{DriverId, RideId};
