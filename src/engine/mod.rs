//! Engine: scanning, paper trading and the loops that drive them.

pub mod coordinator;
pub mod events;
pub mod ledger;
pub mod scanner;

pub use coordinator::{Coordinator, CoordinatorStatus, LoopSchedule};
pub use events::{EventBus, EventKind, LoggingSubscriber};
pub use ledger::{PaperLedger, PlacementResult};
pub use scanner::{OpportunityScanner, ScanReport};
