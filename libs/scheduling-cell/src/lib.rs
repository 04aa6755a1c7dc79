pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{SchedulingError, SlotOption, SlotType, TieredSlots};
pub use services::emergency::EmergencyFinder;
pub use services::engine::SlotFinderService;
pub use services::routing::RoutingService;
