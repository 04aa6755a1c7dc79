pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{BookSlotRequest, BookingConfirmation, BookingError};
pub use services::booking::SlotBookingService;
