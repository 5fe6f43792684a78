// Repository layer for database operations

pub mod dispatch;
pub mod event;
pub mod registration;

pub use dispatch::DispatchRepository;
pub use event::EventRepository;
pub use registration::RegistrationRepository;
