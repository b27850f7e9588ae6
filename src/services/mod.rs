pub mod registration;
pub mod scanner;
pub mod screening;

pub use registration::RegistrationService;
pub use scanner::AuditService;
pub use screening::ScreeningService;
