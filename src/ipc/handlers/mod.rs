pub mod appointments;
pub mod booking;
pub mod core;
pub mod documents;
pub mod insights;
pub mod leads;
pub mod messages;
pub mod metrics;
pub mod payments;
pub mod resources;
pub mod session;
