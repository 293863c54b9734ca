pub mod ai;
pub mod booking;
pub mod clock;
pub mod messaging;
pub mod scheduling;
