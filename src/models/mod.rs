pub mod context;
pub mod draft;
pub mod hold;
pub mod intent;
pub mod request;
pub mod service;

pub use context::BookingContext;
pub use draft::{Draft, DraftStatus};
pub use hold::{Hold, HoldStatus};
pub use intent::{BookingIntent, BookingParse};
pub use request::{BookingRequest, RequestStatus};
pub use service::{find_service, Service, SERVICE_CATALOG};
