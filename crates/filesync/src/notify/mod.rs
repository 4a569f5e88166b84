//! Change notification: ownership, routing and delivery

pub mod delivery;
pub mod ownership;
pub mod router;

pub use delivery::{
    DeliveryDriver, DeliveryOutcome, DeliveryReport, DeliveryStatus, MailTransport, Mailbox,
    Message, OutboxTransport, TransportError,
};
pub use ownership::{OwnedFile, Ownership, OwnershipResolver};
pub use router::{NotificationRouter, RoutingEntry, RoutingTable};
