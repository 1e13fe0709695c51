//! Outbound HTTP collaborators.

pub mod email;
pub mod payment;

pub use email::{Mailer, NotificationKind};
pub use payment::{CheckoutSession, PaymentClient};
