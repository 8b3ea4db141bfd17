//! Newsletters, in-app notifications, delivery preferences and outbound mail.

pub mod mailer;
pub mod newsletters;
pub mod notifications;
pub mod preferences;

pub use mailer::{Mail, Mailer};
