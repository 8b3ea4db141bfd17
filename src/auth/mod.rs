pub mod accounts;
pub mod password;
pub mod router;
pub mod user;
pub mod viewer;

pub use user::{AuthSession, Backend};
pub use viewer::{PageViewer, Viewer};
