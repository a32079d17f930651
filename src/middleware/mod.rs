pub mod permission;

pub use permission::{authenticate, CurrentUser};
