//! Small shared helpers.

pub mod text;
pub mod timeout;

pub use text::truncate;
pub use timeout::with_timeout;
