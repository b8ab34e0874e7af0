pub mod event;
pub mod user;

#[cfg(test)]
pub(crate) mod fixtures;

pub use event::*;
pub use user::*;
