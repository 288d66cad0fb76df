//! Auth endpoints: Google and simple sign-in, refresh, logout.

pub mod principal;
pub mod session;
pub mod sign_in;
pub mod types;
pub(crate) mod utils;

#[cfg(test)]
mod tests;
