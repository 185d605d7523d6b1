extern crate alloc;

pub mod admission;
pub mod capture;
pub mod courier;
pub mod delivery;
pub mod error;
pub mod interaction;
pub mod ledger;
pub mod library;
pub mod session;
pub mod settings;

mod bot;

#[cfg(test)]
mod testing;

pub use bot::{Bot, Followup};
pub use courier::Courier;
pub use ed25519_dalek::VerifyingKey;
pub use library::Library;
pub use session::{Coordinator, Player, Terminal};
pub use settings::{AttemptPolicy, Settings};
