// Library surface for the console binary and headless tests.
// Terminal rendering stays in main.rs/ui.rs.
pub mod config;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod navigation;
pub mod results;
pub mod runtime;
pub mod session;
pub mod sound;
pub mod source;
pub mod target;
pub mod trajectory;

pub use controller::{Phase, SessionController};
pub use error::{NavigationError, RecorderError};
