//! Vehicle controllers
//!
//! [`AnkiController`] is the wireless implementation of
//! [`distortion_core::VehicleController`]. Inbound traffic leaves it as a
//! stream of [`VehicleEvent`]s for the state model.

mod anki;
mod event;

pub use anki::AnkiController;
pub use event::VehicleEvent;
