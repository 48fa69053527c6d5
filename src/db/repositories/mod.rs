pub mod events;
pub mod pending;
