pub mod config;
pub mod events;
pub mod feedback;
pub mod rules;
pub mod run;
