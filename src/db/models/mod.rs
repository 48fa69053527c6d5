pub mod event;

pub use event::StoredEvent;
