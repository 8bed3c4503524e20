pub mod documents;
pub mod health;
pub mod search;
pub mod submissions;
pub mod thread_settings;
