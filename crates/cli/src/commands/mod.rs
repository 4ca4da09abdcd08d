pub mod chat;
pub mod classify;
pub mod onboard;
pub mod providers;
pub mod status;
