pub mod endpoint;
pub mod event;
pub mod health;
pub mod message;
pub mod retry;
pub mod status;
