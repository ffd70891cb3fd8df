pub mod article;
pub mod event_log;
pub mod reference;
