pub mod health;
pub mod images;
pub mod messages;
pub mod metrics;
