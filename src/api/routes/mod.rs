pub mod alerts;
pub mod health;
pub mod readings;
pub mod thresholds;
