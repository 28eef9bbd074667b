pub mod devices;
pub mod health;
