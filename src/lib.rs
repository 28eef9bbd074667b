pub mod actors;
pub mod alerts;
pub mod amqp;
pub mod api;
pub mod classifier;
pub mod config;
pub mod events;
pub mod hub;
pub mod notify;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod util;
