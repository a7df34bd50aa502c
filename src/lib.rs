pub mod api;
pub mod config;
pub mod db;
pub mod forwarder;
pub mod frame_log;
pub mod inncom;
pub mod listener;
pub mod notifier;
pub mod room_store;
pub mod stream;
