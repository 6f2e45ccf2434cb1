pub mod bus;
pub mod config;
pub mod demo;
pub mod derive;
pub mod edit;
pub mod export;
pub mod filter;
pub mod highlight;
pub mod layout;
pub mod local_store;
pub mod logging;
pub mod media;
pub mod persist;
pub mod player;
pub mod postgrest;
pub mod rally;
pub mod stat_event;
pub mod state;
pub mod store;
pub mod summary;
pub mod sync;
pub mod tracker;
