pub mod logging;

pub mod cache;
pub mod chat;
pub mod error;
pub mod friendship;
pub mod groups;
pub mod locks;
pub mod model;
pub mod notify;
pub mod profiles;
pub mod service;
pub mod storage;
pub mod store;
pub mod transition;
pub mod web;

pub use error::GraphError;
pub use service::{Options, Rapport};
