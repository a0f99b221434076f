pub mod api;
pub mod config;
pub mod cors;
pub mod http;
pub mod oauth;
pub mod proxy;
pub mod servicenow;
