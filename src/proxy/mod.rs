pub mod api;
pub mod gateway;
pub mod model;
pub mod service;
