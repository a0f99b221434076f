pub mod api;
pub mod demo;
pub mod model;
pub mod service;
