pub mod app;
pub mod broker;
pub mod capture;
pub mod news;
pub mod protocol;
