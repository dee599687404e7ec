pub mod client;
pub mod dto;
pub mod task_api;

pub use client::HttpClient;
pub use task_api::HttpTaskApi;
