// Library for tests to access modules

pub mod aggregate;
pub mod config;
pub mod fetcher;
pub mod models;
pub mod presentation;
pub mod registry;
pub mod routes;
pub mod scheduler;
pub mod slp;
pub mod stats_repo;
pub mod writer;
