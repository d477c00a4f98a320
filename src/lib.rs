pub mod advisor;
pub mod api;
pub mod coach;
pub mod config;
pub mod db;
pub mod grading;
pub mod identity;
pub mod metrics;
pub mod rules;
pub mod skills;
pub mod webhook;
