pub mod db;
pub mod error;
pub mod images;
pub mod models;
pub mod service;
pub mod users;
