#![cfg(not(doctest))]

pub mod db;
pub mod email;
pub mod html;
pub mod models;
pub mod token;
pub mod validators;
