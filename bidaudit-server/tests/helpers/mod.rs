//! Shared test helpers

#![allow(dead_code)]

pub mod db_utils;
pub mod fake_agent;
