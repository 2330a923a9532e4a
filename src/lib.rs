// ABOUTME: Library crate for gitgroup exposing the repository group engine for testing and external use

#![allow(missing_docs)]

pub mod app;
pub mod cli;
pub mod config;
pub mod git;
pub mod models;
