#![allow(clippy::needless_pass_by_value)]

pub mod admin;
pub mod coverage;
pub mod db;
pub mod deploy;
pub mod init;
pub mod preflight;
pub mod publish;
pub mod seed;
pub mod validate;
