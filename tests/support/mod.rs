#![allow(dead_code)]

pub mod archive_server;
pub mod modelbay_env;
