// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

// Need to use this because src/schema.rs uses the macros
#[macro_use]
extern crate diesel;

pub use config::LeaseProcessorConfig;

pub mod config;
pub mod enricher;
pub mod extraction;
pub mod matching;
pub mod models;
pub mod processors;
pub mod schema;
pub mod utils;
pub mod worker;
