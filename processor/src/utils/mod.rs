// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub mod counters;
pub mod database;
pub mod mongo;
pub mod progress_file;
