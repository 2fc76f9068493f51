// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub mod address_parser;
pub mod csv_sink;
pub mod denormalizer;
pub mod matcher;
