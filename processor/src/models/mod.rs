// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub mod address_models;
pub mod lease_models;
