// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub mod postcodes;
pub mod update_from_csv;
