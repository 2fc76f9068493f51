// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub mod reference_address;
