// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::Parser;
use processor::LeaseProcessorConfig;
use server_framework::JobArgs;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = JobArgs::parse();
    args.run::<LeaseProcessorConfig>().await
}
