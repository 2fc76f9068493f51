// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Document-store (MongoDB) helpers.

use anyhow::{Context, Result};
use mongodb::{bson::Document, Client, Collection, Namespace};

pub async fn connect(connection_string: &str) -> Result<Client> {
    Client::with_uri_str(connection_string)
        .await
        .context("Failed to connect to the document store")
}

pub fn collection(client: &Client, namespace: &Namespace) -> Collection<Document> {
    client.database(&namespace.db).collection(&namespace.coll)
}
