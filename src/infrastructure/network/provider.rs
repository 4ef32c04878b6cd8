// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::MinerError;
use alloy::network::EthereumWallet;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use url::Url;

pub struct ConnectionFactory;

impl ConnectionFactory {
    /// HTTP provider with a signing wallet attached; every submission goes
    /// through this single connection.
    pub fn http_with_wallet(rpc_url: &str, signer: PrivateKeySigner) -> Result<DynProvider, MinerError> {
        let url =
            Url::parse(rpc_url).map_err(|e| MinerError::Config(format!("Invalid RPC URL: {}", e)))?;

        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);
        Ok(provider.erased())
    }
}
