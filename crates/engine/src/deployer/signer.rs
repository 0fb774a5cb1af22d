// Soldep - EVM Contract Deployer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The signing seam of the orchestrator.
//!
//! The orchestrator only depends on [`TransactionSigner`]: a capability that
//! turns an unsigned legacy transaction into a signed one for a specific
//! address. The raw-hex private key backend lives here; keystore and
//! hardware wallet backends plug in through the same trait.

use alloy_consensus::{SignableTransaction, Signed, TxLegacy};
use alloy_primitives::Address;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use thiserror::Error;

use super::SignerScheme;

/// Signing failures. Signing happens strictly before submission, so none of
/// these ever leave a partial transaction on chain.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The requested sender does not match the signer's key.
    #[error("not authorized to sign with {0}")]
    NotAuthorized(Address),
    /// The private key material did not parse.
    #[error("failed to parse private key: {0}")]
    InvalidKey(String),
    /// The underlying ECDSA signer failed.
    #[error(transparent)]
    Sign(#[from] alloy_signer::Error),
}

/// Turns an unsigned legacy transaction into a signed one for a specific
/// sender address.
pub trait TransactionSigner: Send + Sync {
    /// The address this signer can sign for.
    fn address(&self) -> Address;

    /// Signs `tx` on behalf of `from`.
    fn sign_tx(&self, from: Address, tx: TxLegacy) -> Result<Signed<TxLegacy>, SignerError>;
}

/// Raw-hex private key signer with a selectable signature scheme.
#[derive(Debug, Clone)]
pub struct RawKeySigner {
    inner: PrivateKeySigner,
    scheme: SignerScheme,
    chain_id: u64,
}

impl RawKeySigner {
    /// Parses a hex private key (with or without a `0x` prefix) and binds it
    /// to a chain ID for EIP-155 signing.
    pub fn new(hex_key: &str, scheme: SignerScheme, chain_id: u64) -> Result<Self, SignerError> {
        let inner: PrivateKeySigner = hex_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|err: alloy_signer_local::LocalSignerError| {
                SignerError::InvalidKey(err.to_string())
            })?;

        Ok(Self { inner, scheme, chain_id })
    }
}

impl TransactionSigner for RawKeySigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn sign_tx(&self, from: Address, mut tx: TxLegacy) -> Result<Signed<TxLegacy>, SignerError> {
        if from != self.inner.address() {
            return Err(SignerError::NotAuthorized(from));
        }

        // A legacy transaction signs its chain ID into the payload under
        // EIP-155; omitting it yields the original Homestead scheme.
        tx.chain_id = match self.scheme {
            SignerScheme::Eip155 => Some(self.chain_id),
            SignerScheme::Homestead => None,
        };

        let signature = self.inner.sign_hash_sync(&tx.signature_hash())?;
        Ok(tx.into_signed(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{TxKind, U256};

    // well-known anvil test key 0
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn sample_tx() -> TxLegacy {
        TxLegacy {
            chain_id: None,
            nonce: 7,
            gas_price: 1_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(Address::ZERO),
            value: U256::from(1u64),
            input: Default::default(),
        }
    }

    #[test]
    fn test_key_parses_with_and_without_prefix() {
        let with = RawKeySigner::new(TEST_KEY, SignerScheme::Eip155, 1).unwrap();
        let without =
            RawKeySigner::new(TEST_KEY.trim_start_matches("0x"), SignerScheme::Eip155, 1).unwrap();

        let expected: Address = TEST_ADDR.parse().unwrap();
        assert_eq!(with.address(), expected);
        assert_eq!(without.address(), expected);
    }

    #[test]
    fn test_rejects_foreign_sender() {
        let signer = RawKeySigner::new(TEST_KEY, SignerScheme::Eip155, 1).unwrap();
        let err = signer.sign_tx(Address::ZERO, sample_tx()).unwrap_err();
        assert!(matches!(err, SignerError::NotAuthorized(_)));
    }

    #[test]
    fn test_eip155_embeds_chain_id() {
        let signer = RawKeySigner::new(TEST_KEY, SignerScheme::Eip155, 1337).unwrap();
        let from = signer.address();

        let signed = signer.sign_tx(from, sample_tx()).unwrap();
        assert_eq!(signed.tx().chain_id, Some(1337));
    }

    #[test]
    fn test_homestead_omits_chain_id() {
        let signer = RawKeySigner::new(TEST_KEY, SignerScheme::Homestead, 1337).unwrap();
        let from = signer.address();

        let signed = signer.sign_tx(from, sample_tx()).unwrap();
        assert_eq!(signed.tx().chain_id, None);
    }

    #[test]
    fn test_schemes_sign_distinct_payloads() {
        // The EIP-155 signing hash commits to the chain ID, the Homestead
        // one does not, so the two schemes must never produce the same
        // signature for one transaction.
        let eip155 = RawKeySigner::new(TEST_KEY, SignerScheme::Eip155, 1337).unwrap();
        let homestead = RawKeySigner::new(TEST_KEY, SignerScheme::Homestead, 1337).unwrap();
        let from = eip155.address();

        let a = eip155.sign_tx(from, sample_tx()).unwrap();
        let b = homestead.sign_tx(from, sample_tx()).unwrap();
        assert_ne!(a.signature(), b.signature());
    }
}
