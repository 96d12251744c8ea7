//! EIP-712 messages of the confidential-field protocol.
//!
//! Two structures are signed: the user's decryption request (the grant) and
//! the coprocessor's attestation over freshly encrypted inputs. Both produce a
//! [`TypedDataRequest`] carrying the digest for local signers and the
//! `eth_signTypedData_v4` JSON for wallets.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use serde_json::{json, Value};
use std::borrow::Cow;

use crate::handle::CiphertextHandle;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct UserDecryptRequestVerification {
        bytes publicKey;
        address[] contractAddresses;
        uint256 startTimestamp;
        uint256 durationDays;
        bytes extraData;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct CiphertextVerification {
        bytes32[] ctHandles;
        address userAddress;
        address contractAddress;
        uint256 contractChainId;
        bytes extraData;
    }
}

pub const DECRYPTION_DOMAIN_NAME: &str = "Decryption";
pub const INPUT_VERIFICATION_DOMAIN_NAME: &str = "InputVerification";
pub const DOMAIN_VERSION: &str = "1";

pub fn decryption_domain(gateway_chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    domain(DECRYPTION_DOMAIN_NAME, gateway_chain_id, verifying_contract)
}

pub fn input_verification_domain(gateway_chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    domain(INPUT_VERIFICATION_DOMAIN_NAME, gateway_chain_id, verifying_contract)
}

fn domain(name: &'static str, chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(name)),
        Some(Cow::Borrowed(DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

/// A message ready to be signed, in both digest and wallet form.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedDataRequest {
    pub primary_type: &'static str,
    pub signing_hash: B256,
    pub json: Value,
}

/// Message structures that know their EIP-712 field list.
pub trait TypedMessage: SolStruct {
    const PRIMARY_TYPE: &'static str;

    fn type_fields() -> Value;

    fn message_json(&self) -> Value;

    fn typed_data(&self, domain: &Eip712Domain) -> TypedDataRequest {
        let mut types = serde_json::Map::new();
        types.insert(
            "EIP712Domain".to_string(),
            json!([
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" },
            ]),
        );
        types.insert(Self::PRIMARY_TYPE.to_string(), Self::type_fields());
        TypedDataRequest {
            primary_type: Self::PRIMARY_TYPE,
            signing_hash: self.eip712_signing_hash(domain),
            json: json!({
                "types": types,
                "primaryType": Self::PRIMARY_TYPE,
                "domain": domain_json(domain),
                "message": self.message_json(),
            }),
        }
    }
}

fn domain_json(domain: &Eip712Domain) -> Value {
    json!({
        "name": domain.name.as_deref().unwrap_or_default(),
        "version": domain.version.as_deref().unwrap_or_default(),
        "chainId": domain.chain_id.map(|c| c.to_string()).unwrap_or_default(),
        "verifyingContract": domain.verifying_contract.map(|a| a.to_string()).unwrap_or_default(),
    })
}

impl TypedMessage for UserDecryptRequestVerification {
    const PRIMARY_TYPE: &'static str = "UserDecryptRequestVerification";

    fn type_fields() -> Value {
        json!([
            { "name": "publicKey", "type": "bytes" },
            { "name": "contractAddresses", "type": "address[]" },
            { "name": "startTimestamp", "type": "uint256" },
            { "name": "durationDays", "type": "uint256" },
            { "name": "extraData", "type": "bytes" },
        ])
    }

    fn message_json(&self) -> Value {
        json!({
            "publicKey": self.publicKey.to_string(),
            "contractAddresses": self
                .contractAddresses
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>(),
            "startTimestamp": self.startTimestamp.to_string(),
            "durationDays": self.durationDays.to_string(),
            "extraData": self.extraData.to_string(),
        })
    }
}

impl TypedMessage for CiphertextVerification {
    const PRIMARY_TYPE: &'static str = "CiphertextVerification";

    fn type_fields() -> Value {
        json!([
            { "name": "ctHandles", "type": "bytes32[]" },
            { "name": "userAddress", "type": "address" },
            { "name": "contractAddress", "type": "address" },
            { "name": "contractChainId", "type": "uint256" },
            { "name": "extraData", "type": "bytes" },
        ])
    }

    fn message_json(&self) -> Value {
        json!({
            "ctHandles": self.ctHandles.iter().map(|h| h.to_string()).collect::<Vec<_>>(),
            "userAddress": self.userAddress.to_string(),
            "contractAddress": self.contractAddress.to_string(),
            "contractChainId": self.contractChainId.to_string(),
            "extraData": self.extraData.to_string(),
        })
    }
}

impl UserDecryptRequestVerification {
    pub fn new(public_key: &[u8], contracts: &[Address], start_timestamp: u64, duration_days: u32) -> Self {
        Self {
            publicKey: Bytes::copy_from_slice(public_key),
            contractAddresses: contracts.to_vec(),
            startTimestamp: U256::from(start_timestamp),
            durationDays: U256::from(duration_days),
            extraData: Bytes::new(),
        }
    }
}

impl CiphertextVerification {
    pub fn new(
        handles: &[CiphertextHandle],
        user: Address,
        contract: Address,
        chain_id: u64,
        extra_data: Bytes,
    ) -> Self {
        Self {
            ctHandles: handles.iter().map(|h| h.0).collect(),
            userAddress: user,
            contractAddress: contract,
            contractChainId: U256::from(chain_id),
            extraData: extra_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_strings() {
        assert_eq!(
            UserDecryptRequestVerification::eip712_encode_type(),
            "UserDecryptRequestVerification(bytes publicKey,address[] contractAddresses,uint256 startTimestamp,uint256 durationDays,bytes extraData)"
        );
        assert_eq!(
            CiphertextVerification::eip712_encode_type(),
            "CiphertextVerification(bytes32[] ctHandles,address userAddress,address contractAddress,uint256 contractChainId,bytes extraData)"
        );
    }

    #[test]
    fn test_signing_hash_binds_every_field() {
        let domain = decryption_domain(55815, Address::repeat_byte(0xb6));
        let a = Address::repeat_byte(1);
        let base = UserDecryptRequestVerification::new(&[2u8; 33], &[a], 1_000, 365);
        let h = base.eip712_signing_hash(&domain);

        let other_key = UserDecryptRequestVerification::new(&[3u8; 33], &[a], 1_000, 365);
        let other_time = UserDecryptRequestVerification::new(&[2u8; 33], &[a], 1_001, 365);
        let other_days = UserDecryptRequestVerification::new(&[2u8; 33], &[a], 1_000, 364);
        assert_ne!(h, other_key.eip712_signing_hash(&domain));
        assert_ne!(h, other_time.eip712_signing_hash(&domain));
        assert_ne!(h, other_days.eip712_signing_hash(&domain));

        let other_domain = decryption_domain(1, Address::repeat_byte(0xb6));
        assert_ne!(h, base.eip712_signing_hash(&other_domain));
    }

    #[test]
    fn test_typed_data_json() {
        let domain = input_verification_domain(55815, Address::repeat_byte(0x70));
        let msg = CiphertextVerification::new(
            &[CiphertextHandle(B256::repeat_byte(1))],
            Address::repeat_byte(2),
            Address::repeat_byte(3),
            31337,
            Bytes::new(),
        );
        let req = msg.typed_data(&domain);
        assert_eq!(req.primary_type, "CiphertextVerification");
        assert_eq!(req.signing_hash, msg.eip712_signing_hash(&domain));
        assert_eq!(req.json["primaryType"], "CiphertextVerification");
        assert_eq!(req.json["domain"]["name"], "InputVerification");
        assert_eq!(req.json["domain"]["chainId"], "55815");
        assert_eq!(req.json["message"]["contractChainId"], "31337");
        assert_eq!(req.json["types"]["CiphertextVerification"][0]["name"], "ctHandles");
    }
}
