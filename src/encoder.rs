//! Message encoding for `sendCrossChainMessage`
//!
//! Turns a [`MessageRequest`] into the call data and value the wallet signs.
//! Validation happens here, before anything leaves the process.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use std::str::FromStr;
use tracing::debug;

use crate::contracts::TeleporterMessenger::sendCrossChainMessageCall;
use crate::error::IcmError;
use crate::fees::FeeEstimator;
use crate::types::{MessageInput, MessageRequest, PreparedTransaction, TransactionData};

/// Longest accepted message, in characters
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Length of a mock call-data blob (one zero word)
const MOCK_CALL_DATA_LEN: usize = 32;

/// Which messenger the system talks to, decided once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractMode {
    Real(Address),
    /// No contract deployed; payloads are placeholders and delivery is never reported
    Mock,
}

impl ContractMode {
    /// The zero address selects mock mode
    pub fn from_address(address: Address) -> Self {
        if address == Address::ZERO {
            ContractMode::Mock
        } else {
            ContractMode::Real(address)
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, ContractMode::Mock)
    }

    pub fn contract_address(&self) -> Option<Address> {
        match self {
            ContractMode::Real(address) => Some(*address),
            ContractMode::Mock => None,
        }
    }
}

/// Normalize a destination chain ID to 32 big-endian bytes.
///
/// `0x`-prefixed input is hex and is left-padded; anything else must be a
/// decimal numeral. Values that need more than 32 bytes are rejected.
pub fn normalize_chain_id(input: &str) -> Result<B256, IcmError> {
    let trimmed = input.trim();
    let invalid = |reason: &str| IcmError::InvalidChainId {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }

    if let Some(hex_part) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        if hex_part.is_empty() {
            return Err(invalid("no hex digits"));
        }
        // An odd nibble count gets one leading zero nibble
        let padded = if hex_part.len() % 2 == 1 {
            format!("0{}", hex_part)
        } else {
            hex_part.to_string()
        };
        let bytes = hex::decode(&padded).map_err(|_| invalid("contains non-hex characters"))?;
        if bytes.len() > 32 {
            return Err(invalid(&format!("{} bytes exceeds 32", bytes.len())));
        }
        return Ok(left_pad_32(&bytes));
    }

    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a decimal numeral or 0x-prefixed hex"));
    }
    let value = U256::from_str_radix(trimmed, 10).map_err(|_| invalid("exceeds 32 bytes"))?;
    Ok(B256::from(value.to_be_bytes::<32>()))
}

fn left_pad_32(bytes: &[u8]) -> B256 {
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    B256::from(out)
}

/// Parse an account identifier: `0x` followed by 40 hex characters
pub fn parse_address(input: &str) -> Result<Address, IcmError> {
    let trimmed = input.trim();
    let valid = trimmed.len() == 42
        && trimmed.starts_with("0x")
        && trimmed[2..].bytes().all(|b| b.is_ascii_hexdigit());
    if !valid {
        return Err(IcmError::InvalidAddress(input.to_string()));
    }
    Address::from_str(trimmed).map_err(|_| IcmError::InvalidAddress(input.to_string()))
}

/// Parse a 32-byte hash (transaction hash or message ID)
pub fn parse_hash(input: &str) -> Result<B256, IcmError> {
    let trimmed = input.trim();
    let valid = trimmed.len() == 66
        && trimmed.starts_with("0x")
        && trimmed[2..].bytes().all(|b| b.is_ascii_hexdigit());
    if !valid {
        return Err(IcmError::InvalidTransactionHash(input.to_string()));
    }
    B256::from_str(trimmed).map_err(|_| IcmError::InvalidTransactionHash(input.to_string()))
}

/// Validate the message length in characters
pub fn check_message_length(message: &str) -> Result<(), IcmError> {
    let length = message.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(IcmError::MessageTooLarge {
            length,
            max: MAX_MESSAGE_CHARS,
        });
    }
    Ok(())
}

/// Builds `sendCrossChainMessage` transactions
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    mode: ContractMode,
    wallet_gas_limit: u64,
    fees: FeeEstimator,
}

impl MessageEncoder {
    pub fn new(mode: ContractMode, wallet_gas_limit: u64, fees: FeeEstimator) -> Self {
        Self {
            mode,
            wallet_gas_limit,
            fees,
        }
    }

    pub fn fees(&self) -> &FeeEstimator {
        &self.fees
    }

    /// Validate and normalize a request into the encoded tuple
    pub fn normalize(&self, request: &MessageRequest) -> Result<MessageInput, IcmError> {
        check_message_length(&request.message)?;
        if request.required_gas_limit == 0 {
            return Err(IcmError::InvalidGasLimit);
        }

        let destination_blockchain_id = normalize_chain_id(&request.destination_chain_id)?;
        let destination_address = parse_address(&request.destination_address)?;
        let allowed_relayer_addresses = request
            .allowed_relayer_addresses
            .iter()
            .map(|a| parse_address(a))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MessageInput {
            destination_blockchain_id,
            destination_address,
            // Fees are paid in the native token
            fee_token_address: Address::ZERO,
            fee_amount: request.fee_amount,
            required_gas_limit: request.required_gas_limit,
            allowed_relayer_addresses,
            message: request.message.clone(),
        })
    }

    /// Encode a request into a transaction ready for signing
    pub fn encode(&self, request: &MessageRequest) -> Result<PreparedTransaction, IcmError> {
        let input = self.normalize(request)?;
        let message_bytes = input.message.as_bytes();
        let fee_quote = self.fees.estimate(
            &request.destination_chain_id,
            message_bytes.len() as u64,
            input.required_gas_limit,
        );

        let (to, data, mock) = match self.mode {
            ContractMode::Real(contract) => {
                let call = sendCrossChainMessageCall {
                    destinationBlockchainID: input.destination_blockchain_id,
                    destinationAddress: input.destination_address,
                    feeTokenAddress: input.fee_token_address,
                    feeAmount: input.fee_amount,
                    requiredGasLimit: U256::from(input.required_gas_limit),
                    allowedRelayerAddresses: input.allowed_relayer_addresses.clone(),
                    message: Bytes::copy_from_slice(message_bytes),
                };
                (contract, Bytes::from(call.abi_encode()), false)
            }
            ContractMode::Mock => (
                Address::ZERO,
                Bytes::from(vec![0u8; MOCK_CALL_DATA_LEN]),
                true,
            ),
        };

        debug!(
            destination = %input.destination_blockchain_id,
            recipient = %input.destination_address,
            message_bytes = message_bytes.len(),
            gas_limit = input.required_gas_limit,
            mock,
            "Encoded cross-chain message"
        );

        Ok(PreparedTransaction {
            transaction_data: TransactionData {
                to,
                data,
                value: input.fee_amount,
                gas_limit: self.wallet_gas_limit,
            },
            message_input: input,
            fee_quote,
            mock,
        })
    }
}

/// Decode `sendCrossChainMessage` call data back into the tuple it carries
pub fn decode_call_data(data: &[u8]) -> Result<MessageInput, IcmError> {
    let call = sendCrossChainMessageCall::abi_decode(data, true)
        .map_err(|e| IcmError::InvalidCallData(e.to_string()))?;
    let required_gas_limit: u64 = call
        .requiredGasLimit
        .try_into()
        .map_err(|_| IcmError::InvalidGasLimit)?;

    Ok(MessageInput {
        destination_blockchain_id: call.destinationBlockchainID,
        destination_address: call.destinationAddress,
        fee_token_address: call.feeTokenAddress,
        fee_amount: call.feeAmount,
        required_gas_limit,
        allowed_relayer_addresses: call.allowedRelayerAddresses,
        message: String::from_utf8_lossy(&call.message).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const CONTRACT: Address = address!("253b2784c75e510dD0fF1da844684a1aC0aa5fcf");
    const RECIPIENT: &str = "0x2129b880124f9f867dCc080f3272b6CaaBDD5850";

    fn request(chain_id: &str, message: &str) -> MessageRequest {
        MessageRequest {
            destination_chain_id: chain_id.to_string(),
            destination_address: RECIPIENT.to_string(),
            message: message.to_string(),
            required_gas_limit: 200_000,
            allowed_relayer_addresses: vec![],
            fee_amount: U256::from(10_000_000_000_000_000u64),
        }
    }

    fn real_encoder() -> MessageEncoder {
        MessageEncoder::new(ContractMode::Real(CONTRACT), 500_000, FeeEstimator::default())
    }

    #[test]
    fn test_normalize_decimal_chain_id() {
        let id = normalize_chain_id("43113").unwrap();
        let mut expected = [0u8; 32];
        expected[30] = 0xa8;
        expected[31] = 0x69;
        assert_eq!(id, B256::from(expected));
        assert_eq!(
            id.to_string(),
            "0x000000000000000000000000000000000000000000000000000000000000a869"
        );
    }

    #[test]
    fn test_normalize_hex_chain_id_is_left_padded() {
        assert_eq!(normalize_chain_id("0x01").unwrap(), B256::with_last_byte(1));
        assert_eq!(normalize_chain_id("0x2").unwrap(), B256::with_last_byte(2));
        let full = format!("0x{}", "ab".repeat(32));
        assert_eq!(normalize_chain_id(&full).unwrap(), B256::repeat_byte(0xab));
    }

    #[test]
    fn test_normalize_always_yields_32_bytes() {
        for input in ["0", "1", "43113", "0xa869", "0x00", &u64::MAX.to_string()] {
            let id = normalize_chain_id(input).unwrap();
            assert_eq!(id.len(), 32, "input {}", input);
        }
    }

    #[test]
    fn test_normalize_rejects_oversized_values() {
        let hex33 = format!("0x{}", "11".repeat(33));
        assert!(matches!(
            normalize_chain_id(&hex33),
            Err(IcmError::InvalidChainId { .. })
        ));

        // 2^256 does not fit
        let too_big =
            "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(matches!(
            normalize_chain_id(too_big),
            Err(IcmError::InvalidChainId { .. })
        ));

        let max =
            "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(normalize_chain_id(max).unwrap(), B256::repeat_byte(0xff));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        for input in ["", "0x", "0xzz", "fuji", "-5", "12.5"] {
            assert!(
                matches!(
                    normalize_chain_id(input),
                    Err(IcmError::InvalidChainId { .. })
                ),
                "input {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address(RECIPIENT).is_ok());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("2129b880124f9f867dCc080f3272b6CaaBDD5850").is_err());
        assert!(parse_address("0xg129b880124f9f867dCc080f3272b6CaaBDD5850").is_err());
    }

    #[test]
    fn test_parse_hash() {
        let hash = "0x7e9397c14f3f1daf6152470f839ad13bfe6e9ba2a1c9b57385b38055b3c058d3";
        assert_eq!(parse_hash(hash).unwrap().to_string(), hash);
        assert!(parse_hash("0x7e93").is_err());
    }

    #[test]
    fn test_message_length_limit() {
        assert!(check_message_length(&"a".repeat(1000)).is_ok());
        assert!(matches!(
            check_message_length(&"a".repeat(1001)),
            Err(IcmError::MessageTooLarge { length: 1001, .. })
        ));
        // Counted in characters, not bytes
        assert!(check_message_length(&"é".repeat(1000)).is_ok());
    }

    #[test]
    fn test_encode_round_trip() {
        let mut req = request("43113", "hello avalanche");
        req.allowed_relayer_addresses = vec!["0x0000000000000000000000000000000000000abc".into()];
        let prepared = real_encoder().encode(&req).unwrap();

        assert!(!prepared.mock);
        assert_eq!(prepared.recipient_contract(), CONTRACT);
        assert_eq!(prepared.transaction_data.value, req.fee_amount);
        assert_eq!(prepared.transaction_data.gas_limit, 500_000);
        assert_eq!(
            &prepared.transaction_data.data[..4],
            sendCrossChainMessageCall::SELECTOR.as_slice()
        );

        let decoded = decode_call_data(&prepared.transaction_data.data).unwrap();
        assert_eq!(decoded, prepared.message_input);
        assert_eq!(decoded.message, "hello avalanche");
        assert_eq!(decoded.fee_token_address, Address::ZERO);
        assert_eq!(decoded.allowed_relayer_addresses.len(), 1);
    }

    #[test]
    fn test_decode_rejects_truncated_call_data() {
        let prepared = real_encoder().encode(&request("1", "hi")).unwrap();
        let truncated = &prepared.transaction_data.data[..40];
        let err = decode_call_data(truncated).unwrap_err();
        assert!(matches!(err, IcmError::InvalidCallData(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_encode_rejects_before_encoding() {
        let encoder = real_encoder();
        let too_long = request("1", &"x".repeat(1001));
        assert!(matches!(
            encoder.encode(&too_long),
            Err(IcmError::MessageTooLarge { .. })
        ));

        let mut bad_recipient = request("1", "hi");
        bad_recipient.destination_address = "0xnope".into();
        assert!(matches!(
            encoder.encode(&bad_recipient),
            Err(IcmError::InvalidAddress(_))
        ));

        let mut bad_relayer = request("1", "hi");
        bad_relayer.allowed_relayer_addresses = vec!["relayer".into()];
        assert!(matches!(
            encoder.encode(&bad_relayer),
            Err(IcmError::InvalidAddress(_))
        ));

        let mut zero_gas = request("1", "hi");
        zero_gas.required_gas_limit = 0;
        assert!(matches!(
            encoder.encode(&zero_gas),
            Err(IcmError::InvalidGasLimit)
        ));
    }

    #[test]
    fn test_mock_mode_is_deterministic_placeholder() {
        let encoder = MessageEncoder::new(ContractMode::Mock, 500_000, FeeEstimator::default());
        let a = encoder.encode(&request("43113", "hi")).unwrap();
        let b = encoder.encode(&request("43113", "hi")).unwrap();

        assert!(a.mock);
        assert_eq!(a.recipient_contract(), Address::ZERO);
        assert_eq!(a.transaction_data.data.as_ref(), &[0u8; 32]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_contract_mode_from_address() {
        assert_eq!(ContractMode::from_address(Address::ZERO), ContractMode::Mock);
        assert_eq!(
            ContractMode::from_address(CONTRACT),
            ContractMode::Real(CONTRACT)
        );
        assert_eq!(ContractMode::Mock.contract_address(), None);
    }

    #[test]
    fn test_fee_quote_uses_message_bytes() {
        let prepared = real_encoder().encode(&request("1", &"a".repeat(100))).unwrap();
        assert_eq!(prepared.fee_quote.fee_in_avax, "0.016");
    }
}
