//! TeleporterMessenger contract ABI definition
//!
//! Uses alloy's sol! macro to generate type-safe bindings. The
//! `sendCrossChainMessage` signature and argument order are the wire
//! contract with the deployed messenger and must not change.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Teleporter messenger interface used by the dashboard
    #[sol(rpc)]
    contract TeleporterMessenger {
        /// Send a message to another blockchain; the fee is paid in `msg.value`
        /// when `feeTokenAddress` is the zero address
        ///
        /// # Arguments
        /// * `destinationBlockchainID` - 32-byte ID of the destination chain
        /// * `destinationAddress` - Receiving contract on the destination chain
        /// * `feeTokenAddress` - Fee token (zero address = native token)
        /// * `feeAmount` - Relayer incentive
        /// * `requiredGasLimit` - Gas available to the receiver on delivery
        /// * `allowedRelayerAddresses` - Relayers allowed to deliver (empty = any)
        /// * `message` - Raw payload bytes
        function sendCrossChainMessage(
            bytes32 destinationBlockchainID,
            address destinationAddress,
            address feeTokenAddress,
            uint256 feeAmount,
            uint256 requiredGasLimit,
            address[] allowedRelayerAddresses,
            bytes message
        ) external payable returns (bytes32 messageID);

        /// Whether the message has been received on this chain
        function messageReceived(bytes32 messageID) external view returns (bool);
    }
}
