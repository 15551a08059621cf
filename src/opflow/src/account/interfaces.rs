//! Solidity ABI interfaces used to encode calls and decode chain reads.

use alloy_sol_types::sol;
use opflow_types::Operation;

sol! {
    /// ERC-4337 v0.6 user operation as hashed by the entry point.
    #[derive(Debug, PartialEq, Eq)]
    struct UserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes paymasterAndData;
        bytes signature;
    }

    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
        function getUserOpHash(UserOperation calldata userOp) external view returns (bytes32 opHash);
    }

    interface ISmartWallet {
        function execute(address dest, uint256 value, bytes calldata func) external;
        /// Pre-entry-point-nonce wallets track their own counter.
        function getNonce() external view returns (uint256 nonce);
    }

    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool ok);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function balanceOf(address account) external view returns (uint256 balance);
    }

    interface IElectionFactory {
        function createElection(string name, uint256 duration, string description) external returns (address election);
    }

    interface ISessionFactory {
        function createSession(address election, uint256 duration, uint256 maxVoters, string name) external returns (address session);
    }
}

/// ABI view of an unsigned operation. The signature slot is empty: the entry point excludes it
/// from the hash.
pub fn user_operation(op: &Operation) -> UserOperation {
    UserOperation {
        sender: op.sender,
        nonce: op.nonce,
        initCode: op.init_code.clone(),
        callData: op.call_data.clone(),
        callGasLimit: op.call_gas_limit,
        verificationGasLimit: op.verification_gas_limit,
        preVerificationGas: op.pre_verification_gas,
        maxFeePerGas: op.max_fee_per_gas,
        maxPriorityFeePerGas: op.max_priority_fee_per_gas,
        paymasterAndData: op.paymaster_and_data.clone(),
        signature: Default::default(),
    }
}
