/// EVM feature-set target used when recompiling for a given chain.
///
/// Unknown chains fall back to [`DEFAULT_EVM_VERSION`], a fork every
/// production chain supports.
pub const DEFAULT_EVM_VERSION: &str = "london";

pub fn evm_version(chain_id: u64) -> &'static str {
    match chain_id {
        // Ethereum mainnet and Sepolia track the latest fork
        1 | 11155111 => "shanghai",
        // Major L2s and sidechains lag behind mainnet
        10 | 56 | 137 | 8453 | 42161 => "london",
        _ => DEFAULT_EVM_VERSION,
    }
}

pub fn chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        1 => "mainnet",
        10 => "optimism",
        56 => "bsc",
        137 => "polygon",
        8453 => "base",
        42161 => "arbitrum",
        11155111 => "sepolia",
        _ => "unknown",
    }
}
