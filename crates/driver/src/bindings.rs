use ethers::prelude::abigen;

// Generates the bindings for the `DisputeGameFactory` contract.
abigen!(
    DisputeGameFactory,
    r"[
        function gameCount() external view returns (uint256 gameCount_)
        function gameAtIndex(uint256 _index) external view returns (uint32 gameType_, uint64 timestamp_, address proxy_)
    ]"
);

// Generates the bindings for the `FaultDisputeGame` contract.
abigen!(
    FaultDisputeGame,
    r"[
        function claimDataLen() external view returns (uint256 len_)
        function claimData(uint256 _index) external view returns (uint32 parentIndex, address counteredBy, address claimant, uint128 bond, bytes32 claim, uint128 position, uint128 clock)
        function status() external view returns (uint8)
    ]"
);
