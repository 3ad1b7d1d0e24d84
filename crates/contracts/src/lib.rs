//! ABI bindings for the concentrated liquidity contracts that the price
//! services read from. Only the methods that are actually called are
//! declared; all of them are executed through `eth_call`.

pub mod path;

alloy::sol! {
    /// Concentrated liquidity pool.
    interface ICLPool {
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            bool unlocked
        );
    }

    /// Gauge streaming reward emissions to the liquidity providers of a pool.
    interface ICLGauge {
        function rewardRate() external view returns (uint256);
    }

    /// Pool factory, one pool per token pair and tick spacing.
    interface ICLFactory {
        function getPool(address tokenA, address tokenB, int24 tickSpacing)
            external
            view
            returns (address pool);
    }

    /// Quoter simulating swaps without changing state.
    interface IQuoter {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            int24 tickSpacing;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params)
            external
            returns (
                uint256 amountOut,
                uint160 sqrtPriceX96After,
                uint32 initializedTicksCrossed,
                uint256 gasEstimate
            );

        function quoteExactInput(bytes memory path, uint256 amountIn)
            external
            returns (
                uint256 amountOut,
                uint160[] memory sqrtPriceX96AfterList,
                uint32[] memory initializedTicksCrossedList,
                uint256 gasEstimate
            );
    }
}
