//! Integration tests against an in-memory chain.

mod board_flow;
mod mock_chain;
mod monitor_flow;
mod ops_flow;
