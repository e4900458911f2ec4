// ─── Transport: sessions, pool, wire format ───
pub mod pool;
pub mod protocol;
pub mod session;

// ─── Trading actors ───
pub mod coordinator;
pub mod executor;
pub mod ledger;
pub mod messages;

// ─── Shared types & pure logic ───
pub mod config;
pub mod decoder;
pub mod error;
pub mod types;

#[cfg(test)]
mod mock_venue;
