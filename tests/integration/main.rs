//! Integration tests: full coordinator scenarios against an in-memory
//! market-data source.

mod mock_platform;
mod scenarios;
