//! Outbound HTTP adapters — robots.txt fetcher.

pub mod robots;

pub use robots::ReqwestRobotsFetcher;
