pub mod billing;
pub mod blocklist;
pub mod config;
pub mod crawl;
pub mod credits;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod job;
pub mod kickoff;
pub mod options;
pub mod queue;
pub mod streamer;
pub mod testutil;
pub mod traits;
pub mod util;

pub use crawl::{CrawlStore, StoredCrawl};
pub use credits::{AuthContext, CreditChunk, CreditGate, TeamFlags};
pub use dispatch::{ScrapeDispatcher, ScrapeRequest};
pub use document::{Document, LegacyDocument};
pub use error::{AppError, BLOCKLISTED_URL_MESSAGE};
pub use job::{Job, JobDescriptor, JobMode, JobState};
pub use kickoff::{CrawlKickoff, CrawlRequest};
pub use queue::JobQueue;
pub use streamer::CrawlWatcher;
pub use util::normalize_url;
