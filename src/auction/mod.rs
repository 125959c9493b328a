pub mod coordinator;
pub mod prebid_server;
pub mod tag;
pub mod types;

pub use coordinator::{AuctionCoordinator, AuctionEngine, BidsBackHandler, NoBidEngine};
pub use prebid_server::{Consent, PrebidServerEngine};
pub use tag::{AdTagUrl, TagParams, build_video_url};
pub use types::{AuctionConfig, Bid, BidParticipant, BidRequest, BidResult};
