use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

/// A header-bidding request for one video ad unit.
///
/// Field names follow the Prebid.js ad unit JSON so that an ad unit can be
/// loaded straight from a publisher's existing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRequest {
    /// Ad unit code (e.g. "video_01")
    pub code: String,
    #[serde(rename = "mediaTypes")]
    pub media_types: MediaTypes,
    /// Bidding participants, in the order they were configured
    #[serde(default)]
    pub bids: Vec<BidParticipant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTypes {
    pub video: VideoConstraints,
}

/// Media constraints every bid must satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    /// Placement context ("instream" or "outstream")
    pub context: String,
    /// Player size as [width, height]
    pub player_size: [u32; 2],
    pub mimes: Vec<String>,
    /// VAST protocol versions accepted (OpenRTB protocol ids)
    pub protocols: Vec<u8>,
    #[serde(rename = "playbackmethod")]
    pub playback_method: Vec<u8>,
    /// 1 if the player allows skippable creatives
    #[serde(default)]
    pub skip: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidParticipant {
    pub bidder: String,
    /// Adapter-specific parameters, passed through untouched
    #[serde(default)]
    pub params: serde_json::Value,
}

impl BidRequest {
    /// The instream video unit served by the demo page: 640x480 MP4,
    /// all VAST protocols, click-to-play, skippable, bid on by RTB House.
    pub fn default_video_unit() -> Self {
        Self {
            code: "video_01".to_string(),
            media_types: MediaTypes {
                video: VideoConstraints {
                    context: "instream".to_string(),
                    player_size: [640, 480],
                    mimes: vec!["video/mp4".to_string()],
                    protocols: (1..=8).collect(),
                    playback_method: vec![2],
                    skip: 1,
                },
            },
            bids: vec![BidParticipant {
                bidder: "rtbhouse".to_string(),
                params: json!({
                    "publisherId": "MMyM2ZNkRj5w5lniescG",
                    "region": "prebid-eu"
                }),
            }],
        }
    }
}

/// A single bid returned by a bidder
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    pub bidder: String,
    /// Price in CPM
    pub cpm: f64,
    pub ad_id: String,
    /// Key of the cached VAST document, if the engine cached the creative
    pub cache_id: Option<String>,
    pub vast_url: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Outcome of one auction. Produced exactly once per [`BidRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum BidResult {
    Success {
        /// Bids keyed by bidder id
        bids: BTreeMap<String, Bid>,
        auction_id: String,
    },
    TimedOut {
        auction_id: String,
    },
}

impl BidResult {
    pub fn auction_id(&self) -> &str {
        match self {
            BidResult::Success { auction_id, .. } | BidResult::TimedOut { auction_id } => {
                auction_id
            }
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, BidResult::TimedOut { .. })
    }

    /// Metric/log label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            BidResult::Success { bids, .. } if bids.is_empty() => "no_bid",
            BidResult::Success { .. } => "success",
            BidResult::TimedOut { .. } => "timeout",
        }
    }

    /// Highest-CPM bid. Ties go to the lowest bidder id.
    pub fn winning_bid(&self) -> Option<&Bid> {
        let BidResult::Success { bids, .. } = self else {
            return None;
        };
        bids.values().fold(None, |best: Option<&Bid>, bid| match best {
            Some(b) if b.cpm >= bid.cpm => Some(b),
            _ => Some(bid),
        })
    }
}

/// Settings handed to the auction engine with each submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuctionConfig {
    pub timeout: Duration,
}
