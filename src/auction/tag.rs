use crate::auction::types::{BidRequest, BidResult};
use crate::error::{BidplayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Google Ad Manager video ad request endpoint
pub const GAM_VIDEO_ENDPOINT: &str = "https://securepubads.g.doubleclick.net/gampad/ads";

/// Highest price bucket under medium granularity
const MAX_PRICE_BUCKET: f64 = 20.0;

/// Ad server templating parameters merged into every ad tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagParams {
    /// Inventory unit path (e.g. "/31695560/video_01")
    pub iu: String,
    /// Publisher key-values, sent in `cust_params`
    pub cust_params: BTreeMap<String, String>,
    /// Page the video plays on, used as click-through context
    pub description_url: String,
    /// Response format requested from the ad server (e.g. "xml_vast3")
    pub output: String,
}

impl Default for TagParams {
    fn default() -> Self {
        Self {
            iu: "/31695560/video_01".to_string(),
            cust_params: BTreeMap::from([("adformat".to_string(), "video".to_string())]),
            description_url: "https://rtbhouse.com".to_string(),
            output: "xml_vast3".to_string(),
        }
    }
}

/// Ad tag URL handed to the ad decision engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdTagUrl(String);

impl AdTagUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdTagUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the ad server video URL for an auction result.
///
/// Pure and deterministic: the same inputs always give the same URL. The
/// winning bid (if any) is exposed to the ad server as `hb_*` targeting
/// inside `cust_params`; publisher key-values take precedence over
/// targeting keys of the same name.
///
/// Returns an error for a timed-out auction, which must never produce a tag.
pub fn build_video_url(
    ad_unit: &BidRequest,
    params: &TagParams,
    result: &BidResult,
) -> Result<AdTagUrl> {
    if result.is_timed_out() {
        return Err(BidplayError::TagBuild(format!(
            "auction {} timed out, no ad tag can be built",
            result.auction_id()
        )));
    }

    let mut cust_params = targeting(result);
    cust_params.extend(params.cust_params.clone());

    let [width, height] = ad_unit.media_types.video.player_size;

    let mut url = Url::parse(GAM_VIDEO_ENDPOINT)?;
    url.query_pairs_mut()
        .append_pair("env", "vp")
        .append_pair("gdfp_req", "1")
        .append_pair("output", &params.output)
        .append_pair("unviewed_position_start", "1")
        .append_pair("iu", &params.iu)
        .append_pair("sz", &format!("{}x{}", width, height))
        .append_pair("description_url", &params.description_url)
        .append_pair("cust_params", &encode_key_values(&cust_params));

    Ok(AdTagUrl(url.into()))
}

/// Header-bidding targeting keys for the winning bid
fn targeting(result: &BidResult) -> BTreeMap<String, String> {
    let mut keys = BTreeMap::new();
    let Some(bid) = result.winning_bid() else {
        return keys;
    };

    keys.insert("hb_bidder".to_string(), bid.bidder.clone());
    keys.insert("hb_adid".to_string(), bid.ad_id.clone());
    keys.insert("hb_pb".to_string(), price_bucket(bid.cpm));
    keys.insert("hb_size".to_string(), format!("{}x{}", bid.width, bid.height));
    if let Some(cache_id) = &bid.cache_id {
        keys.insert("hb_uuid".to_string(), cache_id.clone());
        keys.insert("hb_cache_id".to_string(), cache_id.clone());
    }
    keys
}

/// Medium price granularity: $0.10 increments, capped at $20.00
pub fn price_bucket(cpm: f64) -> String {
    let capped = cpm.clamp(0.0, MAX_PRICE_BUCKET);
    // Nudge before flooring so e.g. 0.3 * 10 does not land on 2.999..
    let bucket = ((capped * 10.0) + 1e-9).floor() / 10.0;
    format!("{:.2}", bucket)
}

/// `k1=v1&k2=v2`, each part form-encoded; the whole string is encoded again
/// when appended to the tag
fn encode_key_values(pairs: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish()
}
