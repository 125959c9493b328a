use crate::auction::coordinator::{AuctionEngine, BidsBackHandler};
use crate::auction::types::{AuctionConfig, Bid, BidRequest};
use crate::error::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

/// OpenRTB bid response, reduced to what the auction needs
#[derive(Debug, Deserialize)]
struct RtbResponse {
    #[serde(default)]
    seatbid: Vec<SeatBid>,
}

#[derive(Debug, Deserialize)]
struct SeatBid {
    seat: String,
    #[serde(default)]
    bid: Vec<RtbBid>,
}

#[derive(Debug, Deserialize)]
struct RtbBid {
    id: String,
    price: f64,
    #[serde(default)]
    adid: Option<String>,
    #[serde(default)]
    w: u32,
    #[serde(default)]
    h: u32,
    #[serde(default)]
    ext: Option<Value>,
}

/// GDPR consent forwarded with every auction
///
/// Static TCF configuration: the auction always runs, with or without a
/// consent string, and Prebid Server applies the consent per bidder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consent {
    pub gdpr_applies: bool,
    /// TCF v2 consent string, if one was collected
    pub consent_string: Option<String>,
}

/// Auction engine backed by a Prebid Server `/openrtb2/auction` endpoint
///
/// Each submission becomes one OpenRTB 2.5 request with an `imp` per ad
/// unit. Prebid Server is asked to cache the VAST and return winner
/// targeting, so the cache id can be forwarded to the ad server.
#[derive(Clone, Debug)]
pub struct PrebidServerEngine {
    endpoint: String,
    account_id: String,
    consent: Consent,
    http_client: Client,
}

impl PrebidServerEngine {
    pub fn new(endpoint: String, account_id: String, http_client: Client) -> Self {
        Self {
            endpoint,
            account_id,
            consent: Consent::default(),
            http_client,
        }
    }

    pub fn with_consent(mut self, consent: Consent) -> Self {
        self.consent = consent;
        self
    }

    /// Build the OpenRTB request body
    fn build_request(
        &self,
        auction_id: &str,
        ad_units: &[BidRequest],
        config: AuctionConfig,
    ) -> Value {
        let imps: Vec<Value> = ad_units.iter().map(imp_for_unit).collect();

        let mut body = json!({
            "id": auction_id,
            "imp": imps,
            "site": { "publisher": { "id": self.account_id } },
            "tmax": config.timeout.as_millis() as u64,
            "ext": {
                "prebid": {
                    "cache": { "vastxml": {} },
                    "targeting": { "includewinners": true, "includebidderkeys": false }
                }
            },
            "regs": { "ext": { "gdpr": u8::from(self.consent.gdpr_applies) } }
        });
        if let Some(consent_string) = &self.consent.consent_string {
            body["user"] = json!({ "ext": { "consent": consent_string } });
        }
        body
    }
}

/// One OpenRTB `imp` for a video ad unit
fn imp_for_unit(unit: &BidRequest) -> Value {
    let video = &unit.media_types.video;
    let bidders: Map<String, Value> = unit
        .bids
        .iter()
        .map(|p| (p.bidder.clone(), p.params.clone()))
        .collect();

    json!({
        "id": unit.code,
        "video": {
            "mimes": video.mimes,
            "protocols": video.protocols,
            "w": video.player_size[0],
            "h": video.player_size[1],
            "playbackmethod": video.playback_method,
            "skip": video.skip,
            // OpenRTB placement 1 = in-stream
            "placement": if video.context == "instream" { 1 } else { 3 }
        },
        "ext": { "prebid": { "bidder": bidders } }
    })
}

/// Map an OpenRTB response to bids, one entry per returned bid
fn bids_from_response(response: RtbResponse) -> Vec<Bid> {
    response
        .seatbid
        .into_iter()
        .flat_map(|seat| {
            let bidder = seat.seat;
            seat.bid.into_iter().map(move |bid| {
                let prebid_ext = bid.ext.as_ref().and_then(|e| e.get("prebid"));
                let cache_id = prebid_ext
                    .and_then(|p| p.pointer("/targeting/hb_cache_id"))
                    .or_else(|| prebid_ext.and_then(|p| p.pointer("/cache/vastXml/cacheId")))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let vast_url = prebid_ext
                    .and_then(|p| p.pointer("/cache/vastXml/url"))
                    .and_then(Value::as_str)
                    .map(str::to_string);

                Bid {
                    bidder: bidder.clone(),
                    cpm: bid.price,
                    ad_id: bid.adid.unwrap_or(bid.id),
                    cache_id,
                    vast_url,
                    width: bid.w,
                    height: bid.h,
                }
            })
        })
        .collect()
}

impl AuctionEngine for PrebidServerEngine {
    fn submit_auction(
        &self,
        ad_units: Vec<BidRequest>,
        config: AuctionConfig,
        handler: BidsBackHandler,
    ) -> Result<()> {
        let auction_id = uuid::Uuid::new_v4().to_string();
        let body = self.build_request(&auction_id, &ad_units, config);
        let client = self.http_client.clone();
        let endpoint = self.endpoint.clone();

        info!(
            auction_id = %auction_id,
            endpoint = %endpoint,
            "Submitting auction to Prebid Server"
        );

        tokio::spawn(async move {
            let response = client
                .post(&endpoint)
                .timeout(config.timeout)
                .json(&body)
                .send()
                .await;

            let bids = match response {
                // 204 is how Prebid Server says "no bids"
                Ok(resp) if resp.status() == reqwest::StatusCode::NO_CONTENT => Vec::new(),
                Ok(resp) if resp.status().is_success() => match resp.json::<RtbResponse>().await {
                    Ok(parsed) => bids_from_response(parsed),
                    Err(e) => {
                        error!(
                            auction_id = %auction_id,
                            "Failed to decode auction response: {}", e
                        );
                        Vec::new()
                    }
                },
                Ok(resp) => {
                    warn!(
                        auction_id = %auction_id,
                        "Prebid Server returned status {}",
                        resp.status()
                    );
                    Vec::new()
                }
                Err(e) => {
                    warn!(auction_id = %auction_id, "Auction request failed: {}", e);
                    Vec::new()
                }
            };

            debug!(auction_id = %auction_id, "Prebid Server returned {} bids", bids.len());
            handler.complete(bids, false, auction_id);
        });

        Ok(())
    }
}
