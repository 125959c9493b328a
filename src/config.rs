use crate::ad::{LifecycleSettings, StaticAd, ViewMode};
use crate::auction::{BidRequest, Consent, TagParams};
use crate::error::{BidplayError, Result};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which auction engine runs the header-bidding auction
#[derive(Clone, Debug, PartialEq)]
pub enum AuctionEngineType {
    /// Prebid Server over HTTP
    PrebidServer,
    /// No header bidding; every auction closes with no bids
    NoBid,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    pub auction_engine: AuctionEngineType,
    pub prebid_server_url: String,
    pub prebid_account_id: String,
    /// GDPR consent forwarded to Prebid Server
    pub consent: Consent,
    pub auction_timeout: Duration,
    /// Ad unit submitted with every auction
    pub ad_unit: BidRequest,
    pub tag_params: TagParams,
    pub content_element_id: String,
    pub ad_container_id: String,
    pub poll_interval: Duration,
    pub ad_width: u32,
    pub ad_height: u32,
    pub view_mode: ViewMode,
    /// Ad served by the in-process ad engine
    pub static_ad: StaticAd,
}

impl Default for Config {
    /// Dev defaults, matching the demo page setup
    fn default() -> Self {
        Self {
            port: 3000,
            is_dev: true,
            auction_engine: AuctionEngineType::PrebidServer,
            prebid_server_url: "http://localhost:8080/openrtb2/auction".to_string(),
            prebid_account_id: "1001".to_string(),
            consent: Consent::default(),
            auction_timeout: Duration::from_millis(3000),
            ad_unit: BidRequest::default_video_unit(),
            tag_params: TagParams::default(),
            content_element_id: "contentElement".to_string(),
            ad_container_id: "adContainer".to_string(),
            poll_interval: Duration::from_millis(300),
            ad_width: 640,
            ad_height: 360,
            view_mode: ViewMode::Normal,
            static_ad: StaticAd {
                ad_id: "static-preroll".to_string(),
                duration: Duration::from_secs(10),
                is_linear: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT and
    /// PREBID_SERVER_URL are required.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup (environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let is_dev = lookup("DEV_MODE")
            .map(|v| v.parse().unwrap_or(false))
            .unwrap_or(false);

        let port = match lookup("PORT") {
            Some(v) => parse("PORT", &v)?,
            None if is_dev => defaults.port,
            None => {
                return Err(BidplayError::ConfigError(
                    "PORT is required in production".to_string(),
                ));
            }
        };

        let auction_engine = match lookup("AUCTION_ENGINE").as_deref() {
            None | Some("prebid-server") => AuctionEngineType::PrebidServer,
            Some("none") => AuctionEngineType::NoBid,
            Some(other) => {
                return Err(BidplayError::ConfigError(format!(
                    "AUCTION_ENGINE must be 'prebid-server' or 'none', got '{}'",
                    other
                )));
            }
        };

        let prebid_server_url = match lookup("PREBID_SERVER_URL") {
            Some(v) => v,
            None if is_dev || auction_engine == AuctionEngineType::NoBid => {
                defaults.prebid_server_url
            }
            None => {
                return Err(BidplayError::ConfigError(
                    "PREBID_SERVER_URL is required in production".to_string(),
                ));
            }
        };

        let auction_timeout_ms: u64 =
            parse_or(&lookup, "AUCTION_TIMEOUT_MS", defaults.auction_timeout.as_millis() as u64)?;
        if auction_timeout_ms == 0 {
            return Err(BidplayError::ConfigError(
                "AUCTION_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        let ad_unit = match lookup("AD_UNIT_FILE") {
            Some(path) => load_ad_unit(&path)?,
            None => defaults.ad_unit,
        };

        let mut tag_params = defaults.tag_params;
        if let Some(iu) = lookup("AD_TAG_IU") {
            tag_params.iu = iu;
        }
        if let Some(url) = lookup("AD_TAG_DESCRIPTION_URL") {
            tag_params.description_url = url;
        }
        if let Some(output) = lookup("AD_TAG_OUTPUT") {
            tag_params.output = output;
        }
        if let Some(raw) = lookup("AD_TAG_CUST_PARAMS") {
            tag_params.cust_params = parse_key_values(&raw)?;
        }

        let poll_interval_ms: u64 =
            parse_or(&lookup, "POLL_INTERVAL_MS", defaults.poll_interval.as_millis() as u64)?;
        let view_mode = match lookup("AD_VIEW_MODE").as_deref() {
            None | Some("normal") => ViewMode::Normal,
            Some("fullscreen") => ViewMode::Fullscreen,
            Some(other) => {
                return Err(BidplayError::ConfigError(format!(
                    "AD_VIEW_MODE must be 'normal' or 'fullscreen', got '{}'",
                    other
                )));
            }
        };

        let consent = Consent {
            gdpr_applies: parse_or(&lookup, "GDPR_APPLIES", defaults.consent.gdpr_applies)?,
            consent_string: lookup("CONSENT_STRING").filter(|s| !s.trim().is_empty()),
        };

        let static_ad = StaticAd {
            ad_id: defaults.static_ad.ad_id,
            duration: Duration::from_secs(parse_or(
                &lookup,
                "STATIC_AD_DURATION_SECS",
                defaults.static_ad.duration.as_secs(),
            )?),
            is_linear: parse_or(&lookup, "STATIC_AD_LINEAR", defaults.static_ad.is_linear)?,
        };

        Ok(Config {
            port,
            is_dev,
            auction_engine,
            prebid_server_url,
            prebid_account_id: lookup("PREBID_ACCOUNT_ID")
                .unwrap_or(defaults.prebid_account_id),
            consent,
            auction_timeout: Duration::from_millis(auction_timeout_ms),
            ad_unit,
            tag_params,
            content_element_id: lookup("CONTENT_ELEMENT_ID")
                .unwrap_or(defaults.content_element_id),
            ad_container_id: lookup("AD_CONTAINER_ID").unwrap_or(defaults.ad_container_id),
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            ad_width: parse_or(&lookup, "AD_WIDTH", defaults.ad_width)?,
            ad_height: parse_or(&lookup, "AD_HEIGHT", defaults.ad_height)?,
            view_mode,
            static_ad,
        })
    }

    /// Settings every ad lifecycle runs with
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            container_id: self.ad_container_id.clone(),
            width: self.ad_width,
            height: self.ad_height,
            view_mode: self.view_mode,
            poll_interval: self.poll_interval,
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| BidplayError::ConfigError(format!("{} has an invalid value: '{}'", key, raw)))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

/// Read a Prebid-style ad unit from a JSON file
fn load_ad_unit(path: &str) -> Result<BidRequest> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BidplayError::ConfigError(format!("cannot read AD_UNIT_FILE {}: {}", path, e))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| BidplayError::ConfigError(format!("invalid ad unit in {}: {}", path, e)))
}

/// Parse `k1=v1,k2=v2`
fn parse_key_values(raw: &str) -> Result<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
            _ => Err(BidplayError::ConfigError(format!(
                "AD_TAG_CUST_PARAMS entry '{}' is not key=value",
                pair
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_dev_defaults() {
        let config = Config::from_lookup(lookup(&[("DEV_MODE", "true")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.auction_timeout, Duration::from_millis(3000));
        assert_eq!(config.poll_interval, Duration::from_millis(300));
        assert_eq!(config.auction_engine, AuctionEngineType::PrebidServer);
        assert_eq!(config.tag_params.output, "xml_vast3");
        assert_eq!(config.ad_unit.code, "video_01");
    }

    #[test]
    fn test_prod_requires_port() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, BidplayError::ConfigError(_)));
    }

    #[test]
    fn test_prod_requires_prebid_url_unless_no_bid() {
        assert!(Config::from_lookup(lookup(&[("PORT", "8000")])).is_err());
        let config =
            Config::from_lookup(lookup(&[("PORT", "8000"), ("AUCTION_ENGINE", "none")])).unwrap();
        assert_eq!(config.auction_engine, AuctionEngineType::NoBid);
        assert!(!config.is_dev);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DEV_MODE", "true"),
            ("AUCTION_TIMEOUT_MS", "1500"),
            ("AD_TAG_IU", "/1234/preroll"),
            ("AD_TAG_CUST_PARAMS", "section=blog, anotherKey=anotherValue"),
            ("AD_VIEW_MODE", "fullscreen"),
            ("STATIC_AD_LINEAR", "false"),
        ]))
        .unwrap();

        assert_eq!(config.auction_timeout, Duration::from_millis(1500));
        assert_eq!(config.tag_params.iu, "/1234/preroll");
        assert_eq!(config.tag_params.cust_params["section"], "blog");
        assert_eq!(config.tag_params.cust_params["anotherKey"], "anotherValue");
        assert_eq!(config.view_mode, ViewMode::Fullscreen);
        assert!(!config.static_ad.is_linear);
    }

    #[test]
    fn test_consent_settings() {
        let config = Config::from_lookup(lookup(&[("DEV_MODE", "true")])).unwrap();
        assert_eq!(config.consent, Consent::default());

        let config = Config::from_lookup(lookup(&[
            ("DEV_MODE", "true"),
            ("GDPR_APPLIES", "true"),
            ("CONSENT_STRING", "CPa6mQAPa6mQAAGABCENCUCgAP_AAH_AAB5YIqN"),
        ]))
        .unwrap();
        assert!(config.consent.gdpr_applies);
        assert_eq!(
            config.consent.consent_string.as_deref(),
            Some("CPa6mQAPa6mQAAGABCENCUCgAP_AAH_AAB5YIqN")
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        for vars in [
            [("DEV_MODE", "true"), ("AUCTION_TIMEOUT_MS", "0")],
            [("DEV_MODE", "true"), ("AUCTION_TIMEOUT_MS", "soon")],
            [("DEV_MODE", "true"), ("AUCTION_ENGINE", "gam")],
            [("DEV_MODE", "true"), ("AD_TAG_CUST_PARAMS", "novalue")],
            [("DEV_MODE", "true"), ("GDPR_APPLIES", "yes")],
        ] {
            assert!(Config::from_lookup(lookup(&vars)).is_err(), "{:?}", vars);
        }
    }

    #[test]
    fn test_lifecycle_settings() {
        let settings = Config::default().lifecycle_settings();
        assert_eq!(settings, LifecycleSettings::default());
    }
}
