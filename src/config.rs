use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_NICHE: &str = "Crypto Wallets";
pub const DEFAULT_PRE_PRICE: f64 = 0.015;
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_PRICE_ENDPOINT: &str = "https://api.coingecko.com/api/v3";

#[derive(Parser, Clone, Debug)]
#[clap(name = "prestake-analyst", about = "Keyword staking intelligence in the terminal")]
pub struct CliParams {
    /// Gemini API key; when absent the settings dialog opens on start
    #[clap(long = "api-key", env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini model used for keyword generation and CSV enrichment
    #[clap(long = "model", env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    pub model: String,

    /// Gemini endpoint base URL
    #[clap(
        long = "gemini-endpoint",
        env = "GEMINI_API_BASE",
        default_value = DEFAULT_GEMINI_ENDPOINT
    )]
    pub gemini_endpoint: String,

    /// Niche analyzed on start when an API key is available
    #[clap(long = "niche", default_value = DEFAULT_NICHE)]
    pub niche: String,

    /// Analyze this keyword export instead of the niche on start
    #[clap(long = "csv", value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// PRE price in USD used until the live quote arrives
    #[clap(long = "pre-price-fallback", value_name = "USD", default_value_t = DEFAULT_PRE_PRICE)]
    pub pre_price_fallback: f64,

    /// Price quote endpoint base URL (CoinGecko compatible)
    #[clap(long = "price-endpoint", default_value = DEFAULT_PRICE_ENDPOINT)]
    pub price_endpoint: String,

    /// Coin identifier looked up on the price endpoint
    #[clap(long = "coin-id", default_value = "presearch")]
    pub coin_id: String,

    /// File receiving diagnostic logs
    #[clap(long = "log-file", value_name = "PATH", default_value = "prestake.log")]
    pub log_file: PathBuf,

    /// Log level filter; RUST_LOG takes precedence when set
    #[clap(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl CliParams {
    /// Key passed on the command line or via `GEMINI_API_KEY`, falling back to `API_KEY`.
    pub fn initial_api_key(&self) -> String {
        let from_flag = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        match from_flag {
            Some(key) => key.to_string(),
            None => std::env::var("API_KEY")
                .map(|key| key.trim().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        let model = self.model.trim();
        GeminiConfig {
            endpoint: normalize_endpoint(&self.gemini_endpoint, DEFAULT_GEMINI_ENDPOINT),
            model: if model.is_empty() {
                "gemini-2.5-flash".to_string()
            } else {
                model.to_string()
            },
        }
    }

    pub fn price_feed_config(&self) -> PriceFeedConfig {
        let coin_id = self.coin_id.trim().to_ascii_lowercase();
        PriceFeedConfig {
            endpoint: normalize_endpoint(&self.price_endpoint, DEFAULT_PRICE_ENDPOINT),
            coin_id: if coin_id.is_empty() {
                "presearch".to_string()
            } else {
                coin_id
            },
        }
    }

    pub fn fallback_price(&self) -> f64 {
        if self.pre_price_fallback.is_finite() && self.pre_price_fallback >= 0.0 {
            self.pre_price_fallback
        } else {
            DEFAULT_PRE_PRICE
        }
    }

    pub fn initial_niche(&self) -> String {
        let niche = self.niche.trim();
        if niche.is_empty() {
            DEFAULT_NICHE.to_string()
        } else {
            niche.to_string()
        }
    }
}

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct PriceFeedConfig {
    pub endpoint: String,
    pub coin_id: String,
}

fn normalize_endpoint(value: &str, fallback: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliParams {
        let mut argv = vec!["prestake-analyst"];
        argv.extend_from_slice(args);
        CliParams::parse_from(argv)
    }

    #[test]
    fn endpoints_drop_trailing_slashes() {
        let params = parse(&[
            "--gemini-endpoint",
            "https://example.test/",
            "--price-endpoint",
            "https://prices.test/api//",
        ]);
        assert_eq!(params.gemini_config().endpoint, "https://example.test");
        assert_eq!(params.price_feed_config().endpoint, "https://prices.test/api");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let params = parse(&["--niche", "  ", "--coin-id", " ", "--model", ""]);
        assert_eq!(params.initial_niche(), DEFAULT_NICHE);
        assert_eq!(params.price_feed_config().coin_id, "presearch");
        assert_eq!(params.gemini_config().model, "gemini-2.5-flash");
    }

    #[test]
    fn explicit_api_key_is_trimmed() {
        let params = parse(&["--api-key", "  AIza-test  "]);
        assert_eq!(params.initial_api_key(), "AIza-test");
    }

    #[test]
    fn invalid_fallback_price_uses_default() {
        let params = parse(&["--pre-price-fallback=-1"]);
        assert_eq!(params.fallback_price(), DEFAULT_PRE_PRICE);
        let params = parse(&["--pre-price-fallback", "0.02"]);
        assert_eq!(params.fallback_price(), 0.02);
    }
}
