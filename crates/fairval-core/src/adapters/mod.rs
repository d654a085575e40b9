mod alphavantage;

pub use alphavantage::{
    api_key_from_env, classify_payload, AlphaVantageSource, ALPHAVANTAGE_BASE_URL, API_KEY_ENV,
};
