//! External registrar client.
//!
//! The registrar is the system of record that legally finalizes a transfer.
//! The worker sends it one `POST {base_url}/register` per triggered trade and
//! turns the answer into either an [`ExternalRegId`] or a [`RegistrarError`],
//! whose `Display` becomes the on-ledger rejection reason.

use std::time::Duration;

use async_trait::async_trait;
use dvp_types::{
    Address, CurrencyCode, DvpError, ExternalRegId, RegistrarConfig, SecurityId, Trade, TradeId,
    constants, truncate_reason,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest response-body excerpt carried in a [`RegistrarError::Status`].
const BODY_EXCERPT_CHARS: usize = 512;

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Body of `POST /register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub trade_id: TradeId,
    pub seller: Address,
    pub buyer: Address,
    pub security_id: SecurityId,
    #[serde(with = "dvp_types::wire::decimal")]
    pub qty: u128,
    pub currency_code: CurrencyCode,
    #[serde(with = "dvp_types::wire::decimal")]
    pub amount: u128,
    /// Unix seconds.
    pub triggered_at: u64,
}

impl RegistrationRequest {
    #[must_use]
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            trade_id: trade.trade_id,
            seller: trade.terms.seller,
            buyer: trade.terms.buyer,
            security_id: trade.terms.security_id,
            qty: trade.terms.qty,
            currency_code: trade.terms.currency_code,
            amount: trade.terms.amount,
            triggered_at: trade.triggered_at.unwrap_or_default(),
        }
    }
}

/// Successful registrar answer. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    #[serde(default)]
    pub external_reg_id_hex: Option<String>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Every way a registrar call can fail. All of them end in `reject`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrarError {
    #[error("registrar unreachable: {0}")]
    Transport(String),

    #[error("registrar timed out after {0} ms")]
    Timeout(u64),

    #[error("registrar returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("registrar response carried no externalRegIdHex")]
    MissingRegId,

    #[error("registrar returned invalid externalRegIdHex {value:?}: {reason}")]
    InvalidRegId { value: String, reason: String },

    #[error("failed to decode registrar response: {0}")]
    Decode(String),
}

impl From<RegistrarError> for DvpError {
    fn from(err: RegistrarError) -> Self {
        Self::ExternalService {
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// REGISTRAR SEAM
// =============================================================================

/// Anything that can register a triggered trade.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<ExternalRegId, RegistrarError>;
}

/// Registrar over HTTP with bearer authentication.
#[derive(Debug)]
pub struct HttpRegistrar {
    client: Client,
    url: String,
    config: RegistrarConfig,
    random_reg_id_fallback: bool,
}

impl HttpRegistrar {
    pub fn new(config: RegistrarConfig) -> Result<Self, RegistrarError> {
        let connect_ms = constants::DEFAULT_REGISTRAR_CONNECT_TIMEOUT_MS.min(config.timeout_ms);
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(connect_ms))
            .build()
            .map_err(|e| RegistrarError::Transport(e.to_string()))?;

        tracing::info!(url = %config.register_url(), timeout_ms = config.timeout_ms, "Registrar client ready");

        Ok(Self {
            client,
            url: config.register_url(),
            config,
            random_reg_id_fallback: false,
        })
    }

    /// **Test only.** Substitute a random external id when the registrar
    /// omits one, instead of rejecting the trade. Compiled in only under the
    /// `test-fallback` feature.
    #[cfg(any(test, feature = "test-fallback"))]
    #[must_use]
    pub fn with_random_reg_id_fallback(mut self) -> Self {
        tracing::warn!(
            "TEST ONLY: random registration id fallback enabled; \
             a missing registrar id will be replaced by a random one"
        );
        self.random_reg_id_fallback = true;
        self
    }

    fn classify(&self, err: &reqwest::Error) -> RegistrarError {
        if err.is_timeout() {
            RegistrarError::Timeout(self.config.timeout_ms)
        } else {
            RegistrarError::Transport(err.to_string())
        }
    }

    fn resolve_id(&self, response: RegistrationResponse) -> Result<ExternalRegId, RegistrarError> {
        match response
            .external_reg_id_hex
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(value) => value
                .parse()
                .map_err(|e: DvpError| RegistrarError::InvalidRegId {
                    value,
                    reason: e.to_string(),
                }),
            None if self.random_reg_id_fallback => {
                let id = ExternalRegId(rand::random());
                tracing::warn!(external_reg_id = %id, "Registrar omitted id; substituted random id (test fallback)");
                Ok(id)
            }
            None => Err(RegistrarError::MissingRegId),
        }
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<ExternalRegId, RegistrarError> {
        tracing::debug!(trade_id = %request.trade_id, url = %self.url, "Calling registrar");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.config.api_token)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(&e))?;
        if !status.is_success() {
            return Err(RegistrarError::Status {
                status: status.as_u16(),
                body: truncate_reason(body.trim(), BODY_EXCERPT_CHARS),
            });
        }

        let parsed = if body.trim().is_empty() {
            RegistrationResponse::default()
        } else {
            serde_json::from_str(&body).map_err(|e| RegistrarError::Decode(e.to_string()))?
        };
        self.resolve_id(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvp_types::TradeTerms;

    fn trade() -> Trade {
        let terms = TradeTerms {
            seller: Address([1u8; 20]),
            buyer: Address([2u8; 20]),
            security_id: SecurityId([3u8; 32]),
            qty: 100,
            currency_code: "EUR".parse().unwrap(),
            amount: 1_000 * 10u128.pow(18),
            deadline: 2_000,
        };
        let mut trade = Trade::new(TradeId([9u8; 32]), terms, 1_000);
        trade.triggered_at = Some(1_500);
        trade
    }

    fn registrar(fallback: bool) -> HttpRegistrar {
        let r = HttpRegistrar::new(RegistrarConfig::new("http://127.0.0.1:9", "t")).unwrap();
        if fallback {
            r.with_random_reg_id_fallback()
        } else {
            r
        }
    }

    #[test]
    fn request_wire_shape() {
        let req = RegistrationRequest::from_trade(&trade());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["tradeId"], format!("0x{}", "09".repeat(32)));
        assert_eq!(json["qty"], "100");
        assert_eq!(json["amount"], "1000000000000000000000");
        assert_eq!(json["currencyCode"], "EUR");
        assert_eq!(json["triggeredAt"], 1_500);
    }

    #[test]
    fn response_ignores_unknown_fields() {
        let resp: RegistrationResponse =
            serde_json::from_str(r#"{"status":"ok","externalRegIdHex":"0xab"}"#).unwrap();
        assert_eq!(resp.external_reg_id_hex.as_deref(), Some("0xab"));
        let resp: RegistrationResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.external_reg_id_hex.is_none());
    }

    #[tokio::test]
    async fn resolve_id_accepts_optional_prefix() {
        let r = registrar(false);
        let bare = "aa".repeat(32);
        for value in [bare.clone(), format!("0x{bare}")] {
            let id = r
                .resolve_id(RegistrationResponse {
                    external_reg_id_hex: Some(value),
                })
                .unwrap();
            assert_eq!(id, ExternalRegId([0xAA; 32]));
        }
    }

    #[tokio::test]
    async fn resolve_id_missing_and_invalid() {
        let r = registrar(false);
        assert_eq!(
            r.resolve_id(RegistrationResponse::default()).unwrap_err(),
            RegistrarError::MissingRegId
        );
        let err = r
            .resolve_id(RegistrationResponse {
                external_reg_id_hex: Some("0x1234".into()),
            })
            .unwrap_err();
        assert!(matches!(err, RegistrarError::InvalidRegId { .. }));
    }

    #[tokio::test]
    async fn env_config_never_enables_random_fallback() {
        let vars = [
            ("DVP_REGISTRAR_URL", "http://127.0.0.1:9"),
            ("DVP_REGISTRAR_TOKEN", "t"),
            ("DVP_DEV_RANDOM_REG_ID_FALLBACK", "true"),
        ];
        let cfg = RegistrarConfig::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        })
        .unwrap();
        let r = HttpRegistrar::new(cfg).unwrap();
        assert_eq!(
            r.resolve_id(RegistrationResponse::default()).unwrap_err(),
            RegistrarError::MissingRegId
        );
    }

    #[tokio::test]
    async fn test_fallback_substitutes_random_id() {
        let r = registrar(true);
        let a = r.resolve_id(RegistrationResponse::default()).unwrap();
        let b = r.resolve_id(RegistrationResponse::default()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn registrar_error_maps_to_external_service() {
        let err: DvpError = RegistrarError::Timeout(10_000).into();
        assert_eq!(err.kind(), dvp_types::ErrorKind::ExternalService);
        assert!(err.to_string().contains("timed out after 10000 ms"));
    }
}
