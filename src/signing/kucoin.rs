use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::signing::{require_credential, RequestSigner, SignInput};
use crate::venue::adapter::ExchangeError;

/// KuCoin v2 authentication, shared by the spot and futures APIs (they differ
/// only in base URL and instrument format):
/// `KC-API-SIGN = base64(hmac_sha256(secret, ts + method + path(+query) + body))`
/// and the passphrase header is itself HMAC-signed with the secret.
pub struct KucoinSigner {
    api_key: String,
    secret_key: String,
    passphrase: String,
}

impl KucoinSigner {
    pub fn new(api_key: &str, secret_key: &str, passphrase: &str) -> Result<Self, ExchangeError> {
        Ok(Self {
            api_key: require_credential(api_key, "KuCoin api_key")?,
            secret_key: require_credential(secret_key, "KuCoin secret_key")?,
            passphrase: require_credential(passphrase, "KuCoin passphrase")?,
        })
    }

    fn b64_hmac_sha256(&self, message: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

impl RequestSigner for KucoinSigner {
    fn sign(&self, input: &SignInput<'_>) -> Result<Vec<(&'static str, String)>, ExchangeError> {
        let signed_path = if input.query.is_empty() {
            input.path.to_string()
        } else {
            format!("{}?{}", input.path, input.query)
        };
        let prehash = format!("{}{}{}{}", input.nonce, input.method, signed_path, input.body);

        Ok(vec![
            ("KC-API-KEY", self.api_key.clone()),
            ("KC-API-SIGN", self.b64_hmac_sha256(&prehash)),
            ("KC-API-TIMESTAMP", input.nonce.to_string()),
            ("KC-API-PASSPHRASE", self.b64_hmac_sha256(&self.passphrase)),
            ("KC-API-KEY-VERSION", "2".to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header<'a>(headers: &'a [(&'static str, String)], name: &str) -> &'a str {
        headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value.as_str())
            .unwrap()
    }

    #[test]
    fn known_answer_vector() {
        let signer = KucoinSigner::new("key", "kucoin-secret", "kucoin-pass").unwrap();
        let input = SignInput {
            method: "POST",
            path: "/api/v1/orders",
            query: "",
            body: r#"{"clientOid":"abc","side":"buy","size":"0.5","symbol":"BTC-USDT","type":"market"}"#,
            nonce: "1700000000000",
        };
        let headers = signer.sign(&input).unwrap();
        assert_eq!(
            header(&headers, "KC-API-SIGN"),
            "B4j2WtGKFF1sdbd5bxcZQm/04T6FVulAWaN5gM99plE="
        );
        assert_eq!(
            header(&headers, "KC-API-PASSPHRASE"),
            "OplStk3M/IYYslJlMpTMb7auKQZQhD1g+JEQkER3KkA="
        );
        assert_eq!(header(&headers, "KC-API-KEY-VERSION"), "2");
    }

    #[test]
    fn query_string_joins_the_signed_path() {
        let signer = KucoinSigner::new("key", "kucoin-secret", "kucoin-pass").unwrap();
        let input = SignInput {
            method: "GET",
            path: "/api/v1/fills",
            query: "orderId=abc123",
            body: "",
            nonce: "1700000000000",
        };
        let headers = signer.sign(&input).unwrap();
        assert_eq!(
            header(&headers, "KC-API-SIGN"),
            "bnEla2F8SFo6/QtyOO/tij1rL1gdQmpDnti+8D7lYdo="
        );
    }

    #[test]
    fn missing_passphrase_rejected_at_construction() {
        assert!(matches!(
            KucoinSigner::new("key", "secret", ""),
            Err(ExchangeError::Configuration(_))
        ));
    }
}
