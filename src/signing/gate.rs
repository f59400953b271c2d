use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::signing::{require_credential, RequestSigner, SignInput};
use crate::venue::adapter::ExchangeError;

/// Gate apiv4 authentication:
/// `SIGN = hex(hmac_sha512(secret, method + "\n" + path + "\n" + query + "\n" + body + "\n" + ts))`
/// with a unix-seconds timestamp. Spot and USDT-futures share the scheme.
pub struct GateSigner {
    api_key: String,
    secret_key: String,
}

impl GateSigner {
    pub fn new(api_key: &str, secret_key: &str) -> Result<Self, ExchangeError> {
        Ok(Self {
            api_key: require_credential(api_key, "Gate api_key")?,
            secret_key: require_credential(secret_key, "Gate secret_key")?,
        })
    }
}

impl RequestSigner for GateSigner {
    fn sign(&self, input: &SignInput<'_>) -> Result<Vec<(&'static str, String)>, ExchangeError> {
        let message = format!(
            "{}\n{}\n{}\n{}\n{}",
            input.method, input.path, input.query, input.body, input.nonce
        );

        let mut mac = Hmac::<Sha512>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(vec![
            ("KEY", self.api_key.clone()),
            ("Timestamp", input.nonce.to_string()),
            ("SIGN", signature),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_answer_vector() {
        let signer = GateSigner::new("key", "gate-secret").unwrap();
        let input = SignInput {
            method: "POST",
            path: "/api/v4/spot/orders",
            query: "",
            body: r#"{"amount":"0.5","currency_pair":"BTC_USDT","side":"buy","type":"market"}"#,
            nonce: "1700000000",
        };
        let headers = signer.sign(&input).unwrap();
        let sig = headers
            .iter()
            .find(|(name, _)| *name == "SIGN")
            .map(|(_, value)| value.as_str())
            .unwrap();
        assert_eq!(
            sig,
            "16f212626ababe19d3b28c3c6845afb398fe2006c94959b58f4006067258e9b0f49fdfd0a7573c33d88b48faa7b295e2177cdd6967586fc9d6f87414d720334c"
        );
    }
}
