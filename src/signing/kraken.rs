use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::signing::{require_credential, RequestSigner, SignInput};
use crate::venue::adapter::ExchangeError;

/// Kraken spot authentication:
/// `API-Sign = base64(hmac_sha512(base64_decode(secret), path ++ sha256(nonce + postdata)))`
/// where the millisecond nonce is also a field inside the form-encoded body.
pub struct KrakenSigner {
    api_key: String,
    secret_bytes: Vec<u8>,
}

impl KrakenSigner {
    pub fn new(api_key: &str, secret_key: &str) -> Result<Self, ExchangeError> {
        let secret = require_credential(secret_key, "Kraken secret_key")?;
        let secret_bytes = general_purpose::STANDARD.decode(&secret).map_err(|e| {
            ExchangeError::Configuration(format!(
                "invalid Kraken secret_key (base64 decode failed): {e}"
            ))
        })?;
        Ok(Self {
            api_key: require_credential(api_key, "Kraken api_key")?,
            secret_bytes,
        })
    }
}

impl RequestSigner for KrakenSigner {
    fn sign(&self, input: &SignInput<'_>) -> Result<Vec<(&'static str, String)>, ExchangeError> {
        let mut sha = Sha256::new();
        sha.update(input.nonce.as_bytes());
        sha.update(input.body.as_bytes());
        let digest = sha.finalize();

        let mut mac = Hmac::<Sha512>::new_from_slice(&self.secret_bytes)
            .expect("HMAC can take key of any size");
        mac.update(input.path.as_bytes());
        mac.update(&digest);
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(vec![
            ("API-Key", self.api_key.clone()),
            ("API-Sign", signature),
        ])
    }
}

/// Kraken Futures authentication (distinct from spot):
/// `Authent = base64(hmac_sha256(secret, nonce + postdata + path))`
/// with the millisecond nonce carried in its own header.
pub struct KrakenFuturesSigner {
    api_key: String,
    secret_key: String,
}

impl KrakenFuturesSigner {
    pub fn new(api_key: &str, secret_key: &str) -> Result<Self, ExchangeError> {
        Ok(Self {
            api_key: require_credential(api_key, "KrakenFutures api_key")?,
            secret_key: require_credential(secret_key, "KrakenFutures secret_key")?,
        })
    }
}

impl RequestSigner for KrakenFuturesSigner {
    fn sign(&self, input: &SignInput<'_>) -> Result<Vec<(&'static str, String)>, ExchangeError> {
        let prehash = format!("{}{}{}", input.nonce, input.body, input.path);

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(prehash.as_bytes());
        let authent = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(vec![
            ("APIKey", self.api_key.clone()),
            ("Nonce", input.nonce.to_string()),
            ("Authent", authent),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_known_answer_vector() {
        // Secret is base64("kraken-raw-secret-0123456789abcd").
        let signer =
            KrakenSigner::new("key", "a3Jha2VuLXJhdy1zZWNyZXQtMDEyMzQ1Njc4OWFiY2Q=").unwrap();
        let input = SignInput {
            method: "POST",
            path: "/0/private/AddOrder",
            query: "",
            body: "nonce=1700000000000&ordertype=market&pair=XBTUSDT&type=buy&volume=0.5",
            nonce: "1700000000000",
        };
        let headers = signer.sign(&input).unwrap();
        let sig = headers
            .iter()
            .find(|(name, _)| *name == "API-Sign")
            .map(|(_, value)| value.as_str())
            .unwrap();
        assert_eq!(
            sig,
            "8+3yF0pUWT772IiLWrVjF6Ec2cPCS5i2V9AXIk2+keAvo9b1VLZfYPdbxnx/UUgh+lldGDvjf4wpVJRQjUt+Uw=="
        );
    }

    #[test]
    fn futures_known_answer_vector() {
        let signer = KrakenFuturesSigner::new("key", "kraken-futures-secret").unwrap();
        let input = SignInput {
            method: "POST",
            path: "/derivatives/api/v3/sendorder",
            query: "",
            body: "orderType=mkt&side=buy&size=1&symbol=PF_XBTUSD",
            nonce: "1700000000000",
        };
        let headers = signer.sign(&input).unwrap();
        let sig = headers
            .iter()
            .find(|(name, _)| *name == "Authent")
            .map(|(_, value)| value.as_str())
            .unwrap();
        assert_eq!(sig, "i5ui6t4tOhZ9235xREhaIoVeak8ayWOv1QsDcQ8PJHk=");
    }

    #[test]
    fn spot_rejects_non_base64_secret() {
        assert!(matches!(
            KrakenSigner::new("key", "%%%not-base64%%%"),
            Err(ExchangeError::Configuration(_))
        ));
    }
}
