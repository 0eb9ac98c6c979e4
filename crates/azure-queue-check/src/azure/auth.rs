// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared Key request signing for the storage queue service.
//!
//! The signature is `base64(HMAC-SHA256(base64_decode(account_key), string_to_sign))` where the
//! string to sign is
//! ```text
//! VERB\n
//! <11 standard headers, one per line, all empty for the GET requests made here>
//! CanonicalizedHeaders (x-ms-* headers, lowercased and sorted, "name:value\n" each)
//! CanonicalizedResource ("/<account><path>" then "\n<param>:<value>" per sorted query param)
//! ```
//! See <https://learn.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key>.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Signs requests on behalf of one storage account.
#[derive(Clone)]
pub struct SharedKeySigner {
    account_name: String,
    key: Vec<u8>,
}

impl SharedKeySigner {
    pub fn new(account_name: &str, base64_key: &str) -> Result<Self, ServiceError> {
        let key = STANDARD.decode(base64_key).map_err(|e| {
            ServiceError::InvalidConnectionString(format!("AccountKey is not valid base64: {e}"))
        })?;
        Ok(Self {
            account_name: account_name.to_string(),
            key,
        })
    }

    /// Returns the value of the `Authorization` header for a request.
    pub fn authorization(
        &self,
        verb: &str,
        url: &Url,
        ms_headers: &[(&str, &str)],
    ) -> Result<String, ServiceError> {
        let string_to_sign = self.string_to_sign(verb, url, ms_headers);
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| ServiceError::InvalidConnectionString(format!("invalid AccountKey: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account_name, signature))
    }

    fn string_to_sign(&self, verb: &str, url: &Url, ms_headers: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(256);
        out.push_str(verb);
        out.push('\n');
        // Content-Encoding, Content-Language, Content-Length, Content-MD5, Content-Type, Date,
        // If-Modified-Since, If-Match, If-None-Match, If-Unmodified-Since, Range
        out.push_str(&"\n".repeat(11));

        let mut headers: Vec<(String, &str)> = ms_headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
            .filter(|(name, _)| name.starts_with("x-ms-"))
            .collect();
        headers.sort();
        for (name, value) in headers {
            out.push_str(&name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }

        out.push('/');
        out.push_str(&self.account_name);
        out.push_str(url.path());

        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.into_owned()))
            .collect();
        params.sort();
        let mut merged: Vec<(String, Vec<String>)> = Vec::with_capacity(params.len());
        for (name, value) in params {
            match merged.last_mut() {
                Some((last, values)) if *last == name => values.push(value),
                _ => merged.push((name, vec![value])),
            }
        }
        for (name, values) in merged {
            out.push('\n');
            out.push_str(&name);
            out.push(':');
            out.push_str(&values.join(","));
        }
        out
    }
}

impl std::fmt::Debug for SharedKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeySigner")
            .field("account_name", &self.account_name)
            .finish_non_exhaustive()
    }
}
