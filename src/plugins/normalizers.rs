use crate::plugins::{NormalizerScope, PluginError, UrlNormalizer};
use url::Url;

/// Query parameters that never change what a page is
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
];

/// General-purpose URL normalizer
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed (parsing also lowercases the host,
///    drops default ports and resolves dot segments)
/// 2. Collapse repeated slashes in the path
/// 3. Remove the fragment
/// 4. Remove tracking query parameters and sort the rest by name, dropping
///    an emptied query string
/// 5. In `GenerateHostCount` scope only, strip a leading `www.` from the host
///    so that `www.example.com` and `example.com` share one host budget
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicNormalizer;

impl BasicNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl UrlNormalizer for BasicNormalizer {
    fn name(&self) -> &str {
        "basic"
    }

    fn normalize(&self, url: &str, scope: NormalizerScope) -> Result<String, PluginError> {
        let mut parsed = Url::parse(url).map_err(|e| PluginError::MalformedUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if parsed.cannot_be_a_base() {
            return Ok(parsed.to_string());
        }

        let path = collapse_slashes(parsed.path());
        parsed.set_path(&path);
        parsed.set_fragment(None);

        if parsed.query().is_some() {
            let mut kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            kept.sort_by(|a, b| a.0.cmp(&b.0));

            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                parsed.query_pairs_mut().clear().extend_pairs(kept);
            }
        }

        if scope == NormalizerScope::GenerateHostCount {
            let stripped = parsed
                .host_str()
                .and_then(|h| h.strip_prefix("www."))
                .filter(|rest| !rest.is_empty())
                .map(str::to_string);

            if let Some(host) = stripped {
                parsed
                    .set_host(Some(&host))
                    .map_err(|e| PluginError::MalformedUrl {
                        url: url.to_string(),
                        message: format!("Failed to set host: {}", e),
                    })?;
            }
        }

        Ok(parsed.to_string())
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
