//! HTTP page driver
//!
//! Fetches the document with reqwest and computes the title the way a browser
//! computes `document.title`: text of the first `<title>` element, entities
//! decoded, ASCII whitespace collapsed and trimmed. No script runs, so pages
//! that set their title from JavaScript need the Playwright driver.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};

/// Elements whose content can never hold the document `<title>`: raw text,
/// foreign content (an SVG `<title>` is not the HTML title) and inert templates.
const OPAQUE_ELEMENTS: &[&str] = &[
    "script", "style", "svg", "math", "template", "textarea", "noscript", "xmp", "iframe",
    "noembed", "noframes",
];

/// Scans markup in document order. Comments and opaque elements are matched so
/// they can be skipped; only the `title` group is of interest. An unterminated
/// comment, element or title runs to the end of input, as in a browser.
static MARKUP_RE: Lazy<Regex> = Lazy::new(|| {
    let mut alternatives = vec![
        r"<!--(?:-?>|.*?--!?>|.*\z)".to_string(),
        r"<title(?:\s[^>]*)?>(?P<title>.*?)(?:</title\s*>|\z)".to_string(),
    ];
    for tag in OPAQUE_ELEMENTS {
        alternatives.push(format!(r"<{tag}(?:\s[^>]*)?/>"));
        alternatives.push(format!(r"<{tag}(?:\s[^>]*)?>(?:.*?</{tag}\s*>|.*\z)"));
    }
    Regex::new(&format!("(?is){}", alternatives.join("|"))).expect("valid markup regex")
});

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").expect("valid entity regex")
});

/// Entity names for U+00A0..=U+00FF, in code point order
const LATIN1_ENTITIES: [&str; 96] = [
    "nbsp", "iexcl", "cent", "pound", "curren", "yen", "brvbar", "sect", "uml", "copy", "ordf",
    "laquo", "not", "shy", "reg", "macr", "deg", "plusmn", "sup2", "sup3", "acute", "micro",
    "para", "middot", "cedil", "sup1", "ordm", "raquo", "frac14", "frac12", "frac34", "iquest",
    "Agrave", "Aacute", "Acirc", "Atilde", "Auml", "Aring", "AElig", "Ccedil", "Egrave",
    "Eacute", "Ecirc", "Euml", "Igrave", "Iacute", "Icirc", "Iuml", "ETH", "Ntilde", "Ograve",
    "Oacute", "Ocirc", "Otilde", "Ouml", "times", "Oslash", "Ugrave", "Uacute", "Ucirc", "Uuml",
    "Yacute", "THORN", "szlig", "agrave", "aacute", "acirc", "atilde", "auml", "aring", "aelig",
    "ccedil", "egrave", "eacute", "ecirc", "euml", "igrave", "iacute", "icirc", "iuml", "eth",
    "ntilde", "ograve", "oacute", "ocirc", "otilde", "ouml", "divide", "oslash", "ugrave",
    "uacute", "ucirc", "uuml", "yacute", "thorn", "yuml",
];

const SPECIAL_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("OElig", '\u{152}'),
    ("oelig", '\u{153}'),
    ("Scaron", '\u{160}'),
    ("scaron", '\u{161}'),
    ("Yuml", '\u{178}'),
    ("fnof", '\u{192}'),
    ("circ", '\u{2c6}'),
    ("tilde", '\u{2dc}'),
    ("ensp", '\u{2002}'),
    ("emsp", '\u{2003}'),
    ("thinsp", '\u{2009}'),
    ("zwnj", '\u{200c}'),
    ("zwj", '\u{200d}'),
    ("lrm", '\u{200e}'),
    ("rlm", '\u{200f}'),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("sbquo", '\u{201a}'),
    ("ldquo", '\u{201c}'),
    ("rdquo", '\u{201d}'),
    ("bdquo", '\u{201e}'),
    ("dagger", '\u{2020}'),
    ("Dagger", '\u{2021}'),
    ("bull", '\u{2022}'),
    ("hellip", '\u{2026}'),
    ("permil", '\u{2030}'),
    ("prime", '\u{2032}'),
    ("Prime", '\u{2033}'),
    ("lsaquo", '\u{2039}'),
    ("rsaquo", '\u{203a}'),
    ("euro", '\u{20ac}'),
    ("trade", '\u{2122}'),
    ("larr", '\u{2190}'),
    ("uarr", '\u{2191}'),
    ("rarr", '\u{2192}'),
    ("darr", '\u{2193}'),
    ("harr", '\u{2194}'),
    ("minus", '\u{2212}'),
    ("hearts", '\u{2665}'),
];

static NAMED_ENTITIES: Lazy<HashMap<&'static str, char>> = Lazy::new(|| {
    let latin1 = LATIN1_ENTITIES
        .iter()
        .zip(0xa0u32..)
        .filter_map(|(name, code)| char::from_u32(code).map(|c| (*name, c)));
    latin1.chain(SPECIAL_ENTITIES.iter().copied()).collect()
});

/// Numeric references in 0x80..=0x9F name windows-1252 characters
const WINDOWS_1252_C1: [u32; 32] = [
    0x20ac, 0x81, 0x201a, 0x192, 0x201e, 0x2026, 0x2020, 0x2021, 0x2c6, 0x2030, 0x160, 0x2039,
    0x152, 0x8d, 0x17d, 0x8f, 0x90, 0x2018, 0x2019, 0x201c, 0x201d, 0x2022, 0x2013, 0x2014,
    0x2dc, 0x2122, 0x161, 0x203a, 0x153, 0x9d, 0x17e, 0x178,
];

/// Configuration for the HTTP driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("pagecheck/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
        }
    }
}

#[derive(Debug)]
struct LoadedPage {
    url: String,
    body: String,
}

pub struct HttpDriver {
    client: reqwest::Client,
    page: Mutex<Option<LoadedPage>>,
}

impl HttpDriver {
    pub fn new(config: &HttpConfig, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            page: Mutex::new(None),
        })
    }

    /// URL of the loaded page after redirects
    pub async fn current_url(&self) -> Option<String> {
        self.page.lock().await.as_ref().map(|p| p.url.clone())
    }
}

#[async_trait]
impl PageDriver for HttpDriver {
    fn name(&self) -> &str {
        "http"
    }

    async fn navigate(&self, url: &str) -> E2eResult<()> {
        debug!("GET {}", url);

        let navigation_error = |e: reqwest::Error| E2eError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let resp = self.client.get(url).send().await.map_err(navigation_error)?;
        let status = resp.status();
        let final_url = resp.url().to_string();

        // Browsers render error pages too; only transport failures fail navigation.
        if !status.is_success() {
            warn!("{} responded with {}", final_url, status);
        }

        let body = resp.text().await.map_err(navigation_error)?;
        *self.page.lock().await = Some(LoadedPage {
            url: final_url,
            body,
        });
        Ok(())
    }

    async fn title(&self) -> E2eResult<String> {
        Ok(self
            .page
            .lock()
            .await
            .as_ref()
            .map(|p| extract_title(&p.body))
            .unwrap_or_default())
    }

    async fn close(&self) -> E2eResult<()> {
        self.page.lock().await.take();
        Ok(())
    }
}

/// Compute the document title from raw HTML
pub fn extract_title(html: &str) -> String {
    let Some(raw) = MARKUP_RE
        .captures_iter(html)
        .find_map(|caps| caps.name("title"))
    else {
        return String::new();
    };

    let decoded = decode_entities(raw.as_str());
    decoded
        .split(|c: char| c.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            decode_entity(entity).map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity.strip_prefix('#') {
        Some(num) => {
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse().ok(),
            };
            Some(numeric_reference(code))
        }
        None => NAMED_ENTITIES.get(entity).copied(),
    }
}

/// Character for a numeric reference; NUL, surrogates and out-of-range
/// values become U+FFFD
fn numeric_reference(code: Option<u32>) -> char {
    match code {
        None | Some(0) => char::REPLACEMENT_CHARACTER,
        Some(c @ 0x80..=0x9f) => char::from_u32(WINDOWS_1252_C1[(c - 0x80) as usize])
            .unwrap_or(char::REPLACEMENT_CHARACTER),
        Some(c) => char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER),
    }
}
