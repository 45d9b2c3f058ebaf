//! Browser identity generation
//!
//! Every outbound attempt presents a freshly drawn user agent together with
//! client hints derived from it, so the fingerprint stays self-consistent.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Browser version used when the agent string carries no recognised marker
pub const DEFAULT_BROWSER_VERSION: &str = "124";

/// User agents the generator draws from
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.2420.81",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5_2) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; SM-S918N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.82 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G991N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.6261.119 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/124.0.6367.88 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

const VERSION_MARKERS: &[&str] = &["Chrome/", "CriOS/"];

/// Operating system family advertised through `sec-ch-ua-platform`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
    Unknown,
}

impl Platform {
    /// Detect the platform family from a user agent.
    ///
    /// Android agents also mention Linux and iOS agents mention "Mac OS X",
    /// so the mobile families are checked first.
    pub fn detect(user_agent: &str) -> Self {
        if user_agent.contains("Android") {
            Platform::Android
        } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
            Platform::Ios
        } else if user_agent.contains("Windows") {
            Platform::Windows
        } else if user_agent.contains("Macintosh") || user_agent.contains("Mac OS X") {
            Platform::MacOs
        } else if user_agent.contains("Linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
            Platform::Android => "Android",
            Platform::Ios => "iOS",
            Platform::Unknown => "Unknown",
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Platform::Android | Platform::Ios)
    }
}

/// Browser family named by a user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Edge,
    /// Chrome on iOS, a WebKit shell
    ChromeIos,
    Safari,
    Other,
}

impl Browser {
    pub fn detect(user_agent: &str) -> Self {
        if user_agent.contains("Edg/") {
            Browser::Edge
        } else if user_agent.contains("CriOS/") {
            Browser::ChromeIos
        } else if user_agent.contains("Chrome/") {
            Browser::Chrome
        } else if user_agent.contains("Safari/") {
            Browser::Safari
        } else {
            Browser::Other
        }
    }

    /// Brand advertised in `sec-ch-ua`. `None` for browsers that send no
    /// client hints.
    pub fn brand(&self) -> Option<&'static str> {
        match self {
            Browser::Chrome => Some("Google Chrome"),
            Browser::Edge => Some("Microsoft Edge"),
            Browser::ChromeIos | Browser::Safari | Browser::Other => None,
        }
    }

    fn brand_marker(&self) -> &'static str {
        match self {
            Browser::Edge => "Edg/",
            _ => "Chrome/",
        }
    }
}

fn marker_version(user_agent: &str, marker: &str) -> Option<String> {
    let start = user_agent.find(marker)? + marker.len();
    let digits: String = user_agent[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (!digits.is_empty()).then_some(digits)
}

/// Extract the major browser version following a known marker
pub fn browser_version(user_agent: &str) -> String {
    VERSION_MARKERS
        .iter()
        .find_map(|marker| marker_version(user_agent, marker))
        .unwrap_or_else(|| DEFAULT_BROWSER_VERSION.to_string())
}

/// Header set presented for a single attempt
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_agent: String,
    pub platform: Platform,
    pub browser: Browser,
    pub mobile: bool,
    pub browser_version: String,
    headers: HeaderMap,
}

impl Identity {
    /// Build an identity for `user_agent`, targeting the site at `origin`.
    ///
    /// Client hints are only sent for Chromium browsers outside iOS.
    pub fn for_agent(user_agent: &str, origin: &str) -> Self {
        let platform = Platform::detect(user_agent);
        let browser = Browser::detect(user_agent);
        let mobile = platform.is_mobile();
        let version = browser_version(user_agent);
        let origin = origin.trim_end_matches('/');

        let mut pairs: Vec<(&'static str, String)> = vec![
            ("accept", "application/json, text/plain, */*".to_string()),
            ("accept-encoding", "gzip, deflate, br".to_string()),
            (
                "accept-language",
                "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            ),
            ("origin", origin.to_string()),
            ("referer", format!("{}/", origin)),
            ("user-agent", user_agent.to_string()),
            ("sec-fetch-site", "same-site".to_string()),
        ];

        if let Some(brand) = browser.brand().filter(|_| platform != Platform::Ios) {
            let brand_version = marker_version(user_agent, browser.brand_marker())
                .unwrap_or_else(|| version.clone());
            pairs.push((
                "sec-ch-ua",
                format!(
                    "\"Chromium\";v=\"{}\", \"Not(A:Brand\";v=\"24\", \"{}\";v=\"{}\"",
                    version, brand, brand_version
                ),
            ));
            pairs.push(("sec-ch-ua-mobile", if mobile { "?1" } else { "?0" }.to_string()));
            pairs.push(("sec-ch-ua-platform", format!("\"{}\"", platform.as_str())));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }

        Self {
            user_agent: user_agent.to_string(),
            platform,
            browser,
            mobile,
            browser_version: version,
            headers,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Draws identities from [`USER_AGENTS`] with an injectable RNG
pub struct IdentityGenerator {
    rng: Mutex<StdRng>,
    agents: Vec<String>,
    origin: String,
}

impl IdentityGenerator {
    pub fn new(origin: impl Into<String>) -> Self {
        Self::with_rng(origin, StdRng::from_entropy())
    }

    /// Deterministic generator, used by tests
    pub fn with_seed(origin: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(origin, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(origin: impl Into<String>, rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            agents: USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            origin: origin.into(),
        }
    }

    /// Replace the agent catalog. An empty catalog keeps the built-in one.
    pub fn with_agents(mut self, agents: Vec<String>) -> Self {
        if !agents.is_empty() {
            self.agents = agents;
        }
        self
    }

    pub fn generate(&self) -> Identity {
        let agent = {
            let mut rng = self.rng.lock();
            self.agents
                .choose(&mut *rng)
                .cloned()
                .unwrap_or_else(|| USER_AGENTS[0].to_string())
        };
        Identity::for_agent(&agent, &self.origin)
    }
}
