use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Normal,
}

/// Administrator-configured keywords flagged against link metadata.
#[derive(Debug, Clone, Default)]
pub struct RiskPolicy {
    keywords: Vec<String>,
}

impl RiskPolicy {
    /// Parses the comma separated `risk_keywords` setting. Blank entries are dropped.
    pub fn parse(raw: &str) -> Self {
        let keywords = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self { keywords }
    }

    fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// A link is high risk when any keyword occurs, ignoring case, in its
    /// title, url or fetched page title.
    pub fn classify(&self, title: &str, url: &str, http_title: Option<&str>) -> RiskLevel {
        if self.is_empty() {
            return RiskLevel::Normal;
        }

        let haystack = format!("{}{}{}", title, url, http_title.unwrap_or_default()).to_lowercase();
        if self.keywords.iter().any(|k| haystack.contains(k.as_str())) {
            RiskLevel::High
        } else {
            RiskLevel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_drops_blanks() {
        let policy = RiskPolicy::parse(" vpn , ,Casino,");
        assert_eq!(policy.keywords, vec!["vpn", "casino"]);
    }

    #[test]
    fn empty_policy_flags_nothing() {
        let policy = RiskPolicy::parse("  ,  ");
        assert!(policy.is_empty());
        assert_eq!(
            policy.classify("free vpn", "https://vpn.test", None),
            RiskLevel::Normal
        );
    }

    #[test]
    fn matches_are_case_insensitive() {
        let policy = RiskPolicy::parse("VPN");
        assert_eq!(
            policy.classify("Fast Vpn", "https://example.test", None),
            RiskLevel::High
        );
    }

    #[test]
    fn fetched_title_is_checked() {
        let policy = RiskPolicy::parse("赌场");
        assert_eq!(
            policy.classify("home", "https://example.test", Some("在线赌场")),
            RiskLevel::High
        );
        assert_eq!(
            policy.classify("home", "https://example.test", Some("新闻")),
            RiskLevel::Normal
        );
    }

    #[test]
    fn keyword_can_span_title_and_url() {
        // Fields are concatenated without a separator.
        let policy = RiskPolicy::parse("abhttp");
        assert_eq!(
            policy.classify("ab", "http://x.test", None),
            RiskLevel::High
        );
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&RiskLevel::Normal).unwrap(),
            "\"normal\""
        );
    }
}
