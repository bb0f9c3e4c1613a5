//! robots.txt fetching + parsing (C5). Per spec, fetching is best-effort --
//! any failure (network error, non-2xx, unparseable body) degrades to
//! allow-all rather than blocking the crawl.

use std::time::Duration;

use tracing::debug;

use spindle_frontier::RobotsCheck;

#[derive(Debug, Clone, Default)]
struct Rule {
    prefix: String,
    allow: bool,
}

/// Parsed robots.txt rules scoped to one user-agent. Implements
/// `spindle_frontier::RobotsCheck` so it can be handed to the frontier
/// directly.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    rules: Vec<Rule>,
    sitemaps: Vec<String>,
    crawl_delay: Option<Duration>,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parses raw robots.txt content, keeping only the group that applies
    /// to `user_agent` (falling back to the `*` group when there is no
    /// exact-name group), per the standard group-selection rule.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let groups = split_groups(content);
        let ua_lower = user_agent.to_ascii_lowercase();

        let exact = groups.iter().find(|g| {
            g.agents
                .iter()
                .any(|a| ua_lower.contains(a.as_str()) && a != "*")
        });
        let wildcard = groups.iter().find(|g| g.agents.iter().any(|a| a == "*"));
        let chosen = exact.or(wildcard);

        let mut rules = Vec::new();
        let mut crawl_delay = None;
        if let Some(group) = chosen {
            for (prefix, allow) in &group.path_rules {
                rules.push(Rule {
                    prefix: prefix.clone(),
                    allow: *allow,
                });
            }
            crawl_delay = group.crawl_delay;
        }

        // Sitemap directives are global, independent of user-agent grouping.
        let sitemaps = content
            .lines()
            .filter_map(|line| line.trim().strip_prefix_ci("sitemap:"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        Self {
            rules,
            sitemaps,
            crawl_delay,
        }
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

impl RobotsCheck for RobotsRules {
    /// Longest matching prefix wins; ties favor Allow. No match => allowed.
    fn allowed(&self, path: &str) -> bool {
        let mut best: Option<&Rule> = None;
        for rule in &self.rules {
            if rule.prefix.is_empty() || !path.starts_with(rule.prefix.as_str()) {
                continue;
            }
            match best {
                Some(b) if b.prefix.len() > rule.prefix.len() => {}
                Some(b) if b.prefix.len() == rule.prefix.len() && !rule.allow => {}
                _ => best = Some(rule),
            }
        }
        best.map(|r| r.allow).unwrap_or(true)
    }
}

struct Group {
    agents: Vec<String>,
    path_rules: Vec<(String, bool)>,
    crawl_delay: Option<Duration>,
}

fn split_groups(content: &str) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut current_agents: Vec<String> = Vec::new();
    let mut current_rules: Vec<(String, bool)> = Vec::new();
    let mut current_delay: Option<Duration> = None;
    let mut have_rules_since_agent_line = false;

    let flush = |groups: &mut Vec<Group>,
                 agents: &mut Vec<String>,
                 rules: &mut Vec<(String, bool)>,
                 delay: &mut Option<Duration>| {
        if !agents.is_empty() {
            groups.push(Group {
                agents: std::mem::take(agents),
                path_rules: std::mem::take(rules),
                crawl_delay: delay.take(),
            });
        }
        agents.clear();
        rules.clear();
        *delay = None;
    };

    for raw_line in content.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        if let Some(agent) = line.strip_prefix_ci("user-agent:") {
            if have_rules_since_agent_line {
                flush(
                    &mut groups,
                    &mut current_agents,
                    &mut current_rules,
                    &mut current_delay,
                );
                have_rules_since_agent_line = false;
            }
            current_agents.push(agent.trim().to_ascii_lowercase());
        } else if let Some(path) = line.strip_prefix_ci("disallow:") {
            have_rules_since_agent_line = true;
            let path = path.trim();
            if !path.is_empty() {
                current_rules.push((path.to_string(), false));
            }
        } else if let Some(path) = line.strip_prefix_ci("allow:") {
            have_rules_since_agent_line = true;
            let path = path.trim();
            if !path.is_empty() {
                current_rules.push((path.to_string(), true));
            }
        } else if let Some(delay) = line.strip_prefix_ci("crawl-delay:") {
            have_rules_since_agent_line = true;
            if let Ok(secs) = delay.trim().parse::<f64>() {
                current_delay = Some(Duration::from_secs_f64(secs));
            }
        }
    }
    flush(
        &mut groups,
        &mut current_agents,
        &mut current_rules,
        &mut current_delay,
    );
    groups
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

trait StripPrefixCi {
    fn strip_prefix_ci<'a>(&'a self, prefix: &str) -> Option<&'a str>;
}

impl StripPrefixCi for str {
    fn strip_prefix_ci<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        if self.len() < prefix.len() {
            return None;
        }
        if self[..prefix.len()].eq_ignore_ascii_case(prefix) {
            Some(&self[prefix.len()..])
        } else {
            None
        }
    }
}

/// Best-effort robots.txt fetch. Any transport or status failure yields
/// `RobotsRules::allow_all()`.
pub async fn fetch_robots(client: &reqwest::Client, domain_root: &str, user_agent: &str) -> RobotsRules {
    let url = format!("{}/robots.txt", domain_root.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(body) => RobotsRules::parse(&body, user_agent),
            Err(e) => {
                debug!(url = %url, error = %e, "robots.txt body read failed, allowing all");
                RobotsRules::allow_all()
            }
        },
        Ok(resp) => {
            debug!(url = %url, status = %resp.status(), "robots.txt not fetchable, allowing all");
            RobotsRules::allow_all()
        }
        Err(e) => {
            debug!(url = %url, error = %e, "robots.txt fetch failed, allowing all");
            RobotsRules::allow_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallow_blocks_matching_prefix() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /private", "spindle/0.1");
        assert!(!rules.allowed("/private/x"));
        assert!(rules.allowed("/public"));
    }

    #[test]
    fn longest_match_wins_allow_over_disallow() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /a\nAllow: /a/public",
            "spindle/0.1",
        );
        assert!(rules.allowed("/a/public/page"));
        assert!(!rules.allowed("/a/private"));
    }

    #[test]
    fn specific_agent_group_overrides_wildcard() {
        let content = "User-agent: *\nDisallow: /\nUser-agent: spindle\nDisallow: /only-this";
        let rules = RobotsRules::parse(content, "spindle/0.1");
        assert!(rules.allowed("/anything"));
        assert!(!rules.allowed("/only-this"));
    }

    #[test]
    fn collects_sitemaps_and_crawl_delay() {
        let content = "User-agent: *\nCrawl-delay: 2\nSitemap: https://example.com/sitemap.xml";
        let rules = RobotsRules::parse(content, "spindle/0.1");
        assert_eq!(rules.sitemaps(), &["https://example.com/sitemap.xml".to_string()]);
        assert_eq!(rules.crawl_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn unparseable_or_missing_robots_allows_everything() {
        let rules = RobotsRules::allow_all();
        assert!(rules.allowed("/anything"));
    }
}
