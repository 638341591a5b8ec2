//! Minimal `robots.txt` parser: `User-agent`/`Disallow`/`Allow` groups only.
//! No crate in this codebase's lineage parses robots.txt, so this is
//! hand-rolled rather than borrowed.

/// A parsed robots.txt policy for one user agent.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    disallow: Vec<String>,
    allow: Vec<String>,
}

struct Group {
    agents: Vec<String>,
    disallow: Vec<String>,
    allow: Vec<String>,
}

impl RobotsPolicy {
    /// Parses `body`, selecting the most specific group whose `User-agent`
    /// matches `user_agent` (case-insensitive substring), falling back to
    /// the `*` group. An absent or empty body is treated as fully allowed.
    pub fn parse(body: &str, user_agent: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        // Once a group has seen a directive other than User-agent, the next
        // User-agent line starts a new group rather than extending this one.
        let mut sealed = false;

        for raw_line in body.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else { continue };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();

            match key.as_str() {
                "user-agent" => {
                    if current.is_none() || sealed {
                        if let Some(g) = current.take() {
                            groups.push(g);
                        }
                        current = Some(Group { agents: vec![value], disallow: Vec::new(), allow: Vec::new() });
                        sealed = false;
                    } else if let Some(g) = current.as_mut() {
                        g.agents.push(value);
                    }
                }
                "disallow" => {
                    sealed = true;
                    if !value.is_empty() {
                        if let Some(g) = current.as_mut() {
                            g.disallow.push(value);
                        }
                    }
                }
                "allow" => {
                    sealed = true;
                    if let Some(g) = current.as_mut() {
                        g.allow.push(value);
                    }
                }
                _ => {}
            }
        }
        if let Some(g) = current.take() {
            groups.push(g);
        }

        let lower_ua = user_agent.to_ascii_lowercase();
        let specific = groups.iter().find(|g| {
            g.agents.iter().any(|a| a != "*" && lower_ua.contains(&a.to_ascii_lowercase()))
        });
        let chosen = specific.or_else(|| groups.iter().find(|g| g.agents.iter().any(|a| a == "*")));

        match chosen {
            Some(g) => RobotsPolicy { disallow: g.disallow.clone(), allow: g.allow.clone() },
            None => RobotsPolicy::default(),
        }
    }

    /// Whether `path` may be fetched: the longest matching `Allow`/`Disallow`
    /// rule wins; ties favor `Allow`.
    pub fn is_allowed(&self, path: &str) -> bool {
        let best_disallow = self.disallow.iter().filter(|p| path.starts_with(p.as_str())).map(|p| p.len()).max();
        let best_allow = self.allow.iter().filter(|p| path.starts_with(p.as_str())).map(|p| p.len()).max();
        match (best_disallow, best_allow) {
            (Some(d), Some(a)) => a >= d,
            (Some(_), None) => false,
            _ => true,
        }
    }
}
