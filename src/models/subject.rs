use super::NotificationResource;

/// A resource ID split into scopes. Each scope is one `/key/value` pair, except
/// a provider scope which spans `/providers/{namespace}/{type}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    scopes: Vec<Scope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scope {
    namespace: Option<String>,
    kind: String,
    name: String,
}

impl Scope {
    fn segment(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("providers/{}/{}/{}", ns, self.kind, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

impl ResourceId {
    /// `None` when `id` is not an absolute, well-formed resource path.
    pub fn parse(id: &str) -> Option<Self> {
        let rest = id.strip_prefix('/')?;
        let tokens: Vec<&str> = rest.split('/').collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return None;
        }

        let mut scopes = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].eq_ignore_ascii_case("providers") {
                let [ns, kind, name] = tokens.get(i + 1..i + 4)? else {
                    return None;
                };
                scopes.push(Scope {
                    namespace: Some(ns.to_string()),
                    kind: kind.to_string(),
                    name: name.to_string(),
                });
                i += 4;
            } else {
                let [kind, name] = tokens.get(i..i + 2)? else {
                    return None;
                };
                scopes.push(Scope {
                    namespace: None,
                    kind: kind.to_string(),
                    name: name.to_string(),
                });
                i += 2;
            }
        }
        Some(Self { scopes })
    }

    pub fn name(&self) -> &str {
        self.scopes.last().map(|s| s.name.as_str()).unwrap_or_default()
    }

    /// Fully qualified type, e.g. `Microsoft.Compute/virtualMachines/extensions`.
    pub fn resource_type(&self) -> String {
        let provider = self.scopes.iter().rposition(|s| s.namespace.is_some());
        match provider {
            Some(at) => {
                let head = &self.scopes[at];
                let mut out = format!("{}/{}", head.namespace.as_deref().unwrap_or_default(), head.kind);
                for child in &self.scopes[at + 1..] {
                    out.push('/');
                    out.push_str(&child.kind);
                }
                out
            }
            None => match self.scopes.last() {
                Some(s) if s.kind.eq_ignore_ascii_case("subscriptions") => "Microsoft.Resources/subscriptions".into(),
                Some(s) if s.kind.eq_ignore_ascii_case("resourceGroups") => "Microsoft.Resources/resourceGroups".into(),
                Some(s) => s.kind.clone(),
                None => String::new(),
            },
        }
    }

    fn prefix(
        &self,
        len: usize,
    ) -> String {
        let segments: Vec<String> = self.scopes[..len].iter().map(Scope::segment).collect();
        format!("/{}", segments.join("/"))
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.prefix(self.scopes.len()))
    }
}

/// The deepest scope every resource lives under. `/` when they only share the
/// tenant root, the full ID for a single resource, empty for no resources.
pub fn subject(resources: &[NotificationResource]) -> String {
    let Some(first) = resources.first() else {
        return String::new();
    };
    let Some(base) = ResourceId::parse(first.scope_id()) else {
        return "/".to_string();
    };

    let mut shared = base.scopes.len();
    for r in &resources[1..] {
        let Some(other) = ResourceId::parse(r.scope_id()) else {
            return "/".to_string();
        };
        shared = base
            .scopes
            .iter()
            .zip(other.scopes.iter())
            .take(shared)
            .take_while(|(a, b)| a == b)
            .count();
        if shared == 0 {
            break;
        }
    }

    if shared == 0 {
        return "/".to_string();
    }
    base.prefix(shared)
}
