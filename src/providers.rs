use regex::Regex;

/// A third-party login domain with its own multi-step flow.
#[derive(Debug, Clone)]
pub struct FederatedProvider {
    pub id: String,
    /// Hosts (and their subdomains) that route to this provider's flow.
    pub login_hosts: Vec<String>,
    /// Matches URLs only reachable after a successful sign-in.
    pub app_url: Regex,
    pub identifier_selector: String,
    pub identifier_next: String,
    pub password_selector: String,
    pub password_next: String,
}

impl FederatedProvider {
    pub fn google() -> Self {
        Self {
            id: "google".into(),
            login_hosts: vec!["accounts.google.com".into(), "mail.google.com".into()],
            app_url: Regex::new(r"^https://mail\.google\.com/mail/").expect("valid regex"),
            identifier_selector: r#"input[type="email"]"#.into(),
            identifier_next: "#identifierNext".into(),
            password_selector: r#"input[type="password"][name="Passwd"], input[type="password"]"#
                .into(),
            password_next: "#passwordNext".into(),
        }
    }

    /// Whether `url`'s host is one of the login hosts or a subdomain of one.
    /// URLs without a parseable host never match.
    pub fn handles(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        self.login_hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
    }

    pub fn is_app_url(&self, url: &str) -> bool {
        self.app_url.is_match(url)
    }
}

/// How the driver should interact with a target.
#[derive(Debug, Clone, Copy)]
pub enum LoginStrategy<'a> {
    Generic,
    Federated(&'a FederatedProvider),
}

impl LoginStrategy<'_> {
    pub fn is_federated(&self) -> bool {
        matches!(self, Self::Federated(_))
    }
}

/// Picks a [`LoginStrategy`] for a URL from the registered providers.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    providers: Vec<FederatedProvider>,
}

impl UrlClassifier {
    /// A classifier that treats every target as a generic form.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: FederatedProvider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn classify(&self, url: &str) -> LoginStrategy<'_> {
        let url = sanitize_url(url);
        self.providers
            .iter()
            .find(|p| p.handles(&url))
            .map_or(LoginStrategy::Generic, LoginStrategy::Federated)
    }
}

impl Default for UrlClassifier {
    fn default() -> Self {
        Self::empty().with_provider(FederatedProvider::google())
    }
}

/// Prefix `https://` when the URL carries no scheme.
pub fn sanitize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}
