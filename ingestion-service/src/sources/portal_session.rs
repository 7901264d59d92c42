use std::{sync::Arc, time::Duration};

use reqwest::{
    cookie::Jar,
    header::{HeaderValue, ACCEPT, LOCATION, SET_COOKIE, USER_AGENT},
    redirect::Policy,
    Response, Url,
};

use crate::config::TauronConfig;

const LOGIN_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/98.0.4758.82 Safari/537.36";
const LOGIN_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// Redirect hops followed after the login POST before the last response is taken as final.
pub const MAX_LOGIN_REDIRECTS: usize = 2;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid portal URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("login failed with status {0}")]
    Rejected(u16),
}

/// Where the portal lives. Overridable so tests can point at a local server.
#[derive(Debug, Clone)]
pub struct PortalEndpoints {
    pub service_url: Url,
    pub login_url: Url,
}

impl PortalEndpoints {
    pub fn new(service_url: &str, login_url: &str) -> Result<Self, AuthError> {
        Ok(Self {
            service_url: parse_url(service_url)?,
            login_url: parse_url(login_url)?,
        })
    }

    pub fn from_config(cfg: &TauronConfig) -> Result<Self, AuthError> {
        Self::new(cfg.service_url(), cfg.login_url())
    }

    /// `service` form value; the portal expects the bare origin without a trailing slash.
    fn service_param(&self) -> &str {
        self.service_url.as_str().trim_end_matches('/')
    }
}

fn parse_url(raw: &str) -> Result<Url, AuthError> {
    Url::parse(raw).map_err(|e| AuthError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Authenticated client plus the cookie jar it shares with every later request.
#[derive(Debug, Clone)]
pub struct PortalSession {
    client: reqwest::Client,
    jar: Arc<Jar>,
    endpoints: PortalEndpoints,
}

impl PortalSession {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn endpoints(&self) -> &PortalEndpoints {
        &self.endpoints
    }

    /// Cookie header the jar would send to the service origin.
    pub fn service_cookies(&self) -> Option<HeaderValue> {
        use reqwest::cookie::CookieStore;
        self.jar.cookies(&self.endpoints.service_url)
    }

    /// Seed cookies from the service root, then post the login form.
    ///
    /// Redirects are followed by hand, at most [`MAX_LOGIN_REDIRECTS`] hops, and
    /// every cookie set along the way is also filed under the service URL.
    /// Only 200 and 302 count as a successful login.
    pub async fn login(
        endpoints: PortalEndpoints,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(AuthError::Client)?;

        let seed = client.get(endpoints.service_url.clone()).send().await?;
        tracing::debug!(status = seed.status().as_u16(), "portal cookies seeded");

        let form = [
            ("username", username),
            ("password", password),
            ("service", endpoints.service_param()),
        ];
        let mut resp = client
            .post(endpoints.login_url.clone())
            .header(USER_AGENT, LOGIN_USER_AGENT)
            .header(ACCEPT, LOGIN_ACCEPT)
            .form(&form)
            .send()
            .await?;

        let mut hops = 0;
        loop {
            copy_cookies(&jar, &resp, &endpoints.service_url);

            if hops == MAX_LOGIN_REDIRECTS || !resp.status().is_redirection() {
                break;
            }
            let Some(next) = redirect_target(&resp) else {
                break;
            };
            tracing::debug!(hop = hops + 1, location = %next, "following login redirect");
            resp = client
                .get(next)
                .header(USER_AGENT, LOGIN_USER_AGENT)
                .header(ACCEPT, LOGIN_ACCEPT)
                .send()
                .await?;
            hops += 1;
        }

        let status = resp.status().as_u16();
        if status != 200 && status != 302 {
            return Err(AuthError::Rejected(status));
        }
        tracing::info!(status, redirects = hops, "logged in to portal");

        Ok(Self {
            client,
            jar,
            endpoints,
        })
    }
}

fn redirect_target(resp: &Response) -> Option<Url> {
    let location = resp.headers().get(LOCATION)?.to_str().ok()?;
    resp.url().join(location).ok()
}

fn copy_cookies(jar: &Jar, resp: &Response, service_url: &Url) {
    for value in resp.headers().get_all(SET_COOKIE) {
        if let Ok(cookie) = value.to_str() {
            jar.add_cookie_str(cookie, service_url);
        }
    }
}
