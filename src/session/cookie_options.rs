use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite};

use crate::Id;

/// Configuration options for session cookies.
///
/// When `max_age` is set, every commit sends an expiry of now plus
/// `max_age`, and the same expiry becomes the TTL of the stored record.
/// Without it the cookie lives for the browser session and the record
/// never expires on its own.
///
/// # Example
///
/// ```rust
/// use ruts_kv::CookieOptions;
///
/// let cookie_options = CookieOptions::build()
///         .name("test_sess")
///         .http_only(true)
///         .same_site(cookie::SameSite::Lax)
///         .secure(true)
///         .max_age(1 * 60)
///         .path("/");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct CookieOptions {
    pub http_only: bool,
    pub name: &'static str,
    pub domain: Option<&'static str>,
    pub path: Option<&'static str>,
    pub same_site: SameSite,
    pub secure: bool,
    pub max_age: Option<i64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            name: "__session",
            domain: None,
            path: Some("/"),
            same_site: SameSite::Lax,
            secure: true,
            max_age: None,
        }
    }
}

impl CookieOptions {
    /// Creates a new `CookieOptions` with default values.
    pub fn build() -> Self {
        Self::default()
    }

    /// Sets the name of the cookie.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn domain(mut self, domain: &'static str) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn path(mut self, path: &'static str) -> Self {
        self.path = Some(path);
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// The point in time a session committed now should expire at.
    pub fn expires_from(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        self.max_age.map(|seconds| now + Duration::seconds(seconds))
    }

    pub(crate) fn build_cookie(&self, id: &Id, expires: Option<OffsetDateTime>) -> Cookie<'static> {
        let mut cookie = self.base_cookie(id.to_string());

        if let Some(expires) = expires {
            cookie.set_expires(expires);
        }
        if let Some(seconds) = self.max_age {
            cookie.set_max_age(Duration::seconds(seconds));
        }

        cookie
    }

    pub(crate) fn build_removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.base_cookie(String::new());
        cookie.make_removal();
        cookie
    }

    fn base_cookie(&self, value: String) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name, value))
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site);

        if let Some(domain) = self.domain {
            builder = builder.domain(domain);
        }
        if let Some(path) = self.path {
            builder = builder.path(path);
        }

        builder.build()
    }
}
