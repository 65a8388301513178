//! Incoming request types.
//!
//! [`Request`] is the raw request after routing: method, URI, headers, the
//! collected body and the path parameters. Route handlers never see it
//! directly; they receive a [`Context`] that the route pipeline builds from
//! it once authorization, validation and negotiation have passed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::HttpError;
use crate::negotiate::MediaType;
use crate::reply::{Redirect, Reply};
use crate::upload::Upload;

/// An incoming HTTP request with its body fully read.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> Self {
        Self { method, uri, headers, body, params }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Decoded query string. Repeated keys keep the last value.
    pub fn query(&self) -> HashMap<String, String> {
        self.uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    /// `scheme://host` as the client addressed us, or `""` when the request
    /// carries no host. Honors `x-forwarded-proto` from the fronting proxy.
    pub fn origin(&self) -> String {
        let host = self
            .header("host")
            .map(str::to_owned)
            .or_else(|| self.uri.authority().map(|a| a.to_string()));
        let Some(host) = host else { return String::new() };
        let scheme = self
            .header("x-forwarded-proto")
            .and_then(|p| p.split(',').next())
            .map(str::trim)
            .or_else(|| self.uri.scheme_str())
            .unwrap_or("http");
        format!("{scheme}://{host}")
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Credentials from an `Authorization: Basic …` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    /// Empty when the client sent none.
    pub password: String,
}

/// Everything a route handler gets to look at.
pub struct Context {
    pub(crate) body: Value,
    pub(crate) id: Option<String>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) headers: HeaderMap,
    pub(crate) query: HashMap<String, String>,
    pub(crate) accepts: Option<MediaType>,
    pub(crate) upload: Option<Upload>,
    pub(crate) jar: CookieJar,
}

impl Context {
    /// The request body: validated and normalised when the route carries a
    /// schema, raw JSON otherwise, `null` on routes without a body.
    pub fn body(&self) -> &Value { &self.body }

    pub fn into_body(self) -> Value { self.body }

    /// Deserialises the body. Failure is a `400`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        T::deserialize(&self.body).map_err(|e| HttpError::bad_request(format!("Invalid body: {e}")))
    }

    /// The trailing identifier segment, on routes registered with one.
    pub fn id(&self) -> Option<&str> { self.id.as_deref() }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    pub fn headers(&self) -> &HeaderMap { &self.headers }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query(&self) -> &HashMap<String, String> { &self.query }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// The representation negotiated for this request (read routes only).
    pub fn accepts(&self) -> Option<MediaType> { self.accepts }

    /// The stored file, on upload routes.
    pub fn upload(&self) -> Option<&Upload> { self.upload.as_ref() }

    /// Cookies from the `Cookie` header.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
            .filter(|(k, _)| !k.is_empty())
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Adds a `Set-Cookie` header to whatever response this request ends in.
    /// `attributes` is appended verbatim, e.g. `"Path=/; HttpOnly"`.
    pub fn set_cookie(&self, name: &str, value: &str, attributes: Option<&str>) {
        let cookie = match attributes {
            Some(attrs) => format!("{name}={value}; {attrs}"),
            None => format!("{name}={value}"),
        };
        self.jar.push(cookie);
    }

    /// Decodes `Authorization: Basic`. `None` if absent or malformed.
    pub fn basic_auth(&self) -> Option<BasicAuth> {
        let header = self.header("authorization")?;
        let mut parts = header.split_whitespace();
        let (scheme, encoded) = (parts.next()?, parts.next()?);
        if parts.next().is_some() || !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = String::from_utf8(BASE64.decode(encoded).ok()?).ok()?;
        let mut pair = decoded.split(':');
        let username = pair.next()?.to_owned();
        let password = pair.next().unwrap_or_default().to_owned();
        if pair.next().is_some() {
            return None;
        }
        Some(BasicAuth { username, password })
    }

    /// Shorthand for a `302` redirect reply.
    pub fn redirect(&self, location: impl Into<String>) -> Reply {
        Reply::Redirect(Redirect::to(location))
    }
}

/// `Set-Cookie` values collected while a handler runs. Each request owns its
/// own jar; the lock is never contended across requests.
#[derive(Clone, Default)]
pub(crate) struct CookieJar(Arc<Mutex<Vec<String>>>);

impl CookieJar {
    fn push(&self, cookie: String) {
        if let Ok(mut jar) = self.0.lock() {
            jar.push(cookie);
        }
    }

    pub(crate) fn drain(&self) -> Vec<HeaderValue> {
        let cookies = match self.0.lock() {
            Ok(mut jar) => std::mem::take(&mut *jar),
            Err(_) => return Vec::new(),
        };
        cookies
            .into_iter()
            .filter_map(|c| match HeaderValue::try_from(c) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping invalid set-cookie value");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(headers: &[(&'static str, &'static str)]) -> Context {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(*k, HeaderValue::from_static(v));
        }
        Context {
            body: Value::Null,
            id: None,
            params: HashMap::new(),
            headers: map,
            query: HashMap::new(),
            accepts: None,
            upload: None,
            jar: CookieJar::default(),
        }
    }

    fn request(uri: &str, headers: &[(&'static str, &'static str)]) -> Request {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(*k, HeaderValue::from_static(v));
        }
        Request::new(Method::GET, uri.parse().unwrap(), map, Bytes::new(), HashMap::new())
    }

    #[test]
    fn query_is_decoded() {
        let req = request("/users?name=a%20b&page=2&page=3", &[]);
        let query = req.query();
        assert_eq!(query["name"], "a b");
        assert_eq!(query["page"], "3");
    }

    #[test]
    fn origin_from_host_and_forwarded_proto() {
        assert_eq!(request("/x", &[("host", "api.local:8000")]).origin(), "http://api.local:8000");
        let proxied = request("/x", &[("host", "api.example"), ("x-forwarded-proto", "https")]);
        assert_eq!(proxied.origin(), "https://api.example");
        assert_eq!(request("/x", &[]).origin(), "");
    }

    #[test]
    fn cookies_parsed_across_headers() {
        let ctx = context(&[("cookie", "a=1; b = two"), ("cookie", "c=3")]);
        assert_eq!(ctx.cookie("b").as_deref(), Some("two"));
        assert_eq!(ctx.cookies().len(), 3);
        assert_eq!(ctx.cookie("zz"), None);
    }

    #[test]
    fn set_cookie_is_collected() {
        let ctx = context(&[]);
        ctx.set_cookie("session", "abc", Some("Path=/; HttpOnly"));
        let drained = ctx.jar.drain();
        assert_eq!(drained, vec![HeaderValue::from_static("session=abc; Path=/; HttpOnly")]);
        assert!(ctx.jar.drain().is_empty());
    }

    #[test]
    fn basic_auth_with_and_without_password() {
        // "kim:secret"
        let ctx = context(&[("authorization", "Basic a2ltOnNlY3JldA==")]);
        assert_eq!(
            ctx.basic_auth(),
            Some(BasicAuth { username: "kim".into(), password: "secret".into() })
        );
        // "kim"
        let ctx = context(&[("authorization", "basic a2lt")]);
        assert_eq!(ctx.basic_auth().map(|a| a.password), Some(String::new()));
    }

    #[test]
    fn basic_auth_rejects_malformed() {
        assert_eq!(context(&[]).basic_auth(), None);
        assert_eq!(context(&[("authorization", "Bearer abc")]).basic_auth(), None);
        assert_eq!(context(&[("authorization", "Basic !!!")]).basic_auth(), None);
        // "a:b:c"
        assert_eq!(context(&[("authorization", "Basic YTpiOmM=")]).basic_auth(), None);
    }

    #[test]
    fn body_as_typed() {
        #[derive(Debug, serde::Deserialize)]
        struct Order {
            sku: String,
        }
        let mut ctx = context(&[]);
        ctx.body = serde_json::json!({"sku": "x-1"});
        assert_eq!(ctx.body_as::<Order>().unwrap().sku, "x-1");
        ctx.body = serde_json::json!({"sku": 1});
        assert_eq!(ctx.body_as::<Order>().unwrap_err().status, http::StatusCode::BAD_REQUEST);
    }
}
