//! Authentication transforms applied to every outgoing request.
//!
//! An auth transform mutates the request under assembly, usually by
//! setting a header or appending a query parameter. It runs as the first
//! preparation step, after the definition has filled the per-call fields,
//! so configured credentials win over same-named definition headers.

use crate::request::RequestBuilder;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::sync::Arc;

/// Mutates a request in place to attach credentials.
pub trait AuthTransform: Send + Sync {
    /// Applies the credentials to the request being built.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the credentials cannot be encoded
    /// into a valid header or parameter.
    fn apply(&self, builder: &mut RequestBuilder) -> Result<()>;
}

/// No credentials. The default when a consumer sets no auth.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl AuthTransform for Anonymous {
    fn apply(&self, _builder: &mut RequestBuilder) -> Result<()> {
        Ok(())
    }
}

/// HTTP Basic authentication.
///
/// Sends `Authorization: Basic <base64(user:password)>`.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    credentials: String,
}

impl BasicAuth {
    /// Creates the transform from a username and password.
    pub fn new(user: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let raw = format!("{}:{}", user.as_ref(), password.as_ref());
        Self {
            credentials: format!("Basic {}", STANDARD.encode(raw)),
        }
    }
}

impl AuthTransform for BasicAuth {
    fn apply(&self, builder: &mut RequestBuilder) -> Result<()> {
        builder.info_mut().add_header("authorization", &self.credentials)
    }
}

/// Bearer-token authentication.
///
/// Sends `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerToken {
    header: String,
}

impl BearerToken {
    /// Creates the transform from a token.
    pub fn new(token: impl AsRef<str>) -> Self {
        Self {
            header: format!("Bearer {}", token.as_ref()),
        }
    }
}

impl AuthTransform for BearerToken {
    fn apply(&self, builder: &mut RequestBuilder) -> Result<()> {
        builder.info_mut().add_header("authorization", &self.header)
    }
}

/// An API token carried in a named header, with an optional scheme prefix.
#[derive(Debug, Clone)]
pub struct ApiTokenHeader {
    name: String,
    value: String,
}

impl ApiTokenHeader {
    /// Sends `<name>: <token>`.
    pub fn new(name: impl Into<String>, token: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            value: token.as_ref().to_string(),
        }
    }

    /// Sends `<name>: <prefix> <token>`.
    pub fn prefixed(
        name: impl Into<String>,
        prefix: impl AsRef<str>,
        token: impl AsRef<str>,
    ) -> Self {
        Self {
            name: name.into(),
            value: format!("{} {}", prefix.as_ref(), token.as_ref()),
        }
    }
}

impl AuthTransform for ApiTokenHeader {
    fn apply(&self, builder: &mut RequestBuilder) -> Result<()> {
        builder.info_mut().add_header(&self.name, &self.value)
    }
}

/// An API token carried as a query parameter on every request.
#[derive(Debug, Clone)]
pub struct ApiTokenParam {
    param: String,
    token: String,
}

impl ApiTokenParam {
    /// Appends `?<param>=<token>` to every request.
    pub fn new(param: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            token: token.into(),
        }
    }
}

impl AuthTransform for ApiTokenParam {
    fn apply(&self, builder: &mut RequestBuilder) -> Result<()> {
        builder
            .info_mut()
            .add_param(self.param.clone(), self.token.clone());
        Ok(())
    }
}

/// Normalizes the supported credential shapes into one [`AuthTransform`].
///
/// A `(user, password)` pair becomes [`BasicAuth`], a bare string becomes
/// [`BearerToken`], and an `Arc<dyn AuthTransform>` passes through, which
/// is how custom transforms plug in.
pub trait IntoAuth {
    /// Converts `self` into the canonical transform.
    fn into_auth(self) -> Arc<dyn AuthTransform>;
}

impl IntoAuth for Arc<dyn AuthTransform> {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        self
    }
}

impl IntoAuth for Anonymous {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(self)
    }
}

impl IntoAuth for BasicAuth {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(self)
    }
}

impl IntoAuth for BearerToken {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(self)
    }
}

impl IntoAuth for ApiTokenHeader {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(self)
    }
}

impl IntoAuth for ApiTokenParam {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(self)
    }
}

impl IntoAuth for (&str, &str) {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(BasicAuth::new(self.0, self.1))
    }
}

impl IntoAuth for (String, String) {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(BasicAuth::new(self.0, self.1))
    }
}

impl IntoAuth for &str {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(BearerToken::new(self))
    }
}

impl IntoAuth for String {
    fn into_auth(self) -> Arc<dyn AuthTransform> {
        Arc::new(BearerToken::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConverterRegistry, StandardConverter};

    fn builder() -> RequestBuilder {
        RequestBuilder::new(ConverterRegistry::new(vec![Arc::new(StandardConverter)]))
    }

    fn header<'a>(builder: &'a RequestBuilder, name: &str) -> &'a str {
        builder.info().headers.get(name).unwrap().to_str().unwrap()
    }

    #[test]
    fn basic_auth_encodes_the_rfc_7617_example() {
        let mut rb = builder();
        BasicAuth::new("Aladdin", "open sesame").apply(&mut rb).unwrap();
        assert_eq!(
            header(&rb, "authorization"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn bearer_token_sets_the_authorization_header() {
        let mut rb = builder();
        BearerToken::new("abc123").apply(&mut rb).unwrap();
        assert_eq!(header(&rb, "authorization"), "Bearer abc123");
    }

    #[test]
    fn token_header_supports_an_optional_prefix() {
        let mut rb = builder();
        ApiTokenHeader::new("x-api-key", "k1").apply(&mut rb).unwrap();
        ApiTokenHeader::prefixed("x-signed", "Signature", "s1")
            .apply(&mut rb)
            .unwrap();
        assert_eq!(header(&rb, "x-api-key"), "k1");
        assert_eq!(header(&rb, "x-signed"), "Signature s1");
    }

    #[test]
    fn token_param_appends_a_query_parameter() {
        let mut rb = builder();
        ApiTokenParam::new("api_key", "k1").apply(&mut rb).unwrap();
        assert_eq!(
            rb.info().params,
            vec![("api_key".to_string(), "k1".to_string())]
        );
    }

    #[test]
    fn credential_shapes_normalize_to_transforms() {
        let mut rb = builder();
        ("user", "pass").into_auth().apply(&mut rb).unwrap();
        assert!(header(&rb, "authorization").starts_with("Basic "));

        let mut rb = builder();
        "token".into_auth().apply(&mut rb).unwrap();
        assert_eq!(header(&rb, "authorization"), "Bearer token");

        let mut rb = builder();
        Anonymous.into_auth().apply(&mut rb).unwrap();
        assert!(rb.info().headers.is_empty());
    }
}
